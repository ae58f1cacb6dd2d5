pub mod term;
pub mod theory;
pub mod fact;
pub mod knowledge;
pub mod rule;
pub mod formula;
pub mod model;
pub mod trace;
pub mod system;
pub mod search;
pub mod heuristic;
pub mod stats;
pub mod prover;
pub mod lemma;
pub mod compiler;
pub mod print;
