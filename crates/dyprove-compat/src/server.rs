use crate::check;
use crate::config::{BudgetConfig, Config};
use crate::ir::IRModel;
use crate::report::ModelReport;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// A model to check. Fields left out fall back to the server configuration.
#[derive(Deserialize, Debug)]
pub struct EvaluateRequest {
    pub model: IRModel,
    #[serde(default)]
    pub flags: Option<BTreeSet<String>>,
    #[serde(default)]
    pub budget: Option<BudgetConfig>,
    #[serde(default)]
    pub lemma: Option<String>
}

type Failure = (StatusCode, Json<serde_json::Value>);

pub fn router(config: Config) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/evaluate", post(evaluate))
        .with_state(Arc::new(config))
}

/// Serve the router on `addr` until the process is stopped.
pub async fn serve(addr: &str, config: Config) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router(config)).await
}

async fn health() -> &'static str {
    "ok"
}

/// Compile the model and evaluate its lemmas off the async runtime.
async fn evaluate(
    State(config): State<Arc<Config>>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<ModelReport>, Failure> {
    let mut config = (*config).clone();
    if let Some(flags) = request.flags { config.flags = flags }
    if let Some(budget) = request.budget { config.budget = budget }
    let model = request.model;
    let lemma = request.lemma;

    let result = tokio::task::spawn_blocking(move || check(&model, &config, lemma.as_deref())).await;
    match result {
        Ok(Ok(report)) => Ok(Json(report)),
        Ok(Err(error)) => {
            warn!(%error, "model rejected");
            Err((StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": error.to_string() }))))
        }
        Err(error) => Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": error.to_string() }))))
    }
}
