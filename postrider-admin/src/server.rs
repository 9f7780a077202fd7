//! The admin HTTP server and its handlers.

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Form, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::Utc;
use postrider_common::{LogLevel, Signal};
use postrider_delivery::{EffectiveConfig, overlay};
use postrider_store::AgentState;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use crate::{AdminState, auth, error::AdminError, html, stats};

/// How many log lines `/logs` returns.
const LOG_TAIL_LINES: usize = 500;

/// Upper bound on `/emails` listings.
const MAX_LIST_LIMIT: i64 = 200;

/// The admin HTTP server.
pub struct AdminServer {
    listener: TcpListener,
    router: Router,
}

impl AdminServer {
    /// Bind the listener and assemble the router.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind(state: AdminState) -> Result<Self, AdminError> {
        let address = format!("0.0.0.0:{}", state.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| AdminError::Bind { address: address.clone(), source })?;

        tracing::info!(%address, "admin server bound");
        Ok(Self {
            listener,
            router: router(state),
        })
    }

    /// Run until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails while running.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), AdminError> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("admin server received shutdown signal");
            })
            .await
            .map_err(|e| AdminError::Server(e.to_string()))?;

        tracing::info!("admin server stopped");
        Ok(())
    }
}

/// Build the admin router over the given state.
#[must_use]
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(dashboard))
        .route("/stats", get(stats_json))
        .route("/status/reset", post(reset_status))
        .route("/emails", get(emails_list))
        .route("/emails/{id}", get(email_detail))
        .route("/logs", get(log_tail))
        .route("/config", get(config_view).post(config_save))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require,
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .with_state(state)
}

/// The configuration currently in force, merged fresh from the store.
async fn effective(state: &AdminState) -> EffectiveConfig {
    let overrides = state.admin.read_overrides().await.unwrap_or_default();
    overlay::merge(
        &state.defaults,
        &EffectiveConfig::from_defaults(&state.defaults),
        &overrides,
    )
}

async fn health(State(state): State<AdminState>) -> Json<serde_json::Value> {
    let effective = effective(&state).await;
    let (store_ok, store_error) = match state.admin.probe().await {
        Ok(()) => (true, None),
        Err(error) => (false, Some(error.to_string())),
    };

    Json(json!({
        "status": "ok",
        "version": state.version,
        "adminPort": state.port,
        "pollInterval": effective.poll_interval_secs,
        "logLevel": effective.log_level.as_str(),
        "store": { "ok": store_ok, "error": store_error },
    }))
}

async fn dashboard(State(state): State<AdminState>) -> Html<String> {
    let stats = stats::collect(&state).await;
    let config = effective(&state).await;
    Html(html::dashboard(&stats, &config))
}

async fn stats_json(State(state): State<AdminState>) -> Json<stats::Stats> {
    Json(stats::collect(&state).await)
}

async fn reset_status(State(state): State<AdminState>) -> Response {
    match state.admin.reset_status(Utc::now()).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": error.to_string() })),
        )
            .into_response(),
    }
}

fn parse_state_filter(raw: Option<&str>) -> (Option<AgentState>, String) {
    let normalized = raw.unwrap_or_default().trim().to_ascii_uppercase();
    // Only the two result states make sense as a browse filter.
    let state = match normalized.as_str() {
        "SENT" => Some(AgentState::Sent),
        "ERROR" => Some(AgentState::Error),
        _ => None,
    };
    let label = state.map(|s| s.as_str().to_string()).unwrap_or_default();
    (state, label)
}

#[derive(Debug, Deserialize)]
struct ListParams {
    state: Option<String>,
    limit: Option<i64>,
}

async fn emails_list(
    State(state): State<AdminState>,
    Query(params): Query<ListParams>,
) -> Html<String> {
    let (state_filter, label) = parse_state_filter(params.state.as_deref());
    let limit = usize::try_from(params.limit.unwrap_or(50).clamp(1, MAX_LIST_LIMIT))
        .unwrap_or(50);

    match state.mail.list_by_state_desc_updated(state_filter, limit).await {
        Ok(items) => Html(html::emails_list(&items, &label, limit, None)),
        Err(error) => Html(html::emails_list(&[], &label, limit, Some(&error.to_string()))),
    }
}

#[derive(Debug, Deserialize)]
struct DetailParams {
    state: Option<String>,
    format: Option<String>,
}

async fn email_detail(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Query(params): Query<DetailParams>,
) -> Response {
    let (state_filter, label) = parse_state_filter(params.state.as_deref());
    let as_json = params
        .format
        .as_deref()
        .is_some_and(|f| f.eq_ignore_ascii_case("json"));

    let snapshot = match state.mail.get(&id).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            return if as_json {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": "Document not found" })),
                )
                    .into_response()
            } else {
                Html(html::error_banner("Document not found")).into_response()
            };
        }
        Err(error) => {
            return if as_json {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": error.to_string() })),
                )
                    .into_response()
            } else {
                Html(html::error_banner(&error.to_string())).into_response()
            };
        }
    };

    // Neighbors come from a fresh ordered query so prev/next are
    // consistent within this request even as documents keep changing.
    let (mut prev_id, mut next_id) = (None, None);
    if let Ok(window) = state
        .mail
        .list_by_state_desc_updated(state_filter, usize::try_from(MAX_LIST_LIMIT).unwrap_or(200))
        .await
        && let Some(index) = window.iter().position(|item| item.id == id)
    {
        if index > 0 {
            next_id = Some(window[index - 1].id.clone());
        }
        if index + 1 < window.len() {
            prev_id = Some(window[index + 1].id.clone());
        }
    }

    if as_json {
        return Json(json!({
            "id": snapshot.id,
            "to": snapshot.recipients(),
            "subject": snapshot.subject(),
            "html": snapshot.html(),
            "state": snapshot.state().as_str(),
            "createdAt": snapshot.created_at().map(|ts| ts.to_rfc3339()),
            "smtpAgent": snapshot.doc.get_path("smtpAgent").map(postrider_store::Value::to_json),
            "data": snapshot.doc.to_json(),
        }))
        .into_response();
    }

    Html(html::email_detail(
        &snapshot,
        &label,
        prev_id.as_deref(),
        next_id.as_deref(),
    ))
    .into_response()
}

async fn log_tail(State(state): State<AdminState>) -> Response {
    let Some(path) = state.log_file.as_ref() else {
        return Html(html::log_tail(&["no log file configured"])).into_response();
    };

    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let lines: Vec<&str> = content.lines().collect();
            let start = lines.len().saturating_sub(LOG_TAIL_LINES);
            Html(html::log_tail(&lines[start..])).into_response()
        }
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<pre>Failed to read log file: {}</pre>",
                html::escape(&error.to_string())
            )),
        )
            .into_response(),
    }
}

async fn config_view(State(state): State<AdminState>) -> Html<String> {
    let config = effective(&state).await;
    Html(html::config_form(&config, None))
}

#[derive(Debug, Deserialize)]
struct ConfigForm {
    #[serde(rename = "pollInterval")]
    poll_interval: Option<String>,
    #[serde(rename = "maxRetryCount")]
    max_retry_count: Option<String>,
    #[serde(rename = "processFromAfter")]
    process_from_after: Option<String>,
    #[serde(rename = "logLevel")]
    log_level: Option<String>,
    #[serde(rename = "dashboardRefreshSec")]
    dashboard_refresh_sec: Option<String>,
}

fn positive(value: Option<&str>) -> Option<i64> {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|&v| v > 0)
}

async fn config_save(
    State(state): State<AdminState>,
    Form(form): Form<ConfigForm>,
) -> Response {
    let poll_interval = positive(form.poll_interval.as_deref())
        .unwrap_or_else(|| i64::try_from(state.defaults.poll_interval_secs).unwrap_or(60));
    let max_retry_count = positive(form.max_retry_count.as_deref())
        .unwrap_or_else(|| i64::from(state.defaults.max_retry_count));
    let process_from_after = form
        .process_from_after
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_string();
    let log_level = form
        .log_level
        .as_deref()
        .and_then(LogLevel::parse)
        .unwrap_or(state.defaults.log_level);
    let dashboard_refresh = positive(form.dashboard_refresh_sec.as_deref());

    match state
        .admin
        .write_config(
            poll_interval,
            &process_from_after,
            max_retry_count,
            log_level,
            dashboard_refresh,
        )
        .await
    {
        Ok(()) => Redirect::to("/config").into_response(),
        Err(error) => {
            let config = effective(&state).await;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(html::config_form(&config, Some(&error.to_string()))),
            )
                .into_response()
        }
    }
}
