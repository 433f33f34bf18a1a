use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::client::AdminClient;
use crate::commands::CommandError;
use crate::store::LoginActivity;
use crate::types::{AggregateStats, ConnectionState};

pub mod pages;

pub struct WebState {
    pub client: Arc<AdminClient>,
    pub activity_limit: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: AggregateStats,
    pub online_share: u8,
    pub logged_in_share: u8,
    pub locked_share: u8,
    pub offline_share: u8,
}

impl From<AggregateStats> for StatsResponse {
    fn from(stats: AggregateStats) -> Self {
        Self {
            online_share: stats.share(stats.online_count),
            logged_in_share: stats.share(stats.logged_in_count),
            locked_share: stats.share(stats.locked_count),
            offline_share: stats.share(stats.offline_count),
            stats,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub state: ConnectionState,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
}

/// Status API router
pub fn create_web_router(state: WebState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/fleet", get(fleet_handler))
        .route("/api/fleet/:pc_id", get(entity_handler))
        .route("/api/fleet/:pc_id/force-logout", post(force_logout_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/activity", get(activity_handler))
        .route("/api/connection", get(connection_handler))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(Arc::new(state))
}

pub async fn start_web_server(port: u16, state: WebState) -> anyhow::Result<()> {
    let app = create_web_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 Status page listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler(State(state): State<Arc<WebState>>) -> Html<String> {
    let snapshot = state.client.snapshot();
    let activity = snapshot.recent_logins(state.activity_limit);
    Html(pages::generate_index_html(
        &snapshot,
        &activity,
        state.client.connection_state(),
    ))
}

async fn fleet_handler(State(state): State<Arc<WebState>>) -> Response {
    let snapshot = state.client.snapshot();
    Json(&*snapshot).into_response()
}

async fn entity_handler(
    Path(pc_id): Path<String>,
    State(state): State<Arc<WebState>>,
) -> Response {
    let snapshot = state.client.snapshot();
    match snapshot.get(&pc_id) {
        Some(entity) => Json(entity).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(CommandResponse {
                success: false,
                message: format!("PC {} not found", pc_id),
            }),
        )
            .into_response(),
    }
}

async fn stats_handler(State(state): State<Arc<WebState>>) -> Json<StatsResponse> {
    Json(state.client.snapshot().stats.into())
}

async fn activity_handler(State(state): State<Arc<WebState>>) -> Json<Vec<LoginActivity>> {
    Json(state.client.snapshot().recent_logins(state.activity_limit))
}

async fn connection_handler(State(state): State<Arc<WebState>>) -> Json<ConnectionResponse> {
    Json(ConnectionResponse {
        state: state.client.connection_state(),
    })
}

async fn force_logout_handler(
    Path(pc_id): Path<String>,
    State(state): State<Arc<WebState>>,
) -> (StatusCode, Json<CommandResponse>) {
    info!(pc_id = %pc_id, "🚪 Force logout requested");

    let (status, message) = match state.client.force_logout(pc_id.as_str()).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            format!("Force logout sent to PC {}", pc_id),
        ),
        Err(e) => {
            warn!(pc_id = %pc_id, error = %e, "Force logout not delivered");
            let status = match e {
                CommandError::NotConnected | CommandError::Closed => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                CommandError::Transport(_) => StatusCode::BAD_GATEWAY,
                CommandError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string())
        }
    };

    (
        status,
        Json(CommandResponse {
            success: status == StatusCode::ACCEPTED,
            message,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_response_carries_shares() {
        let stats = AggregateStats {
            total_count: 4,
            online_count: 3,
            logged_in_count: 2,
            locked_count: 1,
            offline_count: 1,
        };
        let body = serde_json::to_value(StatsResponse::from(stats)).unwrap();

        assert_eq!(body["total_count"], 4);
        assert_eq!(body["online_share"], 75);
        assert_eq!(body["logged_in_share"], 50);
        assert_eq!(body["locked_share"], 25);
        assert_eq!(body["offline_share"], 25);
    }

    #[test]
    fn connection_state_serializes_lowercase() {
        let body = serde_json::to_value(ConnectionResponse {
            state: ConnectionState::Connecting,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"state": "connecting"}));
    }
}
