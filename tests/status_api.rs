use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tower::ServiceExt;

use pc_fleet_admin::config::AppConfig;
use pc_fleet_admin::net::{Connector, Transport, TransportError};
use pc_fleet_admin::web::{create_web_router, WebState};
use pc_fleet_admin::{AdminClient, ConnectionState};

const WAIT: Duration = Duration::from_secs(5);

struct Refusing;

#[async_trait]
impl Connector for Refusing {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        Err(TransportError::Connect {
            url: url.to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

struct Link {
    inbound: mpsc::Receiver<String>,
    sent: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for Link {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.sent
            .send(text)
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) {}
}

/// In-memory server: frames pushed on `server_tx` reach the client
struct Loopback {
    link: Mutex<Option<Link>>,
}

#[async_trait]
impl Connector for Loopback {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        match self.link.lock().unwrap().take() {
            Some(link) => Ok(Box::new(link)),
            None => Err(TransportError::Connect {
                url: url.to_string(),
                reason: "link already used".to_string(),
            }),
        }
    }
}

struct Harness {
    app: Router,
    client: Arc<AdminClient>,
    server_tx: mpsc::Sender<String>,
    sent_rx: mpsc::UnboundedReceiver<String>,
}

async fn connected_harness() -> Harness {
    let (server_tx, inbound) = mpsc::channel(16);
    let (sent, sent_rx) = mpsc::unbounded_channel();
    let connector = Loopback {
        link: Mutex::new(Some(Link { inbound, sent })),
    };

    let client = Arc::new(AdminClient::new(&AppConfig::default(), Arc::new(connector)));
    client.connect().await;
    let mut state = client.watch_connection();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();

    let app = create_web_router(WebState {
        client: client.clone(),
        activity_limit: 2,
    });
    Harness {
        app,
        client,
        server_tx,
        sent_rx,
    }
}

fn disconnected_app() -> Router {
    let client = Arc::new(AdminClient::new(&AppConfig::default(), Arc::new(Refusing)));
    create_web_router(WebState {
        client,
        activity_limit: 10,
    })
}

async fn call(app: &Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = call(app, Method::GET, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn seed_fleet(harness: &Harness) {
    let frame = json!({
        "type": "initial_pc_status",
        "data": [
            {"pc_id": "1", "status": "logged_in", "username": "kim", "login_time": "2024-03-01T09:00:00Z"},
            {"pc_id": "2", "status": "logged_in", "username": "lee", "login_time": "2024-03-01T10:00:00Z"},
            {"pc_id": "3", "status": "logged_in", "username": "park", "login_time": "2024-03-01T11:00:00Z"},
            {"pc_id": "4", "status": "offline"}
        ]
    });
    harness.server_tx.send(frame.to_string()).await.unwrap();

    let mut snapshots = harness.client.subscribe();
    timeout(WAIT, snapshots.wait_for(|s| s.stats.total_count == 4))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn empty_fleet_while_disconnected() {
    let app = disconnected_app();

    let (status, body) = get_json(&app, "/api/fleet").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entities"], json!([]));
    assert_eq!(body["stats"]["total_count"], 0);

    let (status, body) = get_json(&app, "/api/connection").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"state": "disconnected"}));

    let (status, body) = get_json(&app, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["online_share"], 0);
}

#[tokio::test]
async fn force_logout_while_disconnected_is_unavailable() {
    let app = disconnected_app();

    let (status, body) = call(&app, Method::POST, "/api/fleet/7/force-logout").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_pc_is_not_found() {
    let app = disconnected_app();
    let (status, _) = call(&app, Method::GET, "/api/fleet/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn serves_fleet_stats_and_activity() {
    let harness = connected_harness().await;
    seed_fleet(&harness).await;

    let (status, body) = get_json(&harness.app, "/api/fleet/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "logged_in");
    assert_eq!(body["session"]["username"], "lee");

    let (_, stats) = get_json(&harness.app, "/api/stats").await;
    assert_eq!(stats["total_count"], 4);
    assert_eq!(stats["logged_in_count"], 3);
    assert_eq!(stats["logged_in_share"], 75);
    assert_eq!(stats["offline_share"], 25);

    // Limit of two, newest first
    let (_, activity) = get_json(&harness.app, "/api/activity").await;
    let users: Vec<&str> = activity
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["username"].as_str().unwrap())
        .collect();
    assert_eq!(users, vec!["park", "lee"]);

    let (_, connection) = get_json(&harness.app, "/api/connection").await;
    assert_eq!(connection, json!({"state": "connected"}));

    let (status, html) = call(&harness.app, Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(html).unwrap();
    assert!(html.contains("PCs (4 total)"));
}

#[tokio::test]
async fn force_logout_is_delivered() {
    let mut harness = connected_harness().await;

    let (status, body) = call(&harness.app, Method::POST, "/api/fleet/3/force-logout").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["success"], true);

    let sent = timeout(WAIT, harness.sent_rx.recv()).await.unwrap().unwrap();
    let sent: Value = serde_json::from_str(&sent).unwrap();
    assert_eq!(sent, json!({"type": "force_logout", "data": {"pc_id": "3"}}));
}
