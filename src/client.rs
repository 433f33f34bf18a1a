use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::commands::{CommandError, CommandSender};
use crate::config::AppConfig;
use crate::connection::ConnectionManager;
use crate::dispatcher::EventDispatcher;
use crate::net::{Connector, WsConnector};
use crate::store::FleetSnapshot;
use crate::types::ConnectionState;

/// One admin session against the control server: the connection manager,
/// the dispatcher task that owns the fleet store, and the command handle.
/// Instances are independent; nothing is global.
pub struct AdminClient {
    manager: ConnectionManager,
    commands: CommandSender,
    snapshots: watch::Receiver<Arc<FleetSnapshot>>,
    dispatcher: JoinHandle<()>,
}

impl AdminClient {
    /// Build a client over any transport. The dispatcher starts immediately;
    /// nothing connects until [`AdminClient::connect`].
    pub fn new(config: &AppConfig, connector: Arc<dyn Connector>) -> Self {
        let (ingress_tx, ingress_rx) = mpsc::channel(config.ingress_capacity.max(1));
        let (dispatcher, snapshots) = EventDispatcher::new(config.stale_field_policy);
        let dispatcher = tokio::spawn(dispatcher.run(ingress_rx));

        let manager = ConnectionManager::new(
            config.endpoint_url(),
            config.reconnect.clone(),
            connector,
            ingress_tx,
            config.command_capacity,
        );
        let commands = manager.command_sender();

        info!(url = manager.url(), "🔧 Admin client created");
        Self {
            manager,
            commands,
            snapshots,
            dispatcher,
        }
    }

    pub fn websocket(config: &AppConfig) -> Self {
        Self::new(config, Arc::new(WsConnector))
    }

    pub async fn connect(&self) {
        self.manager.connect().await;
    }

    pub async fn disconnect(&self) {
        self.manager.disconnect().await;
    }

    /// Latest published fleet view
    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<FleetSnapshot>> {
        self.snapshots.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe()
    }

    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    pub async fn force_logout(&self, pc_id: impl Into<String>) -> Result<(), CommandError> {
        self.commands.force_logout(pc_id).await
    }

    /// Disconnect and wait for the dispatcher to drain
    pub async fn shutdown(self) {
        let AdminClient {
            manager,
            commands,
            snapshots,
            dispatcher,
        } = self;

        manager.disconnect().await;
        // The ingress sender lives in the manager; dropping it ends the dispatcher
        drop(manager);
        drop(commands);
        drop(snapshots);

        if let Err(e) = dispatcher.await {
            warn!(error = %e, "Event dispatcher ended abnormally");
        }
        info!("🛑 Admin client shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Transport, TransportError};
    use async_trait::async_trait;

    struct Refusing;

    #[async_trait]
    impl Connector for Refusing {
        async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
            Err(TransportError::Connect {
                url: url.to_string(),
                reason: "refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn starts_empty_and_disconnected() {
        let client = AdminClient::new(&AppConfig::default(), Arc::new(Refusing));

        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        let snapshot = client.snapshot();
        assert!(snapshot.entities.is_empty());
        assert_eq!(snapshot.stats.total_count, 0);

        assert_eq!(
            client.force_logout("1").await,
            Err(CommandError::NotConnected)
        );
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_retrying() {
        let client = AdminClient::new(&AppConfig::default(), Arc::new(Refusing));
        client.connect().await;
        let state = client.watch_connection();

        // Several refused attempts go by
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        client.shutdown().await;
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn clients_are_independent() {
        let first = AdminClient::new(&AppConfig::default(), Arc::new(Refusing));
        let second = AdminClient::new(&AppConfig::default(), Arc::new(Refusing));

        first.connect().await;
        second.disconnect().await;
        assert_eq!(second.connection_state(), ConnectionState::Disconnected);

        first.shutdown().await;
        second.shutdown().await;
    }
}
