use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::protocol::{self, InboundMessage};
use crate::store::{FleetSnapshot, FleetStore};
use crate::types::StaleFieldPolicy;

/// Input to the dispatcher, in arrival order
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// The transport just (re)opened; the server is expected to send a full snapshot
    ResyncRequested,
    /// One raw text frame from the server
    Frame(String),
}

/// Sole writer of the fleet store. Every applied change is published as a
/// fresh snapshot so readers never see a half-applied update.
pub struct EventDispatcher {
    store: FleetStore,
    snapshot_tx: watch::Sender<Arc<FleetSnapshot>>,
}

impl EventDispatcher {
    pub fn new(policy: StaleFieldPolicy) -> (Self, watch::Receiver<Arc<FleetSnapshot>>) {
        let store = FleetStore::new(policy);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(store.snapshot()));
        (Self { store, snapshot_tx }, snapshot_rx)
    }

    pub fn store(&self) -> &FleetStore {
        &self.store
    }

    /// Handle one event; returns true when the store changed
    pub fn handle(&mut self, event: DispatchEvent) -> bool {
        let changed = match event {
            DispatchEvent::ResyncRequested => {
                info!("🔄 Connection established, full resync requested");
                let before = self.store.revision();
                self.store.request_resync();
                self.store.revision() != before
            }
            DispatchEvent::Frame(text) => match protocol::decode_frame(&text) {
                Ok(message) => self.apply(message),
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable admin frame");
                    false
                }
            },
        };

        if changed {
            self.publish();
        }
        changed
    }

    /// Apply a decoded message to the store without publishing
    pub fn apply(&mut self, message: InboundMessage) -> bool {
        match message {
            InboundMessage::FullSnapshot(entities) => {
                info!(count = entities.len(), "📋 Full fleet status received");
                self.store.apply_snapshot(entities);
                true
            }
            InboundMessage::EntityJoined(entity) => {
                info!(pc_id = %entity.id, status = %entity.status, "🔗 PC connected");
                self.store.upsert(entity);
                true
            }
            InboundMessage::EntityLeft { id } => {
                let known = self.store.mark_offline(&id);
                if known {
                    info!(pc_id = %id, "🔌 PC disconnected");
                } else {
                    debug!(pc_id = %id, "Disconnect for unknown PC ignored");
                }
                known
            }
            InboundMessage::EntityUpdated { id, patch } => {
                let known = self.store.merge(&id, patch);
                if known {
                    debug!(pc_id = %id, "PC status updated");
                } else {
                    debug!(pc_id = %id, "Status update for unknown PC ignored");
                }
                known
            }
            InboundMessage::Unknown { kind, payload } => {
                debug!(kind = %kind, payload = %payload, "Ignoring unknown message type");
                false
            }
        }
    }

    fn publish(&self) {
        let snapshot = Arc::new(self.store.snapshot());
        debug!(
            revision = snapshot.revision,
            total = snapshot.stats.total_count,
            online = snapshot.stats.online_count,
            "Publishing fleet snapshot"
        );
        self.snapshot_tx.send_replace(snapshot);
    }

    /// Drain the ingress queue until every sender is gone
    pub async fn run(mut self, mut ingress_rx: mpsc::Receiver<DispatchEvent>) {
        info!("🚀 Starting event dispatcher");

        while let Some(event) = ingress_rx.recv().await {
            self.handle(event);
        }

        info!("🛑 Event dispatcher stopped");
    }
}
