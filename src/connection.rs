use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::commands::{CommandError, CommandSender, PendingCommand};
use crate::dispatcher::DispatchEvent;
use crate::net::{Connector, Transport};
use crate::protocol;
use crate::types::ConnectionState;

/// Shortest wait between attempts, whatever the policy says
pub const MIN_RECONNECT_DELAY_MS: u64 = 100;

/// Delay schedule between reconnect attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay randomly added or removed, 0.0..=1.0
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 3000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// Same delay every time, no jitter
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            initial_delay_ms: ms,
            max_delay_ms: ms,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Un-jittered delay for the current attempt, in milliseconds
    fn base_delay_ms(&self) -> f64 {
        let max = self.policy.max_delay_ms.max(self.policy.initial_delay_ms) as f64;
        let multiplier = self.policy.multiplier.max(1.0);
        let exponent = self.attempt.min(i32::MAX as u32) as i32;
        (self.policy.initial_delay_ms as f64 * multiplier.powi(exponent)).min(max)
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay_ms();
        self.attempt = self.attempt.saturating_add(1);

        let jitter = self.policy.jitter.clamp(0.0, 1.0);
        let delay = if jitter > 0.0 {
            let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
            let max = self.policy.max_delay_ms.max(self.policy.initial_delay_ms) as f64;
            (base * factor).min(max)
        } else {
            base
        };
        Duration::from_millis((delay.round() as u64).max(MIN_RECONNECT_DELAY_MS))
    }
}

struct Shared {
    url: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    ingress_tx: mpsc::Sender<DispatchEvent>,
    state_tx: watch::Sender<ConnectionState>,
    commands: Mutex<mpsc::Receiver<PendingCommand>>,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(state = next.as_str(), "Connection state changed");
        }
    }
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the admin connection: at most one supervisor task, which connects,
/// pumps frames into the dispatcher, writes commands, and reconnects on loss.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    command_tx: mpsc::Sender<PendingCommand>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        connector: Arc<dyn Connector>,
        ingress_tx: mpsc::Sender<DispatchEvent>,
        command_capacity: usize,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(command_capacity.max(1));
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            url: url.into(),
            policy,
            connector,
            ingress_tx,
            state_tx,
            commands: Mutex::new(command_rx),
        });

        Self {
            shared,
            command_tx,
            supervisor: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn command_sender(&self) -> CommandSender {
        CommandSender::new(self.command_tx.clone(), self.subscribe())
    }

    /// Start the supervisor unless one is already running
    pub async fn connect(&self) {
        let mut supervisor = self.supervisor.lock().await;
        if let Some(running) = supervisor.as_ref() {
            if !running.handle.is_finished() {
                debug!("Connection supervisor already running");
                return;
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervise(self.shared.clone(), cancel.clone()));
        *supervisor = Some(Supervisor { cancel, handle });
    }

    /// Stop reconnecting and close the live transport, if any
    pub async fn disconnect(&self) {
        let running = self.supervisor.lock().await.take();
        if let Some(Supervisor { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Connection supervisor ended abnormally");
            }
            info!("🛑 Admin connection closed");
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }
}

enum SessionEnd {
    Cancelled,
    Lost,
    DispatcherGone,
}

#[instrument(skip_all, fields(url = %shared.url))]
async fn supervise(shared: Arc<Shared>, cancel: CancellationToken) {
    // Held for the supervisor's lifetime; there is never more than one
    let mut commands = shared.commands.lock().await;
    let mut backoff = Backoff::new(shared.policy.clone());

    'outer: loop {
        shared.set_state(ConnectionState::Connecting);
        info!("🔧 Connecting to control server");

        let connect = shared.connector.connect(&shared.url);
        tokio::pin!(connect);
        let attempt = loop {
            tokio::select! {
                _ = cancel.cancelled() => break 'outer,
                result = &mut connect => break result,
                Some(pending) = commands.recv() => pending.reject(CommandError::NotConnected),
            }
        };

        match attempt {
            Ok(mut transport) => {
                backoff.reset();
                shared.set_state(ConnectionState::Connected);
                info!("✅ Connected to control server");

                if shared.ingress_tx.send(DispatchEvent::ResyncRequested).await.is_err() {
                    transport.close().await;
                    warn!("Event dispatcher is gone, stopping connection supervisor");
                    break 'outer;
                }

                let end = run_session(&shared, transport.as_mut(), &mut commands, &cancel).await;
                shared.set_state(ConnectionState::Disconnected);
                match end {
                    SessionEnd::Cancelled => break 'outer,
                    SessionEnd::DispatcherGone => {
                        warn!("Event dispatcher is gone, stopping connection supervisor");
                        break 'outer;
                    }
                    SessionEnd::Lost => {}
                }
            }
            Err(e) => {
                shared.set_state(ConnectionState::Disconnected);
                warn!(error = %e, "Connection attempt failed");
            }
        }

        let delay = backoff.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "⏳ Reconnecting after delay");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break 'outer,
                _ = &mut sleep => break,
                Some(pending) = commands.recv() => pending.reject(CommandError::NotConnected),
            }
        }
    }

    shared.set_state(ConnectionState::Disconnected);
    debug!("Connection supervisor stopped");
}

async fn run_session(
    shared: &Shared,
    transport: &mut dyn Transport,
    commands: &mut mpsc::Receiver<PendingCommand>,
    cancel: &CancellationToken,
) -> SessionEnd {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                transport.close().await;
                return SessionEnd::Cancelled;
            }
            frame = transport.recv() => match frame {
                Some(Ok(text)) => {
                    if shared.ingress_tx.send(DispatchEvent::Frame(text)).await.is_err() {
                        transport.close().await;
                        return SessionEnd::DispatcherGone;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "🔌 Admin connection failed");
                    return SessionEnd::Lost;
                }
                None => {
                    info!("🔌 Admin connection closed by server");
                    return SessionEnd::Lost;
                }
            },
            Some(pending) = commands.recv() => deliver(transport, pending).await,
        }
    }
}

async fn deliver(transport: &mut dyn Transport, pending: PendingCommand) {
    let PendingCommand { command, reply } = pending;
    let result = match protocol::encode_command(&command) {
        Ok(text) => transport
            .send(text)
            .await
            .map_err(|e| CommandError::Transport(e.to_string())),
        Err(e) => Err(CommandError::Encode(e.to_string())),
    };

    match &result {
        Ok(()) => info!(kind = command.kind(), "📤 Operator command sent"),
        Err(e) => warn!(kind = command.kind(), error = %e, "Operator command failed"),
    }
    let _ = reply.send(result);
}
