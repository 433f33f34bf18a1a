use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::protocol::OperatorCommand;
use crate::types::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("not connected to the control server")]
    NotConnected,
    #[error("command could not be encoded: {0}")]
    Encode(String),
    #[error("transport write failed: {0}")]
    Transport(String),
    #[error("admin client has shut down")]
    Closed,
}

/// A command waiting for the connection task, with its delivery reply
#[derive(Debug)]
pub struct PendingCommand {
    pub command: OperatorCommand,
    pub reply: oneshot::Sender<Result<(), CommandError>>,
}

impl PendingCommand {
    pub fn reject(self, error: CommandError) {
        debug!(kind = self.command.kind(), %error, "Rejecting operator command");
        // The caller may have stopped waiting
        let _ = self.reply.send(Err(error));
    }
}

/// Cloneable handle the UI layer uses to reach the server.
/// Commands are never queued while disconnected.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<PendingCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl CommandSender {
    pub fn new(tx: mpsc::Sender<PendingCommand>, state: watch::Receiver<ConnectionState>) -> Self {
        Self { tx, state }
    }

    /// Write one command on the live connection and wait for the write result
    pub async fn send(&self, command: OperatorCommand) -> Result<(), CommandError> {
        if *self.state.borrow() != ConnectionState::Connected {
            debug!(kind = command.kind(), "Command dropped: not connected");
            return Err(CommandError::NotConnected);
        }

        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(PendingCommand { command, reply })
            .await
            .map_err(|_| CommandError::Closed)?;
        outcome.await.map_err(|_| CommandError::Closed)?
    }

    pub async fn force_logout(&self, pc_id: impl Into<String>) -> Result<(), CommandError> {
        self.send(OperatorCommand::force_logout(pc_id)).await
    }

    pub async fn send_raw(
        &self,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<(), CommandError> {
        self.send(OperatorCommand::Raw {
            kind: kind.into(),
            payload,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn disconnected_send_returns_not_connected() {
        let (tx, mut rx) = mpsc::channel(4);
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let sender = CommandSender::new(tx, state_rx);

        let result = sender.force_logout("1").await;
        assert_eq!(result, Err(CommandError::NotConnected));
        // Nothing reached the connection task
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connecting_is_not_connected() {
        let (tx, _rx) = mpsc::channel(4);
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let sender = CommandSender::new(tx, state_rx);

        assert_err!(sender.send_raw("ping", serde_json::Value::Null).await);
    }

    #[tokio::test]
    async fn connected_send_waits_for_reply() {
        let (tx, mut rx) = mpsc::channel::<PendingCommand>(4);
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let sender = CommandSender::new(tx, state_rx);

        let responder = tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            assert_eq!(pending.command, OperatorCommand::force_logout("4"));
            pending.reply.send(Ok(())).unwrap();
        });

        assert_ok!(sender.force_logout("4").await);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_reply_reports_closed() {
        let (tx, mut rx) = mpsc::channel::<PendingCommand>(4);
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let sender = CommandSender::new(tx, state_rx);

        tokio::spawn(async move {
            let pending = rx.recv().await.unwrap();
            drop(pending);
        });

        assert_eq!(sender.force_logout("4").await, Err(CommandError::Closed));
    }
}
