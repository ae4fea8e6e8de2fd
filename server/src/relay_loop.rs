use crate::config::ServerConfig;
use crate::registry::{Outbox, Registry};
use axum::body::Bytes;
use axum::extract::ws::Utf8Bytes;
use duckball_shared::PlayerId;
use tokio::sync::{mpsc, oneshot};

/// Raw frame payload as received from a socket.
#[derive(Debug)]
pub enum Inbound {
    Text(Utf8Bytes),
    Binary(Bytes),
}

impl Inbound {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Inbound::Text(text) => text.as_str().as_bytes(),
            Inbound::Binary(bytes) => &bytes[..],
        }
    }
}

/// Commands from client connections to the relay loop
#[derive(Debug)]
pub enum RelayCommand {
    Join {
        outbox: Outbox,
        response: oneshot::Sender<PlayerId>,
    },
    Message {
        sender_id: PlayerId,
        payload: Inbound,
    },
    Leave {
        id: PlayerId,
    },
}

/// Run the relay loop. Owns the registry and handles one command at a time,
/// so no handler ever observes another half-done.
pub async fn run_relay_loop(mut cmd_rx: mpsc::Receiver<RelayCommand>, config: ServerConfig) {
    let mut registry = Registry::new(config.replay_last_state);

    while let Some(cmd) = cmd_rx.recv().await {
        handle_command(&mut registry, cmd);
    }

    tracing::info!("Relay loop ended");
}

fn handle_command(registry: &mut Registry, cmd: RelayCommand) {
    match cmd {
        RelayCommand::Join { outbox, response } => {
            let id = registry.register(outbox);
            if response.send(id).is_err() {
                // Socket task vanished before learning its id.
                registry.unregister(id);
                return;
            }
            tracing::info!("Player {} connected ({} online)", id, registry.len());
        }
        RelayCommand::Message { sender_id, payload } => {
            match registry.ingest(sender_id, payload.as_bytes()) {
                Ok(delivered) => {
                    tracing::trace!("Player {} message relayed to {}", sender_id, delivered)
                }
                Err(e) => tracing::warn!("Dropping message from player {}: {}", sender_id, e),
            }
        }
        RelayCommand::Leave { id } => {
            if registry.unregister(id) {
                tracing::info!("Player {} left ({} online)", id, registry.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn next_frame(rx: &mut mpsc::Receiver<Utf8Bytes>) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("outbox closed");
        serde_json::from_str(frame.as_str()).unwrap()
    }

    async fn join(cmd_tx: &mpsc::Sender<RelayCommand>) -> (PlayerId, mpsc::Receiver<Utf8Bytes>) {
        let (outbox, rx) = mpsc::channel(16);
        let (response, resp_rx) = oneshot::channel();
        cmd_tx
            .send(RelayCommand::Join { outbox, response })
            .await
            .unwrap();
        (resp_rx.await.unwrap(), rx)
    }

    fn spawn_loop() -> mpsc::Sender<RelayCommand> {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(run_relay_loop(cmd_rx, ServerConfig::default()));
        cmd_tx
    }

    #[tokio::test]
    async fn join_message_leave_through_loop() {
        let cmd_tx = spawn_loop();
        let (a, mut rx_a) = join(&cmd_tx).await;
        let (b, mut rx_b) = join(&cmd_tx).await;
        assert_eq!((a, b), (1, 2));
        assert_eq!(next_frame(&mut rx_a).await, json!({"type": "assign_id", "id": 1}));
        assert_eq!(next_frame(&mut rx_b).await, json!({"type": "assign_id", "id": 2}));

        cmd_tx
            .send(RelayCommand::Message {
                sender_id: a,
                payload: Inbound::Text(r#"{"type":"player_shoot"}"#.to_string().into()),
            })
            .await
            .unwrap();
        assert_eq!(
            next_frame(&mut rx_b).await,
            json!({"type": "player_shoot", "id": 1})
        );

        cmd_tx.send(RelayCommand::Leave { id: b }).await.unwrap();
        cmd_tx.send(RelayCommand::Leave { id: b }).await.unwrap();
        assert_eq!(next_frame(&mut rx_a).await, json!({"type": "player_left", "id": 2}));

        // Nothing else may reach a: the duplicate Leave is a no-op and there
        // is nobody left to receive a's own message.
        cmd_tx
            .send(RelayCommand::Message {
                sender_id: a,
                payload: Inbound::Binary(Bytes::from_static(br#"{"type":"ping"}"#)),
            })
            .await
            .unwrap();
        let (_c, mut rx_c) = join(&cmd_tx).await;
        assert_eq!(next_frame(&mut rx_c).await, json!({"type": "assign_id", "id": 3}));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn per_sender_order_is_preserved() {
        let cmd_tx = spawn_loop();
        let (a, _rx_a) = join(&cmd_tx).await;
        let (_b, mut rx_b) = join(&cmd_tx).await;
        next_frame(&mut rx_b).await;

        for i in 0..10 {
            let text = format!(r#"{{"type":"player_update","x":{},"y":0,"z":0}}"#, i);
            cmd_tx
                .send(RelayCommand::Message {
                    sender_id: a,
                    payload: Inbound::Text(text.into()),
                })
                .await
                .unwrap();
        }
        for i in 0..10 {
            let frame = next_frame(&mut rx_b).await;
            assert_eq!(frame["x"], i);
            assert_eq!(frame["id"], 1);
        }
    }

    #[tokio::test]
    async fn abandoned_join_is_rolled_back() {
        let mut registry = Registry::default();
        let (outbox, _rx) = mpsc::channel(4);
        let (response, resp_rx) = oneshot::channel();
        drop(resp_rx);
        handle_command(&mut registry, RelayCommand::Join { outbox, response });
        assert!(registry.is_empty());
    }
}
