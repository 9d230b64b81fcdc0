use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::engine::types::DiffEvent;
use crate::error::SyncError;
use crate::market_data::adapters::DepthFeed;
use crate::market_data::normaliser::Normaliser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
    /// Connected, but dropping too many undecodable frames.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamInput {
    Diff(DiffEvent),
    Malformed(SyncError),
    Status(ConnectionStatus),
}

/// Owns the depth-stream subscription and keeps it alive.
///
/// Reconnects forever with a fixed delay until shutdown is signalled or the
/// receiving side goes away. The reconciler is not told about reconnects; the
/// first event after one shows up as a gap.
pub struct StreamSupervisor<F> {
    feed: F,
    normaliser: Normaliser,
    reconnect_delay: Duration,
}

impl<F: DepthFeed> StreamSupervisor<F> {
    pub fn new(feed: F, symbol: &str, reconnect_delay: Duration) -> Self {
        Self { feed, normaliser: Normaliser::new(symbol), reconnect_delay }
    }

    #[instrument(skip_all, fields(symbol = %self.normaliser.symbol))]
    pub async fn run(self, tx: mpsc::Sender<StreamInput>, mut shutdown: watch::Receiver<bool>) {
        let mut status = ConnectionStatus::Connecting;
        loop {
            if *shutdown.borrow() || !forward(&tx, StreamInput::Status(status)).await {
                break;
            }

            let connected = tokio::select! {
                res = self.feed.connect() => res,
                _ = shutdown.changed() => break,
            };

            match connected {
                Ok(mut frames) => {
                    if !forward(&tx, StreamInput::Status(ConnectionStatus::Connected)).await {
                        break;
                    }
                    loop {
                        let item = tokio::select! {
                            item = frames.next() => item,
                            _ = shutdown.changed() => {
                                info!("Shutdown requested, closing depth stream");
                                return;
                            }
                        };
                        let input = match item {
                            Some(Ok(text)) => match self.normaliser.decode_frame(&text) {
                                Ok(Some(d)) => StreamInput::Diff(d),
                                Ok(None) => continue,
                                Err(e) => {
                                    debug!(error = %e, "Dropping malformed frame");
                                    StreamInput::Malformed(e)
                                }
                            },
                            Some(Err(e)) => {
                                warn!(error = %e, "Depth stream error");
                                break;
                            }
                            None => {
                                warn!("Depth stream ended");
                                break;
                            }
                        };
                        if !forward(&tx, input).await {
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Failed to connect depth stream"),
            }

            metrics::counter!("depth_replica_reconnects_total").increment(1);
            status = ConnectionStatus::Reconnecting;
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("Stream supervisor stopped");
    }
}

async fn forward(tx: &mpsc::Sender<StreamInput>, input: StreamInput) -> bool {
    tx.send(input).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::test_support::{depth_frame, ScriptedFeed};

    fn frame(first: u64, last: u64, pu: u64) -> String {
        depth_frame(first, last, pu, "[]", "[]")
    }

    fn diff(first: u64, last: u64, pu: u64) -> StreamInput {
        StreamInput::Diff(DiffEvent {
            first_update_id: first,
            final_update_id: last,
            prev_final_update_id: pu,
            bid_updates: vec![],
            ask_updates: vec![],
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_close_and_failure() {
        let feed = ScriptedFeed::new(vec![
            Ok(vec![Ok(frame(1, 2, 0)), Ok("garbage".to_string()), Ok(r#"{"result":null,"id":1}"#.to_string())]),
            Err(SyncError::Network("refused".into())),
            Ok(vec![Ok(frame(10, 12, 9)), Err(SyncError::Network("reset".into()))]),
        ]);
        let supervisor = StreamSupervisor::new(feed, "BTCUSDT", Duration::from_millis(500));
        let (tx, mut rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(supervisor.run(tx, stop_rx));

        let mut seen = Vec::new();
        while seen.len() < 10 {
            seen.push(rx.recv().await.unwrap());
        }
        assert_eq!(seen[0], StreamInput::Status(ConnectionStatus::Connecting));
        assert_eq!(seen[1], StreamInput::Status(ConnectionStatus::Connected));
        assert_eq!(seen[2], diff(1, 2, 0));
        assert!(matches!(seen[3], StreamInput::Malformed(SyncError::Malformed(_))));
        assert_eq!(seen[4], StreamInput::Status(ConnectionStatus::Reconnecting));
        assert_eq!(seen[5], StreamInput::Status(ConnectionStatus::Reconnecting));
        assert_eq!(seen[6], StreamInput::Status(ConnectionStatus::Connected));
        assert_eq!(seen[7], diff(10, 12, 9));
        assert_eq!(seen[8], StreamInput::Status(ConnectionStatus::Reconnecting));
        assert_eq!(seen[9], StreamInput::Status(ConnectionStatus::Connected));

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_receiver_dropped() {
        let supervisor = StreamSupervisor::new(ScriptedFeed::new(vec![]), "BTCUSDT", Duration::from_millis(500));
        let (tx, rx) = mpsc::channel(1);
        let (_stop_tx, stop_rx) = watch::channel(false);
        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), supervisor.run(tx, stop_rx))
            .await
            .expect("supervisor should exit without a receiver");
    }
}
