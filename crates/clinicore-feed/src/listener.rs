//! LISTEN loop forwarding change notifications to a consumer channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sqlx_postgres::{PgListener, PgPool};
use tokio::sync::{Notify, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use clinicore_core::{ChangeEvent, WatchedTable};

use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::normalize::ChangeNotification;

/// Listens for row-level change notifications on one watched table.
///
/// Each notification becomes one immutable [`ChangeEvent`] placed on an
/// unbounded channel; the consumer (the event router) reads the channel at
/// its own pace. Multiple tables require multiple listener instances.
pub struct ChangeFeedListener {
    pool: PgPool,
    table: WatchedTable,
    config: FeedConfig,
    sender: mpsc::UnboundedSender<ChangeEvent>,
    receiver: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<ChangeEvent>>>,
    shutdown: Notify,
    stopped: AtomicBool,
}

impl ChangeFeedListener {
    /// Creates a listener for one table.
    ///
    /// This sets up the event channel but does not start listening yet;
    /// call [`start`](Self::start) to begin.
    #[must_use]
    pub fn new(pool: PgPool, table: WatchedTable, config: FeedConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            pool,
            table,
            config,
            sender,
            receiver: tokio::sync::Mutex::new(Some(receiver)),
            shutdown: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// The NOTIFY channel this listener subscribes to.
    #[must_use]
    pub fn channel(&self) -> String {
        format!("{}_{}", self.config.channel_prefix, self.table.table_name())
    }

    /// Returns a clone of the event sender.
    ///
    /// Useful for injecting events manually in tests.
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<ChangeEvent> {
        self.sender.clone()
    }

    /// Takes the consumer side of the event channel.
    ///
    /// Returns `None` if already taken; there is exactly one consumer.
    pub async fn events(&self) -> Option<mpsc::UnboundedReceiver<ChangeEvent>> {
        self.receiver.lock().await.take()
    }

    /// Starts the listener in the background.
    ///
    /// The task LISTENs on the table's channel and forwards normalized
    /// events until [`stop`](Self::stop) is called or the consumer drops
    /// the receiver. Connection errors are logged and the task reconnects
    /// after a fixed delay; they never terminate the listener.
    #[instrument(skip(self), fields(table = %self.table))]
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        info!(channel = %self.channel(), "Starting change feed listener");

        tokio::spawn(async move {
            loop {
                if self.stopped.load(Ordering::SeqCst) {
                    info!(table = %self.table, "Change feed listener stopped");
                    break;
                }
                match self.listen_loop().await {
                    Ok(()) => {
                        info!(table = %self.table, "Change feed listener stopped gracefully");
                        break;
                    }
                    Err(e) => {
                        error!(
                            table = %self.table,
                            error = %e,
                            delay_ms = self.config.reconnect_delay_ms,
                            "Change feed listener error, reconnecting"
                        );
                        sleep(Duration::from_millis(self.config.reconnect_delay_ms)).await;
                    }
                }
            }
        })
    }

    /// Stops the listener. Idempotent; safe to call before `start`.
    ///
    /// `notify_one` stores a permit, so the shutdown is observed even when
    /// the listen loop is not currently parked on its select arm.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    /// Main listen loop: connect, LISTEN, forward until shutdown.
    async fn listen_loop(&self) -> Result<(), FeedError> {
        let channel = self.channel();
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&channel).await?;

        info!(channel = %channel, table = %self.table, "Listening for row changes");

        loop {
            let notification = tokio::select! {
                n = listener.recv() => n?,
                _ = self.shutdown.notified() => return Ok(()),
            };

            let payload = notification.payload();
            debug!(table = %self.table, payload = %payload, "Received NOTIFY");

            let parsed: ChangeNotification = match serde_json::from_str(payload) {
                Ok(parsed) => parsed,
                Err(e) => {
                    // A malformed payload must never tear down the
                    // subscription; log and move on.
                    warn!(
                        table = %self.table,
                        error = %e,
                        payload = %payload,
                        "Failed to parse NOTIFY payload"
                    );
                    continue;
                }
            };

            let Some(event) = parsed.normalize(self.table) else {
                continue;
            };

            debug!(
                table = %self.table,
                op = %event.op,
                entity_id = %event.entity_id,
                "Normalized change event"
            );

            if self.sender.send(event).is_err() {
                warn!(table = %self.table, "Change event channel closed, stopping");
                return Ok(());
            }
        }
    }
}

impl std::fmt::Debug for ChangeFeedListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeedListener")
            .field("table", &self.table)
            .field("channel", &self.channel())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Listen-loop behavior against a live database is exercised by the
    // surrounding deployment; these tests cover channel naming and the
    // sender/receiver hand-off, which do not need a connection.

    fn pool() -> PgPool {
        sqlx_core::pool::PoolOptions::<sqlx_postgres::Postgres>::new()
            .max_connections(1)
            .connect_lazy("postgres://localhost/clinicore_test")
            .expect("lazy pool")
    }

    #[tokio::test]
    async fn test_channel_name_includes_table() {
        let listener =
            ChangeFeedListener::new(pool(), WatchedTable::Appointments, FeedConfig::default());
        assert_eq!(listener.channel(), "clinicore_changes_appointments");

        let listener = ChangeFeedListener::new(
            pool(),
            WatchedTable::VitalSigns,
            FeedConfig::default().with_channel_prefix("cdc"),
        );
        assert_eq!(listener.channel(), "cdc_vital_signs");
    }

    #[tokio::test]
    async fn test_events_receiver_is_taken_once() {
        let listener =
            ChangeFeedListener::new(pool(), WatchedTable::Appointments, FeedConfig::default());
        assert!(listener.events().await.is_some());
        assert!(listener.events().await.is_none());
    }

    #[tokio::test]
    async fn test_injected_events_reach_the_consumer() {
        let listener =
            ChangeFeedListener::new(pool(), WatchedTable::Appointments, FeedConfig::default());
        let mut rx = listener.events().await.unwrap();

        let event = clinicore_core::ChangeEvent::inserted(WatchedTable::Appointments, "a1");
        listener.sender().send(event).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.entity_id, "a1");
    }

    #[tokio::test]
    async fn test_stop_terminates_running_listener() {
        let config = FeedConfig::default().with_reconnect_delay_ms(10);
        let listener = Arc::new(ChangeFeedListener::new(
            pool(),
            WatchedTable::Appointments,
            config,
        ));
        let handle = listener.clone().start();

        // The permit stored by stop() must end the task even if it has not
        // reached the select arm yet.
        listener.stop();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("listener task did not stop")
            .expect("listener task panicked");
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let listener =
            ChangeFeedListener::new(pool(), WatchedTable::Appointments, FeedConfig::default());
        listener.stop();
        listener.stop();
        assert!(listener.stopped.load(Ordering::SeqCst));
    }
}
