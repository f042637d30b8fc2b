//! Stream hub
//!
//! Fan-out dispatcher for live subscribers. Producers enqueue entries on a
//! bounded central channel without blocking; a single dispatcher task
//! snapshots the subscriber registry and delivers to every subscriber whose
//! filter is a subset of the entry's labels. A full central channel drops
//! the entry and bumps a counter so the write path is never delayed by slow
//! consumers; a slow subscriber is evicted instead.

use crate::lifecycle::ShutdownToken;
use crate::metrics;
use crate::storage::{labels_match, LogEntry};
use crate::stream::messages::{LogEvent, ServerFrame};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, timeout};
use uuid::Uuid;

/// Configuration for the stream hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the central broadcast channel
    pub broadcast_capacity: usize,
    /// Capacity of each subscriber's outbound queue
    pub subscriber_capacity: usize,
    /// Per-subscriber delivery deadline before eviction
    pub send_timeout: Duration,
    /// Health-ping and status-log interval
    pub ping_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 5000,
            subscriber_capacity: 256,
            send_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
        }
    }
}

struct SubscriberHandle {
    filter: HashMap<String, String>,
    tx: mpsc::Sender<ServerFrame>,
}

/// A registered subscriber's receiving end
pub struct Subscription {
    pub id: Uuid,
    pub frames: mpsc::Receiver<ServerFrame>,
}

/// Errors surfaced by hub operations
#[derive(Debug, Error)]
pub enum HubError {
    #[error("subscriber not found")]
    NotFound,

    #[error("failed to deliver frame")]
    SendFailed,
}

/// Fan-out hub for live log streaming
pub struct StreamHub {
    subscribers: RwLock<HashMap<Uuid, SubscriberHandle>>,
    broadcast_tx: mpsc::Sender<LogEntry>,
    /// Taken by the dispatcher task on startup
    broadcast_rx: StdMutex<Option<mpsc::Receiver<LogEntry>>>,
    dropped: AtomicU64,
    config: HubConfig,
}

impl StreamHub {
    pub fn new(config: HubConfig) -> Self {
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_capacity);
        Self {
            subscribers: RwLock::new(HashMap::new()),
            broadcast_tx,
            broadcast_rx: StdMutex::new(Some(broadcast_rx)),
            dropped: AtomicU64::new(0),
            config,
        }
    }

    /// Register a subscriber with a label filter (empty filter matches all)
    pub async fn subscribe(&self, filter: HashMap<String, String>) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.config.subscriber_capacity);

        self.subscribers
            .write()
            .await
            .insert(id, SubscriberHandle { filter: filter.clone(), tx });
        metrics::HUB_CLIENTS.inc();

        tracing::info!(subscriber = %id, filter = ?filter, "Subscriber connected");
        Subscription { id, frames: rx }
    }

    /// Remove a subscriber and close its outbound queue
    pub async fn unsubscribe(&self, id: Uuid) {
        if self.subscribers.write().await.remove(&id).is_some() {
            metrics::HUB_CLIENTS.dec();
            tracing::info!(subscriber = %id, "Subscriber disconnected");
        }
    }

    /// Replace a subscriber's filter atomically; effective for the next
    /// broadcast
    pub async fn update_filter(&self, id: Uuid, filter: HashMap<String, String>) -> bool {
        let mut subs = self.subscribers.write().await;
        match subs.get_mut(&id) {
            Some(handle) => {
                handle.filter = filter;
                true
            }
            None => false,
        }
    }

    /// Send a frame directly to one subscriber (connection-level messages)
    pub async fn send_to(&self, id: Uuid, frame: ServerFrame) -> Result<(), HubError> {
        let tx = {
            let subs = self.subscribers.read().await;
            subs.get(&id).map(|h| h.tx.clone()).ok_or(HubError::NotFound)?
        };
        tx.try_send(frame).map_err(|_| HubError::SendFailed)
    }

    /// Enqueue an entry for fan-out. Never blocks: a full channel drops the
    /// entry and bumps the drop counter.
    pub fn broadcast(&self, entry: LogEntry) {
        match self.broadcast_tx.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let drops = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::HUB_DROPPED.inc();
                if drops % 100 == 0 {
                    tracing::warn!(drops, "Broadcast channel full, dropping entries");
                }
            }
            // Dispatcher already stopped; shutdown is in progress.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Total broadcasts dropped at the central channel
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn client_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Dispatcher loop. Consumes the central channel until shutdown, then
    /// closes every subscriber.
    pub async fn run(&self, mut token: ShutdownToken) {
        let rx = match self.broadcast_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(mut rx) = rx else {
            tracing::error!("Stream hub dispatcher already running");
            return;
        };

        tracing::info!("Stream hub started");

        let mut ticker = interval(self.config.ping_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("Stream hub shutting down");
                    self.close_all().await;
                    return;
                }
                maybe = rx.recv() => match maybe {
                    Some(entry) => self.dispatch(&entry).await,
                    None => {
                        self.close_all().await;
                        return;
                    }
                },
                _ = ticker.tick() => {
                    self.ping_subscribers().await;
                    self.log_status().await;
                }
            }
        }
    }

    /// Deliver one entry to every matching subscriber. The registry is
    /// snapshot-copied under the read lock so delivery I/O never holds it.
    async fn dispatch(&self, entry: &LogEntry) {
        let targets: Vec<(Uuid, mpsc::Sender<ServerFrame>)> = {
            let subs = self.subscribers.read().await;
            subs.iter()
                .filter(|(_, handle)| labels_match(&entry.labels, &handle.filter))
                .map(|(id, handle)| (*id, handle.tx.clone()))
                .collect()
        };

        if targets.is_empty() {
            return;
        }

        let frame = ServerFrame::Log {
            data: LogEvent::from_entry(entry),
        };

        let mut failed = Vec::new();
        for (id, tx) in targets {
            match timeout(self.config.send_timeout, tx.send(frame.clone())).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => failed.push(id),
            }
        }

        for id in failed {
            tracing::warn!(subscriber = %id, "Evicting slow or dead subscriber");
            self.unsubscribe(id).await;
        }
    }

    /// Enqueue a health ping on every subscriber; a queue that cannot take
    /// even a ping marks the subscriber dead.
    async fn ping_subscribers(&self) {
        let targets: Vec<(Uuid, mpsc::Sender<ServerFrame>)> = {
            let subs = self.subscribers.read().await;
            subs.iter().map(|(id, h)| (*id, h.tx.clone())).collect()
        };

        for (id, tx) in targets {
            if tx.try_send(ServerFrame::Ping).is_err() {
                tracing::warn!(subscriber = %id, "Ping failed, evicting subscriber");
                self.unsubscribe(id).await;
            }
        }
    }

    async fn log_status(&self) {
        let clients = self.client_count().await;
        let drops = self.dropped();
        if clients > 0 || drops > 0 {
            tracing::info!(clients, drops, "Stream hub status");
        }
    }

    async fn close_all(&self) {
        let mut subs = self.subscribers.write().await;
        let count = subs.len();
        subs.clear();
        metrics::HUB_CLIENTS.set(0);
        if count > 0 {
            tracing::info!(count, "Closed all subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use chrono::Utc;
    use std::sync::Arc;

    fn entry(labels: &[(&str, &str)], line: &str) -> LogEntry {
        let mut e = LogEntry::new(1, Utc::now(), line);
        for (k, v) in labels {
            e = e.label(*k, *v);
        }
        e
    }

    fn filter(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn spawn_hub(config: HubConfig) -> (Arc<StreamHub>, Shutdown) {
        let hub = Arc::new(StreamHub::new(config));
        let shutdown = Shutdown::new();
        let runner = Arc::clone(&hub);
        let token = shutdown.token();
        tokio::spawn(async move { runner.run(token).await });
        (hub, shutdown)
    }

    async fn recv_frame(sub: &mut Subscription) -> Option<ServerFrame> {
        timeout(Duration::from_secs(1), sub.frames.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_broadcast_respects_filters() {
        let (hub, _shutdown) = spawn_hub(HubConfig::default());

        let mut api_sub = hub.subscribe(filter(&[("service", "api")])).await;
        let mut all_sub = hub.subscribe(filter(&[])).await;

        hub.broadcast(entry(&[("service", "api")], "api line"));
        hub.broadcast(entry(&[("service", "db")], "db line"));

        // api subscriber sees only the api line
        match recv_frame(&mut api_sub).await {
            Some(ServerFrame::Log { data }) => assert_eq!(data.message, "api line"),
            other => panic!("expected log frame, got {:?}", other),
        }

        // empty filter sees both, in order
        match recv_frame(&mut all_sub).await {
            Some(ServerFrame::Log { data }) => assert_eq!(data.message, "api line"),
            other => panic!("expected log frame, got {:?}", other),
        }
        match recv_frame(&mut all_sub).await {
            Some(ServerFrame::Log { data }) => assert_eq!(data.message, "db line"),
            other => panic!("expected log frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delivery_order_per_subscriber() {
        let (hub, _shutdown) = spawn_hub(HubConfig::default());

        let mut sub = hub.subscribe(filter(&[])).await;
        for i in 0..20 {
            hub.broadcast(entry(&[], &format!("line {}", i)));
        }

        for i in 0..20 {
            match recv_frame(&mut sub).await {
                Some(ServerFrame::Log { data }) => assert_eq!(data.message, format!("line {}", i)),
                other => panic!("expected log frame, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_full_channel_drops_and_counts() {
        // No dispatcher: the central channel fills up.
        let hub = StreamHub::new(HubConfig {
            broadcast_capacity: 2,
            ..Default::default()
        });

        hub.broadcast(entry(&[], "a"));
        hub.broadcast(entry(&[], "b"));
        hub.broadcast(entry(&[], "c"));

        assert_eq!(hub.dropped(), 1);
    }

    #[tokio::test]
    async fn test_slow_subscriber_evicted() {
        let (hub, _shutdown) = spawn_hub(HubConfig {
            subscriber_capacity: 1,
            send_timeout: Duration::from_millis(50),
            ..Default::default()
        });

        // Never drained: the first entry fills the queue, the second times
        // out and evicts.
        let _sub = hub.subscribe(filter(&[])).await;
        hub.broadcast(entry(&[], "one"));
        hub.broadcast(entry(&[], "two"));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(hub.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_filter_update_takes_effect() {
        let (hub, _shutdown) = spawn_hub(HubConfig::default());

        let mut sub = hub.subscribe(filter(&[("service", "api")])).await;

        assert!(hub.update_filter(sub.id, filter(&[("service", "db")])).await);

        hub.broadcast(entry(&[("service", "api")], "api line"));
        hub.broadcast(entry(&[("service", "db")], "db line"));

        match recv_frame(&mut sub).await {
            Some(ServerFrame::Log { data }) => assert_eq!(data.message, "db line"),
            other => panic!("expected log frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_filter_unknown_subscriber() {
        let hub = StreamHub::new(HubConfig::default());
        assert!(!hub.update_filter(Uuid::new_v4(), filter(&[])).await);
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscribers() {
        let (hub, shutdown) = spawn_hub(HubConfig::default());

        let mut sub = hub.subscribe(filter(&[])).await;
        shutdown.trigger();

        // Outbound channel closes once the dispatcher clears the registry.
        let frame = timeout(Duration::from_secs(1), sub.frames.recv()).await.unwrap();
        assert!(frame.is_none());
        assert_eq!(hub.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes() {
        let hub = StreamHub::new(HubConfig::default());
        let sub = hub.subscribe(filter(&[])).await;
        assert_eq!(hub.client_count().await, 1);
        hub.unsubscribe(sub.id).await;
        assert_eq!(hub.client_count().await, 0);
    }
}
