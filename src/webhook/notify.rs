//! Deferred notification of webhook events that matched no local post.
//!
//! Entries accumulate while a single timer is pending. When it fires, the
//! whole batch goes to the `NotificationSink` in one call and the next entry
//! starts a new timer.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::TopicId;

/// A webhook event that could not be matched to a local post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedTopic {
    pub topic_id: TopicId,
    pub title: String,
    pub received_at: DateTime<Utc>,
}

/// Receives batches of unresolved topics.
pub trait NotificationSink: Send + Sync + 'static {
    fn notify(&self, batch: Vec<UnresolvedTopic>);
}

/// Logs each batch as a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, batch: Vec<UnresolvedTopic>) {
        let topics: Vec<String> = batch
            .iter()
            .map(|e| format!("{} ({})", e.topic_id, e.title))
            .collect();
        warn!(
            count = batch.len(),
            topics = ?topics,
            "Webhook events received for topics with no local post"
        );
    }
}

#[derive(Default)]
struct Pending {
    entries: Vec<UnresolvedTopic>,
    timer_scheduled: bool,
}

struct NotifierInner {
    pending: Mutex<Pending>,
    sink: Arc<dyn NotificationSink>,
    delay: Duration,
}

impl NotifierInner {
    fn take(&self) -> Vec<UnresolvedTopic> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.timer_scheduled = false;
        std::mem::take(&mut pending.entries)
    }

    fn flush(&self) -> usize {
        let batch = self.take();
        let count = batch.len();
        if count > 0 {
            self.sink.notify(batch);
        }
        count
    }
}

/// Debounced batch notifier shared by every clone.
#[derive(Clone)]
pub struct DeferredNotifier {
    inner: Arc<NotifierInner>,
}

impl DeferredNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>, delay: Duration) -> Self {
        DeferredNotifier {
            inner: Arc::new(NotifierInner {
                pending: Mutex::new(Pending::default()),
                sink,
                delay,
            }),
        }
    }

    /// Queues `entry`, starting the flush timer if none is pending.
    ///
    /// A topic already pending is kept once, with the latest title and
    /// arrival time.
    ///
    /// Outside a tokio runtime there is nothing to run the timer, so the
    /// entry is delivered immediately.
    pub fn record(&self, entry: UnresolvedTopic) {
        let start_timer = {
            let mut pending = self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match pending
                .entries
                .iter_mut()
                .find(|e| e.topic_id == entry.topic_id)
            {
                Some(existing) => *existing = entry,
                None => pending.entries.push(entry),
            }
            !std::mem::replace(&mut pending.timer_scheduled, true)
        };

        if !start_timer {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(&self.inner);
                debug!(delay_secs = inner.delay.as_secs(), "Scheduled unresolved topic notification");
                handle.spawn(async move {
                    tokio::time::sleep(inner.delay).await;
                    inner.flush();
                });
            }
            Err(_) => {
                self.inner.flush();
            }
        }
    }

    /// Delivers everything pending now. Returns the number of entries sent.
    pub fn flush(&self) -> usize {
        self.inner.flush()
    }

    pub fn pending(&self) -> usize {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

impl std::fmt::Debug for DeferredNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredNotifier")
            .field("delay", &self.inner.delay)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
