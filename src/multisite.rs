//! Multisite routing of remote topics to local sites.
//!
//! In a network of sites sharing one forum, a webhook for a topic must be
//! applied to the site that published it. `TopicSiteRouter` remembers which
//! site owns each topic; `SiteRegistry` hands out the store of a site so the
//! receiver can act on it without switching any global context.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::lock::{FileLock, LockGuard, acquire_blocking};
use crate::persistence::{RouteLog, RouteLogError, RouteRecord};
use crate::store::PostStore;
use crate::types::{SiteId, TopicId};

pub type Result<T> = std::result::Result<T, RouteLogError>;

/// How long `record` waits for another process appending to the log.
const LOG_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Log locks older than this belong to a crashed writer.
const LOG_LOCK_STALE: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct RouterInner {
    routes: HashMap<TopicId, SiteId>,
    log: Option<RouteLog>,
}

impl RouterInner {
    /// Adds records in log order; the first route of a topic wins.
    fn merge(&mut self, records: Vec<RouteRecord>) {
        for record in records {
            let existing = *self.routes.entry(record.topic_id).or_insert(record.site_id);
            if existing != record.site_id {
                warn!(
                    topic_id = %record.topic_id,
                    kept = %existing,
                    ignored = %record.site_id,
                    "Conflicting route in log, keeping first"
                );
            }
        }
    }

    /// Merges routes other processes appended since the last read.
    fn catch_up(&mut self) -> Result<()> {
        if let Some(log) = self.log.as_mut() {
            let records = log.read_new()?;
            self.merge(records);
        }
        Ok(())
    }
}

/// Cross-process lock guarding appends to one route log.
#[derive(Debug)]
struct LogLock {
    lock: FileLock,
    name: String,
}

impl LogLock {
    fn for_log(path: &Path) -> Self {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("routes")
            .to_string();
        LogLock {
            lock: FileLock::new(dir, LOG_LOCK_STALE),
            name,
        }
    }

    fn acquire(&self) -> Result<LockGuard> {
        acquire_blocking(&self.lock, &self.name, LOG_LOCK_TIMEOUT).ok_or(RouteLogError::Locked)
    }
}

/// Persistent `topic_id → site_id` table.
///
/// Routes are created once and never updated. When the backing log holds
/// conflicting lines for one topic the earliest wins. Processes sharing the
/// log see each other's routes: a lookup miss rereads the log tail, and
/// `record` appends only while holding the log lock after catching up.
#[derive(Debug, Default)]
pub struct TopicSiteRouter {
    inner: Mutex<RouterInner>,
    lock: Option<LogLock>,
}

impl TopicSiteRouter {
    /// A router that keeps routes in memory only.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the route log at `path`, creating it if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock = LogLock::for_log(path);

        let (log, records) = {
            let _guard = lock.acquire()?;
            RouteLog::open(path)?
        };

        let mut inner = RouterInner {
            routes: HashMap::new(),
            log: Some(log),
        };
        inner.merge(records);
        info!(routes = inner.routes.len(), path = %path.display(), "Loaded topic routes");

        Ok(TopicSiteRouter {
            inner: Mutex::new(inner),
            lock: Some(lock),
        })
    }

    pub fn lookup(&self, topic: TopicId) -> Option<SiteId> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(site) = inner.routes.get(&topic) {
            return Some(*site);
        }
        if let Err(e) = inner.catch_up() {
            warn!(topic_id = %topic, error = %e, "Failed to reread route log");
        }
        inner.routes.get(&topic).copied()
    }

    /// Records `topic → site` unless the topic is already routed.
    ///
    /// Returns the site that owns the topic afterwards, which is the existing
    /// one when a route was already present, possibly recorded by another
    /// process.
    pub fn record(&self, topic: TopicId, site: SiteId) -> Result<SiteId> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = inner.routes.get(&topic) {
            return Ok(*existing);
        }

        let _guard = self.lock.as_ref().map(LogLock::acquire).transpose()?;
        inner.catch_up()?;
        if let Some(existing) = inner.routes.get(&topic) {
            info!(topic_id = %topic, site_id = %existing, "Topic already routed by another process");
            return Ok(*existing);
        }

        if let Some(log) = inner.log.as_mut() {
            log.append(RouteRecord {
                topic_id: topic,
                site_id: site,
            })?;
        }
        inner.routes.insert(topic, site);
        info!(topic_id = %topic, site_id = %site, "Recorded topic route");
        Ok(site)
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .routes
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The post stores of every site this process can act on.
#[derive(Clone, Default)]
pub struct SiteRegistry {
    sites: HashMap<SiteId, Arc<dyn PostStore>>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_site(mut self, site: SiteId, store: Arc<dyn PostStore>) -> Self {
        self.sites.insert(site, store);
        self
    }

    pub fn store(&self, site: SiteId) -> Option<Arc<dyn PostStore>> {
        self.sites.get(&site).cloned()
    }

    /// Runs `f` against the store of `site`.
    ///
    /// Returns `None` when the site is unknown. The caller's own context is
    /// never changed, so nothing needs restoring afterwards.
    pub fn in_site<T>(&self, site: SiteId, f: impl FnOnce(&dyn PostStore) -> T) -> Option<T> {
        let store = self.sites.get(&site)?;
        Some(f(store.as_ref()))
    }
}

impl std::fmt::Debug for SiteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sites: Vec<_> = self.sites.keys().map(|s| s.0).collect();
        sites.sort_unstable();
        f.debug_struct("SiteRegistry").field("sites", &sites).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{PostId, SyncedPost};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn first_route_wins() {
        let router = TopicSiteRouter::in_memory();
        assert!(router.is_empty());

        assert_eq!(router.record(TopicId(7), SiteId(1)).unwrap(), SiteId(1));
        assert_eq!(router.record(TopicId(7), SiteId(2)).unwrap(), SiteId(1));
        assert_eq!(router.lookup(TopicId(7)), Some(SiteId(1)));
        assert_eq!(router.lookup(TopicId(8)), None);
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn routes_persist_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("routes.log");

        {
            let router = TopicSiteRouter::open(&path).unwrap();
            router.record(TopicId(7), SiteId(1)).unwrap();
            router.record(TopicId(9), SiteId(3)).unwrap();
        }

        let router = TopicSiteRouter::open(&path).unwrap();
        assert_eq!(router.lookup(TopicId(7)), Some(SiteId(1)));
        assert_eq!(router.lookup(TopicId(9)), Some(SiteId(3)));
    }

    #[test]
    fn conflicting_log_lines_keep_the_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("routes.log");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{{\"topic_id\":7,\"site_id\":1}}").unwrap();
        writeln!(file, "{{\"topic_id\":7,\"site_id\":2}}").unwrap();
        drop(file);

        let router = TopicSiteRouter::open(&path).unwrap();
        assert_eq!(router.lookup(TopicId(7)), Some(SiteId(1)));
    }

    #[test]
    fn route_from_another_process_is_visible() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("routes.log");
        let a = TopicSiteRouter::open(&path).unwrap();
        let b = TopicSiteRouter::open(&path).unwrap();

        a.record(TopicId(7), SiteId(1)).unwrap();
        assert_eq!(b.lookup(TopicId(7)), Some(SiteId(1)));
    }

    #[test]
    fn record_defers_to_route_written_elsewhere() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("routes.log");
        let a = TopicSiteRouter::open(&path).unwrap();
        let b = TopicSiteRouter::open(&path).unwrap();

        assert_eq!(a.record(TopicId(7), SiteId(1)).unwrap(), SiteId(1));
        // b never looked the topic up; its claim must still lose.
        assert_eq!(b.record(TopicId(7), SiteId(2)).unwrap(), SiteId(1));
        assert_eq!(b.lookup(TopicId(7)), Some(SiteId(1)));

        let reopened = TopicSiteRouter::open(&path).unwrap();
        assert_eq!(reopened.lookup(TopicId(7)), Some(SiteId(1)));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn record_waits_out_a_held_log_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("routes.log");
        let router = Arc::new(TopicSiteRouter::open(&path).unwrap());

        let other = FileLock::new(dir.path(), LOG_LOCK_STALE);
        let held = crate::lock::SyncLock::try_acquire(&other, "routes.log").unwrap();

        let writer = {
            let router = router.clone();
            std::thread::spawn(move || router.record(TopicId(3), SiteId(1)))
        };
        std::thread::sleep(Duration::from_millis(30));
        drop(held);

        assert_eq!(writer.join().unwrap().unwrap(), SiteId(1));
        assert_eq!(router.lookup(TopicId(3)), Some(SiteId(1)));
    }

    #[test]
    fn registry_runs_against_the_selected_site() {
        let blog_a = Arc::new(MemoryStore::new());
        let blog_b = Arc::new(MemoryStore::new());
        blog_b.save(&SyncedPost::new(PostId(4), "On B")).unwrap();

        let registry = SiteRegistry::new()
            .with_site(SiteId(1), blog_a.clone())
            .with_site(SiteId(2), blog_b.clone());

        let title = registry
            .in_site(SiteId(2), |store| store.load(PostId(4)).unwrap().map(|p| p.title))
            .flatten();
        assert_eq!(title.as_deref(), Some("On B"));
        assert!(blog_a.load(PostId(4)).unwrap().is_none());

        assert!(registry.in_site(SiteId(9), |_| ()).is_none());
        assert!(registry.store(SiteId(1)).is_some());
    }
}
