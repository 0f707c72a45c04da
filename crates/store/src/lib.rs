//! Cabinet log registry: the authoritative id → session mapping.
//!
//! Writers serialize on one mutex; readers load an immutable snapshot that is
//! swapped wholesale on every publish, so a lookup never observes a partially
//! updated session.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use cabinet_core::{Session, SessionId};
use metrics::counter;
use tokio::sync::watch;
use tracing::debug;

/// Immutable view of every published session at one epoch.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    pub epoch: u64,
    sessions: BTreeMap<SessionId, Arc<Session>>,
}

impl RegistrySnapshot {
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> { self.sessions.get(&id).cloned() }
    pub fn len(&self) -> usize { self.sessions.len() }
    pub fn is_empty(&self) -> bool { self.sessions.is_empty() }

    /// Sessions in descending id order.
    pub fn newest_first(&self) -> Vec<Arc<Session>> { self.sessions.values().rev().cloned().collect() }
}

#[derive(Default)]
struct Inner {
    sessions: BTreeMap<SessionId, Arc<Session>>,
    /// Ids handed out but not yet published, plus ids whose directories exist on disk
    /// without a usable manifest.
    reserved: BTreeSet<SessionId>,
    epoch: u64,
}

impl Inner {
    fn taken(&self, id: SessionId) -> bool { self.sessions.contains_key(&id) || self.reserved.contains(&id) }
}

pub struct LogRegistry {
    inner: Mutex<Inner>,
    snap: ArcSwap<RegistrySnapshot>,
    epoch_tx: watch::Sender<u64>,
}

impl Default for LogRegistry {
    fn default() -> Self { Self::new() }
}

impl LogRegistry {
    pub fn new() -> Self {
        let (epoch_tx, _) = watch::channel(0u64);
        Self { inner: Mutex::new(Inner::default()), snap: ArcSwap::from_pointee(RegistrySnapshot::default()), epoch_tx }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> { self.inner.lock().unwrap_or_else(|e| e.into_inner()) }

    /// Hand out the smallest id that is neither published nor reserved and
    /// reserve it. Concurrent callers always receive distinct ids.
    pub fn allocate_id(&self) -> SessionId {
        let mut g = self.lock();
        let mut id: SessionId = 0;
        while g.taken(id) {
            id += 1;
        }
        g.reserved.insert(id);
        debug!(id, "allocated session id");
        id
    }

    /// Mark `id` as in use without publishing it. Returns false if it already was.
    pub fn reserve(&self, id: SessionId) -> bool {
        let mut g = self.lock();
        if g.taken(id) {
            return false;
        }
        g.reserved.insert(id)
    }

    /// Give back an id whose pipeline failed before it was ever published.
    pub fn release(&self, id: SessionId) {
        let mut g = self.lock();
        if g.reserved.remove(&id) {
            debug!(id, "released session id");
        }
    }

    /// Insert or replace the session under its id and swap in a new snapshot.
    pub fn publish(&self, session: Session) -> u64 {
        let mut g = self.lock();
        let id = session.id;
        g.reserved.remove(&id);
        g.sessions.insert(id, Arc::new(session));
        g.epoch = g.epoch.saturating_add(1);
        let epoch = g.epoch;
        self.snap.store(Arc::new(RegistrySnapshot { epoch, sessions: g.sessions.clone() }));
        drop(g);
        self.epoch_tx.send_replace(epoch);
        counter!("registry_publish_total", 1u64);
        debug!(id, epoch, "published session");
        epoch
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> { self.snap.load_full() }
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> { self.snap.load().get(id) }
    pub fn list(&self) -> Vec<Arc<Session>> { self.snap.load().newest_first() }
    pub fn len(&self) -> usize { self.snap.load().len() }
    pub fn is_empty(&self) -> bool { self.snap.load().is_empty() }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_tx.subscribe() }
}
