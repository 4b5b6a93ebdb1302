//! Per-identity in-flight markers
//!
//! A sharded map from [`TrackIdentity`] to a completion signal. Claiming a
//! marker is an atomic test-and-set on the map entry; the returned
//! [`InFlightGuard`] releases it when dropped, on every exit path of the task
//! that owns it.

use core_library::TrackIdentity;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    entries: Arc<DashMap<TrackIdentity, Arc<Notify>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the marker for `identity`; `None` if someone else holds it.
    pub fn try_acquire(&self, identity: &TrackIdentity) -> Option<InFlightGuard> {
        match self.entries.entry(identity.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let notify = Arc::new(Notify::new());
                vacant.insert(Arc::clone(&notify));
                Some(InFlightGuard {
                    entries: Arc::clone(&self.entries),
                    identity: identity.clone(),
                    notify,
                })
            }
        }
    }

    pub fn contains(&self, identity: &TrackIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve once no marker is held for `identity`.
    pub async fn wait_idle(&self, identity: &TrackIdentity) {
        loop {
            let notify = match self.entries.get(identity) {
                Some(entry) => Arc::clone(entry.value()),
                None => return,
            };

            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // The guard may have been released before `enable`.
            let still_held = self
                .entries
                .get(identity)
                .map(|entry| Arc::ptr_eq(entry.value(), &notify))
                .unwrap_or(false);
            if !still_held {
                continue;
            }

            notified.await;
        }
    }
}

/// Held by the task that owns an identity's marker.
#[derive(Debug)]
pub struct InFlightGuard {
    entries: Arc<DashMap<TrackIdentity, Arc<Notify>>>,
    identity: TrackIdentity,
    notify: Arc<Notify>,
}

impl InFlightGuard {
    pub fn identity(&self) -> &TrackIdentity {
        &self.identity
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let notify = &self.notify;
        self.entries
            .remove_if(&self.identity, |_, current| Arc::ptr_eq(current, notify));
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_library::FileStamp;
    use std::path::Path;
    use std::time::Duration;

    fn identity(name: &str) -> TrackIdentity {
        TrackIdentity::derive(
            Path::new(name),
            &FileStamp {
                size: 1,
                modified_at: None,
            },
        )
    }

    #[test]
    fn test_acquire_is_exclusive_until_dropped() {
        let set = InFlightSet::new();
        let id = identity("a.mp3");

        let guard = set.try_acquire(&id).unwrap();
        assert!(set.try_acquire(&id).is_none());
        assert!(set.contains(&id));
        assert!(set.try_acquire(&identity("b.mp3")).is_some());

        drop(guard);
        assert!(!set.contains(&id));
        assert!(set.try_acquire(&id).is_some());
    }

    #[tokio::test]
    async fn test_wait_idle_resolves_on_release() {
        let set = InFlightSet::new();
        let id = identity("a.mp3");
        set.wait_idle(&id).await;

        let guard = set.try_acquire(&id).unwrap();
        let waiter = {
            let set = set.clone();
            let id = id.clone();
            tokio::spawn(async move { set.wait_idle(&id).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_guard_released_during_panic_unwind() {
        let set = InFlightSet::new();
        let id = identity("a.mp3");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = set.try_acquire(&id).unwrap();
            panic!("worker blew up");
        }));

        assert!(result.is_err());
        assert!(!set.contains(&id));
    }
}
