//! # Enrichment Coordinator
//!
//! Decides whether a track needs a remote fetch and runs that fetch in the
//! background, at most once per identity at a time.
//!
//! ## Flow
//!
//! 1. Fields satisfied locally or by the cache (content, or an unavailable
//!    marker inside the cooldown) are not fetched. If nothing is missing the
//!    call returns [`EnsureOutcome::Satisfied`].
//! 2. Otherwise the caller races for the identity's in-flight marker. Losers
//!    get [`EnsureOutcome::AlreadyInFlight`].
//! 3. The winner submits a task to a bounded queue without waiting. A full
//!    queue drops the task and releases the marker.
//! 4. A dispatcher hands tasks to at most `max_workers` concurrent workers.
//!    Each worker fetches, merges the result into the cache and only then
//!    releases the marker.
//!
//! `ensure_enriched` never awaits network I/O.

use bridge_traits::Clock;
use core_library::{TrackDescriptor, TrackIdentity};
use core_runtime::config::EnrichmentSettings;
use core_runtime::events::{CoreEvent, EnrichmentEvent, EventBus};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::cache::MetadataCacheStore;
use crate::in_flight::{InFlightGuard, InFlightSet};
use crate::models::{
    EnrichmentField, FieldSet, LocalAvailability, MissReason, RemoteFetchResult,
};
use crate::remote::RemoteEnricher;

/// Result of [`EnrichmentCoordinator::ensure_enriched`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnsureOutcome {
    /// Nothing is missing; no task was created
    Satisfied,
    /// Another task for the same identity is running or queued
    AlreadyInFlight,
    /// A background fetch was queued
    Scheduled,
    /// The queue was full; a later call may retry
    Dropped,
    /// The coordinator no longer accepts work
    ShutDown,
}

struct FetchTask {
    descriptor: TrackDescriptor,
    needed: FieldSet,
    guard: InFlightGuard,
}

/// Shared by workers. Holds no reference back to the coordinator.
#[derive(Clone)]
struct WorkerContext {
    cache: MetadataCacheStore,
    enricher: Arc<dyn RemoteEnricher>,
    events: Option<EventBus>,
    task_timeout: Duration,
    cancel: CancellationToken,
}

struct Inner {
    cache: MetadataCacheStore,
    in_flight: InFlightSet,
    sender: RwLock<Option<mpsc::Sender<FetchTask>>>,
    events: Option<EventBus>,
    /// Stops the dispatcher from starting new work
    closing: CancellationToken,
    /// Abandons running fetches
    cancel: CancellationToken,
    tracker: TaskTracker,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Background enrichment scheduler. Cloning shares the same worker pool.
#[derive(Clone)]
pub struct EnrichmentCoordinator {
    inner: Arc<Inner>,
}

impl EnrichmentCoordinator {
    /// Start the dispatcher on the current Tokio runtime.
    pub fn start(
        cache: MetadataCacheStore,
        enricher: Arc<dyn RemoteEnricher>,
        settings: EnrichmentSettings,
        events: Option<EventBus>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let closing = CancellationToken::new();
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let context = WorkerContext {
            cache: cache.clone(),
            enricher,
            events: events.clone(),
            task_timeout: settings.task_timeout,
            cancel: cancel.clone(),
        };
        let dispatcher = tokio::spawn(dispatch(
            receiver,
            context,
            Arc::new(Semaphore::new(settings.max_workers.max(1))),
            tracker.clone(),
            closing.clone(),
        ));

        info!(
            workers = settings.max_workers,
            queue = settings.queue_capacity,
            "Enrichment coordinator started"
        );

        Self {
            inner: Arc::new(Inner {
                cache,
                in_flight: InFlightSet::new(),
                sender: RwLock::new(Some(sender)),
                events,
                closing,
                cancel,
                tracker,
                dispatcher: Mutex::new(Some(dispatcher)),
            }),
        }
    }

    pub fn cache(&self) -> &MetadataCacheStore {
        &self.inner.cache
    }

    /// Schedule a background fetch for whatever `descriptor` is missing.
    ///
    /// Returns without waiting for any remote work.
    #[instrument(skip(self, descriptor, local), fields(key = %descriptor.identity))]
    pub async fn ensure_enriched(
        &self,
        descriptor: &TrackDescriptor,
        local: LocalAvailability,
    ) -> EnsureOutcome {
        if self.inner.closing.is_cancelled() {
            return EnsureOutcome::ShutDown;
        }

        let identity = &descriptor.identity;
        if self.missing_fields(identity, local).await.is_empty() {
            return EnsureOutcome::Satisfied;
        }

        let Some(guard) = self.inner.in_flight.try_acquire(identity) else {
            debug!("Enrichment already in flight");
            return EnsureOutcome::AlreadyInFlight;
        };

        // A task may have merged between the first check and the claim.
        let needed = self.missing_fields(identity, local).await;
        if needed.is_empty() {
            return EnsureOutcome::Satisfied;
        }

        let sender = self
            .inner
            .sender
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(sender) = sender else {
            return EnsureOutcome::ShutDown;
        };

        let task = FetchTask {
            descriptor: descriptor.clone(),
            needed,
            guard,
        };
        match sender.try_send(task) {
            Ok(()) => {
                debug!(fields = ?needed.names(), "Enrichment scheduled");
                EnsureOutcome::Scheduled
            }
            Err(TrySendError::Full(task)) => {
                drop(task);
                debug!("Enrichment queue full, dropping request");
                self.emit(EnrichmentEvent::Dropped {
                    track_key: identity.to_string(),
                });
                EnsureOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => EnsureOutcome::ShutDown,
        }
    }

    async fn missing_fields(&self, identity: &TrackIdentity, local: LocalAvailability) -> FieldSet {
        let mut needed = FieldSet::empty();
        for field in EnrichmentField::ALL {
            if local.has(field) {
                continue;
            }
            match self.inner.cache.has(identity, field).await {
                Ok(true) => {}
                Ok(false) => needed.insert(field),
                Err(e) => {
                    warn!(
                        field = %field,
                        error = %e,
                        "Cache check failed, treating field as missing"
                    );
                    needed.insert(field);
                }
            }
        }
        needed
    }

    pub fn is_in_flight(&self, identity: &TrackIdentity) -> bool {
        self.inner.in_flight.contains(identity)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Resolve once no task is in flight for `identity`.
    pub async fn wait_idle(&self, identity: &TrackIdentity) {
        self.inner.in_flight.wait_idle(identity).await
    }

    /// Stop accepting work, drop queued tasks and give running fetches
    /// `grace` to finish. Fetches still running after that are abandoned
    /// without merging.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner
            .sender
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.inner.closing.cancel();

        let dispatcher = self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                warn!(error = %e, "Enrichment dispatcher ended abnormally");
            }
        }

        self.inner.tracker.close();
        if tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                running = self.inner.tracker.len(),
                "Grace period elapsed, abandoning running enrichment"
            );
            self.inner.cancel.cancel();
            self.inner.tracker.wait().await;
        }
        info!("Enrichment coordinator stopped");
    }

    fn emit(&self, event: EnrichmentEvent) {
        if let Some(bus) = &self.inner.events {
            bus.emit(CoreEvent::Enrichment(event)).ok();
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<FetchTask>,
    context: WorkerContext,
    workers: Arc<Semaphore>,
    tracker: TaskTracker,
    closing: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            biased;
            _ = closing.cancelled() => break,
            task = receiver.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = closing.cancelled() => break,
            permit = Arc::clone(&workers).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let context = context.clone();
        tracker.spawn(async move {
            context.run(task).await;
            drop(permit);
        });
    }

    // Unstarted tasks are dropped, which releases their markers.
    receiver.close();
    let mut dropped = 0usize;
    while receiver.try_recv().is_ok() {
        dropped += 1;
    }
    debug!(dropped, "Enrichment dispatcher stopped");
}

impl WorkerContext {
    async fn run(self, task: FetchTask) {
        let FetchTask {
            descriptor,
            needed,
            guard,
        } = task;
        let key = descriptor.identity.to_string();

        self.emit(EnrichmentEvent::Started {
            track_key: key.clone(),
            fields: needed.names(),
        });

        let fetch = AssertUnwindSafe(tokio::time::timeout(
            self.task_timeout,
            self.enricher.fetch_remote(&descriptor, needed),
        ))
        .catch_unwind();

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(key = %key, "Enrichment abandoned on shutdown");
                return;
            }
            outcome = fetch => outcome,
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                warn!(key = %key, "Enrichment task timed out after {:?}", self.task_timeout);
                RemoteFetchResult::unavailable(needed, MissReason::Timeout)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(key = %key, message = %message, "Remote enricher panicked");
                self.emit(EnrichmentEvent::Failed {
                    track_key: key,
                    message,
                });
                return;
            }
        };

        match self.cache.put(&descriptor.identity, &result).await {
            Ok(()) => {
                let lyrics_found = result.lyrics.is_found();
                let cover_found = result.cover.is_found();
                info!(key = %key, lyrics_found, cover_found, "Enrichment merged");
                self.emit(EnrichmentEvent::Completed {
                    track_key: key,
                    lyrics_found,
                    cover_found,
                });
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to merge enrichment result");
                self.emit(EnrichmentEvent::Failed {
                    track_key: key,
                    message: e.to_string(),
                });
            }
        }

        drop(guard);
    }

    fn emit(&self, event: EnrichmentEvent) {
        if let Some(bus) = &self.events {
            bus.emit(CoreEvent::Enrichment(event)).ok();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
