//! In-memory table of active streams.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::job::StreamJob;
use super::paths::StreamId;

/// Ticket held by whoever currently owns a launch or a teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub since: DateTime<Utc>,
    ticket: u64,
}

/// State of a registered stream.
#[derive(Debug, Clone)]
pub enum RegistryEntry {
    Starting(Reservation),
    Live(Arc<StreamJob>),
    /// Teardown in progress. The id cannot be relaunched until the holder
    /// of the reservation calls [`StreamRegistry::finish_stop`].
    Stopping(Reservation),
}

/// Outcome of [`StreamRegistry::begin_stop`].
#[derive(Debug)]
pub enum StopClaim {
    /// Nothing was registered. The marker guards orphan cleanup.
    Idle(Reservation),
    /// The live job was detached and must be torn down by the caller.
    Live(Arc<StreamJob>, Reservation),
    /// A launch is in flight. The launching task tears it down when it
    /// fails to promote.
    Launching,
    /// Another teardown already owns the id.
    AlreadyStopping,
}

/// Concurrency-safe `stream_id -> entry` table.
///
/// The lock is only held inside these synchronous methods.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    entries: Mutex<HashMap<StreamId, RegistryEntry>>,
    next_ticket: AtomicU64,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ticket(&self) -> Reservation {
        Reservation {
            since: Utc::now(),
            ticket: self.next_ticket.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn get(&self, stream_id: StreamId) -> Option<RegistryEntry> {
        self.entries.lock().get(&stream_id).cloned()
    }

    /// Insert `entry` unless `stream_id` is already registered.
    pub fn insert_if_absent(&self, stream_id: StreamId, entry: RegistryEntry) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&stream_id) {
            return false;
        }
        entries.insert(stream_id, entry);
        true
    }

    /// Reserve `stream_id` for a launch. `None` if it is already registered.
    pub fn reserve(&self, stream_id: StreamId) -> Option<Reservation> {
        let reservation = self.ticket();
        self.insert_if_absent(stream_id, RegistryEntry::Starting(reservation))
            .then_some(reservation)
    }

    /// Replace the reservation with a live job.
    ///
    /// Returns false when the reservation is no longer `Starting`, for
    /// example because the stream was stopped during the launch. In that
    /// case the caller owns the teardown and must end it with
    /// [`Self::finish_stop`].
    pub fn promote(
        &self,
        stream_id: StreamId,
        reservation: Reservation,
        job: Arc<StreamJob>,
    ) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&stream_id) {
            Some(RegistryEntry::Starting(current)) if *current == reservation => {
                entries.insert(stream_id, RegistryEntry::Live(job));
                true
            }
            _ => false,
        }
    }

    /// Drop the reservation after a failed launch, whether or not a stop
    /// arrived in the meantime.
    pub fn release(&self, stream_id: StreamId, reservation: Reservation) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&stream_id) {
            Some(RegistryEntry::Starting(current) | RegistryEntry::Stopping(current))
                if *current == reservation =>
            {
                entries.remove(&stream_id);
                true
            }
            _ => false,
        }
    }

    /// Mark `stream_id` as stopping and hand back what must be torn down.
    pub fn begin_stop(&self, stream_id: StreamId) -> StopClaim {
        let mut entries = self.entries.lock();
        match entries.get(&stream_id).cloned() {
            None => {
                let marker = self.ticket();
                entries.insert(stream_id, RegistryEntry::Stopping(marker));
                StopClaim::Idle(marker)
            }
            Some(RegistryEntry::Live(job)) => {
                let marker = self.ticket();
                entries.insert(stream_id, RegistryEntry::Stopping(marker));
                StopClaim::Live(job, marker)
            }
            Some(RegistryEntry::Starting(reservation)) => {
                // The launcher keeps its ticket and finds it stopping on promote.
                entries.insert(stream_id, RegistryEntry::Stopping(reservation));
                StopClaim::Launching
            }
            Some(RegistryEntry::Stopping(_)) => StopClaim::AlreadyStopping,
        }
    }

    /// Mark `stream_id` as stopping only if `job` is still its live entry.
    pub fn detach_job(&self, stream_id: StreamId, job: &Arc<StreamJob>) -> Option<Reservation> {
        let mut entries = self.entries.lock();
        match entries.get(&stream_id) {
            Some(RegistryEntry::Live(current)) if Arc::ptr_eq(current, job) => {
                let marker = self.ticket();
                entries.insert(stream_id, RegistryEntry::Stopping(marker));
                Some(marker)
            }
            _ => None,
        }
    }

    /// Clear the stopping marker held by `marker`.
    pub fn finish_stop(&self, stream_id: StreamId, marker: Reservation) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&stream_id) {
            Some(RegistryEntry::Stopping(current)) if *current == marker => {
                entries.remove(&stream_id);
                true
            }
            _ => false,
        }
    }

    /// Whether `job` is still the live entry for its stream.
    pub fn is_current(&self, job: &Arc<StreamJob>) -> bool {
        matches!(
            self.entries.lock().get(&job.stream_id()),
            Some(RegistryEntry::Live(current)) if Arc::ptr_eq(current, job)
        )
    }

    /// Remove and return every entry.
    pub fn drain(&self) -> Vec<(StreamId, RegistryEntry)> {
        self.entries.lock().drain().collect()
    }

    pub fn live_jobs(&self) -> Vec<Arc<StreamJob>> {
        self.entries
            .lock()
            .values()
            .filter_map(|entry| match entry {
                RegistryEntry::Live(job) => Some(job.clone()),
                RegistryEntry::Starting(_) | RegistryEntry::Stopping(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: i64) -> StreamId {
        StreamId::new(raw).unwrap()
    }

    #[test]
    fn reservation_is_exclusive() {
        let registry = StreamRegistry::new();

        let first = registry.reserve(id(1));
        assert!(first.is_some());
        assert!(registry.reserve(id(1)).is_none());
        assert!(registry.reserve(id(2)).is_some());
        assert!(matches!(
            registry.get(id(1)),
            Some(RegistryEntry::Starting(_))
        ));
    }

    #[test]
    fn release_only_drops_matching_reservation() {
        let registry = StreamRegistry::new();
        let stale = registry.reserve(id(1)).unwrap();
        registry.drain();
        let fresh = registry.reserve(id(1)).unwrap();

        assert!(!registry.release(id(1), stale));
        assert!(registry.get(id(1)).is_some());
        assert!(registry.release(id(1), fresh));
        assert!(registry.is_empty());
    }

    #[test]
    fn stopping_marker_blocks_relaunch_until_finished() {
        let registry = StreamRegistry::new();

        let StopClaim::Idle(marker) = registry.begin_stop(id(1)) else {
            panic!("expected an idle claim");
        };
        assert!(registry.reserve(id(1)).is_none());
        assert!(matches!(registry.begin_stop(id(1)), StopClaim::AlreadyStopping));

        let other = registry.ticket();
        assert!(!registry.finish_stop(id(1), other));
        assert!(registry.finish_stop(id(1), marker));
        assert!(registry.reserve(id(1)).is_some());
    }

    #[test]
    fn stop_during_launch_hands_teardown_to_launcher() {
        let registry = StreamRegistry::new();
        let reservation = registry.reserve(id(3)).unwrap();

        assert!(matches!(registry.begin_stop(id(3)), StopClaim::Launching));
        assert!(matches!(
            registry.get(id(3)),
            Some(RegistryEntry::Stopping(current)) if current == reservation
        ));
        assert!(registry.reserve(id(3)).is_none());

        // A failed launch still clears the marker it owns.
        assert!(registry.release(id(3), reservation));
        assert!(registry.is_empty());
    }

    #[test]
    fn drain_empties_registry() {
        let registry = StreamRegistry::new();
        registry.reserve(id(1));
        registry.reserve(id(2));

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
        assert!(registry.live_jobs().is_empty());
    }
}
