//! Test helpers: an in-memory exporter and a manually driven clock with
//! timers.
use crate::runtime::{Clock, TimerCallback, TimerId, Timers};
use crate::trace::{ExportResult, RootSpanData, SpanData, SpanExporter, TraceError, TraceResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

/// An exporter that stores every trace it receives.
///
/// Traces handed over by the tracer and traces passed to
/// [`SpanExporter::publish`] are kept apart.
#[derive(Clone, Debug, Default)]
pub struct InMemoryExporter {
    finished: Arc<Mutex<Vec<RootSpanData>>>,
    published: Arc<Mutex<Vec<Vec<RootSpanData>>>>,
}

impl InMemoryExporter {
    /// Traces received through [`SpanExporter::on_end_span`], in order.
    pub fn get_finished_roots(&self) -> TraceResult<Vec<RootSpanData>> {
        self.finished
            .lock()
            .map(|roots| roots.clone())
            .map_err(|err| TraceError::from(format!("Failed to lock roots: {:?}", err)))
    }

    /// Every span of every finished trace, roots first within each trace.
    pub fn get_finished_spans(&self) -> TraceResult<Vec<SpanData>> {
        Ok(self
            .get_finished_roots()?
            .iter()
            .flat_map(|root| root.iter().cloned())
            .collect())
    }

    /// Batches passed to [`SpanExporter::publish`], in order.
    pub fn get_published_batches(&self) -> TraceResult<Vec<Vec<RootSpanData>>> {
        self.published
            .lock()
            .map(|batches| batches.clone())
            .map_err(|err| TraceError::from(format!("Failed to lock batches: {:?}", err)))
    }

    /// Clears the internal storage.
    pub fn reset(&self) {
        let _ = self.finished.lock().map(|mut roots| roots.clear());
        let _ = self.published.lock().map(|mut batches| batches.clear());
    }
}

impl SpanExporter for InMemoryExporter {
    fn on_end_span(&self, root: RootSpanData) {
        let _ = self.finished.lock().map(|mut roots| roots.push(root));
    }

    fn publish(&self, roots: Vec<RootSpanData>) -> ExportResult {
        self.published
            .lock()
            .map(|mut batches| batches.push(roots))
            .map_err(|err| TraceError::from(format!("Failed to lock batches: {:?}", err)))
    }
}

/// Virtual clock with one-shot timers that fire only when the test advances
/// time.
///
/// Time starts at `2019-01-04T00:00:00Z`.
pub struct ManualTimers {
    state: Mutex<ManualState>,
}

struct ManualState {
    now: SystemTime,
    next_id: u64,
    pending: BTreeMap<(SystemTime, u64), TimerCallback>,
}

/// Default start of virtual time, `2019-01-04T00:00:00Z`.
pub const VIRTUAL_EPOCH: Duration = Duration::from_secs(1_546_560_000);

impl ManualTimers {
    /// New timers starting at [`VIRTUAL_EPOCH`].
    pub fn new() -> Arc<Self> {
        Self::starting_at(SystemTime::UNIX_EPOCH + VIRTUAL_EPOCH)
    }

    /// New timers starting at `start`.
    pub fn starting_at(start: SystemTime) -> Arc<Self> {
        Arc::new(ManualTimers {
            state: Mutex::new(ManualState {
                now: start,
                next_id: 1,
                pending: BTreeMap::new(),
            }),
        })
    }

    /// Moves time forward by `by`, running every timer that comes due, in
    /// due-time order. Timers scheduled by callbacks run too if they fall
    /// within the window.
    pub fn advance(&self, by: Duration) {
        let target = match self.state.lock() {
            Ok(state) => state.now + by,
            Err(_) => return,
        };
        loop {
            let due = {
                let Ok(mut state) = self.state.lock() else {
                    return;
                };
                let next = state
                    .pending
                    .first_key_value()
                    .map(|(key, _)| *key)
                    .filter(|(at, _)| *at <= target);
                match next {
                    Some(key) => {
                        state.now = key.0;
                        state.pending.remove(&key)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            match due {
                Some(callback) => callback(),
                None => return,
            }
        }
    }

    /// Number of timers that have not fired or been cleared.
    pub fn pending(&self) -> usize {
        self.state.lock().map(|state| state.pending.len()).unwrap_or_default()
    }
}

impl fmt::Debug for ManualTimers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ManualTimers");
        if let Ok(state) = self.state.lock() {
            debug
                .field("now", &state.now)
                .field("pending", &state.pending.len());
        }
        debug.finish()
    }
}

impl Clock for ManualTimers {
    fn now(&self) -> SystemTime {
        self.state
            .lock()
            .map(|state| state.now)
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

impl Timers for ManualTimers {
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let Ok(mut state) = self.state.lock() else {
            return TimerId::new(0);
        };
        let id = state.next_id;
        state.next_id += 1;
        let due = state.now + delay;
        state.pending.insert((due, id), callback);
        TimerId::new(id)
    }

    fn clear_timeout(&self, id: TimerId) {
        if let Ok(mut state) = self.state.lock() {
            state.pending.retain(|(_, pending), _| *pending != id.as_u64());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn timers_fire_in_due_order() {
        let timers = ManualTimers::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (name, delay) in [("late", 30), ("early", 10), ("middle", 20)] {
            let order = order.clone();
            timers.set_timeout(
                Duration::from_millis(delay),
                Box::new(move || order.lock().unwrap().push(name)),
            );
        }

        timers.advance(Duration::from_millis(25));
        assert_eq!(*order.lock().unwrap(), vec!["early", "middle"]);
        assert_eq!(timers.pending(), 1);

        timers.advance(Duration::from_millis(5));
        assert_eq!(*order.lock().unwrap(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn clock_reads_due_time_inside_callbacks() {
        let timers = ManualTimers::new();
        let start = timers.now();
        let seen = Arc::new(Mutex::new(None));

        let (inner_timers, inner_seen) = (timers.clone(), seen.clone());
        timers.set_timeout(
            Duration::from_millis(50),
            Box::new(move || *inner_seen.lock().unwrap() = Some(inner_timers.now())),
        );
        timers.advance(Duration::from_millis(200));

        assert_eq!(*seen.lock().unwrap(), Some(start + Duration::from_millis(50)));
        assert_eq!(timers.now(), start + Duration::from_millis(200));
    }

    #[test]
    fn cleared_timers_do_not_fire() {
        let timers = ManualTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let id = timers.set_timeout(
            Duration::from_millis(10),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        timers.clear_timeout(id);
        timers.clear_timeout(id);
        timers.advance(Duration::from_secs(1));

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callbacks_can_schedule_more_timers() {
        let timers = ManualTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let (outer_timers, outer_fired) = (timers.clone(), fired.clone());
        timers.set_timeout(
            Duration::from_millis(10),
            Box::new(move || {
                let inner_fired = outer_fired.clone();
                outer_fired.fetch_add(1, Ordering::SeqCst);
                outer_timers.set_timeout(
                    Duration::from_millis(10),
                    Box::new(move || {
                        inner_fired.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        timers.advance(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
