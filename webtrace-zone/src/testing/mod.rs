//! Deterministic host event loop for tests.
use crate::scheduler::{DirectScheduler, TaskScheduler};
use crate::task::{Element, Task, TaskId, TaskTarget, Xhr};
use http::Method;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};
use webtrace::runtime::{Clock, TimerCallback, TimerId, Timers};
use webtrace::testing::VIRTUAL_EPOCH;

pub use crate::page::StaticPage;

/// A single-threaded event loop with virtual time.
///
/// Every task goes through the installed [`TaskScheduler`] exactly like on
/// a real host: `schedule_task` when it is queued, `run_task` when it runs
/// and `cancel_task` when it is cleared. Time only moves when the test calls
/// [`FakeEventLoop::advance`]. Microtasks are drained after every macrotask
/// and after every event dispatched from the outside.
pub struct FakeEventLoop {
    state: Mutex<LoopState>,
    scheduler: RwLock<Arc<dyn TaskScheduler>>,
}

struct LoopState {
    now: SystemTime,
    seq: u64,
    timers: BTreeMap<(SystemTime, u64), Timer>,
    microtasks: VecDeque<Task>,
    listeners: BTreeMap<TaskId, Listener>,
    running: HashSet<TaskId>,
    cancel_requested: HashSet<TaskId>,
    depth: usize,
}

struct Timer {
    task: Task,
    period: Option<Duration>,
    completes: Option<(Xhr, u16)>,
}

struct Listener {
    element: Element,
    event_name: String,
    task: Option<Task>,
}

impl FakeEventLoop {
    /// New loop at `2019-01-04T00:00:00Z` with a [`DirectScheduler`].
    pub fn new() -> Arc<Self> {
        Arc::new(FakeEventLoop {
            state: Mutex::new(LoopState {
                now: SystemTime::UNIX_EPOCH + VIRTUAL_EPOCH,
                seq: 0,
                timers: BTreeMap::new(),
                microtasks: VecDeque::new(),
                listeners: BTreeMap::new(),
                running: HashSet::new(),
                cancel_requested: HashSet::new(),
                depth: 0,
            }),
            scheduler: RwLock::new(Arc::new(DirectScheduler)),
        })
    }

    /// Routes every task through `scheduler` from now on.
    pub fn install_scheduler(&self, scheduler: Arc<dyn TaskScheduler>) {
        if let Ok(mut installed) = self.scheduler.write() {
            *installed = scheduler;
        }
    }

    /// Queues `callback` to run once after `delay`.
    pub fn set_timeout<F>(&self, delay: Duration, callback: F) -> TaskId
    where
        F: FnMut() + Send + 'static,
    {
        self.queue_timer(Task::macro_task("setTimeout", callback), delay, None, None)
    }

    /// Queues `callback` to run every `period`.
    pub fn set_interval<F>(&self, period: Duration, callback: F) -> TaskId
    where
        F: FnMut() + Send + 'static,
    {
        self.queue_timer(
            Task::macro_task("setInterval", callback).periodic(),
            period,
            Some(period),
            None,
        )
    }

    /// Clears a timer, interval or pending request. Clearing a task that
    /// already finished does nothing.
    pub fn clear(&self, id: TaskId) {
        let task = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if state.running.contains(&id) {
                state.cancel_requested.insert(id);
                return;
            }
            let key = state
                .timers
                .iter()
                .find(|(_, timer)| timer.task.id() == id)
                .map(|(key, _)| *key);
            match key {
                Some(key) => state.timers.remove(&key).map(|timer| timer.task),
                None => {
                    let position = state.microtasks.iter().position(|task| task.id() == id);
                    position.and_then(|position| state.microtasks.remove(position))
                }
            }
        };
        if let Some(mut task) = task {
            self.scheduler().cancel_task(&mut task);
        }
    }

    /// Queues a microtask.
    pub fn queue_microtask<F>(&self, callback: F) -> TaskId
    where
        F: FnMut() + Send + 'static,
    {
        let mut task = Task::micro_task("queueMicrotask", callback);
        let id = task.id();
        self.scheduler().schedule_task(&mut task);
        if let Ok(mut state) = self.state.lock() {
            state.microtasks.push_back(task);
        }
        id
    }

    /// Registers a listener for `event_name` on `element`.
    pub fn add_event_listener<E, F>(&self, element: Element, event_name: E, callback: F) -> TaskId
    where
        E: Into<String>,
        F: FnMut() + Send + 'static,
    {
        let event_name = event_name.into();
        let mut task = Task::event_task(
            event_name.clone(),
            TaskTarget::Element(element.clone()),
            callback,
        );
        let id = task.id();
        self.scheduler().schedule_task(&mut task);
        if let Ok(mut state) = self.state.lock() {
            state.listeners.insert(
                id,
                Listener {
                    element,
                    event_name,
                    task: Some(task),
                },
            );
        }
        id
    }

    /// Removes a listener.
    pub fn remove_event_listener(&self, id: TaskId) {
        let task = self
            .state
            .lock()
            .ok()
            .and_then(|mut state| state.listeners.remove(&id))
            .and_then(|listener| listener.task);
        if let Some(mut task) = task {
            self.scheduler().cancel_task(&mut task);
        }
    }

    /// Dispatches `event_name` on `element`, running matching listeners in
    /// registration order. When called from outside the loop, microtasks
    /// are drained afterwards.
    pub fn dispatch_event(&self, element: &Element, event_name: &str) {
        let ids = match self.state.lock() {
            Ok(state) => state
                .listeners
                .iter()
                .filter(|(_, listener)| {
                    listener.element == *element && listener.event_name == event_name
                })
                .map(|(id, _)| *id)
                .collect::<Vec<_>>(),
            Err(_) => return,
        };

        for id in ids {
            let task = self
                .state
                .lock()
                .ok()
                .and_then(|mut state| state.listeners.get_mut(&id).and_then(|l| l.task.take()));
            if let Some(mut task) = task {
                self.run(&mut task);
                if let Ok(mut state) = self.state.lock() {
                    if let Some(listener) = state.listeners.get_mut(&id) {
                        listener.task = Some(task);
                    }
                }
            }
        }

        if self.depth() == 0 {
            self.drain_microtasks();
        }
    }

    /// Sends a request that completes with `status` after `latency`, then
    /// runs `on_done`.
    pub fn send_xhr<U, F>(
        &self,
        method: Method,
        url: U,
        status: u16,
        latency: Duration,
        on_done: F,
    ) -> Xhr
    where
        U: Into<String>,
        F: FnMut() + Send + 'static,
    {
        let xhr = Xhr::open(method, url);
        let task = Task::macro_task("XMLHttpRequest.send", on_done)
            .with_target(TaskTarget::Xhr(xhr.clone()));
        self.queue_timer(task, latency, None, Some((xhr.clone(), status)));
        xhr
    }

    /// Moves time forward by `by`, running every task that comes due, in
    /// due order, and the microtasks each of them queues.
    pub fn advance(&self, by: Duration) {
        let target = match self.state.lock() {
            Ok(state) => state.now + by,
            Err(_) => return,
        };
        loop {
            self.drain_microtasks();
            let due = {
                let Ok(mut state) = self.state.lock() else {
                    return;
                };
                let next = state
                    .timers
                    .first_key_value()
                    .map(|(key, _)| *key)
                    .filter(|(at, _)| *at <= target);
                match next {
                    Some(key) => {
                        state.now = key.0;
                        state.timers.remove(&key)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            let Some(mut timer) = due else {
                return;
            };
            if let Some((xhr, status)) = &timer.completes {
                xhr.complete(*status);
            }
            let id = timer.task.id();
            self.run(&mut timer.task);

            let cancelled = self
                .state
                .lock()
                .map(|mut state| state.cancel_requested.remove(&id))
                .unwrap_or(true);
            match timer.period {
                Some(_) if cancelled => self.scheduler().cancel_task(&mut timer.task),
                Some(period) => self.requeue(timer, period),
                None => {}
            }
        }
    }

    /// Runs everything queued, however far in the future.
    pub fn run_until_idle(&self) {
        loop {
            self.drain_microtasks();
            let next = self.state.lock().ok().and_then(|state| {
                state
                    .timers
                    .iter()
                    .find(|(_, timer)| timer.period.is_none())
                    .map(|((at, _), _)| at.duration_since(state.now).unwrap_or_default())
            });
            match next {
                Some(delay) => self.advance(delay),
                None => return,
            }
        }
    }

    /// Tasks waiting in the queues, listeners excluded.
    pub fn pending_tasks(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.timers.len() + state.microtasks.len())
            .unwrap_or_default()
    }

    fn scheduler(&self) -> Arc<dyn TaskScheduler> {
        self.scheduler
            .read()
            .map(|scheduler| scheduler.clone())
            .unwrap_or_else(|_| Arc::new(DirectScheduler))
    }

    fn depth(&self) -> usize {
        self.state.lock().map(|state| state.depth).unwrap_or_default()
    }

    fn queue_timer(
        &self,
        mut task: Task,
        delay: Duration,
        period: Option<Duration>,
        completes: Option<(Xhr, u16)>,
    ) -> TaskId {
        let id = task.id();
        self.scheduler().schedule_task(&mut task);
        if let Ok(mut state) = self.state.lock() {
            let due = state.now + delay;
            state.seq += 1;
            let seq = state.seq;
            state.timers.insert(
                (due, seq),
                Timer {
                    task,
                    period,
                    completes,
                },
            );
        }
        id
    }

    fn requeue(&self, timer: Timer, period: Duration) {
        if let Ok(mut state) = self.state.lock() {
            let due = state.now + period;
            state.seq += 1;
            let seq = state.seq;
            state.timers.insert((due, seq), timer);
        }
    }

    fn run(&self, task: &mut Task) {
        let id = task.id();
        if let Ok(mut state) = self.state.lock() {
            state.running.insert(id);
            state.depth += 1;
        }
        let scheduler = self.scheduler();
        let _running = RunningGuard { event_loop: self, id };
        scheduler.run_task(task);
    }

    fn drain_microtasks(&self) {
        loop {
            let next = self
                .state
                .lock()
                .ok()
                .and_then(|mut state| state.microtasks.pop_front());
            match next {
                Some(mut task) => self.run(&mut task),
                None => return,
            }
        }
    }
}

struct RunningGuard<'a> {
    event_loop: &'a FakeEventLoop,
    id: TaskId,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.event_loop.state.lock() {
            state.running.remove(&self.id);
            state.depth = state.depth.saturating_sub(1);
        }
    }
}

impl fmt::Debug for FakeEventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("FakeEventLoop");
        if let Ok(state) = self.state.lock() {
            debug
                .field("now", &state.now)
                .field("timers", &state.timers.len())
                .field("microtasks", &state.microtasks.len())
                .field("listeners", &state.listeners.len());
        }
        debug.finish()
    }
}

impl Clock for FakeEventLoop {
    fn now(&self) -> SystemTime {
        self.state
            .lock()
            .map(|state| state.now)
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

impl Timers for FakeEventLoop {
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let mut callback = Some(callback);
        let id = FakeEventLoop::set_timeout(self, delay, move || {
            if let Some(callback) = callback.take() {
                callback()
            }
        });
        TimerId::new(id.as_u64())
    }

    fn clear_timeout(&self, id: TimerId) {
        let task_id = self.state.lock().ok().and_then(|state| {
            state
                .timers
                .values()
                .map(|timer| timer.task.id())
                .find(|task_id| task_id.as_u64() == id.as_u64())
        });
        if let Some(task_id) = task_id {
            self.clear(task_id);
        }
    }
}
