//! Units of asynchronous work on the host event loop.
use crate::zone::Zone;
use http::{HeaderMap, Method};
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_XHR_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a [`Task`], unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// How the host queues a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Timers, network callbacks and other work queued on the loop.
    Macro,
    /// Promise continuations, run before the loop picks the next macrotask.
    Micro,
    /// Event listener callbacks, run whenever their event is dispatched.
    Event,
}

/// Callback executed when a task runs.
pub type TaskCallback = Box<dyn FnMut() + Send + 'static>;

/// A unit of asynchronous work with the bookkeeping the tracker attaches to
/// it.
///
/// The zone slot is filled when the task is scheduled from inside a tracing
/// zone and restored every time the task runs.
pub struct Task {
    id: TaskId,
    kind: TaskKind,
    source: Cow<'static, str>,
    event_name: Option<Cow<'static, str>>,
    target: Option<TaskTarget>,
    periodic: bool,
    zone: Option<Zone>,
    counted: bool,
    callback: TaskCallback,
}

impl Task {
    fn new<F>(kind: TaskKind, source: Cow<'static, str>, callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Task {
            id: TaskId::next(),
            kind,
            source,
            event_name: None,
            target: None,
            periodic: false,
            zone: None,
            counted: false,
            callback: Box::new(callback),
        }
    }

    /// A macrotask such as a timer. `source` names the API that queued it,
    /// e.g. `setTimeout`.
    pub fn macro_task<S, F>(source: S, callback: F) -> Self
    where
        S: Into<Cow<'static, str>>,
        F: FnMut() + Send + 'static,
    {
        Task::new(TaskKind::Macro, source.into(), callback)
    }

    /// A microtask such as a promise continuation.
    pub fn micro_task<S, F>(source: S, callback: F) -> Self
    where
        S: Into<Cow<'static, str>>,
        F: FnMut() + Send + 'static,
    {
        Task::new(TaskKind::Micro, source.into(), callback)
    }

    /// An event listener for `event_name` on `target`.
    pub fn event_task<S, F>(event_name: S, target: TaskTarget, callback: F) -> Self
    where
        S: Into<Cow<'static, str>>,
        F: FnMut() + Send + 'static,
    {
        let event_name = event_name.into();
        let mut task = Task::new(TaskKind::Event, event_name.clone(), callback);
        task.event_name = Some(event_name);
        task.target = Some(target);
        task
    }

    /// Marks the task as periodic, like an interval timer.
    pub fn periodic(mut self) -> Self {
        self.periodic = true;
        self
    }

    /// Attaches the object the task belongs to.
    pub fn with_target(mut self, target: TaskTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// The task id.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// How the task is queued.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// The API that queued the task.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Event name for event tasks.
    pub fn event_name(&self) -> Option<&str> {
        self.event_name.as_deref()
    }

    /// Element or request the task belongs to.
    pub fn target(&self) -> Option<&TaskTarget> {
        self.target.as_ref()
    }

    /// Whether the task runs repeatedly.
    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    /// Zone stamped on the task, if it was scheduled inside a tracing zone.
    pub fn zone(&self) -> Option<&Zone> {
        self.zone.as_ref()
    }

    /// Whether the task counts towards its interaction's pending tasks.
    ///
    /// Periodic tasks and event listeners do not: they may never finish.
    pub fn counts_towards_interaction(&self) -> bool {
        self.kind != TaskKind::Event && !self.periodic
    }

    /// Runs the task's callback.
    pub fn invoke(&mut self) {
        (self.callback)()
    }

    pub(crate) fn set_zone(&mut self, zone: Zone) {
        self.zone = Some(zone);
    }

    pub(crate) fn is_counted(&self) -> bool {
        self.counted
    }

    pub(crate) fn set_counted(&mut self, counted: bool) {
        self.counted = counted;
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("event_name", &self.event_name)
            .field("target", &self.target)
            .field("periodic", &self.periodic)
            .field("zone", &self.zone)
            .finish()
    }
}

/// The object a task is bound to.
#[derive(Clone, Debug)]
pub enum TaskTarget {
    /// A page element receiving events.
    Element(Element),
    /// An HTTP request made by the page.
    Xhr(Xhr),
}

/// A page element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    tag_name: String,
    id: Option<String>,
    interaction_name: Option<String>,
}

impl Element {
    /// An element with the given tag name. Tag names are upper-cased, the
    /// way hosts report them.
    pub fn new<T: AsRef<str>>(tag_name: T) -> Self {
        Element {
            tag_name: tag_name.as_ref().to_ascii_uppercase(),
            id: None,
            interaction_name: None,
        }
    }

    /// Sets the element id.
    pub fn with_id<T: Into<String>>(mut self, id: T) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets an explicit name for interactions started on this element. It
    /// is used as the root span name instead of the event name.
    pub fn with_interaction_name<T: Into<String>>(mut self, name: T) -> Self {
        self.interaction_name = Some(name.into());
        self
    }

    /// Upper-case tag name, e.g. `BUTTON`.
    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    /// Element id.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Explicit interaction name.
    pub fn interaction_name(&self) -> Option<&str> {
        self.interaction_name.as_deref()
    }
}

/// Progress of an [`Xhr`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    /// Created, not opened.
    #[default]
    Unsent = 0,
    /// Opened; `send` may have been called.
    Opened = 1,
    /// Response headers received.
    HeadersReceived = 2,
    /// Response body is arriving.
    Loading = 3,
    /// Finished, successfully or not.
    Done = 4,
}

/// Shared handle to an HTTP request issued by the page.
///
/// Clones refer to the same request.
#[derive(Clone)]
pub struct Xhr {
    inner: Arc<Mutex<XhrState>>,
    id: u64,
}

#[derive(Debug)]
struct XhrState {
    method: Method,
    url: String,
    ready_state: ReadyState,
    status: u16,
    request_headers: HeaderMap,
}

impl Xhr {
    /// An opened request.
    pub fn open<U: Into<String>>(method: Method, url: U) -> Self {
        Xhr {
            inner: Arc::new(Mutex::new(XhrState {
                method,
                url: url.into(),
                ready_state: ReadyState::Opened,
                status: 0,
                request_headers: HeaderMap::new(),
            })),
            id: NEXT_XHR_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Identifier of the request, unique within the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request method.
    pub fn method(&self) -> Method {
        self.read(|state| state.method.clone()).unwrap_or_default()
    }

    /// Request URL as given by the page, possibly relative.
    pub fn url(&self) -> String {
        self.read(|state| state.url.clone()).unwrap_or_default()
    }

    /// Current progress.
    pub fn ready_state(&self) -> ReadyState {
        self.read(|state| state.ready_state).unwrap_or_default()
    }

    /// Response status, `0` until the request completes.
    pub fn status(&self) -> u16 {
        self.read(|state| state.status).unwrap_or_default()
    }

    /// Headers set on the request.
    pub fn request_headers(&self) -> HeaderMap {
        self.read(|state| state.request_headers.clone())
            .unwrap_or_default()
    }

    /// Applies `f` to the request headers.
    pub fn with_request_headers<T>(&self, f: impl FnOnce(&mut HeaderMap) -> T) -> Option<T> {
        self.inner
            .lock()
            .ok()
            .map(|mut state| f(&mut state.request_headers))
    }

    /// Marks the request done with the given response status.
    pub fn complete(&self, status: u16) {
        if let Ok(mut state) = self.inner.lock() {
            state.ready_state = ReadyState::Done;
            state.status = status;
        }
    }

    fn read<T>(&self, f: impl FnOnce(&XhrState) -> T) -> Option<T> {
        self.inner.lock().ok().map(|state| f(&state))
    }
}

impl fmt::Debug for Xhr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Xhr");
        debug.field("id", &self.id);
        if let Ok(state) = self.inner.lock() {
            debug
                .field("method", &state.method)
                .field("url", &state.url)
                .field("ready_state", &state.ready_state)
                .field("status", &state.status);
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Task::macro_task("setTimeout", || {}), true)]
    #[case(Task::micro_task("Promise.then", || {}), true)]
    #[case(Task::macro_task("setInterval", || {}).periodic(), false)]
    #[case(Task::event_task("click", TaskTarget::Element(Element::new("button")), || {}), false)]
    fn counting_rules(#[case] task: Task, #[case] counts: bool) {
        assert_eq!(task.counts_towards_interaction(), counts);
    }

    #[test]
    fn tasks_get_distinct_ids() {
        let a = Task::macro_task("setTimeout", || {});
        let b = Task::macro_task("setTimeout", || {});
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn invoke_runs_callback_each_time() {
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let mut task = Task::macro_task("setInterval", move || *counter.lock().unwrap() += 1);
        task.invoke();
        task.invoke();
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn element_tag_names_are_upper_case() {
        let element = Element::new("button").with_id("save");
        assert_eq!(element.tag_name(), "BUTTON");
        assert_eq!(element.id(), Some("save"));
        assert_eq!(element.interaction_name(), None);
    }

    #[test]
    fn xhr_lifecycle() {
        let xhr = Xhr::open(Method::GET, "/items");
        let handle = xhr.clone();
        assert_eq!(xhr.ready_state(), ReadyState::Opened);
        assert_eq!(xhr.status(), 0);

        handle.complete(200);
        assert_eq!(xhr.ready_state(), ReadyState::Done);
        assert_eq!(xhr.status(), 200);
        assert_eq!(xhr.id(), handle.id());
    }
}
