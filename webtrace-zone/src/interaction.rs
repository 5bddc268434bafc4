//! Lifecycle record of one user interaction.
use std::sync::Mutex;
use std::time::SystemTime;
use webtrace::trace::attribute_keys::{
    ATTRIBUTE_EVENT_TYPE, ATTRIBUTE_HTTP_PATH, ATTRIBUTE_HTTP_URL, ATTRIBUTE_HTTP_USER_AGENT,
    ATTRIBUTE_TARGET_ELEMENT,
};
use webtrace::trace::RootSpan;
use webtrace::wt_debug;

/// Page facts captured when an interaction starts. They become attributes
/// of the root span when the interaction is finalized.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InteractionData {
    /// Full page URL.
    pub start_location_href: String,
    /// Path component of the page URL.
    pub start_location_path: String,
    /// Event that started the interaction, e.g. `click`.
    pub event_type: String,
    /// Tag name of the element the event targeted, e.g. `BUTTON`.
    pub target_element: String,
    /// User agent of the host.
    pub user_agent: String,
}

/// Counts the asynchronous work of an interaction and ends its root span
/// once all of it is done.
///
/// The pending-task count never drops below zero and the root span is
/// ended at most once. While a task of the interaction is executing the
/// record cannot finalize, so work that is scheduled and completed from
/// inside that task does not end the interaction early.
///
/// While the debounce window is open, later events may still join the
/// interaction. An idle interaction then only remembers when it went idle
/// and is ended with that timestamp once the window closes.
#[derive(Debug)]
pub struct OnPageInteraction {
    root_span: RootSpan,
    data: InteractionData,
    state: Mutex<InteractionState>,
}

#[derive(Debug, Default)]
struct InteractionState {
    pending: usize,
    running: usize,
    window_open: bool,
    idle_since: Option<SystemTime>,
    finalized: bool,
}

impl OnPageInteraction {
    /// New record bound to `root_span`, with no pending tasks.
    pub fn new(root_span: RootSpan, data: InteractionData) -> Self {
        OnPageInteraction {
            root_span,
            data,
            state: Mutex::new(InteractionState::default()),
        }
    }

    /// Root span of the interaction.
    pub fn root_span(&self) -> &RootSpan {
        &self.root_span
    }

    /// Page facts captured at the start of the interaction.
    pub fn data(&self) -> &InteractionData {
        &self.data
    }

    /// Number of tasks scheduled for the interaction that have not run or
    /// been cancelled yet.
    pub fn pending_tasks(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.pending)
            .unwrap_or_default()
    }

    /// Whether the root span has been ended by [`OnPageInteraction::finalize`].
    pub fn is_finalized(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.finalized)
            .unwrap_or_default()
    }

    /// Records one more pending task.
    pub fn increment_pending(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.pending += 1;
            state.idle_since = None;
        }
    }

    /// Records that a pending task ran or was cancelled. Clamps at zero.
    pub fn decrement_pending(&self) {
        if let Ok(mut state) = self.state.lock() {
            if state.pending == 0 {
                wt_debug!(
                    name: "OnPageInteraction.PendingUnderflow",
                    trace_id = format!("{}", self.root_span.trace_id())
                );
                return;
            }
            state.pending -= 1;
        }
    }

    pub(crate) fn enter_task(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.running += 1;
        }
    }

    pub(crate) fn exit_task(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.running = state.running.saturating_sub(1);
        }
    }

    pub(crate) fn open_window(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.window_open = true;
        }
    }

    /// Closes the debounce window and finalizes if the interaction is idle.
    pub(crate) fn close_window(&self) -> bool {
        self.end_if_idle(true)
    }

    /// Ends the interaction if nothing is pending or executing and no
    /// debounce window is open.
    ///
    /// Attaches the interaction attributes and ends the root span. Returns
    /// `true` only for the call that actually ended it.
    pub fn finalize(&self) -> bool {
        self.end_if_idle(false)
    }

    fn end_if_idle(&self, closing_window: bool) -> bool {
        let end_time = {
            let Ok(mut state) = self.state.lock() else {
                return false;
            };
            if closing_window {
                state.window_open = false;
            }
            if state.pending > 0 || state.running > 0 {
                return false;
            }
            if state.finalized {
                wt_debug!(
                    name: "OnPageInteraction.FinalizeIgnored",
                    trace_id = format!("{}", self.root_span.trace_id()),
                    reason = "already finalized"
                );
                return false;
            }
            if state.window_open {
                if state.idle_since.is_none() {
                    state.idle_since = Some(self.root_span.clock().now());
                }
                return false;
            }
            state.finalized = true;
            state.idle_since.take()
        };

        let root = &self.root_span;
        root.add_attribute(ATTRIBUTE_EVENT_TYPE, self.data.event_type.clone());
        root.add_attribute(ATTRIBUTE_TARGET_ELEMENT, self.data.target_element.clone());
        root.add_attribute(ATTRIBUTE_HTTP_URL, self.data.start_location_href.clone());
        root.add_attribute(ATTRIBUTE_HTTP_PATH, self.data.start_location_path.clone());
        root.add_attribute(ATTRIBUTE_HTTP_USER_AGENT, self.data.user_agent.clone());
        match end_time {
            Some(timestamp) => root.end_with_timestamp(timestamp),
            None => root.end(),
        }
        true
    }
}
