//! Ambient tracing context.
//!
//! A [`Zone`] is the implicit context code runs in. The root zone carries
//! nothing; a tracing zone carries the interaction that is being traced, and
//! with it the trace id and the root span. Exactly one zone is current on a
//! thread at any instant. Zones are activated with [`Zone::attach`], which
//! returns a [`ZoneGuard`] that restores the previous zone when dropped, also
//! when the code running inside it panics.
//!
//! ```
//! use webtrace_zone::Zone;
//!
//! assert!(!Zone::current().is_tracing());
//! {
//!     let _guard = Zone::root().attach();
//!     assert!(Zone::current() == Zone::root());
//! }
//! ```
use crate::interaction::OnPageInteraction;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use webtrace::trace::{RootSpan, TraceId};
use webtrace::wt_warn;

thread_local! {
    static CURRENT_ZONE: RefCell<ZoneStack> = RefCell::new(ZoneStack::default());
}

/// An execution context that tasks capture when scheduled and restore when
/// run.
///
/// Cloning a zone is cheap. Two zones compare equal when they are the same
/// zone, not merely zones with equal contents.
#[derive(Clone, Default)]
pub struct Zone {
    tracing: Option<Arc<TracingZone>>,
}

struct TracingZone {
    trace_id: TraceId,
    interaction: Arc<OnPageInteraction>,
}

impl Zone {
    /// The zone with no interaction attached.
    pub fn root() -> Self {
        Zone::default()
    }

    /// A new zone tracing `interaction`.
    pub fn tracing(interaction: Arc<OnPageInteraction>) -> Self {
        Zone {
            tracing: Some(Arc::new(TracingZone {
                trace_id: interaction.root_span().trace_id(),
                interaction,
            })),
        }
    }

    /// Returns an immutable snapshot of the current thread's zone.
    pub fn current() -> Self {
        Self::map_current(|zone| zone.clone())
    }

    /// Applies a function to the current zone returning its value.
    ///
    /// Note: This function will panic if you attempt to attach another zone
    /// while the current one is still borrowed.
    pub fn map_current<T>(f: impl FnOnce(&Zone) -> T) -> T {
        CURRENT_ZONE.with(|stack| f(&stack.borrow().current))
    }

    /// Whether this zone belongs to a traced interaction.
    pub fn is_tracing(&self) -> bool {
        self.tracing.is_some()
    }

    /// Trace id of the interaction, `None` for the root zone.
    pub fn trace_id(&self) -> Option<TraceId> {
        self.tracing.as_ref().map(|tracing| tracing.trace_id)
    }

    /// Root span of the interaction, `None` for the root zone.
    pub fn root_span(&self) -> Option<&RootSpan> {
        self.interaction().map(|interaction| interaction.root_span())
    }

    /// Lifecycle record of the interaction, `None` for the root zone.
    pub fn interaction(&self) -> Option<&Arc<OnPageInteraction>> {
        self.tracing.as_ref().map(|tracing| &tracing.interaction)
    }

    /// Replaces the current zone on this thread with this zone.
    ///
    /// Dropping the returned [`ZoneGuard`] will reset the current zone to the
    /// previous value. Guards dropped out of order leave the stack
    /// consistent: the zone of the guard dropped last stays current until
    /// every guard above it is gone.
    pub fn attach(self) -> ZoneGuard {
        let pos = CURRENT_ZONE.with(|stack| stack.borrow_mut().push(self));

        ZoneGuard {
            zone_pos: pos,
            _marker: PhantomData,
        }
    }
}

impl PartialEq for Zone {
    fn eq(&self, other: &Self) -> bool {
        match (&self.tracing, &other.tracing) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tracing {
            Some(tracing) => f
                .debug_struct("Zone")
                .field("trace_id", &tracing.trace_id)
                .finish(),
            None => f.write_str("Zone(root)"),
        }
    }
}

/// A guard that resets the current zone to the prior zone when dropped.
#[derive(Debug)]
pub struct ZoneGuard {
    zone_pos: u16,
    // Ensure this type is !Send as it relies on thread locals
    _marker: PhantomData<*const ()>,
}

impl Drop for ZoneGuard {
    fn drop(&mut self) {
        let pos = self.zone_pos;
        if pos > ZoneStack::BASE_POS && pos < ZoneStack::MAX_POS {
            CURRENT_ZONE.with(|stack| stack.borrow_mut().pop_id(pos));
        }
    }
}

/// Stack of zones attached on a thread. `current` is the top, the root zone
/// when nothing is attached.
struct ZoneStack {
    current: Zone,
    stack: Vec<Option<Zone>>,
    _marker: PhantomData<*const ()>,
}

impl ZoneStack {
    const BASE_POS: u16 = 0;
    const MAX_POS: u16 = u16::MAX;
    const INITIAL_CAPACITY: usize = 8;

    fn push(&mut self, zone: Zone) -> u16 {
        let next_pos = self.stack.len() + 1;
        if next_pos < ZoneStack::MAX_POS.into() {
            let previous = std::mem::replace(&mut self.current, zone);
            self.stack.push(Some(previous));
            next_pos as u16
        } else {
            wt_warn!(
                name: "Zone.AttachFailed",
                message = format!(
                    "Too many nested zones. Max limit is {}. The current zone is unchanged.",
                    ZoneStack::MAX_POS
                )
            );
            ZoneStack::MAX_POS
        }
    }

    fn pop_id(&mut self, pos: u16) {
        if pos == ZoneStack::BASE_POS || pos == ZoneStack::MAX_POS {
            wt_warn!(
                name: "Zone.OutOfOrderDrop",
                position = pos,
                message = "Attempted to pop the base or overflow position"
            );
            return;
        }
        let len = self.stack.len() as u16;
        if pos == len {
            while let Some(None) = self.stack.last() {
                _ = self.stack.pop();
            }
            if let Some(Some(previous)) = self.stack.pop() {
                self.current = previous;
            }
        } else {
            if pos >= len {
                wt_warn!(
                    name: "Zone.PopOutOfBounds",
                    position = pos,
                    stack_length = len,
                    message = "Attempted to pop beyond the end of the zone stack"
                );
                return;
            }
            _ = self.stack[pos as usize].take();
        }
    }
}

impl Default for ZoneStack {
    fn default() -> Self {
        ZoneStack {
            current: Zone::root(),
            stack: Vec::with_capacity(ZoneStack::INITIAL_CAPACITY),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::InteractionData;
    use webtrace::trace::Tracer;

    fn tracing_zone(name: &'static str) -> Zone {
        let root = Tracer::default().start_root_span(name, None);
        Zone::tracing(Arc::new(OnPageInteraction::new(
            root,
            InteractionData::default(),
        )))
    }

    #[test]
    fn root_is_current_by_default() {
        let current = Zone::current();
        assert!(!current.is_tracing());
        assert_eq!(current.trace_id(), None);
        assert!(current.root_span().is_none());
        assert_eq!(current, Zone::root());
    }

    #[test]
    fn attach_restores_previous_zone() {
        let outer = tracing_zone("outer");
        let inner = tracing_zone("inner");
        {
            let _outer = outer.clone().attach();
            assert_eq!(Zone::current(), outer);
            {
                let _inner = inner.clone().attach();
                assert_eq!(Zone::current(), inner);
                assert_eq!(Zone::current().trace_id(), inner.trace_id());
            }
            assert_eq!(Zone::current(), outer);
        }
        assert_eq!(Zone::current(), Zone::root());
    }

    #[test]
    fn zones_compare_by_identity() {
        let a = tracing_zone("a");
        assert_eq!(a, a.clone());
        assert_ne!(a, tracing_zone("a"));
        assert_ne!(a, Zone::root());
    }

    #[test]
    fn out_of_order_drops_keep_stack_consistent() {
        let first = tracing_zone("first");
        let second = tracing_zone("second");

        let guard_first = first.clone().attach();
        let guard_second = second.clone().attach();

        drop(guard_first);
        assert_eq!(Zone::current(), second);

        drop(guard_second);
        assert_eq!(Zone::current(), Zone::root());
    }

    #[test]
    fn panics_restore_previous_zone() {
        let zone = tracing_zone("panicking");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = zone.attach();
            panic!("task failed");
        }));
        assert!(result.is_err());
        assert!(!Zone::current().is_tracing());
    }
}
