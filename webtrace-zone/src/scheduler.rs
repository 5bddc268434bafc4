//! Interception points of the host task scheduler.
use crate::task::Task;
use std::fmt::Debug;
use std::sync::Arc;

/// The three points at which the host hands a task to the scheduler.
///
/// Hosts call `schedule_task` when work is queued, `run_task` each time it
/// executes, and `cancel_task` when it is dropped without running (a
/// cleared timer, a removed listener). Implementations decorate each other:
/// [`InteractionTracker`] wraps an inner scheduler and forwards every call
/// after its own bookkeeping.
///
/// [`InteractionTracker`]: crate::InteractionTracker
pub trait TaskScheduler: Send + Sync + Debug {
    /// Called once when the task is queued.
    fn schedule_task(&self, task: &mut Task);

    /// Called every time the task executes. Must run the task.
    fn run_task(&self, task: &mut Task);

    /// Called once when the task is dropped without running again.
    fn cancel_task(&self, task: &mut Task);
}

/// Pass-through scheduler: runs tasks as they are.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectScheduler;

impl TaskScheduler for DirectScheduler {
    fn schedule_task(&self, _task: &mut Task) {}

    fn run_task(&self, task: &mut Task) {
        task.invoke()
    }

    fn cancel_task(&self, _task: &mut Task) {}
}

impl<S: TaskScheduler + ?Sized> TaskScheduler for Arc<S> {
    fn schedule_task(&self, task: &mut Task) {
        (**self).schedule_task(task)
    }

    fn run_task(&self, task: &mut Task) {
        (**self).run_task(task)
    }

    fn cancel_task(&self, task: &mut Task) {
        (**self).cancel_task(task)
    }
}

impl<S: TaskScheduler + ?Sized> TaskScheduler for Box<S> {
    fn schedule_task(&self, task: &mut Task) {
        (**self).schedule_task(task)
    }

    fn run_task(&self, task: &mut Task) {
        (**self).run_task(task)
    }

    fn cancel_task(&self, task: &mut Task) {
        (**self).cancel_task(task)
    }
}
