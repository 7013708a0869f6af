//! Widget-to-task bindings and the cancellable task bound to a widget.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, LoadRequest, LoadedImage, TaskState};
use crate::domain::errors::LoadError;
use crate::domain::ports::{ImageTarget, LoadListener, TargetId};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a binding task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocates a process-unique identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Shared cancellation flag polled by a running task.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct Binding {
    task: TaskId,
    key: CacheKey,
    cancel: CancellationFlag,
}

/// Result of [`BindingTable::bind`].
#[derive(Debug, Clone)]
pub enum BindOutcome {
    /// A new task owns the target; any previous task was cancelled.
    Bound {
        /// The new task.
        task: TaskId,
        /// Flag the new task polls.
        cancel: CancellationFlag,
    },
    /// A task for the same key is already running for the target.
    AlreadyLoading(TaskId),
}

/// Side table from widget to the one task currently allowed to update it.
#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: Mutex<HashMap<TargetId, Binding>>,
}

impl BindingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a new task for `key` to `target`.
    ///
    /// If the target's current task loads the same key it is kept and
    /// `AlreadyLoading` is returned. Otherwise the current task is cancelled
    /// and replaced.
    pub fn bind(&self, target: TargetId, key: &CacheKey) -> BindOutcome {
        let mut bindings = self.bindings.lock();
        if let Some(current) = bindings.get(&target) {
            if current.key == *key && !current.cancel.is_cancelled() {
                trace!(target = %target, task = %current.task, key = %key, "Same work already in progress");
                return BindOutcome::AlreadyLoading(current.task);
            }
            current.cancel.cancel();
            debug!(target = %target, task = %current.task, "Cancelled superseded task");
        }

        let task = TaskId::next();
        let cancel = CancellationFlag::new();
        bindings.insert(
            target,
            Binding {
                task,
                key: key.clone(),
                cancel: cancel.clone(),
            },
        );
        BindOutcome::Bound { task, cancel }
    }

    /// Returns true if `task` is still the task bound to `target`.
    #[must_use]
    pub fn is_current(&self, target: TargetId, task: TaskId) -> bool {
        self.bindings
            .lock()
            .get(&target)
            .is_some_and(|b| b.task == task)
    }

    /// Task currently bound to `target`.
    #[must_use]
    pub fn current(&self, target: TargetId) -> Option<TaskId> {
        self.bindings.lock().get(&target).map(|b| b.task)
    }

    /// Removes the binding if `task` still owns `target`.
    pub fn release(&self, target: TargetId, task: TaskId) -> bool {
        let mut bindings = self.bindings.lock();
        if bindings.get(&target).is_some_and(|b| b.task == task) {
            bindings.remove(&target);
            true
        } else {
            false
        }
    }

    /// Cancels and unbinds whatever task is bound to `target`.
    pub fn cancel(&self, target: TargetId) -> Option<TaskId> {
        let binding = self.bindings.lock().remove(&target)?;
        binding.cancel.cancel();
        debug!(target = %target, task = %binding.task, "Cancelled work");
        Some(binding.task)
    }

    /// Number of bound targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Returns true if no target is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One asynchronous load bound to one widget. The widget is only weakly
/// referenced.
pub struct BindingTask {
    id: TaskId,
    request: LoadRequest,
    target_id: TargetId,
    target: Weak<dyn ImageTarget>,
    cancel: CancellationFlag,
    listener: Arc<dyn LoadListener>,
    state: TaskState,
}

impl std::fmt::Debug for BindingTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingTask")
            .field("id", &self.id)
            .field("key", &self.request.key)
            .field("target", &self.target_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl BindingTask {
    /// Creates a pending task.
    #[must_use]
    pub fn new(
        id: TaskId,
        request: LoadRequest,
        target: &Arc<dyn ImageTarget>,
        cancel: CancellationFlag,
        listener: Arc<dyn LoadListener>,
    ) -> Self {
        Self {
            id,
            request,
            target_id: target.id(),
            target: Arc::downgrade(target),
            cancel,
            listener,
            state: TaskState::Pending,
        }
    }

    /// Task identity.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// The request being loaded.
    #[must_use]
    pub const fn request(&self) -> &LoadRequest {
        &self.request
    }

    /// Identity of the bound widget.
    #[must_use]
    pub const fn target_id(&self) -> TargetId {
        self.target_id
    }

    /// The widget, if it still exists.
    #[must_use]
    pub fn target(&self) -> Option<Arc<dyn ImageTarget>> {
        self.target.upgrade()
    }

    /// Listener for this request.
    #[must_use]
    pub fn listener(&self) -> &dyn LoadListener {
        self.listener.as_ref()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Moves to `next`. Terminal states are final.
    pub fn transition(&mut self, next: TaskState) {
        if self.state.is_terminal() {
            return;
        }
        trace!(task = %self.id, from = %self.state, to = %next, "Task state change");
        self.state = next;
    }

    /// True when the result can no longer be applied: the task was
    /// cancelled, the worker is exiting, the widget is gone or the widget was
    /// rebound to another task.
    #[must_use]
    pub fn is_stale(&self, bindings: &BindingTable, exit_early: &AtomicBool) -> bool {
        self.cancel.is_cancelled()
            || exit_early.load(Ordering::Acquire)
            || self.target.strong_count() == 0
            || !bindings.is_current(self.target_id, self.id)
    }
}

/// How a task ended on the worker side.
#[derive(Debug)]
pub enum TaskResult {
    /// The image was produced and is in the memory cache.
    Completed(LoadedImage),
    /// A step failed.
    Failed(LoadError),
    /// The task noticed it was stale.
    Cancelled,
}

/// A finished task on its way to the UI dispatcher.
#[derive(Debug)]
pub struct TaskOutcome {
    /// The task.
    pub task: BindingTask,
    /// What the worker produced.
    pub result: TaskResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{LoadKey, TargetSize};
    use crate::domain::ports::SimpleLoadListener;
    use crate::presentation::widgets::ImageSlot;

    fn key(name: &str) -> CacheKey {
        CacheKey::raw(&LoadKey::new(name))
    }

    fn bound(outcome: BindOutcome) -> (TaskId, CancellationFlag) {
        match outcome {
            BindOutcome::Bound { task, cancel } => (task, cancel),
            BindOutcome::AlreadyLoading(task) => panic!("unexpected dedupe onto {task}"),
        }
    }

    #[test]
    fn test_same_key_is_deduplicated() {
        let table = BindingTable::new();
        let target = TargetId::next();
        let (first, _) = bound(table.bind(target, &key("a")));

        match table.bind(target, &key("a")) {
            BindOutcome::AlreadyLoading(task) => assert_eq!(task, first),
            BindOutcome::Bound { .. } => panic!("expected dedupe"),
        }
    }

    #[test]
    fn test_rebinding_cancels_previous_task() {
        let table = BindingTable::new();
        let target = TargetId::next();
        let (first, first_cancel) = bound(table.bind(target, &key("a")));
        let (second, second_cancel) = bound(table.bind(target, &key("b")));

        assert!(first_cancel.is_cancelled());
        assert!(!second_cancel.is_cancelled());
        assert!(!table.is_current(target, first));
        assert!(table.is_current(target, second));
    }

    #[test]
    fn test_targets_are_independent() {
        let table = BindingTable::new();
        let (_, a_cancel) = bound(table.bind(TargetId::next(), &key("a")));
        let (_, _) = bound(table.bind(TargetId::next(), &key("b")));

        assert!(!a_cancel.is_cancelled());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_release_only_by_owner() {
        let table = BindingTable::new();
        let target = TargetId::next();
        let (first, _) = bound(table.bind(target, &key("a")));
        let (second, _) = bound(table.bind(target, &key("b")));

        assert!(!table.release(target, first));
        assert!(table.release(target, second));
        assert!(table.is_empty());
    }

    #[test]
    fn test_cancel_unbinds() {
        let table = BindingTable::new();
        let target = TargetId::next();
        let (task, cancel) = bound(table.bind(target, &key("a")));

        assert_eq!(table.cancel(target), Some(task));
        assert!(cancel.is_cancelled());
        assert_eq!(table.current(target), None);
        assert_eq!(table.cancel(target), None);
    }

    #[test]
    fn test_task_staleness() {
        let table = BindingTable::new();
        let exit_early = AtomicBool::new(false);
        let slot: Arc<dyn ImageTarget> = ImageSlot::new();
        let request = LoadRequest::new("a", TargetSize::square(8).unwrap());
        let (id, cancel) = bound(table.bind(slot.id(), &request.cache_key()));
        let task = BindingTask::new(id, request, &slot, cancel, Arc::new(SimpleLoadListener));

        assert!(!task.is_stale(&table, &exit_early));

        exit_early.store(true, Ordering::Release);
        assert!(task.is_stale(&table, &exit_early));
        exit_early.store(false, Ordering::Release);

        drop(slot);
        assert!(task.is_stale(&table, &exit_early));
    }

    #[test]
    fn test_rebound_task_is_stale() {
        let table = BindingTable::new();
        let exit_early = AtomicBool::new(false);
        let slot: Arc<dyn ImageTarget> = ImageSlot::new();
        let request = LoadRequest::new("a", TargetSize::square(8).unwrap());
        let (id, cancel) = bound(table.bind(slot.id(), &request.cache_key()));
        let task = BindingTask::new(id, request, &slot, cancel, Arc::new(SimpleLoadListener));

        let _ = table.bind(slot.id(), &key("b"));
        assert!(task.is_stale(&table, &exit_early));
    }

    #[test]
    fn test_terminal_state_is_final() {
        let slot: Arc<dyn ImageTarget> = ImageSlot::new();
        let mut task = BindingTask::new(
            TaskId::next(),
            LoadRequest::new("a", TargetSize::square(8).unwrap()),
            &slot,
            CancellationFlag::new(),
            Arc::new(SimpleLoadListener),
        );
        assert_eq!(task.state(), TaskState::Pending);
        task.transition(TaskState::Running);
        task.transition(TaskState::Cancelled);
        task.transition(TaskState::Completed);
        assert_eq!(task.state(), TaskState::Cancelled);
    }
}
