//! Named background-task registry with idempotent start/stop and
//! cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A task's body: given a cancellation token, runs until the token fires,
/// then returns.
pub type StartFn = Arc<dyn Fn(CancellationToken) -> JoinHandle<()> + Send + Sync>;

struct TaskEntry {
    start: StartFn,
    running: AtomicBool,
    token: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// Registers named background tasks and starts/stops them by name, or all
/// at once when no name is given. Starting an already-running task, or
/// stopping an already-stopped one, is a no-op logged at `info!` rather
/// than an error.
pub struct TaskSupervisor {
    tasks: DashMap<&'static str, Arc<TaskEntry>>,
    registration_order: RwLock<Vec<&'static str>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self { tasks: DashMap::new(), registration_order: RwLock::new(Vec::new()) }
    }

    /// Registers a task under `name`. Re-registering the same name is a
    /// no-op (the original task keeps running if it was already started).
    pub fn register(&self, name: &'static str, start: StartFn) {
        if self.tasks.contains_key(name) {
            info!(task = name, "task already registered");
            return;
        }
        self.tasks.insert(
            name,
            Arc::new(TaskEntry { start, running: AtomicBool::new(false), token: Mutex::new(None), handle: Mutex::new(None) }),
        );
        self.registration_order.write().push(name);
    }

    fn names_to_act_on(&self, name: Option<&str>) -> Vec<&'static str> {
        match name {
            Some(n) => self.registration_order.read().iter().copied().filter(|t| *t == n).collect(),
            None => self.registration_order.read().clone(),
        }
    }

    /// Starts the named task, or every registered task if `name` is `None`.
    pub fn start_tasks(&self, name: Option<&str>) {
        for task_name in self.names_to_act_on(name) {
            let Some(entry) = self.tasks.get(task_name) else { continue };
            if entry.running.swap(true, Ordering::SeqCst) {
                info!(task = task_name, "task already running, start is a no-op");
                continue;
            }
            let token = CancellationToken::new();
            let handle = (entry.start)(token.clone());
            *entry.token.lock() = Some(token);
            *entry.handle.lock() = Some(handle);
            info!(task = task_name, "task started");
        }
    }

    /// Stops the named task, or every registered task if `name` is `None`.
    /// Cancels the task's token and awaits its join handle.
    pub async fn shutdown(&self, name: Option<&str>) {
        for task_name in self.names_to_act_on(name) {
            let Some(entry) = self.tasks.get(task_name).map(|e| Arc::clone(&e)) else { continue };
            if !entry.running.swap(false, Ordering::SeqCst) {
                info!(task = task_name, "task already stopped, shutdown is a no-op");
                continue;
            }
            if let Some(token) = entry.token.lock().take() {
                token.cancel();
            }
            let handle = entry.handle.lock().take();
            if let Some(handle) = handle {
                let _ = handle.await;
            }
            info!(task = task_name, "task stopped");
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks.get(name).is_some_and(|e| e.running.load(Ordering::SeqCst))
    }

    /// A snapshot of every registered task's running state, used by the
    /// metrics worker's `tasks_running_states` sample.
    pub fn running_states(&self) -> Vec<(String, bool)> {
        self.registration_order
            .read()
            .iter()
            .filter_map(|name| self.tasks.get(*name).map(|e| (name.to_string(), e.running.load(Ordering::SeqCst))))
            .collect()
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
    use std::time::Duration;

    use super::*;

    fn counting_task(counter: Arc<AtomicU32>) -> StartFn {
        Arc::new(move |token: CancellationToken| {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                token.cancelled().await;
            })
        })
    }

    #[tokio::test]
    async fn start_and_shutdown_single_task() {
        let supervisor = TaskSupervisor::new();
        let starts = Arc::new(AtomicU32::new(0));
        supervisor.register("cleanup", counting_task(starts.clone()));

        supervisor.start_tasks(Some("cleanup"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(starts.load(AtomicOrdering::SeqCst), 1);
        assert!(supervisor.is_running("cleanup"));

        supervisor.shutdown(Some("cleanup")).await;
        assert!(!supervisor.is_running("cleanup"));
    }

    #[tokio::test]
    async fn starting_a_running_task_is_a_noop() {
        let supervisor = TaskSupervisor::new();
        let starts = Arc::new(AtomicU32::new(0));
        supervisor.register("cleanup", counting_task(starts.clone()));

        supervisor.start_tasks(Some("cleanup"));
        supervisor.start_tasks(Some("cleanup"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(starts.load(AtomicOrdering::SeqCst), 1, "second start must not spawn again");

        supervisor.shutdown(None).await;
    }

    #[tokio::test]
    async fn stopping_a_stopped_task_is_a_noop() {
        let supervisor = TaskSupervisor::new();
        supervisor.register("cleanup", counting_task(Arc::new(AtomicU32::new(0))));
        supervisor.shutdown(Some("cleanup")).await;
        supervisor.shutdown(Some("cleanup")).await;
        assert!(!supervisor.is_running("cleanup"));
    }

    #[tokio::test]
    async fn shutdown_without_name_stops_every_task() {
        let supervisor = TaskSupervisor::new();
        supervisor.register("cleanup", counting_task(Arc::new(AtomicU32::new(0))));
        supervisor.register("metrics", counting_task(Arc::new(AtomicU32::new(0))));
        supervisor.start_tasks(None);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(supervisor.is_running("cleanup"));
        assert!(supervisor.is_running("metrics"));

        supervisor.shutdown(None).await;
        assert!(!supervisor.is_running("cleanup"));
        assert!(!supervisor.is_running("metrics"));
    }

    #[test]
    fn running_states_reports_registration_order() {
        let supervisor = TaskSupervisor::new();
        supervisor.register("cleanup", counting_task(Arc::new(AtomicU32::new(0))));
        supervisor.register("metrics", counting_task(Arc::new(AtomicU32::new(0))));
        let states = supervisor.running_states();
        assert_eq!(states, vec![("cleanup".to_string(), false), ("metrics".to_string(), false)]);
    }
}
