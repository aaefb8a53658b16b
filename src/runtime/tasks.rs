use std::mem;
use std::sync::{Mutex, PoisonError};

use futures::future::{join_all, BoxFuture, Shared};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A unit of background work. Shared so that callers can await the same
/// work the driver runs.
pub(crate) type Work = Shared<BoxFuture<'static, ()>>;

enum Task {
    Spawned(JoinHandle<()>),
    Parked(Work),
}

impl Task {
    fn is_finished(&self) -> bool {
        match self {
            Task::Spawned(handle) => handle.is_finished(),
            Task::Parked(work) => work.peek().is_some(),
        }
    }
}

/// Background work issued by a store: lazy resolutions and write-behind
/// persistence.
///
/// Work is spawned on the ambient Tokio runtime when there is one, and
/// parked otherwise. [`Background::settle`] waits for spawned work and
/// drives parked work to completion. Parked work still unfinished when the
/// driver is dropped runs to completion on the dropping thread.
#[derive(Default)]
pub(crate) struct Background {
    tasks: Mutex<Vec<Task>>,
}

impl Background {
    pub(crate) fn spawn(&self, work: Work) {
        let task = match Handle::try_current() {
            Ok(handle) => Task::Spawned(handle.spawn(work)),
            Err(_) => Task::Parked(work),
        };
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }

    pub(crate) fn outstanding(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.iter().filter(|t| !t.is_finished()).count()
    }

    /// Wait until no work is outstanding, including work issued meanwhile.
    pub(crate) async fn settle(&self) {
        loop {
            let batch = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                mem::take(&mut *tasks)
            };
            if batch.is_empty() {
                return;
            }
            for task in batch {
                match task {
                    Task::Spawned(handle) => {
                        if let Err(e) = handle.await {
                            tracing::warn!(error = %e, "background task did not complete");
                        }
                    }
                    Task::Parked(work) => work.await,
                }
            }
        }
    }
}

impl Drop for Background {
    fn drop(&mut self) {
        let tasks = mem::take(self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner));
        let parked: Vec<Work> = tasks
            .into_iter()
            .filter_map(|task| match task {
                Task::Parked(work) if work.peek().is_none() => Some(work),
                _ => None,
            })
            .collect();
        if parked.is_empty() {
            return;
        }
        tracing::debug!(count = parked.len(), "finishing parked background work");
        futures::executor::block_on(join_all(parked));
    }
}
