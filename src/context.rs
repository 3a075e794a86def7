//! Serial execution contexts.
//!
//! An [`ExecutionContext`] is the "home" of a registrant: jobs posted to it
//! run one at a time, in posting order, on a dedicated tokio task. The
//! dispatcher posts callbacks here instead of calling them inline, so a slow
//! callback only delays its own context.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable handle to a serial job queue.
#[derive(Clone)]
pub struct ExecutionContext {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Job>,
}

impl ExecutionContext {
    /// Spawn the context's task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn spawn(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let task_name = Arc::clone(&name);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!(target: "netloc::dispatch", context = %task_name, "job panicked");
                }
            }
            tracing::trace!(target: "netloc::dispatch", context = %task_name, "execution context stopped");
        });
        Self { name, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `job`. Fails only when the context's task has gone away.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        self.tx.send(Box::new(job)).map_err(|_| Error::Closed.boxed())
    }

    /// Wait until every job posted before this call has run.
    pub async fn flush(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.post(move || {
            let _ = done.send(());
        })?;
        wait.await.map_err(|_| Error::Closed.boxed())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
