use std::future::Future;

use tokio::task::JoinHandle;

/// A background activity owned by whoever holds the handle.
///
/// The task is aborted when the handle is dropped, so releasing the handle is
/// all it takes to cancel a timer or a location subscription.
#[derive(Debug)]
pub struct ActivityHandle {
    name: &'static str,
    task: JoinHandle<()>,
}

impl ActivityHandle {
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            task: tokio::spawn(future),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ActivityHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            tracing::trace!("Cancelling {} activity", self.name);
        }
        self.task.abort();
    }
}
