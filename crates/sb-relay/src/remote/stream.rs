//! Handle to a background task that serves one sub-channel

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Owns the task behind a shell or file transfer stream.
///
/// The request sender is attached once the task reports the stream open;
/// until then the stream is not ready. Dropping the handle aborts the task.
pub struct StreamHandle<T> {
    task: Option<JoinHandle<()>>,
    requests: Option<mpsc::UnboundedSender<T>>,
}

impl<T> StreamHandle<T> {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self {
            task: Some(task),
            requests: None,
        }
    }

    /// Attach the request sender announced by the task
    pub fn attach(&mut self, requests: mpsc::UnboundedSender<T>) {
        self.requests = Some(requests);
    }

    /// Whether the stream accepts requests
    pub fn is_ready(&self) -> bool {
        self.requests
            .as_ref()
            .is_some_and(|requests| !requests.is_closed())
    }

    /// Queue a request; false when the stream is not ready
    pub fn send(&self, request: T) -> bool {
        match &self.requests {
            Some(requests) => requests.send(request).is_ok(),
            None => false,
        }
    }

    /// Stop the task and wait until it has released its channel
    pub async fn shutdown(mut self) {
        self.requests = None;
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl<T> Drop for StreamHandle<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
