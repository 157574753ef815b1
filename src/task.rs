use std::future::Future;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct TaskProgress {
    pub message: String,
    /// Completed share of the work in `0.0..=1.0` when it is known.
    pub fraction: Option<f32>,
}

/// Sending half handed to the task body. Reports are dropped once nobody listens.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<TaskProgress>,
}

impl ProgressSender {
    pub fn report(&self, message: impl Into<String>, fraction: Option<f32>) {
        let _ = self.tx.send(TaskProgress {
            message: message.into(),
            fraction: fraction.map(|f| f.clamp(0.0, 1.0)),
        });
    }

    /// A sender whose reports go nowhere, for callers that do not track progress.
    pub fn detached() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }
}

pub enum TaskPoll<T> {
    Running,
    Finished(Result<T, AppError>),
}

/// A long running workflow step (extraction, segmentation, encoding) running on the
/// tokio runtime. The GUI polls it without blocking; the CLI awaits it.
pub struct TaskHandle<T> {
    label: String,
    cancel: CancellationToken,
    progress_rx: mpsc::UnboundedReceiver<TaskProgress>,
    result_rx: oneshot::Receiver<Result<T, AppError>>,
    task: JoinHandle<()>,
    last_progress: Option<TaskProgress>,
}

impl<T: Send + 'static> TaskHandle<T> {
    pub fn spawn<F, Fut>(label: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(CancellationToken, ProgressSender) -> Fut,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        let label = label.into();
        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();

        let future = body(cancel.clone(), ProgressSender { tx: progress_tx });
        let task_label = label.clone();
        let task = tokio::spawn(async move {
            info!("{} started", task_label);
            let result = future.await;
            match &result {
                Ok(_) => info!("{} finished", task_label),
                Err(AppError::Cancelled) => info!("{} cancelled", task_label),
                Err(e) => error!("{} failed: {}", task_label, e),
            }
            let _ = result_tx.send(result);
        });

        Self {
            label,
            cancel,
            progress_rx,
            result_rx,
            task,
            last_progress: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cancel(&self) {
        debug!("Cancelling {}", self.label);
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Latest progress report, draining everything queued since the last call.
    pub fn progress(&mut self) -> Option<&TaskProgress> {
        while let Ok(progress) = self.progress_rx.try_recv() {
            self.last_progress = Some(progress);
        }
        self.last_progress.as_ref()
    }

    pub fn try_finish(&mut self) -> TaskPoll<T> {
        match self.result_rx.try_recv() {
            Ok(result) => TaskPoll::Finished(result),
            Err(oneshot::error::TryRecvError::Empty) => TaskPoll::Running,
            Err(oneshot::error::TryRecvError::Closed) => TaskPoll::Finished(Err(AppError::Ui(
                format!("{} stopped without a result", self.label),
            ))),
        }
    }

    pub async fn join(mut self) -> Result<T, AppError> {
        let (_placeholder_tx, placeholder_rx) = oneshot::channel();
        let result_rx = std::mem::replace(&mut self.result_rx, placeholder_rx);
        match result_rx.await {
            Ok(result) => result,
            Err(_) => Err(AppError::Ui(format!("{} stopped without a result", self.label))),
        }
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
        if !self.task.is_finished() {
            debug!("{} dropped while running", self.label);
        }
    }
}
