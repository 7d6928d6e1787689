//! Debounced single writer for the collection.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use studio_core::{Msg, TrackedItem};
use studio_logging::{studio_debug, studio_error};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::storage::{PersistedCollection, SaveReport, StorageChain, StorageError};

pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(400);

type FlushReply = oneshot::Sender<Result<Option<SaveReport>, StorageError>>;

enum PersistCommand {
    Save(Vec<TrackedItem>),
    Flush(FlushReply),
    Clear(oneshot::Sender<Result<(), StorageError>>),
}

/// Handle to the writer task. Cloning is cheap; the task stops once every
/// handle is dropped, writing out whatever is still pending.
#[derive(Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistHandle {
    /// Spawn the writer on the current tokio runtime. Failed saves are
    /// reported through `notify` as [`Msg::StorageFailed`].
    pub fn spawn<F>(chain: Arc<StorageChain>, debounce: Duration, notify: F) -> Self
    where
        F: Fn(Msg) + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(chain, debounce, rx, notify));
        Self { tx }
    }

    /// Queue a snapshot; it replaces any snapshot still waiting.
    pub fn save(&self, items: Vec<TrackedItem>) {
        let _ = self.tx.send(PersistCommand::Save(items));
    }

    /// Write the pending snapshot now. `Ok(None)` when nothing was pending.
    ///
    /// The request is queued before this returns, so it is ordered after
    /// every earlier [`PersistHandle::save`].
    pub fn flush(
        &self,
    ) -> impl Future<Output = Result<Option<SaveReport>, StorageError>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let sent = self.tx.send(PersistCommand::Flush(reply)).is_ok();
        async move {
            if !sent {
                return Ok(None);
            }
            rx.await.unwrap_or(Ok(None))
        }
    }

    /// Drop the pending snapshot and wipe every backend. Queued like
    /// [`PersistHandle::flush`].
    pub fn clear(&self) -> impl Future<Output = Result<(), StorageError>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let sent = self.tx.send(PersistCommand::Clear(reply)).is_ok();
        async move {
            if !sent {
                return Ok(());
            }
            rx.await.unwrap_or(Ok(()))
        }
    }
}

async fn run_writer<F>(
    chain: Arc<StorageChain>,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
    notify: F,
) where
    F: Fn(Msg),
{
    let mut pending: Option<Vec<TrackedItem>> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let timeout = deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::MAX);

        tokio::select! {
            biased;

            _ = tokio::time::sleep(timeout), if deadline.is_some() => {
                deadline = None;
                if let Some(items) = pending.take() {
                    let _ = write(&chain, items, &notify).await;
                }
            }

            command = rx.recv() => match command {
                Some(PersistCommand::Save(items)) => {
                    if pending.is_none() {
                        deadline = Some(Instant::now() + debounce);
                    }
                    pending = Some(items);
                }
                Some(PersistCommand::Flush(reply)) => {
                    deadline = None;
                    let result = match pending.take() {
                        Some(items) => write(&chain, items, &notify).await.map(Some),
                        None => Ok(None),
                    };
                    let _ = reply.send(result);
                }
                Some(PersistCommand::Clear(reply)) => {
                    deadline = None;
                    pending = None;
                    let _ = reply.send(chain.clear().await);
                }
                None => {
                    if let Some(items) = pending.take() {
                        let _ = write(&chain, items, &notify).await;
                    }
                    break;
                }
            }
        }
    }
    studio_debug!("Persistence writer stopped");
}

async fn write<F>(
    chain: &StorageChain,
    items: Vec<TrackedItem>,
    notify: &F,
) -> Result<SaveReport, StorageError>
where
    F: Fn(Msg),
{
    let collection = PersistedCollection::from_items(&items);
    let result = chain.save(&collection).await;
    if let Err(err) = &result {
        studio_error!("Saving collection of {} items failed: {}", items.len(), err);
        notify(Msg::StorageFailed {
            message: err.to_string(),
            quota_exceeded: err.is_quota_exceeded(),
        });
    }
    result
}
