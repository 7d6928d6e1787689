//! The task that owns [`AppState`] and executes the effects `update` returns.
use std::collections::HashMap;
use std::sync::Arc;

use studio_core::{
    update, AppState, Effect, ItemId, ItemStatus, Msg, OperationKind, OriginalFile, Plan,
    StudioViewModel,
};
use studio_logging::{studio_debug, studio_info, studio_warn};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::pipeline::{execute_plan, MsgSink};
use crate::saver::PersistHandle;
use crate::storage::{PersistedCollection, Quota, SaveReport, StorageChain, StorageError};
use crate::thumbnail::generate_thumbnail;
use crate::OperationClient;

/// Something the runtime needs a front end to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioEvent {
    /// The operation needs user input; answer with
    /// [`Msg::InteractionCompleted`] or [`Msg::InteractionCancelled`].
    InteractionRequested { item_id: ItemId, kind: OperationKind },
}

/// How a [`StudioHandle::run`] request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    Failed,
    /// Unknown item, empty plan, or a plan already running on the item.
    Rejected,
    /// The item was deleted before its plan settled.
    Removed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("studio runtime has stopped")]
pub struct RuntimeClosed;

enum Command {
    Dispatch(Msg),
    Apply {
        msg: Msg,
        reply: oneshot::Sender<AppState>,
    },
    Run {
        item_id: ItemId,
        plan: Plan,
        reply: oneshot::Sender<RunOutcome>,
    },
    Flush(oneshot::Sender<Result<Option<SaveReport>, StorageError>>),
    Shutdown(oneshot::Sender<()>),
}

struct CommandSink {
    tx: mpsc::UnboundedSender<Command>,
}

impl MsgSink for CommandSink {
    fn emit(&self, msg: Msg) {
        let _ = self.tx.send(Command::Dispatch(msg));
    }
}

/// Receiver side of [`StudioEvent`]s.
pub struct StudioEvents {
    rx: mpsc::UnboundedReceiver<StudioEvent>,
}

impl StudioEvents {
    pub fn try_recv(&mut self) -> Option<StudioEvent> {
        self.rx.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<StudioEvent> {
        self.rx.recv().await
    }
}

/// Cheap front door to the runtime task.
#[derive(Clone)]
pub struct StudioHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    view_rx: watch::Receiver<StudioViewModel>,
    chain: Arc<StorageChain>,
}

impl StudioHandle {
    /// Restore the collection from `chain` and start the runtime on the
    /// current tokio runtime.
    pub async fn start(
        config: &EngineConfig,
        client: Arc<dyn OperationClient>,
        chain: Arc<StorageChain>,
    ) -> (Self, StudioEvents) {
        let restored = chain
            .load()
            .await
            .map(PersistedCollection::into_items)
            .unwrap_or_default();

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let failures = cmd_tx.clone();
        let persist = PersistHandle::spawn(chain.clone(), config.save_debounce, move |msg| {
            let _ = failures.send(Command::Dispatch(msg));
        });

        let state = AppState::new().with_notification_ticks(config.notification_ticks);
        let (view_tx, view_rx) = watch::channel(state.view());
        let mut runtime = Runtime {
            state,
            client,
            persist,
            cmd_tx: cmd_tx.clone(),
            event_tx,
            view_tx,
            waiters: HashMap::new(),
            purges: Vec::new(),
        };
        if !restored.is_empty() {
            studio_info!("Restoring {} items", restored.len());
            runtime.apply(Msg::CollectionRestored(restored));
        }
        tokio::spawn(runtime.run(cmd_rx));

        if !config.tick_interval.is_zero() {
            tokio::spawn(tick(cmd_tx.clone(), config.tick_interval));
        }

        (
            Self {
                cmd_tx,
                view_rx,
                chain,
            },
            StudioEvents { rx: event_rx },
        )
    }

    /// Fire and forget.
    pub fn dispatch(&self, msg: Msg) {
        let _ = self.cmd_tx.send(Command::Dispatch(msg));
    }

    /// Apply `msg` and return the state right after it.
    pub async fn apply(&self, msg: Msg) -> Result<AppState, RuntimeClosed> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Apply { msg, reply })
            .map_err(|_| RuntimeClosed)?;
        rx.await.map_err(|_| RuntimeClosed)
    }

    pub async fn snapshot(&self) -> Result<AppState, RuntimeClosed> {
        self.apply(Msg::NoOp).await
    }

    /// Add files to the collection; returns the new item ids.
    pub async fn ingest(&self, files: Vec<OriginalFile>) -> Result<Vec<ItemId>, RuntimeClosed> {
        let count = files.len();
        let state = self.apply(Msg::FilesIngested(files)).await?;
        let items = state.items();
        Ok(items[items.len().saturating_sub(count)..]
            .iter()
            .map(|item| item.id())
            .collect())
    }

    /// Submit `plan` for one item and wait until it settles.
    pub async fn run(&self, item_id: ItemId, plan: Plan) -> Result<RunOutcome, RuntimeClosed> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Run {
                item_id,
                plan,
                reply,
            })
            .map_err(|_| RuntimeClosed)?;
        rx.await.map_err(|_| RuntimeClosed)
    }

    /// Write every change applied so far.
    pub async fn flush(&self) -> Result<Option<SaveReport>, StorageError> {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Flush(reply)).is_err() {
            return Ok(None);
        }
        rx.await.unwrap_or(Ok(None))
    }

    pub async fn quota(&self) -> Quota {
        self.chain.quota().await
    }

    /// Latest view model; updated after every state change.
    pub fn subscribe(&self) -> watch::Receiver<StudioViewModel> {
        self.view_rx.clone()
    }

    /// Flush storage and stop the runtime. Plans still running are
    /// abandoned.
    pub async fn shutdown(self) {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown(reply)).is_ok() {
            let _ = rx.await;
        }
    }
}

struct Runtime {
    state: AppState,
    client: Arc<dyn OperationClient>,
    persist: PersistHandle,
    cmd_tx: mpsc::UnboundedSender<Command>,
    event_tx: mpsc::UnboundedSender<StudioEvent>,
    view_tx: watch::Sender<StudioViewModel>,
    waiters: HashMap<ItemId, Vec<oneshot::Sender<RunOutcome>>>,
    /// Storage purges and discards; shutdown waits for them.
    purges: Vec<JoinHandle<()>>,
}

impl Runtime {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = cmd_rx.recv().await {
            match command {
                Command::Dispatch(msg) => {
                    self.apply(msg);
                }
                Command::Apply { msg, reply } => {
                    self.apply(msg);
                    let _ = reply.send(self.state.clone());
                }
                Command::Run {
                    item_id,
                    plan,
                    reply,
                } => self.submit(item_id, plan, reply),
                Command::Flush(reply) => {
                    let pending = self.persist.flush();
                    tokio::spawn(async move {
                        let _ = reply.send(pending.await);
                    });
                }
                Command::Shutdown(reply) => {
                    if let Err(err) = self.persist.flush().await {
                        studio_warn!("Final save failed: {}", err);
                    }
                    for purge in self.purges.drain(..) {
                        let _ = purge.await;
                    }
                    let _ = reply.send(());
                    break;
                }
            }
        }
        studio_debug!("Studio runtime stopped");
    }

    /// Run `msg` through `update`, execute its effects and publish the view.
    fn apply(&mut self, msg: Msg) -> Vec<Effect> {
        let settled = match &msg {
            Msg::PlanSettled { item_id } => Some(*item_id),
            _ => None,
        };

        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;

        if let Some(item_id) = settled {
            self.settle_waiters(item_id);
        }
        for effect in &effects {
            self.execute(effect.clone());
        }

        let view = self.state.view();
        if self.state.consume_dirty() {
            self.view_tx.send_replace(view);
        }
        effects
    }

    fn submit(&mut self, item_id: ItemId, plan: Plan, reply: oneshot::Sender<RunOutcome>) {
        let known = self.state.item(item_id).is_some();
        let busy = self.state.is_in_flight(item_id);
        let empty = plan.is_empty();
        let effects = self.apply(Msg::RunRequested { item_id, plan });
        let accepted = effects
            .iter()
            .any(|effect| matches!(effect, Effect::ExecutePlan { item_id: id, .. } if *id == item_id));

        if accepted {
            self.waiters.entry(item_id).or_default().push(reply);
        } else if known && !busy && !empty {
            // Refused by parameter validation; the item now carries the error.
            let _ = reply.send(RunOutcome::Failed);
        } else {
            let _ = reply.send(RunOutcome::Rejected);
        }
    }

    fn settle_waiters(&mut self, item_id: ItemId) {
        let Some(waiters) = self.waiters.remove(&item_id) else {
            return;
        };
        let outcome = match self.state.item(item_id).map(|item| item.status()) {
            None => RunOutcome::Removed,
            Some(ItemStatus::Error { .. }) => RunOutcome::Failed,
            Some(_) => RunOutcome::Done,
        };
        for waiter in waiters {
            let _ = waiter.send(outcome);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::GenerateThumbnail { item_id, original } => {
                let tx = self.cmd_tx.clone();
                tokio::spawn(async move {
                    match generate_thumbnail(original).await {
                        Ok(thumbnail_url) => {
                            let _ = tx.send(Command::Dispatch(Msg::ThumbnailReady {
                                item_id,
                                thumbnail_url,
                            }));
                        }
                        Err(err) => studio_debug!("No thumbnail for item {}: {}", item_id, err),
                    }
                });
            }
            Effect::OpenInteraction { item_id, kind } => {
                let _ = self
                    .event_tx
                    .send(StudioEvent::InteractionRequested { item_id, kind });
            }
            Effect::ExecutePlan {
                item_id,
                plan,
                original,
                processed_url,
            } => {
                let client = self.client.clone();
                let sink = CommandSink {
                    tx: self.cmd_tx.clone(),
                };
                tokio::spawn(async move {
                    execute_plan(
                        client.as_ref(),
                        item_id,
                        plan,
                        original,
                        processed_url,
                        &sink,
                    )
                    .await;
                });
            }
            Effect::PersistCollection => self.persist.save(self.state.snapshot()),
            Effect::PurgeStorage { derived_outputs } => {
                let cleared = self.persist.clear();
                let client = self.client.clone();
                self.purges.retain(|purge| !purge.is_finished());
                self.purges.push(tokio::spawn(async move {
                    if let Err(err) = cleared.await {
                        studio_warn!("Clearing storage failed: {}", err);
                    }
                    if derived_outputs.is_empty() {
                        return;
                    }
                    if let Err(err) = client.discard(&derived_outputs).await {
                        studio_warn!(
                            "Discarding {} derived outputs failed: {}",
                            derived_outputs.len(),
                            err
                        );
                    }
                }));
            }
        }
    }
}

async fn tick(tx: mpsc::UnboundedSender<Command>, period: std::time::Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        if tx.send(Command::Dispatch(Msg::Tick)).is_err() {
            break;
        }
    }
}
