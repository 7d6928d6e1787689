use crate::{
    ItemId, MetadataField, OperationKind, OperationParams, OriginalFile, Plan, StepOutput,
    TrackedItem,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User uploaded or dropped files.
    FilesIngested(Vec<OriginalFile>),
    /// Replace the collection with items loaded from storage.
    CollectionRestored(Vec<TrackedItem>),
    /// Thumbnail generator finished for an item.
    ThumbnailReady {
        item_id: ItemId,
        thumbnail_url: String,
    },
    /// User picked an operation for an item. Interactive operations first
    /// ask for their input.
    OperationInvoked { item_id: ItemId, kind: OperationKind },
    /// Input collection for an interactive operation finished.
    InteractionCompleted {
        item_id: ItemId,
        kind: OperationKind,
        params: OperationParams,
    },
    /// User dismissed an input collection step.
    InteractionCancelled { item_id: ItemId, kind: OperationKind },
    /// Run a plan against one item.
    RunRequested { item_id: ItemId, plan: Plan },
    /// Engine began executing a plan step.
    StepStarted { item_id: ItemId, kind: OperationKind },
    /// Engine completed a plan step.
    StepSucceeded {
        item_id: ItemId,
        kind: OperationKind,
        output: StepOutput,
    },
    /// Engine failed a plan step; the rest of the plan is skipped.
    StepFailed {
        item_id: ItemId,
        kind: OperationKind,
        message: String,
    },
    /// Every step of a plan has run or been skipped.
    PlanSettled { item_id: ItemId },
    /// User edited a listing field.
    MetadataEdited {
        item_id: ItemId,
        field: MetadataField,
        value: String,
    },
    UndoRequested { item_id: ItemId },
    RevertRequested { item_id: ItemId },
    DeleteRequested { item_id: ItemId },
    /// Drop every item, the stored collection and server-side outputs.
    ClearAllRequested,
    /// Persisting the collection failed on every backend.
    StorageFailed {
        message: String,
        quota_exceeded: bool,
    },
    NotificationDismissed,
    /// Periodic tick; ages the transient notification.
    Tick,
    /// Fallback for placeholder wiring.
    NoOp,
}
