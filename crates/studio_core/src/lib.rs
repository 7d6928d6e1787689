//! Studio core: pure per-item state machine, operation registry and
//! view-model helpers. No I/O happens here; side effects are returned as
//! [`Effect`]s for the engine to execute.
mod effect;
mod item;
mod msg;
mod plan;
mod registry;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use item::{
    HistoryEntry, ItemId, ItemStatus, Metadata, MetadataField, MetadataPatch, OriginalFile,
    ProcessingSteps, StepLabel, TrackedItem,
};
pub use msg::Msg;
pub use plan::{MacroOperation, Plan, PlanStep, StepOutput};
pub use registry::{
    resolve_source, ColorSelection, Interaction, OperationKind, OperationParams, OperationSpec,
    ParamsError, RequestEncoding, ResolvedSource, ResponseKind, Rgb, SourceChoice, SourcePolicy,
    UnknownOperation, DEFAULT_SCALE_FACTOR, MAX_UPSCALE_FACTOR,
};
pub use state::{AppState, Notification, DEFAULT_NOTIFICATION_TICKS};
pub use update::update;
pub use view_model::{ItemRowView, NotificationView, StatusCounts, StudioViewModel};
