//! Studio engine: remote operations, storage and effect execution.
mod batch;
mod client;
mod config;
mod persist;
mod pipeline;
mod runtime;
mod saver;
pub mod storage;
mod thumbnail;
mod types;

pub use batch::{run_batch, run_macro_batch, BatchSummary};
pub use client::{
    OperationClient, ReqwestOperationClient, ServiceSettings, RESULT_FILENAME_HEADER,
    RESULT_URL_HEADER,
};
pub use config::{
    ConfigError, EngineConfig, ENV_REQUEST_TIMEOUT_SECS, ENV_SERVICE_URL, ENV_STATE_DIR,
};
pub use persist::{ensure_state_dir, AtomicFileWriter, PersistError};
pub use pipeline::{execute_plan, guess_mime, ChannelMsgSink, MsgSink, PlanOutcome};
pub use runtime::{RunOutcome, RuntimeClosed, StudioEvent, StudioEvents, StudioHandle};
pub use saver::{PersistHandle, DEFAULT_SAVE_DEBOUNCE};
pub use storage::{Quota, SaveReport, StorageBackend, StorageChain, StorageError};
pub use thumbnail::{bounded_size, generate_thumbnail, render_thumbnail, ThumbnailError, THUMBNAIL_EDGE};
pub use types::{
    FailureKind, HealthStatus, OperationError, OperationJob, OperationOutput, SourceBytes,
};
