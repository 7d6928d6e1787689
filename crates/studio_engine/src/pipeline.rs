//! Runs one plan for one item against the remote client.
use bytes::Bytes;
use studio_core::{
    resolve_source, ItemId, Msg, OperationKind, OriginalFile, Plan, ResolvedSource, StepOutput,
};
use studio_logging::{studio_debug, studio_info, studio_warn};

use crate::{OperationClient, OperationError, OperationJob, OperationOutput, SourceBytes};

/// Receives the state-machine messages a running plan produces.
pub trait MsgSink: Send + Sync {
    fn emit(&self, msg: Msg);
}

pub struct ChannelMsgSink {
    tx: tokio::sync::mpsc::UnboundedSender<Msg>,
}

impl ChannelMsgSink {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<Msg>) -> Self {
        Self { tx }
    }
}

impl MsgSink for ChannelMsgSink {
    fn emit(&self, msg: Msg) {
        let _ = self.tx.send(msg);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanOutcome {
    pub completed: Vec<OperationKind>,
    pub failed: Option<(OperationKind, String)>,
}

/// Execute `plan` step by step. The first failing step ends the plan;
/// `PlanSettled` is always the last message emitted.
///
/// Each step after the first sees the raw bytes the previous step returned
/// when it asks for [`studio_core::SourceChoice::PreviousOutput`].
pub async fn execute_plan(
    client: &dyn OperationClient,
    item_id: ItemId,
    plan: Plan,
    original: OriginalFile,
    processed_url: Option<String>,
    sink: &dyn MsgSink,
) -> PlanOutcome {
    let mut outcome = PlanOutcome::default();
    let mut processed_url = processed_url;
    let mut previous: Option<(String, Bytes)> = None;

    for step in plan.steps() {
        let kind = step.kind;
        sink.emit(Msg::StepStarted { item_id, kind });

        let resolved = resolve_source(
            kind,
            &step.source,
            &original,
            processed_url.as_deref(),
            previous.as_ref().map(|(name, bytes)| (name.as_str(), bytes)),
        );
        let result = match materialize(client, resolved).await {
            Ok(source) => {
                let job = OperationJob {
                    item_id,
                    kind,
                    params: step.params.clone(),
                    source,
                };
                client.invoke(job).await
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(OperationOutput::Image { url, .. }) if url.is_empty() => {
                let message = format!("{kind} returned no output");
                fail(sink, &mut outcome, item_id, kind, message);
                break;
            }
            Ok(OperationOutput::Image {
                url,
                filename,
                bytes,
            }) => {
                studio_debug!("Item {} step {} produced {}", item_id, kind, url);
                previous = match bytes {
                    Some(bytes) => {
                        let name = filename.unwrap_or_else(|| format!("{kind}-{}", original.name));
                        Some((name, bytes))
                    }
                    None => fetch_previous(client, &url).await,
                };
                processed_url = Some(url.clone());
                sink.emit(Msg::StepSucceeded {
                    item_id,
                    kind,
                    output: StepOutput::Image { url },
                });
                outcome.completed.push(kind);
            }
            Ok(OperationOutput::Metadata(patch)) => {
                sink.emit(Msg::StepSucceeded {
                    item_id,
                    kind,
                    output: StepOutput::Metadata(patch),
                });
                outcome.completed.push(kind);
            }
            Err(err) => {
                fail(sink, &mut outcome, item_id, kind, err.to_string());
                break;
            }
        }
    }

    match &outcome.failed {
        Some((kind, message)) => {
            studio_warn!("Item {} plan stopped at {}: {}", item_id, kind, message)
        }
        None => studio_info!(
            "Item {} plan finished ({} steps)",
            item_id,
            outcome.completed.len()
        ),
    }
    sink.emit(Msg::PlanSettled { item_id });
    outcome
}

fn fail(
    sink: &dyn MsgSink,
    outcome: &mut PlanOutcome,
    item_id: ItemId,
    kind: OperationKind,
    message: String,
) {
    sink.emit(Msg::StepFailed {
        item_id,
        kind,
        message: message.clone(),
    });
    outcome.failed = Some((kind, message));
}

/// Output that came back by reference only; fetch it so the next step can
/// still chain on bytes. A failed fetch leaves the next step to fall back on
/// the processed URL.
async fn fetch_previous(client: &dyn OperationClient, url: &str) -> Option<(String, Bytes)> {
    match client.fetch_source(url).await {
        Ok(bytes) => Some((file_name_of(url), bytes)),
        Err(err) => {
            studio_debug!("Could not fetch {} for chaining: {}", url, err);
            None
        }
    }
}

async fn materialize(
    client: &dyn OperationClient,
    source: ResolvedSource,
) -> Result<SourceBytes, OperationError> {
    match source {
        ResolvedSource::Original(original) => Ok(SourceBytes {
            name: original.name,
            mime: original.mime,
            bytes: original.bytes,
        }),
        ResolvedSource::Processed(url) => {
            let bytes = client.fetch_source(&url).await?;
            let name = file_name_of(&url);
            Ok(SourceBytes {
                mime: guess_mime(&name).to_string(),
                name,
                bytes,
            })
        }
        ResolvedSource::Bytes { name, bytes } => Ok(SourceBytes {
            mime: guess_mime(&name).to_string(),
            name,
            bytes,
        }),
    }
}

fn file_name_of(reference: &str) -> String {
    let trimmed = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference)
        .trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("image.png")
        .to_string()
}

/// Mime type for a file name, by extension.
pub fn guess_mime(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}
