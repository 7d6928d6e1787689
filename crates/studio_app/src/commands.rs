use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use studio_core::{ItemId, ItemRowView, ItemStatus, MacroOperation, Msg, OperationParams, OriginalFile};
use studio_engine::{
    guess_mime, run_batch, run_macro_batch, BatchSummary, EngineConfig, OperationClient,
    ReqwestOperationClient, StudioHandle,
};
use studio_logging::{studio_info, studio_warn};

use crate::cli::{Command, Selection};

const THUMBNAIL_WAIT: Duration = Duration::from_secs(10);

/// Restore the collection, apply `command`, then flush storage.
pub async fn execute(config: &EngineConfig, command: Command) -> Result<()> {
    let client: Arc<dyn OperationClient> = Arc::new(
        ReqwestOperationClient::new(config.service.clone(), config.work_dir.clone())
            .context("building the service client")?,
    );
    let chain = Arc::new(config.storage_chain());
    let (handle, _events) = StudioHandle::start(config, client.clone(), chain).await;
    let outcome = apply(&handle, client.as_ref(), command).await;
    let flushed = handle.flush().await;
    handle.shutdown().await;

    outcome?;
    if let Some(report) = flushed.context("saving the collection")? {
        studio_info!(
            "Collection saved to {}{}",
            report.backend,
            if report.fell_back { " (fallback)" } else { "" }
        );
    }
    Ok(())
}

async fn apply(handle: &StudioHandle, client: &dyn OperationClient, command: Command) -> Result<()> {
    match command {
        Command::Ingest { files } => ingest(handle, &files).await,
        Command::Run {
            operation,
            selection,
            params,
        } => {
            let ids = select(handle, &selection).await?;
            let summary = run_batch(handle, operation, &ids, params.to_params()).await;
            report_batch(handle, &ids, summary).await
        }
        Command::PrintReady {
            selection,
            provider,
        } => {
            let ids = select(handle, &selection).await?;
            let params = OperationParams {
                provider,
                ..OperationParams::default()
            };
            let summary = run_macro_batch(handle, MacroOperation::PrintReady, &ids, params).await;
            report_batch(handle, &ids, summary).await
        }
        Command::Undo { id } => edit(handle, id, Msg::UndoRequested { item_id: id }).await,
        Command::Revert { id } => edit(handle, id, Msg::RevertRequested { item_id: id }).await,
        Command::Delete { id } => {
            require_item(handle, id).await?;
            handle.apply(Msg::DeleteRequested { item_id: id }).await?;
            println!("Deleted item {id}");
            Ok(())
        }
        Command::Set { id, field, value } => {
            let msg = Msg::MetadataEdited {
                item_id: id,
                field,
                value,
            };
            edit(handle, id, msg).await
        }
        Command::List => {
            let view = handle.snapshot().await?.view();
            if view.items.is_empty() {
                println!("No items");
            }
            for row in &view.items {
                println!("{}", format_row(row));
            }
            let counts = &view.counts;
            println!(
                "{} pending, {} processing, {} done, {} failed",
                counts.pending, counts.processing, counts.done, counts.error
            );
            Ok(())
        }
        Command::Quota => {
            let quota = handle.quota().await;
            println!(
                "{:.2} MB used, {:.2} MB available{}",
                quota.used_mb(),
                quota.available_mb(),
                if quota.estimated { " (estimated)" } else { "" }
            );
            Ok(())
        }
        Command::Clear => {
            let removed = handle.snapshot().await?.items().len();
            handle.apply(Msg::ClearAllRequested).await?;
            println!("Removed {removed} items");
            Ok(())
        }
        Command::Health => health(client).await,
    }
}

async fn ingest(handle: &StudioHandle, paths: &[impl AsRef<Path>]) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime = guess_mime(&name);
        files.push(OriginalFile::new(name, mime, bytes));
    }

    let ids = handle.ingest(files).await?;
    await_thumbnails(handle, &ids).await;

    let state = handle.snapshot().await?;
    for id in &ids {
        if let Some(item) = state.item(*id) {
            println!("Added item {}: {}", id, item.original().name);
        }
    }
    Ok(())
}

/// Thumbnails are generated in the background; wait so they get saved.
async fn await_thumbnails(handle: &StudioHandle, ids: &[ItemId]) {
    let mut views = handle.subscribe();
    let wait = async {
        loop {
            let ready = {
                let view = views.borrow_and_update();
                ids.iter().all(|id| {
                    view.items
                        .iter()
                        .any(|row| row.item_id == *id && row.has_thumbnail)
                })
            };
            if ready || views.changed().await.is_err() {
                break;
            }
        }
    };
    if tokio::time::timeout(THUMBNAIL_WAIT, wait).await.is_err() {
        studio_warn!("Some thumbnails were not ready after {:?}", THUMBNAIL_WAIT);
    }
}

async fn select(handle: &StudioHandle, selection: &Selection) -> Result<Vec<ItemId>> {
    if selection.all {
        let state = handle.snapshot().await?;
        return Ok(state.items().iter().map(|item| item.id()).collect());
    }
    Ok(selection.ids.clone())
}

async fn require_item(handle: &StudioHandle, id: ItemId) -> Result<()> {
    if handle.snapshot().await?.item(id).is_none() {
        bail!("no item with id {id}");
    }
    Ok(())
}

async fn edit(handle: &StudioHandle, id: ItemId, msg: Msg) -> Result<()> {
    require_item(handle, id).await?;
    let view = handle.apply(msg).await?.view();
    if let Some(row) = view.items.iter().find(|row| row.item_id == id) {
        println!("{}", format_row(row));
    }
    Ok(())
}

async fn report_batch(handle: &StudioHandle, ids: &[ItemId], summary: BatchSummary) -> Result<()> {
    let view = handle.snapshot().await?.view();
    for row in view.items.iter().filter(|row| ids.contains(&row.item_id)) {
        println!("{}", format_row(row));
    }
    println!(
        "{} done, {} failed, {} rejected",
        summary.done, summary.failed, summary.rejected
    );
    let unfinished = summary.failed + summary.rejected;
    if unfinished > 0 {
        bail!("{unfinished} of {} items did not complete", ids.len());
    }
    Ok(())
}

async fn health(client: &dyn OperationClient) -> Result<()> {
    let status = client.health().await.context("service health probe")?;
    match status.service {
        Some(service) => println!("{} ({service})", status.status),
        None => println!("{}", status.status),
    }
    Ok(())
}

fn format_row(row: &ItemRowView) -> String {
    let status = match &row.status {
        ItemStatus::Error { message } => format!("error: {message}"),
        other => other.as_str().to_string(),
    };
    let steps: Vec<&str> = row.steps.iter().map(|kind| kind.as_str()).collect();
    format!(
        "{:>4}  {:<24} {}  steps=[{}] history={}{}",
        row.item_id,
        row.name,
        status,
        steps.join(","),
        row.history_len,
        row.processed_url
            .as_deref()
            .map(|url| format!("  -> {url}"))
            .unwrap_or_default()
    )
}
