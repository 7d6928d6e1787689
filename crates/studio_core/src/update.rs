use studio_logging::{studio_debug, studio_info, studio_warn};

use crate::{AppState, Effect, ItemId, Msg, OperationParams, Plan, StepOutput, TrackedItem};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::FilesIngested(files) => {
            if files.is_empty() {
                return (state, Vec::new());
            }
            let created = state.ingest(files);
            state.mark_dirty();
            let mut effects: Vec<Effect> = created
                .into_iter()
                .map(|(item_id, original)| Effect::GenerateThumbnail { item_id, original })
                .collect();
            effects.push(Effect::PersistCollection);
            effects
        }
        Msg::CollectionRestored(items) => {
            state.restore(items);
            state.mark_dirty();
            // Backfill previews for anything restored without one.
            state
                .items()
                .iter()
                .filter(|item| item.thumbnail_url().is_none())
                .map(|item| Effect::GenerateThumbnail {
                    item_id: item.id(),
                    original: item.original().clone(),
                })
                .collect()
        }
        Msg::ThumbnailReady {
            item_id,
            thumbnail_url,
        } => {
            if state.replace_item(item_id, |item| item.set_thumbnail_url(thumbnail_url)) {
                state.mark_dirty();
                vec![Effect::PersistCollection]
            } else {
                Vec::new()
            }
        }
        Msg::OperationInvoked { item_id, kind } => {
            if state.item(item_id).is_none() {
                studio_warn!("Operation {} invoked for unknown item {}", kind, item_id);
                Vec::new()
            } else if kind.is_interactive() {
                vec![Effect::OpenInteraction { item_id, kind }]
            } else {
                request_run(
                    &mut state,
                    item_id,
                    Plan::single(kind, OperationParams::default()),
                )
            }
        }
        Msg::InteractionCompleted {
            item_id,
            kind,
            params,
        } => request_run(&mut state, item_id, Plan::single(kind, params)),
        Msg::InteractionCancelled { item_id, kind } => {
            studio_debug!("Input for {} on item {} was cancelled", kind, item_id);
            Vec::new()
        }
        Msg::RunRequested { item_id, plan } => request_run(&mut state, item_id, plan),
        Msg::StepStarted { item_id, kind } => {
            studio_debug!("Item {} started {}", item_id, kind);
            if state.replace_item(item_id, TrackedItem::begin_processing) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::StepSucceeded {
            item_id,
            kind,
            output,
        } => {
            let applied = state.replace_item(item_id, |item| match output {
                StepOutput::Image { url } if url.is_empty() => {
                    item.apply_failure(format!("{kind} returned no output"));
                }
                StepOutput::Image { url } => item.apply_image_success(kind, url),
                StepOutput::Metadata(patch) => item.apply_metadata_success(kind, patch),
            });
            if applied {
                state.mark_dirty();
                vec![Effect::PersistCollection]
            } else {
                studio_debug!("Dropping {} result for removed item {}", kind, item_id);
                Vec::new()
            }
        }
        Msg::StepFailed {
            item_id,
            kind,
            message,
        } => {
            studio_info!("Item {} failed {}: {}", item_id, kind, message);
            if state.replace_item(item_id, |item| item.apply_failure(message)) {
                state.mark_dirty();
                vec![Effect::PersistCollection]
            } else {
                Vec::new()
            }
        }
        Msg::PlanSettled { item_id } => {
            if state.release_lease(item_id) {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::MetadataEdited {
            item_id,
            field,
            value,
        } => {
            if state.replace_item(item_id, |item| item.set_metadata_field(field, value)) {
                state.mark_dirty();
                vec![Effect::PersistCollection]
            } else {
                Vec::new()
            }
        }
        Msg::UndoRequested { item_id } => {
            history_edit(&mut state, item_id, "undo", TrackedItem::undo)
        }
        Msg::RevertRequested { item_id } => {
            history_edit(&mut state, item_id, "revert", TrackedItem::revert)
        }
        Msg::DeleteRequested { item_id } => match state.remove_item(item_id) {
            Some(_) => {
                state.mark_dirty();
                vec![Effect::PersistCollection]
            }
            None => Vec::new(),
        },
        Msg::ClearAllRequested => {
            let removed = state.take_all();
            let derived_outputs = removed
                .iter()
                .flat_map(TrackedItem::derived_outputs)
                .collect();
            state.mark_dirty();
            vec![Effect::PurgeStorage { derived_outputs }]
        }
        Msg::StorageFailed {
            message,
            quota_exceeded,
        } => {
            state.notify(message, quota_exceeded);
            state.mark_dirty();
            Vec::new()
        }
        Msg::NotificationDismissed => {
            if state.dismiss_notification() {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::Tick => {
            if state.tick_notification() {
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

/// Accept a plan unless the item is unknown, already running one, or the
/// plan's parameters are incomplete.
fn request_run(state: &mut AppState, item_id: ItemId, plan: Plan) -> Vec<Effect> {
    let Some(item) = state.item(item_id) else {
        studio_warn!("Run requested for unknown item {}", item_id);
        return Vec::new();
    };
    let Some(first) = plan.first_kind() else {
        return Vec::new();
    };
    if state.is_in_flight(item_id) {
        studio_warn!(
            "Item {} already has an operation in flight; ignoring {}",
            item_id,
            first
        );
        return Vec::new();
    }
    if let Err(err) = plan.validate() {
        studio_info!("Rejecting {} for item {}: {}", first, item_id, err);
        state.replace_item(item_id, |item| item.apply_failure(err.to_string()));
        state.mark_dirty();
        return vec![Effect::PersistCollection];
    }

    let original = item.original().clone();
    let processed_url = item.processed_url().map(str::to_owned);
    state.acquire_lease(item_id);
    state.replace_item(item_id, TrackedItem::begin_processing);
    state.mark_dirty();
    vec![Effect::ExecutePlan {
        item_id,
        plan,
        original,
        processed_url,
    }]
}

fn history_edit(
    state: &mut AppState,
    item_id: ItemId,
    action: &str,
    edit: fn(&mut TrackedItem),
) -> Vec<Effect> {
    if state.is_in_flight(item_id) {
        studio_warn!("Ignoring {} on item {} while it is processing", action, item_id);
        return Vec::new();
    }
    if state.replace_item(item_id, edit) {
        state.mark_dirty();
        vec![Effect::PersistCollection]
    } else {
        Vec::new()
    }
}
