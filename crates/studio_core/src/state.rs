use std::collections::BTreeSet;

use studio_logging::studio_warn;

use crate::view_model::{ItemRowView, NotificationView, StatusCounts, StudioViewModel};
use crate::{ItemId, ItemStatus, OriginalFile, TrackedItem};

/// Ticks a storage notification stays visible unless configured otherwise.
pub const DEFAULT_NOTIFICATION_TICKS: u32 = 40;

const INTERRUPTED_MESSAGE: &str = "interrupted before completion";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub quota_exceeded: bool,
    pub ticks_left: u32,
}

/// Owned in-memory store of every tracked item.
///
/// Only [`crate::update`] mutates it; readers get clones or view models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    items: Vec<TrackedItem>,
    next_id: ItemId,
    in_flight: BTreeSet<ItemId>,
    notification: Option<Notification>,
    notification_ticks: u32,
    dirty: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
            in_flight: BTreeSet::new(),
            notification: None,
            notification_ticks: DEFAULT_NOTIFICATION_TICKS,
            dirty: false,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notification_ticks(mut self, ticks: u32) -> Self {
        self.notification_ticks = ticks.max(1);
        self
    }

    pub fn items(&self) -> &[TrackedItem] {
        &self.items
    }

    pub fn item(&self, item_id: ItemId) -> Option<&TrackedItem> {
        self.items.iter().find(|item| item.id() == item_id)
    }

    pub fn is_in_flight(&self, item_id: ItemId) -> bool {
        self.in_flight.contains(&item_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    /// Clone of the collection suitable for persisting.
    pub fn snapshot(&self) -> Vec<TrackedItem> {
        self.items.clone()
    }

    pub fn view(&self) -> StudioViewModel {
        let mut counts = StatusCounts::default();
        let items = self
            .items
            .iter()
            .map(|item| {
                counts.record(item.status());
                ItemRowView {
                    item_id: item.id(),
                    name: item.original().name.clone(),
                    status: item.status().clone(),
                    has_thumbnail: item.thumbnail_url().is_some(),
                    processed_url: item.processed_url().map(str::to_owned),
                    steps: item.processing_steps().iter().collect(),
                    history_len: item.history().len(),
                    title: item.metadata().title.clone(),
                    busy: self.in_flight.contains(&item.id()),
                }
            })
            .collect();
        StudioViewModel {
            items,
            counts,
            in_flight: self.in_flight.len(),
            notification: self.notification.as_ref().map(|n| NotificationView {
                message: n.message.clone(),
                quota_exceeded: n.quota_exceeded,
            }),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn ingest(&mut self, files: Vec<OriginalFile>) -> Vec<(ItemId, OriginalFile)> {
        let mut created = Vec::with_capacity(files.len());
        for original in files {
            let item_id = self.next_id;
            self.next_id += 1;
            created.push((item_id, original.clone()));
            self.items.push(TrackedItem::new(item_id, original));
        }
        created
    }

    /// Replace the collection. Duplicate ids keep their first occurrence and
    /// items persisted mid-operation come back as failed.
    pub(crate) fn restore(&mut self, items: Vec<TrackedItem>) {
        let mut seen = BTreeSet::new();
        let mut restored = Vec::with_capacity(items.len());
        for mut item in items {
            if !seen.insert(item.id()) {
                studio_warn!("Dropping duplicate item id {} during restore", item.id());
                continue;
            }
            if *item.status() == ItemStatus::Processing {
                item.apply_failure(INTERRUPTED_MESSAGE);
            }
            restored.push(item);
        }
        self.next_id = restored.iter().map(TrackedItem::id).max().unwrap_or(0) + 1;
        self.items = restored;
        self.in_flight.clear();
    }

    /// Apply `change` to a copy of the item and swap the copy in.
    pub(crate) fn replace_item(
        &mut self,
        item_id: ItemId,
        change: impl FnOnce(&mut TrackedItem),
    ) -> bool {
        let Some(slot) = self.items.iter_mut().find(|item| item.id() == item_id) else {
            return false;
        };
        let mut next = slot.clone();
        change(&mut next);
        *slot = next;
        true
    }

    pub(crate) fn remove_item(&mut self, item_id: ItemId) -> Option<TrackedItem> {
        let index = self.items.iter().position(|item| item.id() == item_id)?;
        Some(self.items.remove(index))
    }

    pub(crate) fn take_all(&mut self) -> Vec<TrackedItem> {
        std::mem::take(&mut self.items)
    }

    pub(crate) fn acquire_lease(&mut self, item_id: ItemId) -> bool {
        self.in_flight.insert(item_id)
    }

    pub(crate) fn release_lease(&mut self, item_id: ItemId) -> bool {
        self.in_flight.remove(&item_id)
    }

    pub(crate) fn notify(&mut self, message: String, quota_exceeded: bool) {
        self.notification = Some(Notification {
            message,
            quota_exceeded,
            ticks_left: self.notification_ticks,
        });
    }

    pub(crate) fn dismiss_notification(&mut self) -> bool {
        self.notification.take().is_some()
    }

    /// Age the notification by one tick; true when it expired.
    pub(crate) fn tick_notification(&mut self) -> bool {
        match self.notification.as_mut() {
            Some(notification) if notification.ticks_left > 1 => {
                notification.ticks_left -= 1;
                false
            }
            Some(_) => {
                self.notification = None;
                true
            }
            None => false,
        }
    }
}
