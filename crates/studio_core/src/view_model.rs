use crate::{ItemId, ItemStatus, OperationKind};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub error: usize,
}

impl StatusCounts {
    pub(crate) fn record(&mut self, status: &ItemStatus) {
        match status {
            ItemStatus::Pending => self.pending += 1,
            ItemStatus::Processing => self.processing += 1,
            ItemStatus::Done => self.done += 1,
            ItemStatus::Error { .. } => self.error += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationView {
    pub message: String,
    pub quota_exceeded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StudioViewModel {
    pub items: Vec<ItemRowView>,
    pub counts: StatusCounts,
    pub in_flight: usize,
    pub notification: Option<NotificationView>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRowView {
    pub item_id: ItemId,
    pub name: String,
    pub status: ItemStatus,
    pub has_thumbnail: bool,
    pub processed_url: Option<String>,
    pub steps: Vec<OperationKind>,
    pub history_len: usize,
    pub title: String,
    /// A plan is running; callers should not offer new operations.
    pub busy: bool,
}
