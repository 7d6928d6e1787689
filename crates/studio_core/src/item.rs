use std::collections::BTreeSet;
use std::fmt;

use bytes::Bytes;

use crate::OperationKind;

pub type ItemId = u64;

const GENERIC_FAILURE: &str = "operation failed";

/// Raw input image as supplied by the user. Never mutated after ingestion.
#[derive(Clone, PartialEq, Eq)]
pub struct OriginalFile {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl OriginalFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for OriginalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginalFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ItemStatus {
    #[default]
    Pending,
    Processing,
    Done,
    Error {
        message: String,
    },
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Done => "done",
            ItemStatus::Error { .. } => "error",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ItemStatus::Error { message } => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataField {
    Brand,
    Title,
    Bullet1,
    Bullet2,
    Description,
    Keywords,
}

impl MetadataField {
    pub const ALL: [MetadataField; 6] = [
        MetadataField::Brand,
        MetadataField::Title,
        MetadataField::Bullet1,
        MetadataField::Bullet2,
        MetadataField::Description,
        MetadataField::Keywords,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetadataField::Brand => "brand",
            MetadataField::Title => "title",
            MetadataField::Bullet1 => "bullet1",
            MetadataField::Bullet2 => "bullet2",
            MetadataField::Description => "description",
            MetadataField::Keywords => "keywords",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

/// Listing text attached to an item. Editable regardless of processing status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub brand: String,
    pub title: String,
    pub bullet1: String,
    pub bullet2: String,
    pub description: String,
    pub keywords: String,
}

impl Metadata {
    pub fn get(&self, field: MetadataField) -> &str {
        match field {
            MetadataField::Brand => &self.brand,
            MetadataField::Title => &self.title,
            MetadataField::Bullet1 => &self.bullet1,
            MetadataField::Bullet2 => &self.bullet2,
            MetadataField::Description => &self.description,
            MetadataField::Keywords => &self.keywords,
        }
    }

    pub fn set(&mut self, field: MetadataField, value: impl Into<String>) {
        let slot = match field {
            MetadataField::Brand => &mut self.brand,
            MetadataField::Title => &mut self.title,
            MetadataField::Bullet1 => &mut self.bullet1,
            MetadataField::Bullet2 => &mut self.bullet2,
            MetadataField::Description => &mut self.description,
            MetadataField::Keywords => &mut self.keywords,
        };
        *slot = value.into();
    }
}

/// Generated metadata: either a full listing or one requested field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataPatch {
    Full(Metadata),
    Field { field: MetadataField, value: String },
}

/// Flags for every operation that has succeeded on the current lineage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessingSteps(BTreeSet<OperationKind>);

impl ProcessingSteps {
    pub fn contains(&self, kind: OperationKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = OperationKind> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn insert(&mut self, kind: OperationKind) {
        self.0.insert(kind);
    }

    pub(crate) fn remove(&mut self, kind: OperationKind) {
        self.0.remove(&kind);
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<OperationKind> for ProcessingSteps {
    fn from_iter<T: IntoIterator<Item = OperationKind>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Operation label recorded with a history entry.
///
/// Labels restored from storage may no longer name a known operation; they
/// are kept verbatim so a save/load cycle does not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepLabel {
    Known(OperationKind),
    Unrecognized(String),
}

impl StepLabel {
    pub fn parse(label: &str) -> Self {
        match label.parse::<OperationKind>() {
            Ok(kind) => StepLabel::Known(kind),
            Err(_) => StepLabel::Unrecognized(label.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StepLabel::Known(kind) => kind.as_str(),
            StepLabel::Unrecognized(label) => label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Processed output that was current before the step ran.
    pub prior: Option<String>,
    pub step: StepLabel,
}

/// One uploaded image and its processing lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedItem {
    id: ItemId,
    original: OriginalFile,
    thumbnail_url: Option<String>,
    processed_url: Option<String>,
    status: ItemStatus,
    metadata: Metadata,
    processing_steps: ProcessingSteps,
    history: Vec<HistoryEntry>,
}

impl TrackedItem {
    pub fn new(id: ItemId, original: OriginalFile) -> Self {
        Self {
            id,
            original,
            thumbnail_url: None,
            processed_url: None,
            status: ItemStatus::Pending,
            metadata: Metadata::default(),
            processing_steps: ProcessingSteps::default(),
            history: Vec::new(),
        }
    }

    /// Rebuild an item from persisted parts.
    ///
    /// An empty `processed_url` or `prior` is normalized to `None`, and an
    /// `Error` status without a message gets a generic one.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: ItemId,
        original: OriginalFile,
        thumbnail_url: Option<String>,
        processed_url: Option<String>,
        status: ItemStatus,
        metadata: Metadata,
        processing_steps: ProcessingSteps,
        history: Vec<HistoryEntry>,
    ) -> Self {
        let status = match status {
            ItemStatus::Error { message } => ItemStatus::Error {
                message: non_empty_message(message),
            },
            other => other,
        };
        Self {
            id,
            original,
            thumbnail_url: thumbnail_url.filter(|url| !url.is_empty()),
            processed_url: processed_url.filter(|url| !url.is_empty()),
            status,
            metadata,
            processing_steps,
            history: history
                .into_iter()
                .map(|entry| HistoryEntry {
                    prior: entry.prior.filter(|url| !url.is_empty()),
                    step: entry.step,
                })
                .collect(),
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn original(&self) -> &OriginalFile {
        &self.original
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }

    pub fn processed_url(&self) -> Option<&str> {
        self.processed_url.as_deref()
    }

    pub fn status(&self) -> &ItemStatus {
        &self.status
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn processing_steps(&self) -> &ProcessingSteps {
        &self.processing_steps
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Every processed output this item references, current one included.
    pub fn derived_outputs(&self) -> Vec<String> {
        self.history
            .iter()
            .filter_map(|entry| entry.prior.clone())
            .chain(self.processed_url.clone())
            .collect()
    }

    pub fn set_thumbnail_url(&mut self, url: String) {
        self.thumbnail_url = Some(url).filter(|url| !url.is_empty());
    }

    pub fn begin_processing(&mut self) {
        self.status = ItemStatus::Processing;
    }

    pub fn apply_image_success(&mut self, kind: OperationKind, output_url: String) {
        let prior = self.processed_url.replace(output_url);
        self.history.push(HistoryEntry {
            prior,
            step: StepLabel::Known(kind),
        });
        self.processing_steps.insert(kind);
        self.status = ItemStatus::Done;
    }

    pub fn apply_metadata_success(&mut self, kind: OperationKind, patch: MetadataPatch) {
        match patch {
            MetadataPatch::Full(metadata) => self.metadata = metadata,
            MetadataPatch::Field { field, value } => self.metadata.set(field, value),
        }
        self.processing_steps.insert(kind);
        self.status = ItemStatus::Done;
    }

    pub fn apply_failure(&mut self, message: impl Into<String>) {
        self.status = ItemStatus::Error {
            message: non_empty_message(message.into()),
        };
    }

    /// Step back one entry in the history stack.
    pub fn undo(&mut self) {
        match self.history.pop() {
            None => {
                self.processed_url = None;
                self.status = ItemStatus::Pending;
            }
            Some(entry) => {
                self.status = if entry.prior.is_some() {
                    ItemStatus::Done
                } else {
                    ItemStatus::Pending
                };
                self.processed_url = entry.prior;
                if let StepLabel::Known(kind) = entry.step {
                    self.processing_steps.remove(kind);
                }
            }
        }
    }

    /// Drop every processing result. Cannot be undone.
    pub fn revert(&mut self) {
        self.processed_url = None;
        self.processing_steps.clear();
        self.history.clear();
        self.status = ItemStatus::Pending;
    }

    pub fn set_metadata_field(&mut self, field: MetadataField, value: impl Into<String>) {
        self.metadata.set(field, value);
    }
}

fn non_empty_message(message: String) -> String {
    if message.trim().is_empty() {
        GENERIC_FAILURE.to_string()
    } else {
        message
    }
}
