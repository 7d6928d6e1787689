//! On-disk shape of the collection.
//!
//! History is stored as two index-aligned arrays (`history`, `historySteps`)
//! so existing saves stay readable; in memory it is one stack of pairs.
use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use studio_core::{
    HistoryEntry, ItemStatus, Metadata, OperationKind, OriginalFile, ProcessingSteps, StepLabel,
    TrackedItem,
};
use studio_logging::studio_warn;

pub const SCHEMA_VERSION: u32 = 1;

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCollection {
    #[serde(default = "schema_version")]
    pub version: u32,
    pub items: Vec<PersistedItem>,
}

impl Default for PersistedCollection {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedOriginal {
    pub name: String,
    pub mime: String,
    /// Base64 (standard alphabet) file content.
    pub bytes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedMetadata {
    pub brand: String,
    pub title: String,
    pub bullet1: String,
    pub bullet2: String,
    pub description: String,
    pub keywords: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedItem {
    pub id: u64,
    pub original_file: PersistedOriginal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_url: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: PersistedMetadata,
    #[serde(default)]
    pub processing_steps: BTreeMap<String, bool>,
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub history_steps: Vec<String>,
}

impl PersistedCollection {
    pub fn from_items(items: &[TrackedItem]) -> Self {
        Self {
            version: SCHEMA_VERSION,
            items: items.iter().map(PersistedItem::from_item).collect(),
        }
    }

    /// Rebuild tracked items. Records that cannot be decoded are skipped.
    pub fn into_items(self) -> Vec<TrackedItem> {
        self.items
            .into_iter()
            .filter_map(PersistedItem::into_item)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl PersistedItem {
    pub fn from_item(item: &TrackedItem) -> Self {
        let original = item.original();
        let processing_steps = OperationKind::ALL
            .into_iter()
            .map(|kind| {
                (
                    kind.as_str().to_string(),
                    item.processing_steps().contains(kind),
                )
            })
            .collect();
        let (history, history_steps) = item
            .history()
            .iter()
            .map(|entry| {
                (
                    entry.prior.clone().unwrap_or_default(),
                    entry.step.as_str().to_string(),
                )
            })
            .unzip();
        let metadata = item.metadata();
        Self {
            id: item.id(),
            original_file: PersistedOriginal {
                name: original.name.clone(),
                mime: original.mime.clone(),
                bytes: general_purpose::STANDARD.encode(&original.bytes),
            },
            thumbnail_url: item.thumbnail_url().map(str::to_owned),
            processed_url: item.processed_url().map(str::to_owned),
            status: item.status().as_str().to_string(),
            error: item.status().error_message().map(str::to_owned),
            metadata: PersistedMetadata {
                brand: metadata.brand.clone(),
                title: metadata.title.clone(),
                bullet1: metadata.bullet1.clone(),
                bullet2: metadata.bullet2.clone(),
                description: metadata.description.clone(),
                keywords: metadata.keywords.clone(),
            },
            processing_steps,
            history,
            history_steps,
        }
    }

    pub fn into_item(self) -> Option<TrackedItem> {
        let bytes = match general_purpose::STANDARD.decode(self.original_file.bytes.as_bytes()) {
            Ok(bytes) => bytes,
            Err(err) => {
                studio_warn!("Skipping stored item {}: undecodable original: {}", self.id, err);
                return None;
            }
        };
        let original = OriginalFile::new(self.original_file.name, self.original_file.mime, bytes);

        let status = match self.status.as_str() {
            "pending" => ItemStatus::Pending,
            "processing" => ItemStatus::Processing,
            "done" => ItemStatus::Done,
            "error" => ItemStatus::Error {
                message: self.error.unwrap_or_default(),
            },
            other => {
                studio_warn!("Stored item {} has unknown status {:?}", self.id, other);
                ItemStatus::Pending
            }
        };

        let mut steps = Vec::new();
        for (name, set) in self.processing_steps {
            match name.parse::<OperationKind>() {
                Ok(kind) if set => steps.push(kind),
                Ok(_) => {}
                Err(err) => studio_warn!("Stored item {}: {}", self.id, err),
            }
        }

        if self.history.len() != self.history_steps.len() {
            studio_warn!(
                "Stored item {} has {} history entries but {} step labels; truncating",
                self.id,
                self.history.len(),
                self.history_steps.len()
            );
        }
        let history = self
            .history
            .into_iter()
            .zip(self.history_steps)
            .map(|(prior, step)| HistoryEntry {
                prior: Some(prior).filter(|prior| !prior.is_empty()),
                step: StepLabel::parse(&step),
            })
            .collect();

        let metadata = Metadata {
            brand: self.metadata.brand,
            title: self.metadata.title,
            bullet1: self.metadata.bullet1,
            bullet2: self.metadata.bullet2,
            description: self.metadata.description,
            keywords: self.metadata.keywords,
        };

        Some(TrackedItem::restore(
            self.id,
            original,
            self.thumbnail_url,
            self.processed_url,
            status,
            metadata,
            steps.into_iter().collect::<ProcessingSteps>(),
            history,
        ))
    }
}
