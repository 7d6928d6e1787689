use crate::{ItemId, OperationKind, OriginalFile, Plan};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    GenerateThumbnail {
        item_id: ItemId,
        original: OriginalFile,
    },
    /// Ask the user for the input an interactive operation needs.
    OpenInteraction { item_id: ItemId, kind: OperationKind },
    /// Run `plan` against the item as it was when the plan was accepted.
    ExecutePlan {
        item_id: ItemId,
        plan: Plan,
        original: OriginalFile,
        processed_url: Option<String>,
    },
    /// Schedule a (debounced) save of the whole collection.
    PersistCollection,
    /// Wipe stored state and discard the listed server-side outputs.
    PurgeStorage { derived_outputs: Vec<String> },
}
