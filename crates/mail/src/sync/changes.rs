//! Change-feed event partitioning
//!
//! Pure resolution of one change-feed page into the mutations a pass
//! must apply. Delete wins: an id that is both added and deleted within
//! the same page ends up deleted only.

use std::collections::{HashMap, HashSet};

use crate::mailbox::{ChangeEvent, MessageRef};
use crate::models::MessageId;

/// Resolved mutations from one change-feed page
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Messages that appeared, deduplicated, with delete-wins applied
    pub added: Vec<MessageRef>,
    /// Messages to remove locally
    pub deleted: HashSet<MessageId>,
    /// Label additions per message id
    pub labels_added: HashMap<MessageId, Vec<String>>,
    /// Label removals per message id
    pub labels_removed: HashMap<MessageId, Vec<String>>,
}

impl ChangeSet {
    /// Ids needing a label delta applied, in deterministic order
    pub fn label_changed_ids(&self) -> Vec<MessageId> {
        let mut ids: Vec<MessageId> = self
            .labels_added
            .keys()
            .chain(self.labels_removed.keys())
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort();
        ids
    }

    /// True when the page carried no effective mutations
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.deleted.is_empty()
            && self.labels_added.is_empty()
            && self.labels_removed.is_empty()
    }
}

/// Partition feed events into added / deleted / label-delta sets
pub fn partition_events(events: Vec<ChangeEvent>) -> ChangeSet {
    let mut added: HashMap<MessageId, MessageRef> = HashMap::new();
    let mut set = ChangeSet::default();

    for event in events {
        match event {
            ChangeEvent::Added { id, thread_id } => {
                added.insert(
                    id.clone(),
                    MessageRef {
                        id,
                        thread_id,
                    },
                );
            }
            ChangeEvent::Deleted { id } => {
                set.deleted.insert(id);
            }
            ChangeEvent::LabelsAdded { id, labels } => {
                set.labels_added.entry(id).or_default().extend(labels);
            }
            ChangeEvent::LabelsRemoved { id, labels } => {
                set.labels_removed.entry(id).or_default().extend(labels);
            }
        }
    }

    // Delete wins within a page
    added.retain(|id, _| !set.deleted.contains(id));

    let mut refs: Vec<MessageRef> = added.into_values().collect();
    refs.sort_by(|a, b| a.id.cmp(&b.id));
    set.added = refs;
    set
}
