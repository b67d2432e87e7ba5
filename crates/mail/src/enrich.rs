//! Post-sync enrichment hook
//!
//! Newly stored messages are handed to an [`EnrichmentHook`] (AI
//! categorization, vector indexing, and the like live behind it). Hook
//! failures are logged and never abort a sync pass.

use anyhow::Result;

use crate::models::EmailRecord;

/// Post-processing step invoked per newly stored message
pub trait EnrichmentHook: Send + Sync {
    /// Called after an EmailRecord is stored for the first time
    fn on_message_stored(&self, record: &EmailRecord) -> Result<()>;
}

/// Hook that does nothing
#[derive(Debug, Default)]
pub struct NoopEnrichment;

impl EnrichmentHook for NoopEnrichment {
    fn on_message_stored(&self, _record: &EmailRecord) -> Result<()> {
        Ok(())
    }
}

/// Invoke the hook for one record, swallowing and logging any error
pub(crate) fn notify_stored(hook: &dyn EnrichmentHook, record: &EmailRecord) {
    if let Err(e) = hook.on_message_stored(record) {
        log::warn!(
            "[SYNC] Enrichment hook failed for message {}: {:#}",
            record.id.as_str(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageId, ThreadId};

    struct FailingHook;

    impl EnrichmentHook for FailingHook {
        fn on_message_stored(&self, _record: &EmailRecord) -> Result<()> {
            anyhow::bail!("enrichment backend down")
        }
    }

    #[test]
    fn test_hook_failure_is_swallowed() {
        let record = EmailRecord::builder(MessageId::new("m1"), ThreadId::new("t1"))
            .account_id("acct")
            .build();
        // Must not panic or propagate
        notify_stored(&FailingHook, &record);
        notify_stored(&NoopEnrichment, &record);
    }
}
