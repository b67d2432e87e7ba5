//! Domain models for the sync engine

mod cursor;
mod email;
mod stub;

pub use cursor::SyncCursor;
pub use email::{EmailAddress, EmailRecord, EmailRecordBuilder, STARRED_LABEL, UNREAD_LABEL};
pub use stub::{MessageId, MessageStub, ThreadId};
