//! Storage backends for synced mail

mod codec;
mod memory;
mod sqlite;
mod traits;

pub use codec::{BodyCodec, PlainCodec, ZstdCodec};
pub use memory::InMemoryMailStore;
pub use sqlite::SqliteMailStore;
pub use traits::MailStore;
