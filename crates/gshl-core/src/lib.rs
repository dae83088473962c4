// Shared plumbing for the GSHL stats engine: loosely-typed records and the
// row-store collaborator that persists them.

pub mod db;
pub mod record;
pub mod store;

pub use db::SqliteStore;
pub use record::{Filter, Record};
pub use store::{MemoryStore, RowStore, UpsertOutcome};
