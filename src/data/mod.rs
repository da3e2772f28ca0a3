//! Payload resolution: generated, file-backed, and transaction-extracted values.
mod field;
mod path;
mod source;
mod transaction;


pub use field::{LOCATOR_SEPARATOR, Resolver, split_locator};
pub use path::lookup_path;
pub use source::{FileSources, FileTable};
pub use transaction::{Captures, TransactionCursor};
