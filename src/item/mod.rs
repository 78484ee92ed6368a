//! Ingested items: the canonical item shape, the store interface, and the
//! file-backed store.

pub mod storage;
pub mod store;
pub mod types;

pub use storage::FileItemStore;
pub use store::ItemStore;
pub use types::{Item, ItemId, ELLIPSIS, MAX_SUMMARY_LENGTH, UNTITLED};
