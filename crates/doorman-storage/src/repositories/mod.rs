pub mod access_event;
pub mod holder;

pub use access_event::{AccessEventRepository, SqliteAccessEventRepository};
pub use holder::{HolderRepository, SqliteHolderRepository};
