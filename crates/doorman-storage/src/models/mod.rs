pub mod access_event;
pub mod holder;

pub use access_event::AccessEvent;
pub use holder::{CredentialHolder, HolderStatus};
