pub mod message;
pub mod persisted;

pub use message::{Envelope, MessageKey, MessageWrapper, ENVELOPE_OVERHEAD};
pub use persisted::{PersistedEntry, PersistedMessage};
