//! Domain model (messages, blob summaries, errors).

pub mod blob;
pub mod errors;
pub mod message;

pub use self::blob::BlobSummary;
pub use self::errors::{ControllerError, StoreError};
pub use self::message::{
    DefaultMessageFactory, FileMessageFactory, Headers, Message, MessageFactory, Payload,
    PayloadMode, PayloadReader,
};
