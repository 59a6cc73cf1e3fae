//! Relay client: the public face of the orchestration core.
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod error_classification;
pub mod session;

pub use builder::AiRelayBuilder;
pub use self::core::AiRelay;
pub use error_classification::{classify, classify_error, Classification, ConnectionFailure, Failure};
pub use session::ChatSession;
