//! The execution pipeline for untrusted Python scripts.
//!
//! A request is validated, wrapped in the runner harness, persisted as a
//! uniquely named artifact, run (sandboxed when possible) and its framed
//! stdout decoded back into a JSON result plus the text `main()` printed.

pub mod artifact;
pub mod decoder;
pub mod error;
pub mod harness;
pub mod request;
pub mod service;

pub use decoder::ExecutionOutput;
pub use error::{ExecutionError, ProtocolError, ScriptFailure};
pub use request::ExecutionRequest;
pub use service::ExecutionService;
