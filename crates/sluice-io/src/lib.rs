//! Concrete source and sink adapters plus the streaming connector,
//! generalized from the teacher's `rde-io` crate structure (one module per
//! connector family) to the JSON-text `Event`/`Capsule` model of
//! `sluice-core`.

pub mod sinks;
pub mod sources;
pub mod streaming;

pub use sinks::build_sink;
pub use sources::build_source;
