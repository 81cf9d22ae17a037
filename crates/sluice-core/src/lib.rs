//! Core types for the sluice log-shipping engine: the event and capsule
//! model, the task graph and op model, the Source/Transform/Sink worker
//! traits, process configuration, and the shared error type.

pub mod capsule;
pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod op;
pub mod traits;

pub use capsule::{Capsule, FlushCapsule, TimerMessage};
pub use config::{GlobalConfig, LogLevel};
pub use error::{Result, SluiceError};
pub use event::{Event, EventBatch};
pub use op::{Op, OpId, OpKind};
pub use traits::{
    run_pull_source, run_push_source, CapsuleRx, CapsuleTx, Operator, Sink, Source, SourceKind, Transform,
};
