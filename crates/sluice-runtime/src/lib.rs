//! Runtime: the workers that turn a loaded task graph into a running
//! pipeline, plus the Lifecycle Controller that reconciles the declared
//! state in `sluice-registry` against these workers.

pub mod controller;
pub mod flush_worker;
pub mod secrets;
pub mod sink_batcher;
pub mod source_worker;
pub mod timer_service;
pub mod transform_worker;

pub use controller::run_controller;
