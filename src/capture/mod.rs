//! Bounded, reentrancy-safe streaming capture.
//!
//! Three pieces cooperate here:
//!
//! - [`accumulator`]: bounded buffers that retain at most a configured
//!   prefix of the bytes/characters flowing through a stream.
//! - [`reentrancy`]: a thread-local call-depth guard ensuring that when one
//!   instrumented operation delegates to another on the same target, only
//!   the outermost invocation captures.
//! - [`registry`]: the concurrent table associating live streams with their
//!   accumulators and request-scoped metadata.
//!
//! The capture layer in [`crate::layer`] wires these together behind the
//! `on_stream_bytes` / `on_stream_end` contract exposed to instrumentation
//! hooks.

pub mod accumulator;
pub mod reentrancy;
pub mod registry;

pub use accumulator::{BoundedByteAccumulator, BoundedCharAccumulator};
pub use reentrancy::{OpCategory, ReentrancyScope};
pub use registry::{CaptureEntry, StreamCaptureRegistry, StreamId};
