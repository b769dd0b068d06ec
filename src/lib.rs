//! TapGate - in-process interception core for network-facing services.
//!
//! TapGate does two tightly coupled jobs for a host instrumentation layer:
//!
//! 1. **Bounded, reentrancy-safe streaming capture** - accumulating an
//!    upper-bounded copy of the bytes flowing through instrumented streams,
//!    without unbounded memory growth, without double-capturing when
//!    overlapping instrumentation hooks delegate to each other, and while
//!    coexisting with unrelated concurrent streams.
//! 2. **Blocking policy evaluation** - composing an arbitrary set of
//!    independent filters into one verdict, including the reference
//!    IP-policy filter with time-windowed suspend/snooze lists.
//!
//! The crate intercepts nothing itself. The host's network-library hooks
//! deliver bytes to [`layer::CaptureLayer::on_stream_bytes`] and signal
//! completion via [`layer::CaptureLayer::on_stream_end`]; the resulting
//! [`layer::CaptureReport`] carries the block verdict and the captured
//! payload for the host's observability record. Plugin discovery, trace
//! propagation, config file formats, and the process entry point all stay
//! on the host side.
//!
//! Everything here runs synchronously on the calling request-handling
//! thread: no suspension, no I/O, no dedicated threads.

pub mod capture;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod filter;
pub mod layer;

pub use capture::{OpCategory, StreamId};
pub use config::CaptureConfig;
pub use context::RequestContext;
pub use filter::{Filter, FilterRegistry, MultiFilter, Verdict};
pub use layer::{CaptureLayer, CaptureReport};
