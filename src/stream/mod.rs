//! Stream composition.
//!
//! Small adapters the orchestrator builds decode and encode pipelines from:
//!
//! - [`BoundedWindow`]: a byte range of a shared backing stream with its own
//!   cursor, so several windows can interleave over one container
//! - [`ConcatReader`]: N lazily opened readers presented as one stream, with
//!   the realized size and CRC of each recorded as it is exhausted
//! - [`SplitWriter`]: the inverse, routing one stream into N sinks of known
//!   sizes and reporting each sink's digest as it completes
//! - [`NullSink`]: a size-only sink for sub-streams nobody asked for
//!
//! The CRC filter itself lives in [`crate::checksum`].

mod concat;
mod null;
mod split;
mod window;

pub use concat::ConcatReader;
pub use null::NullSink;
pub use split::SplitWriter;
pub use window::BoundedWindow;
