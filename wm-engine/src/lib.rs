//! Processor and Engine (spec.md §4.9-§4.10): per-URL fetch
//! orchestration and the bounded worker pool that drives a crawl to
//! completion.

mod engine;
mod processor;
mod writer;

pub use engine::Engine;
pub use processor::{Processor, ProcessorConfig};
pub use writer::{FsWriter, Writer, WriterError};
