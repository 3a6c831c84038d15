//! Streaming of one table from the source export into the destination import.
//!
//! The export, an optional compression stage and the import run as external processes. The
//! compressed stream crosses a named pipe ([`Conduit`]) that the import reads like a file, so
//! no table content is ever buffered in this process or written to disk.

mod conduit;
mod process;
mod stream;

pub use conduit::Conduit;
pub use process::{PipelineStage, ProcessGroup};
pub use stream::StreamPipeline;
