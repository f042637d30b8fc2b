//! Chunked log storage
//!
//! One directory per label stream (named by the stream's canonical label
//! encoding), each holding sealed `chunk_<unixSec>_<seq>.log` files with
//! `.meta` JSON sidecars. The sidecar is the commit marker: readers never
//! observe a chunk without one.
//!
//! - [`writer`]: batch → sealed chunk + sidecar
//! - [`reader`]: sidecar-driven enumeration over a time window
//! - [`retention`]: horizon-based deletion and empty-directory pruning

pub mod error;
pub mod reader;
pub mod retention;
pub mod types;
pub mod writer;

pub use error::{StorageError, StorageResult};
pub use reader::{ChunkReader, EnumerateOutcome};
pub use retention::{run_sweeper, sweep_once, SweepStats};
pub use types::{
    labels_match, validate_label, ChunkMeta, LabelSet, LogEntry, StreamId, TimeRange,
};
pub use writer::ChunkWriter;
