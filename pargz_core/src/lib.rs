pub mod batch_decompress;
pub mod cancel;
pub mod codec;
pub mod compress;
pub mod engine;
pub mod error;
pub mod format;
pub mod reader;
mod seek_decompress;
pub mod session;

pub use cancel::CancellationToken;
pub use codec::Codec;
pub use engine::{CompressOptions, DecompressOptions, Outcome, RunStats, Strategy};
pub use error::{Error, ErrorKind, Result};
pub use format::{ChunkIndex, ChunkInfo};
pub use reader::ArchiveReader;
pub use session::Session;
