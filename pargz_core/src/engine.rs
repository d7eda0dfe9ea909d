use std::io::{Read, Seek, Write};
use std::thread;

use crate::cancel::{CancellationToken, StopSignal};
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::format::{ChunkInfo, MAX_MEMORY_BLOCK_SIZE};
use crate::session::Session;
use crate::{batch_decompress, compress, seek_decompress};

/// Compression settings. `None` fields fall back to the session heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressOptions {
    pub threads: Option<usize>,
    /// Raw bytes per chunk.
    pub chunk_size: Option<usize>,
}

/// Decompression settings shared by both decompressors.
#[derive(Debug, Clone, Copy)]
pub struct DecompressOptions {
    pub threads: Option<usize>,
    /// Upper bound on the original bytes of one in-memory block
    /// (batched decompressor only).
    pub memory_ceiling: u64,
}

impl Default for DecompressOptions {
    fn default() -> Self {
        Self {
            threads: None,
            memory_ceiling: MAX_MEMORY_BLOCK_SIZE,
        }
    }
}

/// Figures reported by a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub chunks: usize,
    pub original_bytes: u64,
    /// Compressed payload bytes, excluding the footer.
    pub compressed_bytes: u64,
    pub threads: usize,
}

impl RunStats {
    /// Compression ratio (original / compressed).
    pub fn ratio(&self) -> f64 {
        if self.compressed_bytes == 0 {
            return 1.0;
        }
        self.original_bytes as f64 / self.compressed_bytes as f64
    }
}

/// How a run ended when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed(RunStats),
    /// Stopped at a chunk boundary because the token was cancelled. A
    /// cancelled compression leaves its output without a footer.
    Cancelled,
}

/// The three engines that operate on a [`Session`].
#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    /// Split the input into chunks, compress them in parallel, append the footer.
    Compress(CompressOptions),
    /// Workers pull chunks from a shared pool and read/write each at its own offset.
    SeekDecompress(DecompressOptions),
    /// Read bounded blocks of consecutive chunks sequentially and fan each
    /// block out round-robin.
    BatchDecompress(DecompressOptions),
}

impl Strategy {
    /// Run the whole operation synchronously on `session`.
    pub fn run<R, W>(
        &self,
        session: &Session<R, W>,
        codec: &dyn Codec,
        cancel: &CancellationToken,
    ) -> Result<Outcome>
    where
        R: Read + Seek + Send,
        W: Write + Seek + Send,
    {
        match self {
            Strategy::Compress(options) => compress::run(session, codec, options, cancel),
            Strategy::SeekDecompress(options) => {
                seek_decompress::run(session, codec, options, cancel)
            }
            Strategy::BatchDecompress(options) => {
                batch_decompress::run(session, codec, options, cancel)
            }
        }
    }
}

pub(crate) fn resolve_threads<R, W>(requested: Option<usize>, session: &Session<R, W>) -> Result<usize>
where
    R: Read + Seek,
    W: Write + Seek,
{
    match requested {
        Some(0) => Err(Error::invalid_argument("thread count must be at least 1")),
        Some(n) => Ok(n),
        None => Ok(session.ideal_threads()),
    }
}

/// Decompress one chunk and check it reproduces the recorded length.
pub(crate) fn decode_chunk(codec: &dyn Codec, chunk: &ChunkInfo, compressed: &[u8]) -> Result<Vec<u8>> {
    let size_hint = usize::try_from(chunk.original_length).unwrap_or(usize::MAX);
    let raw = codec.decompress_chunk(compressed, size_hint)?;
    if raw.len() as u64 != chunk.original_length {
        return Err(Error::LengthMismatch {
            original_start: chunk.original_start,
            expected: chunk.original_length,
            actual: raw.len() as u64,
        });
    }
    Ok(raw)
}

/// Run `work(worker_id)` on `workers` scoped threads and join them all.
///
/// No new worker is started once `stop` fires. A failing worker raises
/// `stop` so its siblings quit at their next chunk boundary; the first error
/// (by worker id) is returned.
pub(crate) fn fan_out<T, F>(workers: usize, stop: &StopSignal<'_>, work: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync,
{
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            if stop.should_stop() {
                break;
            }
            let work = &work;
            let handle = thread::Builder::new()
                .name(format!("pargz-worker-{worker}"))
                .spawn_scoped(scope, move || {
                    let result = work(worker);
                    if result.is_err() {
                        stop.fail();
                    }
                    result
                })?;
            handles.push(handle);
        }
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(Err(Error::WorkerPanicked)))
            .collect()
    })
}
