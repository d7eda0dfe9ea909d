use std::io::{Read, Seek, Write};

use log::{debug, info, warn};

use crate::cancel::{CancellationToken, StopSignal};
use crate::codec::Codec;
use crate::engine::{fan_out, resolve_threads, CompressOptions, Outcome, RunStats};
use crate::error::{Error, Result};
use crate::format::MAX_CHUNK_SIZE;
use crate::session::Session;

/// Chunk size used when none is requested: [`MAX_CHUNK_SIZE`], or an even
/// share of the input per worker when that is smaller.
pub fn default_chunk_size(input_len: u64, threads: usize) -> usize {
    if threads <= 1 {
        return MAX_CHUNK_SIZE;
    }
    let share = input_len / threads as u64;
    (share.min(MAX_CHUNK_SIZE as u64) as usize).max(1)
}

/// Parallel compressor.
///
/// Every worker loops: take the next `chunk_size` bytes of input under the
/// reader lock, compress them, then append the result and its chunk record
/// under the writer lock. Chunks land in the output in completion order. The
/// footer is written once after all workers have joined; a cancelled run
/// returns before that, leaving a footer-less output.
pub(crate) fn run<R, W>(
    session: &Session<R, W>,
    codec: &dyn Codec,
    options: &CompressOptions,
    cancel: &CancellationToken,
) -> Result<Outcome>
where
    R: Read + Seek + Send,
    W: Write + Seek + Send,
{
    let threads = resolve_threads(options.threads, session)?;
    let chunk_size = match options.chunk_size {
        Some(0) => return Err(Error::invalid_argument("chunk size must be at least 1 byte")),
        Some(size) => size,
        None => default_chunk_size(session.input_len(), threads),
    };
    info!(
        "compressing {} bytes with {} ({} workers, {}-byte chunks)",
        session.input_len(),
        codec.name(),
        threads,
        chunk_size
    );

    // A chunk never holds more than the whole input.
    let chunk_len = chunk_size
        .min(usize::try_from(session.input_len()).unwrap_or(usize::MAX))
        .max(1);

    let stop = StopSignal::new(cancel);
    fan_out(threads, &stop, |worker| {
        compress_worker(worker, session, codec, chunk_len, &stop)
    })?;

    if stop.is_cancelled() {
        warn!("compression cancelled; output has no footer");
        return Ok(Outcome::Cancelled);
    }

    let index = session.write_footer()?;
    let stats = RunStats {
        chunks: index.len(),
        original_bytes: index.original_file_size(),
        compressed_bytes: index.compressed_size(),
        threads,
    };
    info!(
        "compressed {} chunks: {} -> {} bytes ({:.2}x)",
        stats.chunks,
        stats.original_bytes,
        stats.compressed_bytes,
        stats.ratio()
    );
    Ok(Outcome::Completed(stats))
}

fn compress_worker<R, W>(
    worker: usize,
    session: &Session<R, W>,
    codec: &dyn Codec,
    chunk_len: usize,
    stop: &StopSignal<'_>,
) -> Result<()>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let mut buf = vec![0u8; chunk_len];
    while !stop.should_stop() {
        let (original_start, read) = session.read_next(&mut buf)?;
        if read == 0 {
            break;
        }
        let compressed = codec.compress_chunk(&buf[..read])?;
        let chunk = session.append_chunk(original_start, read as u64, &compressed)?;
        debug!(
            "[worker {worker}] chunk @{} ({} bytes) -> @{} ({} bytes)",
            chunk.original_start, chunk.original_length, chunk.compressed_start, chunk.compressed_length
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_worker_uses_max_chunk() {
        assert_eq!(default_chunk_size(10, 1), MAX_CHUNK_SIZE);
        assert_eq!(default_chunk_size(10_000_000_000, 1), MAX_CHUNK_SIZE);
    }

    #[test]
    fn parallel_chunks_split_the_input_evenly() {
        assert_eq!(default_chunk_size(4_000_000, 4), 1_000_000);
        assert_eq!(default_chunk_size(100_000_000, 4), MAX_CHUNK_SIZE);
        assert_eq!(default_chunk_size(3, 8), 1);
    }
}
