use std::io::{Read, Seek, Write};
use std::ops::Range;

use log::{debug, info, warn};

use crate::cancel::{CancellationToken, StopSignal};
use crate::codec::Codec;
use crate::engine::{decode_chunk, fan_out, resolve_threads, DecompressOptions, Outcome, RunStats};
use crate::error::{Error, Result};
use crate::format::ChunkInfo;
use crate::session::Session;

/// Split `chunks` (in file order) into consecutive blocks whose summed
/// `original_length` stays within `ceiling`.
///
/// Blocks are filled greedily; the first chunk that would overflow the
/// current block starts the next one. A chunk that alone exceeds `ceiling`
/// becomes a block of its own. Every chunk lands in exactly one block.
pub fn plan_blocks(chunks: &[ChunkInfo], ceiling: u64) -> Vec<Range<usize>> {
    let mut blocks = Vec::new();
    let mut start = 0;
    while start < chunks.len() {
        let mut end = start;
        let mut original = 0u64;
        while end < chunks.len() {
            let next = original.saturating_add(chunks[end].original_length);
            if next > ceiling {
                break;
            }
            original = next;
            end += 1;
        }
        if end == start {
            end += 1;
        }
        blocks.push(start..end);
        start = end;
    }
    blocks
}

/// Deal `block` out round-robin by position: chunk `i` goes to lane
/// `i % lanes`.
pub fn round_robin(block: &[ChunkInfo], lanes: usize) -> Vec<Vec<ChunkInfo>> {
    let mut assigned = vec![Vec::new(); lanes];
    for (i, chunk) in block.iter().enumerate() {
        assigned[i % lanes].push(*chunk);
    }
    assigned
}

/// Memory-bounded, batched parallel decompressor.
///
/// # Block loop
/// 1. Take the next run of consecutive chunks whose original size fits the
///    memory ceiling ([`plan_blocks`]).
/// 2. Read the compressed bytes of the whole run with one sequential read.
/// 3. Deal the chunks round-robin to `min(chunks, threads)` workers; a single
///    lane runs on the calling thread.
/// 4. Workers decode their slices of the shared block buffer and write each
///    result at its `original_start`.
/// 5. Flush the output, then move on to the next block.
///
/// Only the writer is shared while a block is being decoded; the input is
/// touched once per block.
pub(crate) fn run<R, W>(
    session: &Session<R, W>,
    codec: &dyn Codec,
    options: &DecompressOptions,
    cancel: &CancellationToken,
) -> Result<Outcome>
where
    R: Read + Seek + Send,
    W: Write + Seek + Send,
{
    if options.memory_ceiling == 0 {
        return Err(Error::invalid_argument("memory ceiling must be at least 1 byte"));
    }
    let threads = resolve_threads(options.threads, session)?;
    let index = session.read_footer()?;
    let chunks = index.chunks();
    let blocks = plan_blocks(chunks, options.memory_ceiling);
    info!(
        "decompressing {} chunks ({} bytes) with {} in {} blocks, up to {} workers",
        chunks.len(),
        index.original_file_size(),
        codec.name(),
        blocks.len(),
        threads
    );

    let stop = StopSignal::new(cancel);
    let mut processed = 0;
    let mut max_workers = 1;
    for (block_no, range) in blocks.into_iter().enumerate() {
        if stop.should_stop() {
            break;
        }
        let block = &chunks[range];
        let workers = block.len().min(threads);
        max_workers = max_workers.max(workers);
        processed += decode_block(block_no, block, workers, session, codec, &stop)?;
        session.flush()?;
    }

    if stop.is_cancelled() {
        warn!("decompression cancelled after {processed} of {} chunks", chunks.len());
        return Ok(Outcome::Cancelled);
    }

    Ok(Outcome::Completed(RunStats {
        chunks: processed,
        original_bytes: index.original_file_size(),
        compressed_bytes: index.compressed_size(),
        threads: max_workers,
    }))
}

fn decode_block<R, W>(
    block_no: usize,
    block: &[ChunkInfo],
    workers: usize,
    session: &Session<R, W>,
    codec: &dyn Codec,
    stop: &StopSignal<'_>,
) -> Result<usize>
where
    R: Read + Seek + Send,
    W: Write + Seek + Send,
{
    // Chunks written by the compressor are contiguous, so this span is
    // exactly the sum of their compressed lengths.
    let block_start = block.iter().map(|c| c.compressed_start).min().unwrap_or(0);
    let block_end = block.iter().map(|c| c.compressed_end()).max().unwrap_or(0);
    let mut buffer = vec![0u8; (block_end - block_start) as usize];
    session.read_at(block_start, &mut buffer)?;
    debug!(
        "block {block_no}: {} chunks, {} compressed bytes @{block_start}, {workers} workers",
        block.len(),
        buffer.len()
    );

    let lanes = round_robin(block, workers);
    if lanes.len() == 1 {
        return decode_lane(0, &lanes[0], &buffer, block_start, session, codec, stop);
    }
    let per_lane = fan_out(lanes.len(), stop, |lane| {
        decode_lane(lane, &lanes[lane], &buffer, block_start, session, codec, stop)
    })?;
    Ok(per_lane.into_iter().sum())
}

fn decode_lane<R, W>(
    lane: usize,
    chunks: &[ChunkInfo],
    buffer: &[u8],
    block_start: u64,
    session: &Session<R, W>,
    codec: &dyn Codec,
    stop: &StopSignal<'_>,
) -> Result<usize>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let mut processed = 0;
    for chunk in chunks {
        if stop.should_stop() {
            break;
        }
        let at = (chunk.compressed_start - block_start) as usize;
        let compressed = &buffer[at..at + chunk.compressed_length as usize];
        let raw = decode_chunk(codec, chunk, compressed)?;
        session.write_at(chunk.original_start, &raw)?;
        debug!("[lane {lane}] chunk @{} ({} bytes)", chunk.original_start, raw.len());
        processed += 1;
    }
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks_of(lengths: &[u64]) -> Vec<ChunkInfo> {
        let mut original = 0;
        let mut compressed = 0;
        lengths
            .iter()
            .map(|&len| {
                let chunk = ChunkInfo {
                    original_start: original,
                    compressed_start: compressed,
                    original_length: len,
                    compressed_length: len / 2 + 1,
                };
                original += len;
                compressed += chunk.compressed_length;
                chunk
            })
            .collect()
    }

    fn assert_partition(blocks: &[Range<usize>], count: usize) {
        let mut next = 0;
        for block in blocks {
            assert_eq!(block.start, next, "blocks must be consecutive");
            assert!(block.end > block.start, "blocks are never empty");
            next = block.end;
        }
        assert_eq!(next, count, "every chunk appears in exactly one block");
    }

    #[test]
    fn blocks_respect_the_ceiling() {
        let chunks = chunks_of(&[40, 40, 40, 10, 90, 5, 5, 100, 1]);
        let blocks = plan_blocks(&chunks, 100);
        assert_partition(&blocks, chunks.len());
        for block in &blocks {
            let original: u64 = chunks[block.clone()].iter().map(|c| c.original_length).sum();
            assert!(original <= 100, "block {block:?} holds {original} bytes");
        }
        assert_eq!(blocks, vec![0..2, 2..4, 4..7, 7..8, 8..9]);
    }

    #[test]
    fn everything_fits_in_one_block() {
        let chunks = chunks_of(&[10; 50]);
        assert_eq!(plan_blocks(&chunks, 512_000_000), vec![0..50]);
    }

    #[test]
    fn oversized_chunk_gets_its_own_block() {
        let chunks = chunks_of(&[10, 500, 10]);
        let blocks = plan_blocks(&chunks, 100);
        assert_eq!(blocks, vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn no_chunks_no_blocks() {
        assert!(plan_blocks(&[], 100).is_empty());
    }

    #[test]
    fn round_robin_deals_by_position() {
        let chunks = chunks_of(&[1, 2, 3, 4, 5]);
        let lanes = round_robin(&chunks, 2);
        let lengths: Vec<Vec<u64>> = lanes
            .iter()
            .map(|lane| lane.iter().map(|c| c.original_length).collect())
            .collect();
        assert_eq!(lengths, vec![vec![1, 3, 5], vec![2, 4]]);
    }
}
