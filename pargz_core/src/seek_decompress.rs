use std::io::{self, Read, Seek, Write};

use crossbeam_channel::Receiver;
use log::{debug, info, warn};

use crate::cancel::{CancellationToken, StopSignal};
use crate::codec::Codec;
use crate::engine::{decode_chunk, fan_out, resolve_threads, DecompressOptions, Outcome, RunStats};
use crate::error::Result;
use crate::format::ChunkInfo;
use crate::session::Session;

/// Seek-addressed parallel decompressor.
///
/// All chunk records go into one unordered work pool. Each worker takes a
/// record, reads its compressed bytes at `compressed_start`, decodes them and
/// writes the result at `original_start`. Output ranges are disjoint, so no
/// ordering between chunks is needed.
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
    let threads = resolve_threads(options.threads, session)?;
    let index = session.read_footer()?;
    let workers = threads.min(index.len()).max(1);
    info!(
        "decompressing {} chunks ({} bytes) with {}, {} seek workers",
        index.len(),
        index.original_file_size(),
        codec.name(),
        workers
    );

    let (pool_tx, pool_rx) = crossbeam_channel::bounded(index.len());
    for chunk in index.chunks() {
        pool_tx
            .try_send(*chunk)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("chunk pool: {e}")))?;
    }
    drop(pool_tx);

    let stop = StopSignal::new(cancel);
    let processed: usize = fan_out(workers, &stop, |worker| {
        seek_worker(worker, session, codec, &pool_rx, &stop)
    })?
    .into_iter()
    .sum();
    session.flush()?;

    if stop.is_cancelled() {
        warn!("decompression cancelled after {processed} of {} chunks", index.len());
        return Ok(Outcome::Cancelled);
    }

    Ok(Outcome::Completed(RunStats {
        chunks: processed,
        original_bytes: index.original_file_size(),
        compressed_bytes: index.compressed_size(),
        threads: workers,
    }))
}

fn seek_worker<R, W>(
    worker: usize,
    session: &Session<R, W>,
    codec: &dyn Codec,
    pool: &Receiver<ChunkInfo>,
    stop: &StopSignal<'_>,
) -> Result<usize>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let mut processed = 0;
    while !stop.should_stop() {
        let Ok(chunk) = pool.try_recv() else {
            break;
        };
        let mut compressed = vec![0u8; chunk.compressed_length as usize];
        session.read_at(chunk.compressed_start, &mut compressed)?;
        let raw = decode_chunk(codec, &chunk, &compressed)?;
        session.write_at(chunk.original_start, &raw)?;
        debug!(
            "[worker {worker}] chunk @{} -> @{} ({} bytes)",
            chunk.compressed_start, chunk.original_start, chunk.original_length
        );
        processed += 1;
    }
    Ok(processed)
}
