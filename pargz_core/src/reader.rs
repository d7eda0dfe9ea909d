use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use crate::codec::Codec;
use crate::engine::decode_chunk;
use crate::error::{Error, Result};
use crate::format::{ChunkIndex, ChunkInfo};

/// Random-access reader for pargz archives.
///
/// # Open sequence
/// 1. Seek to `end - 8`, read `footer_size`.
/// 2. Load the whole footer and check it describes a complete archive.
/// 3. Keep the chunk records sorted by `original_start`.
///
/// The footer is 32 bytes per chunk; with the default 8 MB chunks a 1 TB
/// input carries a footer of about 4 MB, so it always stays in RAM.
///
/// # Access pattern
/// [`read_chunk`](Self::read_chunk) seeks straight to one chunk and decodes
/// only that chunk. [`read_range`](Self::read_range) decodes the minimal run
/// of chunks covering a byte range of the original file.
pub struct ArchiveReader<R> {
    source: R,
    index: ChunkIndex,
    /// Chunk records ordered by `original_start`.
    chunks: Vec<ChunkInfo>,
    codec: Arc<dyn Codec>,
}

impl ArchiveReader<File> {
    /// Open an archive file. `codec` must be the codec it was written with.
    pub fn open(path: impl AsRef<Path>, codec: Arc<dyn Codec>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(file, codec)
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    pub fn new(mut source: R, codec: Arc<dyn Codec>) -> Result<Self> {
        let index = ChunkIndex::read_archive(&mut source)?;
        let mut chunks = index.chunks().to_vec();
        chunks.sort_by_key(|c| c.original_start);
        Ok(Self {
            source,
            index,
            chunks,
            codec,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Total uncompressed size in bytes.
    pub fn original_size(&self) -> u64 {
        self.index.original_file_size()
    }

    /// Total compressed payload in bytes (excluding the footer).
    pub fn compressed_size(&self) -> u64 {
        self.index.compressed_size()
    }

    /// Compression ratio (original / compressed).
    pub fn ratio(&self) -> f64 {
        let compressed = self.compressed_size();
        if compressed == 0 {
            return 1.0;
        }
        self.original_size() as f64 / compressed as f64
    }

    /// The footer as read from disk, in file order.
    pub fn index(&self) -> &ChunkIndex {
        &self.index
    }

    /// Chunk records ordered by position in the original file.
    pub fn chunks(&self) -> &[ChunkInfo] {
        &self.chunks
    }

    /// Decompress chunk `idx` (counted in original-file order).
    ///
    /// Only that chunk's compressed bytes are read from the source.
    pub fn read_chunk(&mut self, idx: usize) -> Result<Vec<u8>> {
        let chunk = *self.chunks.get(idx).ok_or_else(|| {
            Error::invalid_argument(format!(
                "chunk index {idx} out of range (total {})",
                self.chunks.len()
            ))
        })?;

        self.source.seek(SeekFrom::Start(chunk.compressed_start))?;
        let mut compressed = vec![0u8; chunk.compressed_length as usize];
        self.source.read_exact(&mut compressed)?;
        decode_chunk(self.codec.as_ref(), &chunk, &compressed)
    }

    /// Decompress and return up to `len` bytes starting at `start` in the
    /// original file. The range is clamped to the end of the file.
    pub fn read_range(&mut self, start: u64, len: u64) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let total = self.original_size();
        if start >= total {
            return Err(Error::invalid_argument(format!(
                "read_range start {start} is beyond original size {total}"
            )));
        }
        let end = start.saturating_add(len).min(total);

        let first = self.chunks.partition_point(|c| c.original_end() <= start);
        let mut result = Vec::new();
        for idx in first..self.chunks.len() {
            let chunk = self.chunks[idx];
            if chunk.original_start >= end {
                break;
            }
            let raw = self.read_chunk(idx)?;
            let from = start.saturating_sub(chunk.original_start) as usize;
            let to = (end.min(chunk.original_end()) - chunk.original_start) as usize;
            result.extend_from_slice(&raw[from..to]);
        }
        Ok(result)
    }
}
