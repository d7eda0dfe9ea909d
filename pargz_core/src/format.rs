use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};

/// Size of one chunk record in the footer, in bytes.
///   original_start:u64 + compressed_start:u64
///   + original_length:u64 + compressed_length:u64
///   = 4 × 8 = 32
pub const CHUNK_RECORD_SIZE: u64 = 32;

/// Fixed tail of every footer: original_file_size:u64 + footer_size:u64.
pub const FOOTER_TAIL_SIZE: u64 = 16;

/// Upper bound on the raw bytes per chunk (8 MB).
pub const MAX_CHUNK_SIZE: usize = 8_000_000;

/// Default ceiling on the original bytes the batched decompressor keeps in
/// memory per block (512 MB).
pub const MAX_MEMORY_BLOCK_SIZE: u64 = 512_000_000;

/// Inputs smaller than this are processed by a single worker.
pub const PARALLEL_THRESHOLD: u64 = 500_000;

// ── Chunk record ───────────────────────────────────────────────────────────

/// Locates one independently compressed chunk in both the original and the
/// compressed stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkInfo {
    /// Byte offset of the chunk in the original (uncompressed) stream.
    pub original_start: u64,
    /// Byte offset of the compressed chunk from the start of the archive.
    pub compressed_start: u64,
    /// Raw length of the chunk in bytes.
    pub original_length: u64,
    /// Length of the compressed chunk in bytes.
    pub compressed_length: u64,
}

impl ChunkInfo {
    #[inline]
    pub fn original_end(&self) -> u64 {
        self.original_start + self.original_length
    }

    #[inline]
    pub fn compressed_end(&self) -> u64 {
        self.compressed_start + self.compressed_length
    }

    /// Serialize to exactly `CHUNK_RECORD_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; CHUNK_RECORD_SIZE as usize] {
        let mut buf = [0u8; CHUNK_RECORD_SIZE as usize];
        buf[0..8].copy_from_slice(&self.original_start.to_le_bytes());
        buf[8..16].copy_from_slice(&self.compressed_start.to_le_bytes());
        buf[16..24].copy_from_slice(&self.original_length.to_le_bytes());
        buf[24..32].copy_from_slice(&self.compressed_length.to_le_bytes());
        buf
    }

    /// Deserialize from `CHUNK_RECORD_SIZE` bytes.
    pub fn from_bytes(buf: &[u8; CHUNK_RECORD_SIZE as usize]) -> Self {
        Self {
            original_start: le_u64(buf, 0),
            compressed_start: le_u64(buf, 8),
            original_length: le_u64(buf, 16),
            compressed_length: le_u64(buf, 24),
        }
    }
}

fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(word)
}

// ── Chunk index (footer) ───────────────────────────────────────────────────

/// The trailer appended to every archive.
///
/// # Layout
/// ```text
/// [CHUNK 0 RECORD] ... [CHUNK N-1 RECORD]   ← 32 bytes each, ascending compressed_start
/// [original_file_size: u64 LE]
/// [footer_size: u64 LE]                     ← always the last 8 bytes of the file
/// ```
///
/// During compression chunks are appended in whatever order workers finish
/// them; [`write_to`](Self::write_to) restores file order.
///
/// Equality ignores chunk order: two indexes are equal when they record the
/// same original size and the same multiset of chunks.
#[derive(Debug, Clone, Default)]
pub struct ChunkIndex {
    chunks: Vec<ChunkInfo>,
    /// Running sum of `original_length` over `chunks`.
    original_file_size: u64,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk record. Overlap and ordering are not checked here; see
    /// [`validate_layout`](Self::validate_layout).
    pub fn add_chunk(
        &mut self,
        original_start: u64,
        compressed_start: u64,
        original_length: u64,
        compressed_length: u64,
    ) -> Result<()> {
        self.push(ChunkInfo {
            original_start,
            compressed_start,
            original_length,
            compressed_length,
        })
    }

    /// Append a chunk record, refusing one that would overflow the original
    /// size. The index is left unchanged on error.
    pub fn push(&mut self, chunk: ChunkInfo) -> Result<()> {
        self.original_file_size = self
            .original_file_size
            .checked_add(chunk.original_length)
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "chunk of {} bytes overflows an original size of {}",
                    chunk.original_length, self.original_file_size
                ))
            })?;
        self.chunks.push(chunk);
        Ok(())
    }

    /// Chunks in the order they were added (file order after a read).
    pub fn chunks(&self) -> &[ChunkInfo] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn original_file_size(&self) -> u64 {
        self.original_file_size
    }

    /// Total compressed bytes of all chunks (excluding the footer).
    pub fn compressed_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.compressed_length).sum()
    }

    /// Total trailer length in bytes, including the trailing size field.
    pub fn footer_size(&self) -> u64 {
        self.chunks.len() as u64 * CHUNK_RECORD_SIZE + FOOTER_TAIL_SIZE
    }

    /// Chunks in ascending `compressed_start` order; ties keep insertion order.
    pub fn in_file_order(&self) -> Vec<ChunkInfo> {
        let mut ordered = self.chunks.clone();
        ordered.sort_by_key(|c| c.compressed_start);
        ordered
    }

    /// Serialize the footer. Advances `writer` by exactly
    /// [`footer_size`](Self::footer_size) bytes and returns that count.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let footer_size = self.footer_size();
        let mut buf = Vec::with_capacity(footer_size as usize);
        for chunk in self.in_file_order() {
            buf.extend_from_slice(&chunk.to_bytes());
        }
        buf.extend_from_slice(&self.original_file_size.to_le_bytes());
        buf.extend_from_slice(&footer_size.to_le_bytes());
        writer.write_all(&buf)?;
        Ok(footer_size)
    }

    /// Locate and parse the footer at the end of `reader`.
    ///
    /// # Read sequence
    /// 1. Seek to `end - 8`, read `footer_size`.
    /// 2. Check it is at least 16, a whole number of records, and no larger
    ///    than the stream.
    /// 3. Seek to `end - footer_size`, read the whole trailer in one call.
    /// 4. Check the recorded original size against the sum of chunk lengths.
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let stream_len = reader
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::format(format!("footer requires a seekable input: {e}")))?;
        if stream_len < FOOTER_TAIL_SIZE {
            return Err(Error::format(format!(
                "input is {stream_len} bytes, too short to hold a footer"
            )));
        }

        reader.seek(SeekFrom::End(-8))?;
        let mut size_buf = [0u8; 8];
        reader.read_exact(&mut size_buf)?;
        let footer_size = u64::from_le_bytes(size_buf);

        if footer_size < FOOTER_TAIL_SIZE
            || (footer_size - FOOTER_TAIL_SIZE) % CHUNK_RECORD_SIZE != 0
        {
            return Err(Error::format(format!(
                "footer size {footer_size} is not 16 + a multiple of {CHUNK_RECORD_SIZE}"
            )));
        }
        if footer_size > stream_len {
            return Err(Error::format(format!(
                "footer size {footer_size} exceeds input length {stream_len}"
            )));
        }

        reader.seek(SeekFrom::Start(stream_len - footer_size))?;
        let mut footer = vec![0u8; footer_size as usize];
        reader.read_exact(&mut footer)?;

        let chunk_count = ((footer_size - FOOTER_TAIL_SIZE) / CHUNK_RECORD_SIZE) as usize;
        let mut index = ChunkIndex {
            chunks: Vec::with_capacity(chunk_count),
            original_file_size: 0,
        };
        let mut record = [0u8; CHUNK_RECORD_SIZE as usize];
        for raw in footer.chunks_exact(CHUNK_RECORD_SIZE as usize).take(chunk_count) {
            record.copy_from_slice(raw);
            let chunk = ChunkInfo::from_bytes(&record);
            index
                .push(chunk)
                .map_err(|_| Error::format("chunk lengths overflow the original size"))?;
        }

        let recorded = le_u64(&footer, chunk_count * CHUNK_RECORD_SIZE as usize);
        if recorded != index.original_file_size {
            return Err(Error::format(format!(
                "footer records original size {recorded} but its chunks sum to {}",
                index.original_file_size
            )));
        }

        Ok(index)
    }

    /// Read the footer of a complete archive and check its chunk layout
    /// against the data region that precedes it.
    pub fn read_archive<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let index = Self::read_from(reader)?;
        let stream_len = reader.seek(SeekFrom::End(0))?;
        index.validate_layout(stream_len - index.footer_size())?;
        Ok(index)
    }

    /// Check that the chunks describe a usable archive whose compressed data
    /// occupies `data_len` bytes: every compressed range lies inside
    /// `[0, data_len)` and the original ranges tile `[0, original_file_size)`
    /// with no gap or overlap.
    pub fn validate_layout(&self, data_len: u64) -> Result<()> {
        for chunk in &self.chunks {
            let end = chunk.compressed_start.checked_add(chunk.compressed_length);
            if chunk.compressed_length == 0 || end.map_or(true, |end| end > data_len) {
                return Err(Error::format(format!(
                    "chunk at compressed offset {} (length {}) lies outside the {data_len}-byte data region",
                    chunk.compressed_start, chunk.compressed_length
                )));
            }
        }

        let mut by_original = self.chunks.clone();
        by_original.sort_by_key(|c| c.original_start);
        let mut expected = 0u64;
        for chunk in &by_original {
            if chunk.original_start != expected {
                return Err(Error::format(format!(
                    "chunk ranges do not tile the original file: expected a chunk at offset {expected}, found {}",
                    chunk.original_start
                )));
            }
            expected += chunk.original_length;
        }
        Ok(())
    }

    fn canonical(&self) -> Vec<ChunkInfo> {
        let mut sorted = self.chunks.clone();
        sorted.sort_unstable();
        sorted
    }
}

impl PartialEq for ChunkIndex {
    fn eq(&self, other: &Self) -> bool {
        self.original_file_size == other.original_file_size
            && self.chunks.len() == other.chunks.len()
            && self.canonical() == other.canonical()
    }
}

impl Eq for ChunkIndex {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_index() -> ChunkIndex {
        let mut index = ChunkIndex::new();
        index.add_chunk(5, 5, 10, 10).unwrap();
        index.add_chunk(5, 5, 10, 10).unwrap();
        index.add_chunk(100, 200, 300, 400).unwrap();
        index
    }

    fn footer_bytes(index: &ChunkIndex) -> Vec<u8> {
        let mut out = Vec::new();
        index.write_to(&mut out).unwrap();
        out
    }

    #[test]
    fn footer_roundtrip_with_duplicates() {
        let original = sample_index();
        assert_eq!(original.original_file_size(), 320);

        let mut stream = Cursor::new(Vec::new());
        let written = original.write_to(&mut stream).unwrap();
        assert_eq!(written, original.footer_size());
        assert_eq!(stream.position(), original.footer_size());

        let restored = ChunkIndex::read_from(&mut stream).unwrap();
        assert_eq!(restored, original);
        assert_eq!(restored.original_file_size(), 320);
    }

    #[test]
    fn footer_size_law() {
        let mut index = ChunkIndex::new();
        assert_eq!(index.footer_size(), 16);
        for k in 1..=5u64 {
            index.add_chunk(k, k, 1, 1).unwrap();
            assert_eq!(index.footer_size(), 32 * k + 16);
            assert_eq!(footer_bytes(&index).len() as u64, 32 * k + 16);
        }
    }

    #[test]
    fn differing_compressed_length_is_unequal() {
        let mut a = ChunkIndex::new();
        let mut b = ChunkIndex::new();
        a.add_chunk(5, 5, 10, 10).unwrap();
        b.add_chunk(5, 5, 10, 10).unwrap();
        assert_eq!(a, b);

        a.add_chunk(5, 5, 10, 10).unwrap();
        b.add_chunk(5, 5, 10, 11).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let mut a = ChunkIndex::new();
        a.add_chunk(0, 0, 10, 4).unwrap();
        a.add_chunk(10, 4, 10, 6).unwrap();
        let mut b = ChunkIndex::new();
        b.add_chunk(10, 4, 10, 6).unwrap();
        b.add_chunk(0, 0, 10, 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn records_are_written_in_compressed_order() {
        let mut index = ChunkIndex::new();
        index.add_chunk(20, 90, 10, 30).unwrap();
        index.add_chunk(0, 0, 10, 50).unwrap();
        index.add_chunk(10, 50, 10, 40).unwrap();

        let bytes = footer_bytes(&index);
        let starts: Vec<u64> = (0..index.len())
            .map(|i| le_u64(&bytes, i * CHUNK_RECORD_SIZE as usize + 8))
            .collect();
        assert_eq!(starts, vec![0, 50, 90]);

        let restored = ChunkIndex::read_from(&mut Cursor::new(bytes)).unwrap();
        let order: Vec<u64> = restored.chunks().iter().map(|c| c.compressed_start).collect();
        assert_eq!(order, vec![0, 50, 90]);
    }

    #[test]
    fn footer_after_payload_is_found_from_the_end() {
        let index = sample_index();
        let mut archive = vec![0xAB; 1000];
        index.write_to(&mut archive).unwrap();
        let restored = ChunkIndex::read_from(&mut Cursor::new(archive)).unwrap();
        assert_eq!(restored, index);
    }

    #[test]
    fn empty_index_roundtrip() {
        let index = ChunkIndex::new();
        let bytes = footer_bytes(&index);
        assert_eq!(bytes.len(), 16);
        let restored = ChunkIndex::read_from(&mut Cursor::new(bytes)).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.original_file_size(), 0);
    }

    #[test]
    fn rejects_short_input() {
        let err = ChunkIndex::read_from(&mut Cursor::new(vec![0u8; 7])).unwrap_err();
        assert!(matches!(err, Error::Format(_)), "{err}");
    }

    #[test]
    fn rejects_misaligned_footer_size() {
        let mut bytes = footer_bytes(&sample_index());
        let len = bytes.len();
        bytes[len - 8..].copy_from_slice(&(16u64 + 33).to_le_bytes());
        let err = ChunkIndex::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("multiple"), "{err}");
    }

    #[test]
    fn rejects_footer_larger_than_input() {
        let mut bytes = footer_bytes(&sample_index());
        let len = bytes.len();
        bytes[len - 8..].copy_from_slice(&(16u64 + 32 * 1000).to_le_bytes());
        let err = ChunkIndex::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{err}");
    }

    #[test]
    fn rejects_inconsistent_original_size() {
        let mut bytes = footer_bytes(&sample_index());
        let at = bytes.len() - 16;
        bytes[at..at + 8].copy_from_slice(&999u64.to_le_bytes());
        let err = ChunkIndex::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("sum"), "{err}");
    }

    #[test]
    fn layout_accepts_compressor_output() {
        let mut index = ChunkIndex::new();
        index.add_chunk(10, 0, 10, 7).unwrap();
        index.add_chunk(0, 7, 10, 5).unwrap();
        index.validate_layout(12).unwrap();
    }

    #[test]
    fn layout_rejects_out_of_range_and_gaps() {
        let mut index = ChunkIndex::new();
        index.add_chunk(0, 0, 10, 7).unwrap();
        index.add_chunk(10, 7, 10, 5).unwrap();
        assert!(index.validate_layout(11).is_err());

        let mut gapped = ChunkIndex::new();
        gapped.add_chunk(0, 0, 10, 7).unwrap();
        gapped.add_chunk(12, 7, 10, 5).unwrap();
        let err = gapped.validate_layout(12).unwrap_err();
        assert!(err.to_string().contains("tile"), "{err}");

        let mut overflowing = ChunkIndex::new();
        overflowing.add_chunk(0, u64::MAX, 10, 7).unwrap();
        assert!(overflowing.validate_layout(u64::MAX).is_err());
    }

    #[test]
    fn push_refuses_an_overflowing_original_size() {
        let mut index = ChunkIndex::new();
        index.add_chunk(0, 0, u64::MAX - 5, 3).unwrap();
        let err = index.add_chunk(u64::MAX - 5, 3, 10, 3).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
        assert_eq!(index.len(), 1);
        assert_eq!(index.original_file_size(), u64::MAX - 5);
    }
}
