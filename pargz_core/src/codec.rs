/// Single-chunk compression primitive.
///
/// Each `Codec` implementation:
/// - Must compress/decompress individual chunks independently. No
///   cross-chunk state is permitted; parallel and random-access
///   decompression depend on it.
/// - Must produce a self-contained unit: `decompress_chunk(compress_chunk(x)) == x`.
///
/// The footer carries no codec tag, so the same codec has to be handed to the
/// compressor and to whichever decompressor reads the archive back.
pub trait Codec: Send + Sync {
    /// Human-readable codec name for CLI display and lookup.
    fn name(&self) -> &'static str;

    /// Compress a single independent chunk.
    fn compress_chunk(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// Decompress a single independent chunk.
    ///
    /// `size_hint` is the original length recorded in the footer; codecs may
    /// use it to pre-size their output buffer.
    fn decompress_chunk(&self, compressed: &[u8], size_hint: usize) -> anyhow::Result<Vec<u8>>;
}

/// Largest expansion a deflate stream can achieve.
pub const MAX_DEFLATE_RATIO: usize = 1032;

/// Output buffer to reserve before decoding `compressed_len` bytes whose
/// footer records `size_hint` original bytes.
///
/// The hint comes from the archive and is not trusted beyond what the input
/// could plausibly expand to; the buffer still grows past this if needed.
pub fn initial_capacity(compressed_len: usize, size_hint: usize) -> usize {
    size_hint.min(compressed_len.saturating_mul(MAX_DEFLATE_RATIO))
}

/// Read limit for decoding a chunk recorded as `size_hint` bytes: one byte
/// more than recorded, so an oversized chunk is caught without decoding it in
/// full.
pub fn decode_limit(size_hint: usize) -> u64 {
    (size_hint as u64).saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_hint_never_drives_the_reservation() {
        assert_eq!(initial_capacity(100, 5_000), 5_000);
        assert_eq!(initial_capacity(5, 1 << 62), 5 * MAX_DEFLATE_RATIO);
        assert_eq!(initial_capacity(0, 1 << 40), 0);
    }

    #[test]
    fn limit_reads_one_past_the_hint() {
        assert_eq!(decode_limit(10), 11);
        assert_eq!(decode_limit(usize::MAX), (usize::MAX as u64).saturating_add(1));
    }
}
