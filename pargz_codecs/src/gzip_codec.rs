use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pargz_core::codec::{decode_limit, initial_capacity};
use pargz_core::Codec;

/// Gzip chunk codec (the default).
///
/// Every chunk becomes one complete, standard gzip member, so each chunk on
/// its own can be handed to any gzip decoder.
///
/// Best for: interchange with existing gzip tooling.
pub struct GzipCodec {
    /// Deflate level (0 = store, 9 = smallest).
    pub level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCodec {
    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

impl Codec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress_chunk(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(raw.len() / 2 + 64),
            Compression::new(self.level),
        );
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }

    fn decompress_chunk(&self, compressed: &[u8], size_hint: usize) -> anyhow::Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(initial_capacity(compressed.len(), size_hint));
        GzDecoder::new(compressed)
            .take(decode_limit(size_hint))
            .read_to_end(&mut raw)
            .map_err(|e| anyhow::anyhow!("gzip decompress error: {}", e))?;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_is_a_standalone_gzip_member() {
        let data = b"ABAB AB ABAB AB ABAB xx";
        let compressed = GzipCodec::default().compress_chunk(data).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b], "gzip magic");

        let mut plain = Vec::new();
        GzDecoder::new(&compressed[..]).read_to_end(&mut plain).unwrap();
        assert_eq!(plain, data);
    }

    #[test]
    fn corrupt_input_is_an_error() {
        let err = GzipCodec::default()
            .decompress_chunk(b"definitely not gzip", 0)
            .unwrap_err();
        assert!(err.to_string().contains("gzip"), "{err}");
    }

    #[test]
    fn decoding_stops_one_byte_past_the_hint() {
        let codec = GzipCodec::default();
        let compressed = codec.compress_chunk(&vec![0u8; 1_000_000]).unwrap();
        let raw = codec.decompress_chunk(&compressed, 10).unwrap();
        assert_eq!(raw.len(), 11);
    }

    #[test]
    fn oversized_hint_is_not_reserved() {
        let codec = GzipCodec::default();
        let compressed = codec.compress_chunk(b"hello").unwrap();
        let raw = codec.decompress_chunk(&compressed, 1 << 62).unwrap();
        assert_eq!(raw, b"hello");
    }
}
