use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use pargz_core::Codec;

/// LZ4 block codec.
///
/// Fastest decompression of all bundled codecs. Best when decode speed
/// matters more than size reduction.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress_chunk(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(compress_prepend_size(raw))
    }

    fn decompress_chunk(&self, compressed: &[u8], size_hint: usize) -> anyhow::Result<Vec<u8>> {
        // Block layout: [uncompressed_len: u32 LE][lz4 block]. The decoder
        // allocates the declared length up front.
        let declared = match compressed.get(..4) {
            Some(prefix) => u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize,
            None => anyhow::bail!("lz4 chunk is {} bytes, too short for its size prefix", compressed.len()),
        };
        if declared > size_hint {
            anyhow::bail!(
                "lz4 chunk declares {} bytes but the footer records {}",
                declared,
                size_hint
            );
        }
        let raw = decompress_size_prepended(compressed)
            .map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))?;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_size_above_hint_is_refused() {
        let compressed = Lz4Codec.compress_chunk(&[3u8; 4096]).unwrap();
        assert_eq!(Lz4Codec.decompress_chunk(&compressed, 4096).unwrap().len(), 4096);
        let err = Lz4Codec.decompress_chunk(&compressed, 100).unwrap_err();
        assert!(err.to_string().contains("declares"), "{err}");
        assert!(Lz4Codec.decompress_chunk(&[1, 2], 100).is_err());
    }
}
