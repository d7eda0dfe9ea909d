use pargz_core::Codec;

/// No-op codec: stores chunks verbatim.
///
/// Useful for exercising the container format independently of any
/// compressor, and for inputs that are already compressed.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress_chunk(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_chunk(&self, compressed: &[u8], _size_hint: usize) -> anyhow::Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}
