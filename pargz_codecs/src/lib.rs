mod gzip_codec;
mod lz4_codec;
mod passthrough;
mod zstd_codec;

pub use gzip_codec::GzipCodec;
pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use zstd_codec::ZstdCodec;

use pargz_core::Codec;
use std::sync::Arc;

/// Codec names accepted by [`codec_by_name`].
pub const CODEC_NAMES: &[&str] = &["gzip", "zstd", "lz4", "passthrough"];

/// Resolve a codec from its name.
///
/// Archives carry no codec tag, so the CLI asks for the codec by name on both
/// the compress and the decompress side. `level` overrides the codec's
/// default level where the codec has one.
pub fn codec_by_name(name: &str, level: Option<i32>) -> anyhow::Result<Arc<dyn Codec>> {
    match name {
        "gzip" | "gz" => {
            let level = match level {
                Some(l) if !(0..=9).contains(&l) => {
                    anyhow::bail!("gzip level must be between 0 and 9, got {}", l)
                }
                Some(l) => l as u32,
                None => GzipCodec::default().level,
            };
            Ok(Arc::new(GzipCodec::new(level)))
        }
        "zstd" | "z" => Ok(Arc::new(level.map_or_else(ZstdCodec::default, ZstdCodec::new))),
        "lz4" | "l" => Ok(Arc::new(Lz4Codec)),
        "passthrough" | "pass" | "none" => Ok(Arc::new(PassThroughCodec)),
        other => anyhow::bail!(
            "unknown codec '{}'. Valid options: {}",
            other,
            CODEC_NAMES.join(", ")
        ),
    }
}
