#![no_main]

use bedrock_client::utils::compression::{compress, decompress, CompressionKind};
use libfuzzer_sys::fuzz_target;

const LIMIT: usize = 1 << 20;

fuzz_target!(|data: &[u8]| {
    for kind in [CompressionKind::Flate, CompressionKind::Lz4, CompressionKind::Zstd] {
        if let Ok(compressed) = compress(data, &kind, 3) {
            let _ = decompress(&compressed, &kind, LIMIT);
        }

        // Malformed input must fail within the output limit
        let _ = decompress(data, &kind, LIMIT);
    }
});
