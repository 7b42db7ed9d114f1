#![no_main]

use bedrock_client::core::codec::{BatchDecoder, FrameCodec};
use bedrock_client::core::registry::PacketRegistry;
use bedrock_client::utils::compression::CompressionKind;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let registry = Arc::new(PacketRegistry::default());

    // Untrusted batch frames, plain and encrypted
    for kind in [CompressionKind::None, CompressionKind::Flate] {
        let _ = BatchDecoder::new(kind, registry.clone())
            .with_limits(1 << 20, 256)
            .decode(data);

        let mut encrypted = BatchDecoder::new(kind, registry.clone());
        if encrypted.enable_encryption(&[0x42; 32]).is_ok() {
            let _ = encrypted.decode(data);
        }
    }

    // Stream framing
    let mut codec = FrameCodec::new(1 << 20);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
});
