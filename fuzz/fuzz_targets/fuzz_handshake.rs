#![no_main]

use bedrock_client::protocol::handshake::client_handshake_verify;
use bedrock_client::protocol::login::decode_request;
use libfuzzer_sys::fuzz_target;
use p384::ecdsa::SigningKey;

fuzz_target!(|data: &[u8]| {
    // A fixed scalar keeps runs reproducible
    let Ok(key) = SigningKey::from_slice(&[0x11; 48]) else {
        return;
    };
    let _ = client_handshake_verify(&key, data);
    let _ = decode_request(data);
});
