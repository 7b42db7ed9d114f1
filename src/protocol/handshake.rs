//! Encryption handshake using P-384 Elliptic Curve Diffie-Hellman (ECDH).
//!
//! After the login the server answers with a `ServerToClientHandshake` carrying a JWT
//! signed by its own key. The token's `x5u` header holds the server public key and
//! its claims a base64 `salt`. Both sides then derive
//! `key = SHA-256(salt ‖ ECDH(client, server))`.
//!
//! Key material lives in [`SessionKey`], which is zeroized on drop. Nothing here is
//! global; each session passes its own signing key through.

use crate::core::packet::ServerToClientHandshake;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::jwt;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use bytes::Bytes;
use p384::ecdsa::SigningKey;
use p384::PublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

#[allow(unused_imports)]
use tracing::{debug, instrument, warn};

/// Symmetric key negotiated by the handshake
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HandshakeClaims {
    salt: String,
}

/// Derive the session key from our secret, the peer's public key and the salt
fn derive_key(secret: &SigningKey, peer: &PublicKey, salt: &[u8]) -> SessionKey {
    let shared = p384::ecdh::diffie_hellman(secret.as_nonzero_scalar(), peer.as_affine());

    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(shared.raw_secret_bytes());
    SessionKey(hasher.finalize().into())
}

fn decode_salt(salt: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(salt)
        .or_else(|_| STANDARD_NO_PAD.decode(salt.trim_end_matches('=')))
        .map_err(|e| ProtocolError::HandshakeError(format!("Invalid salt encoding: {e}")))
}

/// Client verifies the server's handshake token and derives the session key.
///
/// # Errors
/// Returns `ProtocolError::HandshakeError` if the token is malformed, its signature does
/// not verify under its `x5u` key, or it carries no salt
#[instrument(skip_all)]
pub fn client_handshake_verify(client_key: &SigningKey, token: &[u8]) -> Result<SessionKey> {
    let token = std::str::from_utf8(token)
        .map_err(|_| ProtocolError::HandshakeError(constants::ERR_MALFORMED_TOKEN.into()))?;

    let (server_key, claims): (PublicKey, serde_json::Value) =
        jwt::verify(token).map_err(|e| match e {
            ProtocolError::CryptoError(reason) | ProtocolError::DecodeError(reason) => {
                ProtocolError::HandshakeError(reason)
            }
            other => other,
        })?;

    let salt = claims
        .get("salt")
        .and_then(|salt| salt.as_str())
        .ok_or_else(|| ProtocolError::HandshakeError(constants::ERR_MISSING_SALT.into()))?;
    let mut salt = decode_salt(salt)?;

    let key = derive_key(client_key, &server_key, &salt);
    salt.zeroize();

    debug!("Client derived session key from server handshake");
    Ok(key)
}

/// Server side of the exchange: sign a handshake token for `client_public`.
///
/// Returns the packet to send together with the key both sides will use.
#[instrument(skip_all)]
pub fn server_handshake_init(
    server_key: &SigningKey,
    client_public: &PublicKey,
    salt: &[u8],
) -> Result<(ServerToClientHandshake, SessionKey)> {
    let claims = HandshakeClaims {
        salt: STANDARD.encode(salt),
    };
    let token = jwt::encode(&claims, server_key)?;
    let key = derive_key(server_key, client_public, salt);

    debug!("Server signed handshake token");
    Ok((
        ServerToClientHandshake {
            jwt: Bytes::from(token.into_bytes()),
        },
        key,
    ))
}
