//! Compact ES384 JSON Web Tokens.
//!
//! Bedrock signs every token in the login chain and the server handshake with
//! P-384 ECDSA. The signer's public key travels in the `x5u` header as base64 DER
//! (SubjectPublicKeyInfo); signatures are raw `r ‖ s` (96 bytes).

use crate::error::{constants, ProtocolError, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use p384::ecdsa::signature::{Signer, Verifier};
use p384::ecdsa::{Signature, SigningKey, VerifyingKey};
use p384::pkcs8::{DecodePublicKey, EncodePublicKey};
use p384::PublicKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const ALGORITHM: &str = "ES384";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5u: Option<String>,
}

/// Base64 DER encoding of `key`, as used in `x5u` and `identityPublicKey`
pub fn encode_public_key(key: &VerifyingKey) -> Result<String> {
    let der = PublicKey::from(key)
        .to_public_key_der()
        .map_err(|e| ProtocolError::CryptoError(format!("Failed to encode public key: {e}")))?;
    Ok(STANDARD.encode(der.as_bytes()))
}

/// Inverse of [`encode_public_key`]
pub fn decode_public_key(encoded: &str) -> Result<PublicKey> {
    let der = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ProtocolError::CryptoError(format!("Invalid public key encoding: {e}")))?;
    PublicKey::from_public_key_der(&der)
        .map_err(|e| ProtocolError::CryptoError(format!("Invalid public key: {e}")))
}

/// Sign `claims` with `key`, putting the matching public key in `x5u`
pub fn encode<T: Serialize>(claims: &T, key: &SigningKey) -> Result<String> {
    let header = JwtHeader {
        alg: ALGORITHM.to_string(),
        x5u: Some(encode_public_key(key.verifying_key())?),
    };
    let header = serde_json::to_vec(&header)
        .map_err(|e| ProtocolError::EncodeError(format!("JWT header: {e}")))?;
    let claims = serde_json::to_vec(claims)
        .map_err(|e| ProtocolError::EncodeError(format!("JWT claims: {e}")))?;

    let mut token = URL_SAFE_NO_PAD.encode(header);
    token.push('.');
    token.push_str(&URL_SAFE_NO_PAD.encode(claims));

    let signature: Signature = key.sign(token.as_bytes());
    token.push('.');
    token.push_str(&URL_SAFE_NO_PAD.encode(signature.to_bytes()));
    Ok(token)
}

struct Parts<'a> {
    signing_input: &'a str,
    header: &'a str,
    claims: &'a str,
    signature: &'a str,
}

fn split(token: &str) -> Result<Parts<'_>> {
    let malformed = || ProtocolError::DecodeError(constants::ERR_MALFORMED_TOKEN.into());
    let (signing_input, signature) = token.rsplit_once('.').ok_or_else(malformed)?;
    let (header, claims) = signing_input.split_once('.').ok_or_else(malformed)?;
    if claims.contains('.') {
        return Err(malformed());
    }
    Ok(Parts {
        signing_input,
        header,
        claims,
        signature,
    })
}

fn segment<T: DeserializeOwned>(segment: &str) -> Result<T> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| ProtocolError::DecodeError(format!("{}: {e}", constants::ERR_MALFORMED_TOKEN)))?;
    serde_json::from_slice(&raw)
        .map_err(|e| ProtocolError::DecodeError(format!("{}: {e}", constants::ERR_MALFORMED_TOKEN)))
}

/// Read header and claims without checking the signature
pub fn decode_unverified<T: DeserializeOwned>(token: &str) -> Result<(JwtHeader, T)> {
    let parts = split(token)?;
    Ok((segment(parts.header)?, segment(parts.claims)?))
}

/// Verify `token` against `key` and return its claims
pub fn verify_with<T: DeserializeOwned>(token: &str, key: &PublicKey) -> Result<T> {
    let parts = split(token)?;
    let header: JwtHeader = segment(parts.header)?;
    if header.alg != ALGORITHM {
        return Err(ProtocolError::CryptoError(format!(
            "Unsupported JWT algorithm {}",
            header.alg
        )));
    }

    let raw_signature = URL_SAFE_NO_PAD
        .decode(parts.signature.trim_end_matches('='))
        .map_err(|_| ProtocolError::CryptoError(constants::ERR_BAD_SIGNATURE.into()))?;
    let signature = Signature::from_slice(&raw_signature)
        .map_err(|_| ProtocolError::CryptoError(constants::ERR_BAD_SIGNATURE.into()))?;
    VerifyingKey::from(key)
        .verify(parts.signing_input.as_bytes(), &signature)
        .map_err(|_| ProtocolError::CryptoError(constants::ERR_BAD_SIGNATURE.into()))?;

    segment(parts.claims)
}

/// Verify `token` against the key in its own `x5u` header.
///
/// Returns the signer's key together with the claims.
pub fn verify<T: DeserializeOwned>(token: &str) -> Result<(PublicKey, T)> {
    let parts = split(token)?;
    let header: JwtHeader = segment(parts.header)?;
    let x5u = header
        .x5u
        .ok_or_else(|| ProtocolError::CryptoError(constants::ERR_MISSING_X5U.into()))?;
    let key = decode_public_key(&x5u)?;
    let claims = verify_with(token, &key)?;
    Ok((key, claims))
}
