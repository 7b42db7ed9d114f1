//! Login request assembly.
//!
//! The `Login` packet carries a connection request made of two length-prefixed
//! (little-endian `i32`) parts: the identity chain as JSON (`{"chain":[...]}`) and
//! the client data as a signed JWT.

use crate::config::GAME_VERSION;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::jwt;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use p384::ecdsa::SigningKey;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::{Builder, Uuid};

/// Windows 10
pub const DEVICE_OS_WIN10: i32 = 7;
/// Size of the blank 64x32 RGBA skin sent by default
pub const DEFAULT_SKIN_SIZE: usize = 32 * 64 * 4;
/// Token lifetime used for self-signed chain entries
const TOKEN_LIFETIME_SECS: i64 = 6 * 60 * 60;

/// Client-side metadata sent with the login request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ClientData {
    pub cape_data: String,
    pub client_random_id: i64,
    pub current_input_mode: i32,
    pub default_input_mode: i32,
    pub device_id: String,
    pub device_model: String,
    #[serde(rename = "DeviceOS")]
    pub device_os: i32,
    pub game_version: String,
    pub gui_scale: i32,
    pub language_code: String,
    pub platform_offline_id: String,
    pub platform_online_id: String,
    pub premium_skin: bool,
    pub self_signed_id: String,
    pub server_address: String,
    pub skin_data: String,
    pub skin_geometry: String,
    pub skin_geometry_name: String,
    pub skin_id: String,
    pub third_party_name: String,
    #[serde(rename = "UIProfile")]
    pub ui_profile: i32,
}

fn random_uuid<R: RngCore + ?Sized>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    Builder::from_random_bytes(bytes).into_uuid()
}

impl ClientData {
    /// Plausible default client data for a Windows 10 client connecting to `address`.
    ///
    /// Every random field is drawn from `rng`, so a seeded RNG gives reproducible data.
    pub fn generate<R: Rng + ?Sized>(address: &str, language_code: &str, rng: &mut R) -> Self {
        Self {
            client_random_id: rng.random::<i64>() & i64::MAX,
            device_os: DEVICE_OS_WIN10,
            game_version: GAME_VERSION.to_string(),
            device_id: random_uuid(rng).to_string(),
            language_code: language_code.to_string(),
            third_party_name: "Steve".to_string(),
            self_signed_id: random_uuid(rng).to_string(),
            skin_geometry_name: "geometry.humanoid".to_string(),
            server_address: address.to_string(),
            skin_id: random_uuid(rng).to_string(),
            skin_data: STANDARD.encode(vec![0u8; DEFAULT_SKIN_SIZE]),
            ..Self::default()
        }
    }
}

/// Identity of the logged-in player, taken from the chain's `extraData`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityData {
    #[serde(rename = "XUID", default)]
    pub xuid: String,
    #[serde(default)]
    pub identity: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "titleId", default, skip_serializing_if = "Option::is_none")]
    pub title_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chain {
    pub chain: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdentityClaims {
    #[serde(rename = "extraData")]
    extra_data: IdentityData,
    #[serde(rename = "identityPublicKey")]
    identity_public_key: String,
    nbf: i64,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CertificateClaims {
    #[serde(rename = "certificateAuthority")]
    certificate_authority: bool,
    #[serde(rename = "identityPublicKey")]
    identity_public_key: String,
    nbf: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct ExtraDataClaims {
    #[serde(rename = "extraData")]
    extra_data: Option<IdentityData>,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// A chain holding one self-signed identity token, for offline-mode servers
pub fn self_signed_chain(identity: &IdentityData, key: &SigningKey) -> Result<Chain> {
    let now = unix_now();
    let claims = IdentityClaims {
        extra_data: identity.clone(),
        identity_public_key: jwt::encode_public_key(key.verifying_key())?,
        nbf: now - 60,
        exp: now + TOKEN_LIFETIME_SECS,
    };
    Ok(Chain {
        chain: vec![jwt::encode(&claims, key)?],
    })
}

/// Prepend a token signed by `key` that vouches for the chain's first signer.
///
/// `chain_data` is the JSON returned by the account token exchange.
pub fn authenticated_chain(chain_data: &str, key: &SigningKey) -> Result<Chain> {
    let mut chain: Chain = serde_json::from_str(chain_data)
        .map_err(|e| ProtocolError::DecodeError(format!("Invalid chain data: {e}")))?;
    let first = chain
        .chain
        .first()
        .ok_or_else(|| ProtocolError::DecodeError("Chain data holds no tokens".into()))?;
    let (header, _): (jwt::JwtHeader, serde_json::Value) = jwt::decode_unverified(first)?;
    let x5u = header
        .x5u
        .ok_or_else(|| ProtocolError::DecodeError(constants::ERR_MISSING_X5U.into()))?;

    let now = unix_now();
    let claims = CertificateClaims {
        certificate_authority: true,
        identity_public_key: x5u,
        nbf: now - 60,
        exp: now + TOKEN_LIFETIME_SECS,
    };
    chain.chain.insert(0, jwt::encode(&claims, key)?);
    Ok(chain)
}

/// The last `extraData` found in the chain, which is the player's identity
pub fn identity_from_chain(chain: &Chain) -> Result<IdentityData> {
    let mut identity = None;
    for token in &chain.chain {
        let (_, claims): (jwt::JwtHeader, ExtraDataClaims) = jwt::decode_unverified(token)?;
        if let Some(extra) = claims.extra_data {
            identity = Some(extra);
        }
    }
    identity.ok_or_else(|| ProtocolError::DecodeError("Chain carries no identity data".into()))
}

/// Identity used when no account is involved
pub fn offline_identity<R: RngCore + ?Sized>(client_data: &ClientData, rng: &mut R) -> IdentityData {
    IdentityData {
        xuid: String::new(),
        identity: random_uuid(rng).to_string(),
        display_name: client_data.third_party_name.clone(),
        title_id: None,
    }
}

/// Build the connection request bytes carried by the `Login` packet
pub fn encode_request(chain: &Chain, client_data: &ClientData, key: &SigningKey) -> Result<Bytes> {
    let chain_json = serde_json::to_vec(chain)
        .map_err(|e| ProtocolError::EncodeError(format!("Chain: {e}")))?;
    let client_jwt = jwt::encode(client_data, key)?;

    let mut buf = BytesMut::with_capacity(8 + chain_json.len() + client_jwt.len());
    buf.put_i32_le(chain_json.len() as i32);
    buf.put_slice(&chain_json);
    buf.put_i32_le(client_jwt.len() as i32);
    buf.put_slice(client_jwt.as_bytes());
    Ok(buf.freeze())
}

/// Split a connection request back into its chain and client data token
pub fn decode_request(request: &[u8]) -> Result<(Chain, String)> {
    fn part(buf: &[u8]) -> Result<(&[u8], &[u8])> {
        if buf.len() < 4 {
            return Err(ProtocolError::DecodeError(constants::ERR_TRUNCATED.into()));
        }
        let len = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let len = usize::try_from(len)
            .map_err(|_| ProtocolError::DecodeError("Negative request length".into()))?;
        let rest = &buf[4..];
        if rest.len() < len {
            return Err(ProtocolError::DecodeError(constants::ERR_TRUNCATED.into()));
        }
        Ok(rest.split_at(len))
    }

    let (chain_json, rest) = part(request)?;
    let (client_jwt, _) = part(rest)?;
    let chain = serde_json::from_slice(chain_json)
        .map_err(|e| ProtocolError::DecodeError(format!("Invalid chain: {e}")))?;
    let client_jwt = String::from_utf8(client_jwt.to_vec())
        .map_err(|e| ProtocolError::DecodeError(format!("Invalid client data token: {e}")))?;
    Ok((chain, client_jwt))
}
