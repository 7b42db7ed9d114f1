//! Account token exchange.
//!
//! Signing in to an account is a three-stage exchange (Live token, XSTS token, signed
//! Minecraft chain) against external services. This crate does not talk to those
//! services itself; callers plug in an [`Authenticator`]. The dialer runs the stages
//! in order and tags any failure with the stage it happened in.

use crate::error::{AuthStage, BoxError, ProtocolError, Result};
use futures::future::BoxFuture;
use p384::ecdsa::VerifyingKey;
use std::fmt;
use tracing::{debug, instrument};

/// Account email and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The three stages of the account token exchange.
pub trait Authenticator: Send + Sync {
    fn live_token<'a>(&'a self, credentials: &'a Credentials) -> BoxFuture<'a, std::result::Result<String, BoxError>>;

    fn xsts_token<'a>(&'a self, live_token: &'a str) -> BoxFuture<'a, std::result::Result<String, BoxError>>;

    /// Returns the chain JSON (`{"chain":[...]}`) vouching for `key`
    fn minecraft_chain<'a>(
        &'a self,
        xsts_token: &'a str,
        key: &'a VerifyingKey,
    ) -> BoxFuture<'a, std::result::Result<String, BoxError>>;
}

fn stage_error(stage: AuthStage) -> impl FnOnce(BoxError) -> ProtocolError {
    move |e| ProtocolError::Authentication {
        stage,
        reason: e.to_string(),
    }
}

/// Run every stage and return the Minecraft chain JSON
#[instrument(skip_all, fields(email = %credentials.email))]
pub async fn auth_chain(
    authenticator: &dyn Authenticator,
    credentials: &Credentials,
    key: &VerifyingKey,
) -> Result<String> {
    let live = authenticator
        .live_token(credentials)
        .await
        .map_err(stage_error(AuthStage::LiveToken))?;
    debug!("Obtained Live token");

    let xsts = authenticator
        .xsts_token(&live)
        .await
        .map_err(stage_error(AuthStage::XstsToken))?;
    debug!("Obtained XSTS token");

    let chain = authenticator
        .minecraft_chain(&xsts, key)
        .await
        .map_err(stage_error(AuthStage::MinecraftChain))?;
    debug!("Obtained Minecraft chain");
    Ok(chain)
}
