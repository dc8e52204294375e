//! Upload token handling.
//!
//! Only a SHA-256 digest of the token is kept, in memory and in the settings
//! table.

use base64::{Engine as _, engine::general_purpose};
use ring::digest::{SHA256, digest};
use uuid::Uuid;

use crate::db::StoreError;
use crate::metadata::MetadataStore;

/// Digest of the shared upload secret.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadToken {
    digest: String,
}

impl std::fmt::Debug for UploadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadToken").finish_non_exhaustive()
    }
}

impl UploadToken {
    /// Build from the plain secret.
    pub fn from_secret(secret: &str) -> Self {
        Self {
            digest: digest_token(secret),
        }
    }

    /// Build from a previously stored digest.
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
        }
    }

    /// Base64 digest of the secret.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Whether a candidate from a request matches the secret.
    pub fn verify(&self, candidate: Option<&str>) -> bool {
        candidate.is_some_and(|candidate| digest_token(candidate) == self.digest)
    }
}

/// Base64-encoded SHA-256 digest of a token.
pub fn digest_token(token: &str) -> String {
    general_purpose::STANDARD.encode(digest(&SHA256, token.as_bytes()))
}

/// Resolve the upload token at startup.
///
/// A configured token always wins and replaces the stored digest. Without
/// one the stored digest is reused; on a fresh store a random token is
/// generated and logged so the operator can pick it up.
pub fn initialize_token(
    store: &dyn MetadataStore,
    configured: Option<&str>,
) -> Result<UploadToken, StoreError> {
    if let Some(secret) = configured {
        let token = UploadToken::from_secret(secret);
        store.store_token_digest(token.digest())?;
        log::debug!("using configured upload token");
        return Ok(token);
    }

    if let Some(stored) = store.load_token_digest()? {
        log::debug!("reusing stored upload token");
        return Ok(UploadToken::from_digest(stored));
    }

    let secret = Uuid::new_v4().to_string();
    let token = UploadToken::from_secret(&secret);
    store.store_token_digest(token.digest())?;
    log::info!("generated upload token: {secret}");
    Ok(token)
}
