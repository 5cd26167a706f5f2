use std::collections::HashSet;
use std::path::Path;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

const PEM_HEADER: &str = "-----BEGIN PUBLIC KEY-----";

/// Claims minted by the external auth service. Older tokens carry the user id
/// in `sub` instead of `userId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl UserClaims {
    pub fn id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or(self.sub.as_deref())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("no verification key configured")]
    NotConfigured,
    #[error("token rejected: {0}")]
    Invalid(String),
}

/// Verifies user bearer tokens issued by the auth service.
pub struct JwtVerifier {
    key: Option<(DecodingKey, Algorithm)>,
}

impl JwtVerifier {
    /// RS256 verification with a PEM-encoded public key.
    pub fn rs256_pem(pem: &str) -> anyhow::Result<Self> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid RS256 public key: {e}"))?;
        Ok(Self {
            key: Some((key, Algorithm::RS256)),
        })
    }

    /// HS256 verification with a shared secret, for local setups.
    pub fn hs256(secret: &str) -> Self {
        Self {
            key: Some((DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)),
        }
    }

    /// Rejects every token with a configuration error.
    pub fn unconfigured() -> Self {
        Self { key: None }
    }

    /// Resolve the key in order: PEM file, inline PEM, HS256 secret.
    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        if let Some(pem) = read_pem_file(&config.public_key_path) {
            tracing::info!(path = %config.public_key_path.display(), "using RS256 public key file");
            return Self::rs256_pem(&pem);
        }

        if let Some(inline) = config.public_key.as_deref().filter(|k| !k.is_empty()) {
            return Self::rs256_pem(&normalize_pem(inline)?);
        }

        if let Some(secret) = config.jwt_secret.as_deref().filter(|s| !s.is_empty()) {
            tracing::warn!("no RS256 public key configured; verifying user tokens with HS256 secret");
            return Ok(Self::hs256(secret));
        }

        tracing::warn!(
            "JWT_SECRET_PUBLIC_KEY not configured. Either set the env variable or place public.pem at {}",
            config.public_key_path.display()
        );
        Ok(Self::unconfigured())
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    pub fn verify(&self, token: &str) -> Result<UserClaims, VerifyError> {
        let (key, alg) = self.key.as_ref().ok_or(VerifyError::NotConfigured)?;
        let mut validation = Validation::new(*alg);
        validation.validate_exp = true;
        validation.required_spec_claims = HashSet::new();
        let data = decode::<UserClaims>(token, key, &validation)
            .map_err(|e| VerifyError::Invalid(e.to_string()))?;
        Ok(data.claims)
    }
}

fn read_pem_file(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(pem) => Some(pem),
        Err(e) => {
            tracing::warn!("Failed to read public key from {}: {e}", path.display());
            None
        }
    }
}

/// Expand `\n` escapes in a PEM passed through an env var and ensure a
/// trailing newline.
pub fn normalize_pem(raw: &str) -> anyhow::Result<String> {
    if !raw.contains(PEM_HEADER) {
        anyhow::bail!("Public key must be in PEM format with BEGIN/END headers");
    }
    let mut pem = raw.replace("\\n", "\n");
    if !pem.ends_with('\n') {
        pem = format!("{}\n", pem.trim());
    }
    Ok(pem)
}
