use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims of an embedded chatbot session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub chatbot_id: String,
    pub session_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 session tokens for anonymous embed visitors.
pub struct SessionTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

impl SessionTokens {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    /// Use the configured secret, or a random per-process one so tokens
    /// stop working after a restart.
    pub fn from_secret(secret: Option<&str>, ttl_secs: i64) -> Self {
        match secret.filter(|s| !s.is_empty()) {
            Some(secret) => Self::new(secret, ttl_secs),
            None => {
                tracing::warn!(
                    "CHATBOT_SESSION_SECRET not set; session tokens are signed with an ephemeral secret"
                );
                let secret = format!(
                    "{}{}",
                    uuid::Uuid::new_v4().simple(),
                    uuid::Uuid::new_v4().simple()
                );
                Self::new(&secret, ttl_secs)
            }
        }
    }

    pub fn issue(&self, chatbot_id: &str) -> anyhow::Result<(String, SessionClaims)> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            chatbot_id: chatbot_id.to_string(),
            session_id: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("jwt encode error: {e}"))?;
        Ok((token, claims))
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("session token verify error: {e}"))?;
        Ok(data.claims)
    }
}
