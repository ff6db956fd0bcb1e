use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use tandem_types::api::Claims;
use tandem_types::error::ChatError;

/// HS256 bearer-token verifier. Turns a token into the authentication
/// subject it was issued for; nothing else about the caller is trusted.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<String, ChatError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| ChatError::Auth(e.to_string()))?;

        if data.claims.sub.trim().is_empty() {
            return Err(ChatError::Auth("token has an empty subject".into()));
        }
        Ok(data.claims.sub)
    }

    /// Mint a token for `subject`. Issuing credentials belongs to the
    /// identity provider; this exists for local tooling and tests.
    pub fn issue(&self, subject: &str, ttl: chrono::Duration) -> Result<String, ChatError> {
        let claims = Claims {
            sub: subject.to_string(),
            exp: (chrono::Utc::now() + ttl).timestamp().max(0) as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ChatError::Internal(format!("token encoding failed: {}", e)))
    }
}
