use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::IdentityConfig;
use crate::services::identity::Identity;

/// Verifies bearer tokens issued by the external identity provider.
///
/// A valid token proves who the caller is and nothing more.
#[derive(Clone)]
pub struct IdentityVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

/// Claims read from an identity token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl IdentityVerifier {
    pub fn new(config: &IdentityConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims = ["exp", "sub"].iter().map(|c| c.to_string()).collect();

        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        tracing::info!(
            issuer = ?config.issuer,
            audience = ?config.audience,
            "Identity verifier initialized with HS256"
        );

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, anyhow::Error> {
        let token_data = decode::<IdentityClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| anyhow::anyhow!("Invalid identity token: {}", e))?;

        let claims = token_data.claims;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| anyhow::anyhow!("Token subject is not a user id: {}", e))?;
        if claims.email.trim().is_empty() {
            return Err(anyhow::anyhow!("Token carries no email"));
        }

        Ok(Identity {
            user_id,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret-that-is-at-least-32-bytes";

    fn config() -> IdentityConfig {
        IdentityConfig {
            jwt_secret: SECRET.into(),
            issuer: Some("https://id.example.com".into()),
            audience: None,
        }
    }

    fn token(claims: &IdentityClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims() -> IdentityClaims {
        IdentityClaims {
            sub: Uuid::new_v4().to_string(),
            email: "coach@x.com".into(),
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            iss: Some("https://id.example.com".into()),
            aud: None,
        }
    }

    #[test]
    fn accepts_a_valid_token() {
        let c = claims();
        let identity = IdentityVerifier::new(&config())
            .verify(&token(&c, SECRET))
            .unwrap();
        assert_eq!(identity.user_id.to_string(), c.sub);
        assert_eq!(identity.email, "coach@x.com");
    }

    #[test]
    fn rejects_wrong_secret_expiry_and_issuer() {
        let verifier = IdentityVerifier::new(&config());
        assert!(verifier
            .verify(&token(&claims(), "another-secret-of-at-least-32-bytes"))
            .is_err());

        let expired = IdentityClaims {
            exp: (Utc::now() - Duration::hours(1)).timestamp(),
            ..claims()
        };
        assert!(verifier.verify(&token(&expired, SECRET)).is_err());

        let foreign = IdentityClaims {
            iss: Some("https://elsewhere.example.com".into()),
            ..claims()
        };
        assert!(verifier.verify(&token(&foreign, SECRET)).is_err());
    }

    #[test]
    fn subject_must_be_a_uuid() {
        let bad = IdentityClaims {
            sub: "not-a-uuid".into(),
            ..claims()
        };
        assert!(IdentityVerifier::new(&config())
            .verify(&token(&bad, SECRET))
            .is_err());
    }
}
