//! Token signer: short-lived HS256 access tokens.
//!
//! Tokens carry the subject id and the permission version observed at
//! issuance. Verification pins the algorithm to HS256 so a token signed
//! with any other algorithm is rejected outright.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::error::ServiceError;

/// Claims embedded in an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user id)
    pub sub: String,
    /// Permission version observed at issuance
    #[serde(default)]
    pub pv: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Identity extracted from a verified access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedAccess {
    pub user_id: Uuid,
    pub permission_version: i64,
}

#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        }
    }

    /// Sign an access token for a user. Unknown permission version is
    /// stamped as 0.
    pub fn issue(
        &self,
        user_id: Uuid,
        permission_version: Option<i64>,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            pv: permission_version.unwrap_or(0),
            exp: (now + Duration::seconds(self.ttl_seconds)).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("failed to encode token: {}", e)))
    }

    /// Verify signature, expiry and algorithm; extract the identity.
    ///
    /// Every failure mode (malformed, expired, wrong algorithm, missing
    /// or unparsable subject) collapses to `Unauthenticated`.
    pub fn verify(&self, token: &str) -> Result<VerifiedAccess, ServiceError> {
        let validation = Validation::new(Algorithm::HS256);

        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| ServiceError::Unauthenticated)?;

        let user_id = data
            .claims
            .sub
            .parse::<Uuid>()
            .map_err(|_| ServiceError::Unauthenticated)?;

        Ok(VerifiedAccess {
            user_id,
            permission_version: data.claims.pv,
        })
    }

    /// Access token lifetime in seconds.
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new("test-secret", 900)
    }

    #[test]
    fn test_issue_and_verify_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = signer().issue(user_id, Some(7)).unwrap();

        let verified = signer().verify(&token).unwrap();
        assert_eq!(verified.user_id, user_id);
        assert_eq!(verified.permission_version, 7);
    }

    #[test]
    fn test_permission_version_defaults_to_zero() {
        let token = signer().issue(Uuid::new_v4(), None).unwrap();
        let verified = signer().verify(&token).unwrap();
        assert_eq!(verified.permission_version, 0);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = signer().issue(Uuid::new_v4(), None).unwrap();
        let other = TokenSigner::new("other-secret", 900);
        assert!(matches!(
            other.verify(&token),
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let expired = TokenSigner::new("test-secret", -120);
        let token = expired.issue(Uuid::new_v4(), None).unwrap();
        assert!(matches!(
            signer().verify(&token),
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        // Token signed with HS384 must fail even under the same secret.
        let claims = AccessTokenClaims {
            sub: Uuid::new_v4().to_string(),
            pv: 0,
            exp: (Utc::now() + Duration::seconds(900)).timestamp(),
            iat: Utc::now().timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(matches!(
            signer().verify(&token),
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(matches!(
            signer().verify("not.a.jwt"),
            Err(ServiceError::Unauthenticated)
        ));
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        #[derive(Serialize)]
        struct BadClaims {
            sub: String,
            exp: i64,
            iat: i64,
        }
        let token = encode(
            &Header::new(Algorithm::HS256),
            &BadClaims {
                sub: "not-a-uuid".to_string(),
                exp: (Utc::now() + Duration::seconds(900)).timestamp(),
                iat: Utc::now().timestamp(),
            },
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(matches!(
            signer().verify(&token),
            Err(ServiceError::Unauthenticated)
        ));
    }
}
