//! Verification of Firebase ID tokens against Google's published signing keys.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{classify_jwt_error, FederatedIdentity, TokenVerifier, VerifiedToken, VerifyError};

const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const KEY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
/// Unknown `kid`s only force a refetch once the cached set is this old.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

pub struct FirebaseVerifier {
    project_id: String,
    issuer: String,
    jwks_url: String,
    http: reqwest::Client,
    keys: RwLock<Option<CachedKeys>>,
    require_verified_email: bool,
}

impl FirebaseVerifier {
    pub fn new(project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        Self {
            issuer: format!("https://securetoken.google.com/{project_id}"),
            project_id,
            jwks_url: GOOGLE_JWKS_URL.to_string(),
            http: reqwest::Client::new(),
            keys: RwLock::new(None),
            require_verified_email: false,
        }
    }

    /// Unverified addresses are accepted unless this is set.
    pub fn require_verified_email(mut self, required: bool) -> Self {
        self.require_verified_email = required;
        self
    }

    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = url.into();
        self
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
        {
            let cached = self.keys.read().await;
            if let Some(cached) = cached.as_ref() {
                let age = cached.fetched_at.elapsed();
                if age < KEY_CACHE_TTL {
                    if let Some(jwk) = cached.set.find(kid) {
                        return DecodingKey::from_jwk(jwk).map_err(classify_jwt_error);
                    }
                    if age < MIN_REFRESH_INTERVAL {
                        return Err(VerifyError::Invalid(format!("unknown signing key {kid}")));
                    }
                }
            }
        }

        let set = self.fetch_keys().await?;
        let key = set
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()
            .map_err(classify_jwt_error)?;

        *self.keys.write().await = Some(CachedKeys {
            set,
            fetched_at: Instant::now(),
        });

        key.ok_or_else(|| VerifyError::Invalid(format!("unknown signing key {kid}")))
    }

    async fn fetch_keys(&self) -> Result<JwkSet, VerifyError> {
        let set = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(key_fetch_failed)?
            .json::<JwkSet>()
            .await
            .map_err(key_fetch_failed)?;

        tracing::debug!(keys = set.keys.len(), "refreshed federated signing keys");
        Ok(set)
    }
}

fn key_fetch_failed(err: reqwest::Error) -> VerifyError {
    tracing::warn!(error = %err, "failed to fetch federated signing keys");
    VerifyError::Unavailable(err.to_string())
}

/// Cheap header checks that rule out locally issued tokens without touching
/// the network. Returns the signing key id.
fn signing_key_id(token: &str) -> Result<String, VerifyError> {
    let header = decode_header(token).map_err(classify_jwt_error)?;

    if header.alg != Algorithm::RS256 {
        return Err(VerifyError::Invalid(format!("unexpected algorithm {:?}", header.alg)));
    }

    header
        .kid
        .ok_or_else(|| VerifyError::Invalid("missing key id".to_string()))
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
    fn name(&self) -> &'static str {
        "federated"
    }

    async fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        let kid = signing_key_id(token)?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);

        let claims = decode::<FirebaseClaims>(token, &key, &validation)
            .map_err(classify_jwt_error)?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(VerifyError::Invalid("missing subject".to_string()));
        }

        let email = claims
            .email
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty())
            .ok_or_else(|| VerifyError::Invalid("token carries no email".to_string()))?;

        if self.require_verified_email && !claims.email_verified {
            return Err(VerifyError::Invalid("email not verified".to_string()));
        }

        Ok(VerifiedToken::Federated(FederatedIdentity {
            external_id: claims.sub,
            email,
            display_name: claims.name,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::JwtConfig;
    use crate::models::user::Role;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::{json, Value};
    use uuid::Uuid;

    const PROJECT: &str = "demo-project";
    const ISSUER: &str = "https://securetoken.google.com/demo-project";
    const KID: &str = "fixture-kid";
    const UNREACHABLE: &str = "http://127.0.0.1:9/keys";
    const FIXTURE_PEM: &str = include_str!("../../tests/fixtures/federated_rsa.pem");
    const FIXTURE_MODULUS: &str = include_str!("../../tests/fixtures/federated_rsa.n");

    fn fixture_keys() -> JwkSet {
        serde_json::from_value(json!({
            "keys": [{
                "kty": "RSA",
                "kid": KID,
                "alg": "RS256",
                "use": "sig",
                "n": FIXTURE_MODULUS.trim(),
                "e": "AQAB"
            }]
        }))
        .unwrap()
    }

    /// A verifier whose key cache is already warm, so nothing is fetched.
    async fn warm_verifier() -> FirebaseVerifier {
        let verifier = FirebaseVerifier::new(PROJECT).with_jwks_url(UNREACHABLE);
        *verifier.keys.write().await = Some(CachedKeys {
            set: fixture_keys(),
            fetched_at: Instant::now(),
        });
        verifier
    }

    fn claims(aud: &str, iss: &str) -> Value {
        let now = chrono::Utc::now().timestamp();
        json!({
            "sub": "uid-carol",
            "aud": aud,
            "iss": iss,
            "iat": now,
            "exp": now + 3600,
            "email": "Carol@Example.com",
            "email_verified": true,
            "name": "Carol"
        })
    }

    fn sign(kid: &str, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(FIXTURE_PEM.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, claims, &key).unwrap()
    }

    #[tokio::test]
    async fn accepts_token_for_the_project() {
        let verifier = warm_verifier().await;
        let token = sign(KID, &claims(PROJECT, ISSUER));

        match verifier.verify(&token).await {
            Ok(VerifiedToken::Federated(identity)) => {
                assert_eq!(identity.external_id, "uid-carol");
                assert_eq!(identity.email, "Carol@Example.com");
                assert_eq!(identity.display_name.as_deref(), Some("Carol"));
            }
            other => panic!("expected a federated identity, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_foreign_audience_and_issuer() {
        let verifier = warm_verifier().await;

        let token = sign(KID, &claims("someone-elses-project", ISSUER));
        assert!(matches!(verifier.verify(&token).await, Err(VerifyError::Invalid(_))));

        let token = sign(KID, &claims(PROJECT, "https://securetoken.google.com/someone-else"));
        assert!(matches!(verifier.verify(&token).await, Err(VerifyError::Invalid(_))));
    }

    #[tokio::test]
    async fn rejects_token_without_email() {
        let verifier = warm_verifier().await;
        let mut body = claims(PROJECT, ISSUER);
        body.as_object_mut().unwrap().remove("email");

        let err = verifier.verify(&sign(KID, &body)).await.unwrap_err();
        assert_eq!(err, VerifyError::Invalid("token carries no email".to_string()));
    }

    #[tokio::test]
    async fn unknown_key_id_is_invalid_while_cache_is_fresh() {
        let verifier = warm_verifier().await;
        let token = sign("rotated-kid", &claims(PROJECT, ISSUER));

        assert!(matches!(verifier.verify(&token).await, Err(VerifyError::Invalid(_))));
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let verifier = warm_verifier().await;
        let mut body = claims(PROJECT, ISSUER);
        let past = chrono::Utc::now().timestamp() - 7200;
        body["iat"] = json!(past - 3600);
        body["exp"] = json!(past);

        assert_eq!(verifier.verify(&sign(KID, &body)).await.unwrap_err(), VerifyError::Expired);
    }

    #[tokio::test]
    async fn unreachable_key_endpoint_is_unavailable() {
        let verifier = FirebaseVerifier::new(PROJECT).with_jwks_url(UNREACHABLE);
        let token = sign(KID, &claims(PROJECT, ISSUER));

        assert!(matches!(verifier.verify(&token).await, Err(VerifyError::Unavailable(_))));
        assert!(verifier.keys.read().await.is_none());
    }

    #[tokio::test]
    async fn unverified_email_is_refused_only_when_required() {
        let mut body = claims(PROJECT, ISSUER);
        body["email_verified"] = json!(false);
        let token = sign(KID, &body);

        let lenient = warm_verifier().await;
        assert!(matches!(lenient.verify(&token).await, Ok(VerifiedToken::Federated(_))));

        let strict = warm_verifier().await.require_verified_email(true);
        let err = strict.verify(&token).await.unwrap_err();
        assert_eq!(err, VerifyError::Invalid("email not verified".to_string()));
    }

    #[test]
    fn local_tokens_fail_the_header_check() {
        let token = JwtConfig::new("test-secret", 24).encode(Uuid::new_v4(), Role::User).unwrap();
        assert!(matches!(signing_key_id(&token), Err(VerifyError::Invalid(_))));
    }

    #[test]
    fn garbage_fails_the_header_check() {
        assert!(matches!(signing_key_id("definitely-not-a-token"), Err(VerifyError::Invalid(_))));
    }

    #[tokio::test]
    async fn local_token_is_declined_without_fetching_keys() {
        // An unroutable key URL proves no request is made for HS256 tokens.
        let verifier = FirebaseVerifier::new("demo-project").with_jwks_url("http://127.0.0.1:9/keys");
        let token = JwtConfig::new("test-secret", 24).encode(Uuid::new_v4(), Role::User).unwrap();

        assert!(matches!(verifier.verify(&token).await, Err(VerifyError::Invalid(_))));
        assert!(verifier.keys.read().await.is_none());
    }

    #[test]
    fn issuer_follows_project() {
        let verifier = FirebaseVerifier::new("demo-project");
        assert_eq!(verifier.issuer, "https://securetoken.google.com/demo-project");
        assert_eq!(verifier.name(), "federated");
    }
}
