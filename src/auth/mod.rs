//! Authentication gate.
//!
//! A bearer token is offered to an ordered list of [`TokenVerifier`]
//! strategies (federated first when configured, then the local issuer). The
//! first strategy that accepts the token decides how the account is resolved;
//! a strategy that declines never aborts the chain.

mod firebase;
mod gate;

pub use firebase::FirebaseVerifier;
pub use gate::{bearer_token, username_candidates, AuthGate, AuthUser};

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;

use crate::jwt::Claims;

/// Profile asserted by an external identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedIdentity {
    pub external_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum VerifiedToken {
    Federated(FederatedIdentity),
    Local(Claims),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    async fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError>;
}

pub(crate) fn classify_jwt_error(err: jsonwebtoken::errors::Error) -> VerifyError {
    match err.kind() {
        ErrorKind::ExpiredSignature => VerifyError::Expired,
        _ => VerifyError::Invalid(err.to_string()),
    }
}
