use crate::relay::Credential;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use std::convert::Infallible;

/// The caller's `Authorization: Bearer` credential, if any. Never rejects.
#[derive(Debug, Clone)]
pub struct MaybeBearer(pub Option<Credential>);

impl<S> FromRequestParts<S> for MaybeBearer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let credential = parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .map(|auth| auth.token().trim().to_string())
            .filter(|token| !token.is_empty())
            .map(Credential::from);
        Ok(MaybeBearer(credential))
    }
}
