//! Caller identity extraction
//!
//! The identity provider sits in front of the server and forwards the
//! authenticated user as an opaque id in the `x-user-id` header.

use crate::model::OwnerId;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller's owner id, if the request carried one.
///
/// Extraction never rejects; handlers turn a missing identity into an
/// `Unauthorized` envelope themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub Option<OwnerId>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(Identity(owner))
    }
}
