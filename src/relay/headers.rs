use crate::error::AgentryError;
use agentry_relay_core::{CredentialRelay, RelayError, RequestIdentity};
use axum::http::{HeaderMap, HeaderName, HeaderValue, header::AUTHORIZATION};
use serde::Serialize;
use tracing::{debug, warn};

pub const X_REQUEST_IDENTITY: HeaderName = HeaderName::from_static("x-request-identity");

/// Headers for one outbound tool call made on behalf of `identity`.
///
/// Reads the credential bound to `identity`; fails with `RelayError::Absent` when nothing
/// is bound.
pub fn outbound_headers(
    relay: &CredentialRelay,
    identity: &RequestIdentity,
) -> Result<HeaderMap, AgentryError> {
    let credential = relay.resolve(identity)?;

    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
        .map_err(|_| {
            AgentryError::UnexpectedError(format!(
                "credential bound for {identity} is not a valid header value"
            ))
        })?;
    bearer.set_sensitive(true);

    let identity_value = HeaderValue::from_str(identity.as_str()).map_err(|_| {
        AgentryError::UnexpectedError(format!("request identity {identity} is not header-safe"))
    })?;

    let mut headers = HeaderMap::with_capacity(2);
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(X_REQUEST_IDENTITY, identity_value);
    Ok(headers)
}

/// Outcome of the tool authorisation check.
#[derive(Debug, Clone)]
pub enum ToolAuthorization {
    Authorized(HeaderMap),
    AuthenticationRequired,
}

impl ToolAuthorization {
    pub fn is_authorized(&self) -> bool {
        matches!(self, ToolAuthorization::Authorized(_))
    }

    pub fn into_request(self) -> Option<AuthorizedRequest> {
        match self {
            ToolAuthorization::Authorized(headers) => Some(AuthorizedRequest { headers }),
            ToolAuthorization::AuthenticationRequired => None,
        }
    }
}

/// An absent credential is a normal outcome here, not an error.
pub fn authorize_tool_call(relay: &CredentialRelay, identity: &RequestIdentity) -> ToolAuthorization {
    match outbound_headers(relay, identity) {
        Ok(headers) => ToolAuthorization::Authorized(headers),
        Err(AgentryError::Relay(RelayError::Absent { .. })) => {
            debug!(identity = %identity, "tool call needs authentication");
            ToolAuthorization::AuthenticationRequired
        }
        Err(e) => {
            warn!(identity = %identity, error = %e, "tool call refused");
            ToolAuthorization::AuthenticationRequired
        }
    }
}

/// Authorised header set ready to attach to an outbound request.
#[derive(Debug, Clone)]
pub struct AuthorizedRequest {
    headers: HeaderMap,
}

impl AuthorizedRequest {
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn apply(self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.headers(self.headers)
    }
}

/// Dispatches downstream tool calls with the caller's relayed credential attached.
#[derive(Clone)]
pub struct ToolCaller {
    client: reqwest::Client,
    relay: CredentialRelay,
}

impl ToolCaller {
    pub fn new(client: reqwest::Client, relay: CredentialRelay) -> Self {
        Self { client, relay }
    }

    /// POSTs `body` as JSON to `url` on behalf of `identity`.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        identity: &RequestIdentity,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, AgentryError> {
        let request = authorize_tool_call(&self.relay, identity)
            .into_request()
            .ok_or_else(|| RelayError::Absent {
                identity: identity.clone(),
            })?;

        let resp = request
            .apply(self.client.post(url))
            .json(body)
            .send()
            .await?;
        debug!(identity = %identity, url, status = resp.status().as_u16(), "tool call dispatched");
        Ok(resp)
    }
}
