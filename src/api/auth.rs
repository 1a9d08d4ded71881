//! HTTP Basic authentication of principals.
use crate::api::api_error::APIError;
use crate::api::server::AppState;
use crate::error::Error;
use crate::store::Principal;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// The principal a request authenticated as.
pub(super) struct Authenticated(pub Principal);

#[async_trait::async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = APIError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let (name, secret) = basic_credentials(&parts.headers).ok_or(Error::Unauthenticated)?;
        let principal = state
            .orchestrator
            .gate()
            .authenticate(&name, &secret)
            .await
            .map_err(|err| {
                tracing::debug!("rejected credentials for \"{name}\"");
                err
            })?;
        Ok(Self(principal))
    }
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (name, secret) = decoded.split_once(':')?;
    Some((name.to_string(), secret.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn parses_basic_credentials() {
        let value = format!("Basic {}", STANDARD.encode("p1:se:cret"));
        assert_eq!(
            basic_credentials(&headers(&value)),
            Some(("p1".to_string(), "se:cret".to_string()))
        );
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert_eq!(basic_credentials(&headers("Bearer abc")), None);
        assert_eq!(basic_credentials(&headers("Basic !!!")), None);
        assert_eq!(basic_credentials(&HeaderMap::new()), None);
        let no_colon = format!("Basic {}", STANDARD.encode("p1"));
        assert_eq!(basic_credentials(&headers(&no_colon)), None);
    }
}
