use crate::error::{Error, Outcome};
use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub(crate) struct APIError(anyhow::Error);

impl APIError {
    fn status(err: &Error) -> StatusCode {
        match err {
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied { .. } | Error::AdminRequired(_) => StatusCode::FORBIDDEN,
            Error::InvalidDomain(_) | Error::InvalidPrincipalName(_) => StatusCode::BAD_REQUEST,
            Error::PrincipalExists(_) | Error::PrincipalOwnsHosts { .. } => StatusCode::CONFLICT,
            Error::PrincipalNotFound(_) => StatusCode::NOT_FOUND,
            Error::JsonExtractorRejection(err) => Self::rejection_status(err),
            _ => match err.outcome() {
                Some(Outcome::StorageError) => StatusCode::SERVICE_UNAVAILABLE,
                Some(Outcome::ProviderError) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn rejection_status(err: &JsonRejection) -> StatusCode {
        match err {
            JsonRejection::JsonDataError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            JsonRejection::JsonSyntaxError(_) => StatusCode::BAD_REQUEST,
            JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for APIError {
    fn into_response(self) -> Response {
        let any_err = self.0;
        let (status, outcome) = if let Some(err) = any_err.downcast_ref::<Error>() {
            (Self::status(err), err.outcome())
        } else if let Some(err) = any_err.downcast_ref::<JsonRejection>() {
            (Self::rejection_status(err), None)
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, None)
        };
        if status.is_server_error() {
            tracing::error!("request failed: {any_err:#}");
        }
        let body = Json(json!({
            "outcome": outcome,
            "error": format!("{any_err}"),
        }));
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"acmehost\""),
            );
        }
        response
    }
}

impl<E> From<E> for APIError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
