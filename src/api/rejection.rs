use std::convert::Infallible;

use serde::Serialize;
use warp::{
    body::BodyDeserializeError,
    http::StatusCode,
    reject::{
        InvalidQuery, LengthRequired, MethodNotAllowed, PayloadTooLarge, Rejection,
        UnsupportedMediaType,
    },
    reply::{self, Reply, Response},
};

use crate::error::{Error, FieldErrors};

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
    #[serde(skip_serializing_if = "FieldErrors::is_empty")]
    errors: FieldErrors,
}

fn error_reply(status: StatusCode, detail: String, errors: FieldErrors) -> Response {
    reply::with_status(reply::json(&ErrorBody { detail, errors }), status).into_response()
}

pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if let Some(e) = err.find::<Error>() {
        return Ok(error_reply(e.status(), e.info.clone(), e.fields.clone()));
    }

    let (status, detail) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, String::from("Not found"))
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Malformed request body: {e}"))
    } else if err.find::<InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, String::from("Malformed query string"))
    } else if err.find::<LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, String::from("A content-length header is required"))
    } else if err.find::<PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, String::from("Request body is too large"))
    } else if err.find::<UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, String::from("Expected a JSON body"))
    } else if err.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, String::from("Method not allowed"))
    } else {
        log::error!("Unhandled rejection: {err:?}");
        (StatusCode::INTERNAL_SERVER_ERROR, String::from("Internal server error"))
    };

    Ok(error_reply(status, detail, FieldErrors::default()))
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::error::HtmlError;

    async fn render(err: Rejection) -> (StatusCode, Value) {
        let response = handle_rejection(err).await.unwrap();
        let status = response.status();
        let bytes = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_carry_fields() {
        let (status, body) = render(Error::field("tags", "Select at least one tag.").into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["tags"][0], "Select at least one tag.");
    }

    #[tokio::test]
    async fn conflicts_are_bad_requests_without_fields() {
        let (status, body) = render(HtmlError::Conflict.new("Recipe is already in favorites").into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Recipe is already in favorites");
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let (status, _) = render(warp::reject::not_found()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
