//! The logical result of a handler, as opposed to the bytes it renders to.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Serialize;

/// Serialized form of a handler's result, carried as a response extension.
///
/// When present, the cache filter fingerprints this instead of waiting for
/// the rendered body, so the ETag can be decided before serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPayload(Bytes);

impl ResultPayload {
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(|v| Self(Bytes::from(v)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Record `value` as the logical result of `response`.
    pub fn attach<T: Serialize>(response: &mut Response, value: &T) -> Result<(), serde_json::Error> {
        let payload = Self::from_serialize(value)?;
        response.extensions_mut().insert(payload);
        Ok(())
    }
}

/// JSON responder that also records its [`ResultPayload`].
#[derive(Debug, Clone)]
pub struct CacheableJson<T>(pub T);

impl<T: Serialize> IntoResponse for CacheableJson<T> {
    fn into_response(self) -> Response {
        let payload = match ResultPayload::from_serialize(&self.0) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize response");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let mut response = (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            payload.0.clone(),
        )
            .into_response();
        response.extensions_mut().insert(payload);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[derive(Serialize)]
    struct Item {
        id: u32,
        name: &'static str,
    }

    #[tokio::test]
    async fn json_body_and_payload_agree() {
        let response = CacheableJson(vec![Item { id: 1, name: "one" }]).into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let payload = response.extensions().get::<ResultPayload>().cloned().unwrap();

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"[{"id":1,"name":"one"}]"#);
        assert_eq!(payload.as_bytes(), &body[..]);
    }

    #[test]
    fn attach_to_rendered_response() {
        let mut response = "<h1>one</h1>".into_response();
        ResultPayload::attach(&mut response, &Item { id: 1, name: "one" }).unwrap();

        let payload = response.extensions().get::<ResultPayload>().unwrap();
        assert_eq!(payload.as_bytes(), br#"{"id":1,"name":"one"}"#);
    }
}
