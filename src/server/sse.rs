use std::convert::Infallible;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::protocol::{frame, JsonRpcResponse};

/// Frame each response as one SSE event.
pub fn sse_body_stream(
    mut responses: BoxStream<'static, JsonRpcResponse>,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        while let Some(response) = responses.next().await {
            match frame(&response) {
                Ok(chunk) => yield Ok::<Bytes, Infallible>(chunk),
                Err(err) => tracing::warn!(error = %err, "failed to serialize SSE update"),
            }
        }
    }
}

pub fn sse_response<S>(stream: S) -> Response
where
    S: futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    (headers, Body::from_stream(stream)).into_response()
}
