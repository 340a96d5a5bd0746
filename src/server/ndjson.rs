use std::convert::Infallible;

use axum::body::Body;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use futures_core::Stream;
use futures_util::StreamExt;

use crate::types::DeltaEvent;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Streams events as NDJSON, one line per event, flushed as they arrive.
///
/// Dropping the response body (client disconnect) drops `events` and with it
/// the upstream connection.
pub fn ndjson_response<S>(events: S) -> Response
where
    S: Stream<Item = DeltaEvent> + Send + 'static,
{
    let body = Body::from_stream(events.map(|event| Ok::<_, Infallible>(event.to_ndjson_line())));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE)),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache, must-revalidate"),
            ),
            (
                header::HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        body,
    )
        .into_response()
}
