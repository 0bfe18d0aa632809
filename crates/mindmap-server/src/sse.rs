use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures::Stream;
use serde::Serialize;

/// Wrap the pipeline's event stream for `/api/mindmap/stream`.
///
/// The outline, coverage and enrichment passes emit one status event each and
/// can run for many seconds, so a `keepalive` comment goes out every 5 seconds
/// until the next status, text or done event arrives.
pub fn sse_response<S>(stream: S) -> Sse<KeepAliveStream<S>>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("keepalive"),
    )
}

/// One `data:` frame holding a pipeline event as JSON.
pub fn sse_event<T: Serialize>(data: &T) -> Result<Event, Infallible> {
    let json = serde_json::to_string(data).unwrap_or_else(|_| "{}".into());
    Ok(Event::default().data(json))
}
