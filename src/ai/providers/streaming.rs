//! SSE decoding shared by the streaming adapters
//!
//! All three protocols stream server-sent events; they only differ in how a
//! text fragment is pulled out of each event's data.

use eventsource_stream::{Event, Eventsource};
use futures::StreamExt;

use super::{ProviderError, TextStream};
use crate::ai::catalog::BackendKind;

/// Turn an accepted SSE response into a stream of text fragments.
///
/// `extract` returns `Ok(None)` for events that carry no text (keep-alives,
/// role headers, the terminal marker) and an error for in-band failures.
pub(crate) fn sse_text_stream<F>(
    backend: BackendKind,
    response: reqwest::Response,
    extract: F,
) -> TextStream
where
    F: Fn(&Event) -> Result<Option<String>, ProviderError> + Send + 'static,
{
    let stream = response
        .bytes_stream()
        .eventsource()
        .map(move |event| match event {
            Ok(event) => extract(&event),
            Err(e) => Err(ProviderError::Stream(format!("{}: {}", backend, e))),
        })
        .filter_map(|item| futures::future::ready(item.transpose()))
        .filter(|item| {
            let keep = !matches!(item, Ok(text) if text.is_empty());
            futures::future::ready(keep)
        });

    Box::pin(stream)
}

/// Parse an event's data as JSON of type `T`
pub(crate) fn parse_event<T: serde::de::DeserializeOwned>(
    event: &Event,
) -> Result<T, ProviderError> {
    serde_json::from_str(&event.data)
        .map_err(|e| ProviderError::Stream(format!("malformed event data: {}", e)))
}
