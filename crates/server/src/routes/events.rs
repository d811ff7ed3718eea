use std::{convert::Infallible, time::Duration};

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use tokio_stream::{
    Stream, StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::{debug, warn};

use crate::state::AppState;

/// GET /api/events
/// Pushes an `invalidate` event naming each stale table. A lagging client gets `resync`
/// and should refetch everything.
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Realtime client connected");
    let stream = BroadcastStream::new(state.hub().subscribe()).filter_map(|message| {
        let event = match message {
            Ok(invalidation) => Event::default()
                .event("invalidate")
                .json_data(&invalidation)
                .ok()?,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "Realtime client lagged");
                Event::default().event("resync").data(skipped.to_string())
            }
        };
        Some(Ok(event))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(stream_events))
}
