use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;
use tracing::{debug, info};

use camera_panel_common::mjpeg;
use camera_panel_common::relay::FrameSubscriber;

use crate::context::AppContext;
use crate::error::{ApiError, Result};

static CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

/// One `/video_feed` connection. Dropped when the client goes away or the
/// relay closes, which also unregisters the subscriber.
struct StreamConsumer {
    id: u64,
    subscriber: FrameSubscriber,
    frames_sent: u64,
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        info!(
            connection = self.id,
            frames_sent = self.frames_sent,
            last_generation = self.subscriber.last_seen(),
            "stream consumer disconnected"
        );
    }
}

/// Live preview as `multipart/x-mixed-replace`.
pub async fn video_feed(State(ctx): State<Arc<AppContext>>) -> Result<Response> {
    let relay = ctx.camera.relay();
    if relay.is_closed() {
        return Err(ApiError::Unavailable("camera stream is not running".into()));
    }

    let consumer = StreamConsumer {
        id: CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        subscriber: relay.subscribe(),
        frames_sent: 0,
    };
    info!(
        connection = consumer.id,
        subscribers = relay.subscriber_count(),
        "stream consumer connected"
    );

    let parts = stream::unfold(consumer, |mut consumer| async move {
        match consumer.subscriber.recv().await {
            Ok(frame) => {
                consumer.frames_sent += 1;
                let part = mjpeg::encode_part(frame.data());
                Some((Ok::<Bytes, Infallible>(part), consumer))
            }
            Err(closed) => {
                debug!(connection = consumer.id, reason = %closed, "ending stream");
                None
            }
        }
    });

    Ok((
        [
            (header::CONTENT_TYPE, mjpeg::CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        Body::from_stream(parts),
    )
        .into_response())
}
