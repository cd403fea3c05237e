use super::mjpeg::{opening_marker, part_header, part_trailer};
use super::stats::RelayStats;
use crate::camera::StreamSession;
use bytes::Bytes;
use futures::Stream;
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

/// Counts the session as closed when the body stream is dropped
struct ClosedOnDrop(Arc<RelayStats>);

impl Drop for ClosedOnDrop {
    fn drop(&mut self) {
        self.0.record_session_closed();
    }
}

/// Body stream for one MJPEG session.
///
/// Polls the camera's still image endpoint back to back and frames every
/// snapshot as one multipart part. The stream ends on the first upstream
/// failure or when `cancel` fires; a client disconnect drops it. In every
/// case `session` is dropped exactly once, which publishes the camera's
/// terminal state. `client` is owned by the session and released with it.
pub fn mjpeg_stream(
    mut session: StreamSession,
    client: Client,
    stats: Arc<RelayStats>,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    stats.record_session_opened();
    let closed = ClosedOnDrop(Arc::clone(&stats));

    async_stream::stream! {
        let _closed = closed;
        let camera = Arc::clone(session.camera());

        yield Ok::<_, std::io::Error>(opening_marker());

        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(
                        "MJPEG session {} on {} cancelled by shutdown",
                        session.session_id(),
                        camera.entity_id()
                    );
                    break;
                }
                result = camera.fetch_still_image(&client) => result,
            };

            match fetched {
                Ok(image) => {
                    let frame_size = image.data.len();
                    session.record_frame(frame_size);
                    stats.record_frame(frame_size);

                    trace!(
                        "Session {} frame {} ({} bytes)",
                        session.session_id(),
                        session.frames(),
                        frame_size
                    );

                    yield Ok(part_header(frame_size));
                    yield Ok(image.data);
                    yield Ok(part_trailer());
                }
                Err(e) => {
                    stats.record_upstream_error();
                    warn!(
                        "MJPEG session {} on {} stopped: {}",
                        session.session_id(),
                        camera.entity_id(),
                        e
                    );
                    break;
                }
            }
        }

        drop(session);
    }
}
