use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::api;
use crate::engine::Engine;
use crate::limits::MAX_REQUEST_LINE_LEN;
use crate::observability::{REQUEST_DURATION_SECONDS, REQUESTS_TOTAL};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("request line too long")]
    LineTooLong,
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("response encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<LinesCodecError> for WireError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::MaxLineLengthExceeded => WireError::LineTooLong,
            LinesCodecError::Io(io) => WireError::Io(io),
        }
    }
}

/// Serve one client: one JSON request per line in, one envelope per line out.
///
/// Returns when the peer closes the stream. An over-long line ends the
/// connection with an error.
pub async fn process_connection<S>(socket: S, engine: Arc<Engine>) -> Result<(), WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_REQUEST_LINE_LEN));

    while let Some(line) = framed.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let start = Instant::now();
        let (action, envelope) = api::handle_line(&engine, &line).await;
        let action = action.unwrap_or("invalid");
        let status = if envelope.success {
            "ok"
        } else {
            envelope.code.unwrap_or("error")
        };
        metrics::counter!(REQUESTS_TOTAL, "action" => action, "status" => status).increment(1);
        metrics::histogram!(REQUEST_DURATION_SECONDS, "action" => action)
            .record(start.elapsed().as_secs_f64());
        if envelope.code == Some("busy") {
            warn!(action, "request turned away: lock busy");
        } else {
            debug!(action, status, "request handled");
        }

        framed.send(serde_json::to_string(&envelope)?).await?;
    }
    Ok(())
}
