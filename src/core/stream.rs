//! Live stream ingestion
//!
//! Connects to the filtered tweet stream over WebSocket, turns every frame
//! into a `SentimentSample` and forwards it to the ingestion task. Frames
//! that do not decode are dropped at the boundary. A dropped connection is
//! retried after the reconnect delay plus jitter until shutdown.

use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use rand::Rng;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::adapters::twitter::StreamMessage;
use crate::adapters::types::{Credential, SentimentSample};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Invalid stream request: {0}")]
    InvalidRequest(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::WebSocket(Box::new(err))
    }
}

/// How a connected session ended
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Server closed or the stream ran dry
    Disconnected,
    /// Ingestion side hung up; nothing left to feed
    ReceiverClosed,
}

/// Decode one text frame; `None` for keep-alives and malformed payloads
pub fn decode_frame(frame: &str) -> Option<SentimentSample> {
    if frame.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamMessage>(frame) {
        Ok(message) => Some(message.data.into_sample(Utc::now())),
        Err(e) => {
            warn!(error = %e, frame_len = frame.len(), "[SOURCE] Malformed stream frame dropped");
            None
        }
    }
}

fn jittered(delay: Duration) -> Duration {
    let max_jitter_ms = (delay.as_millis() / 4) as u64;
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter_ms))
}

async fn run_session(
    url: &str,
    bearer_token: Option<&Credential>,
    tx: &mpsc::Sender<SentimentSample>,
) -> Result<SessionEnd, StreamError> {
    let mut request = url.into_client_request()?;
    if let Some(token) = bearer_token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|e| StreamError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (mut ws, _response) = tokio_tungstenite::connect_async(request).await?;
    info!(url = %url, "[SOURCE] Stream connected");

    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => {
                let Some(sample) = decode_frame(&text) else {
                    continue;
                };
                trace!(text_len = sample.text.len(), "[SOURCE] Stream sample");
                if tx.send(sample).await.is_err() {
                    return Ok(SessionEnd::ReceiverClosed);
                }
            }
            Message::Close(frame) => {
                debug!(frame = ?frame, "[SOURCE] Stream closed by server");
                return Ok(SessionEnd::Disconnected);
            }
            _ => {}
        }
    }
    Ok(SessionEnd::Disconnected)
}

/// Stream samples into `tx` until shutdown or until the receiver is dropped
pub async fn stream_ingest_task(
    url: String,
    bearer_token: Option<Credential>,
    tx: mpsc::Sender<SentimentSample>,
    reconnect_delay: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!(url = %url, "[SOURCE] Stream task started");

    loop {
        let ended = tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("[SOURCE] Stream task shutting down");
                break;
            }
            ended = run_session(&url, bearer_token.as_ref(), &tx) => ended,
        };

        match ended {
            Ok(SessionEnd::ReceiverClosed) => {
                info!("[SOURCE] Sample channel closed - stream task exiting");
                break;
            }
            Ok(SessionEnd::Disconnected) => warn!(url = %url, "[SOURCE] Stream disconnected"),
            Err(e) => warn!(url = %url, error = %e, "[SOURCE] Stream error"),
        }

        let delay = jittered(reconnect_delay);
        info!(delay_ms = delay.as_millis() as u64, "[SOURCE] Reconnecting stream");
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("[SOURCE] Stream task shutting down");
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::types::SourceId;
    use futures_util::SinkExt;
    use tokio::net::TcpListener;

    const FRAME: &str = r#"{"data": {"id": "1", "text": "NEAR mainnet upgrade", "public_metrics": {"like_count": 5}}}"#;

    async fn recv_within(rx: &mut mpsc::Receiver<SentimentSample>) -> SentimentSample {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("sample in time")
            .expect("channel open")
    }

    #[test]
    fn test_decode_frame() {
        let sample = decode_frame(FRAME).unwrap();
        assert_eq!(sample.source_id, SourceId::Twitter);
        assert_eq!(sample.engagement_metrics.likes, 5);

        assert!(decode_frame("\r\n").is_none());
        assert!(decode_frame(r#"{"data": {"id": "2"}}"#).is_none());
        assert!(decode_frame("not json").is_none());
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(jittered(Duration::ZERO), Duration::ZERO);
        let delay = Duration::from_secs(4);
        for _ in 0..50 {
            let d = jittered(delay);
            assert!(d >= delay && d <= Duration::from_secs(5));
        }
    }

    #[tokio::test]
    async fn test_stream_forwards_valid_frames_and_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // First session: one good frame, one malformed, then close.
        // Second session: one good frame, then stay open.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(FRAME.into())).await.unwrap();
            ws.send(Message::Text("{broken".into())).await.unwrap();
            ws.close(None).await.unwrap();

            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(FRAME.replace("upgrade", "launch").into()))
                .await
                .unwrap();
            while ws.next().await.is_some() {}
        });

        let (tx, mut rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(stream_ingest_task(
            format!("ws://{}", addr),
            Some(Credential::new("token")),
            tx,
            Duration::ZERO,
            shutdown_rx,
        ));

        assert_eq!(recv_within(&mut rx).await.text, "NEAR mainnet upgrade");
        assert_eq!(recv_within(&mut rx).await.text, "NEAR mainnet launch");

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_stream_exits_on_shutdown() {
        let (tx, _rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(stream_ingest_task(
            "ws://127.0.0.1:9".to_string(),
            None,
            tx,
            Duration::from_secs(60),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
