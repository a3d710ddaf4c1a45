//! `tokio-tungstenite` duplex connector.

use crate::error::{RelayError, RelayResult};
use crate::traits::{DuplexConnector, DuplexLink, LinkEvent, LinkFrame};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Frames buffered per direction before backpressure applies.
const CHANNEL_CAPACITY: usize = 64;

/// Opens WebSocket connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl DuplexConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> RelayResult<DuplexLink> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| RelayError::FetchFailed(format!("websocket connect to {url} failed: {e}")))?;
        let (mut sink, mut stream) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<LinkFrame>(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<LinkEvent>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let result = match frame {
                    LinkFrame::Text(text) => sink.send(Message::Text(text.into())).await,
                    LinkFrame::Close { code, reason } => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code.unwrap_or(1000)),
                            reason: reason.unwrap_or_default().into(),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        break;
                    }
                };
                if let Err(e) = result {
                    tracing::debug!(error = %e, "Websocket write failed");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let closed = loop {
                let event = match stream.next().await {
                    Some(Ok(Message::Text(text))) => LinkEvent::Text(text.to_string()),
                    Some(Ok(Message::Binary(data))) => LinkEvent::Binary(data.to_vec()),
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => LinkEvent::Closed {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.to_string(),
                            },
                            None => LinkEvent::Closed {
                                code: None,
                                reason: String::new(),
                            },
                        };
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = inbound_tx.send(LinkEvent::Error(e.to_string())).await;
                        break LinkEvent::Closed {
                            code: None,
                            reason: String::new(),
                        };
                    }
                    None => {
                        break LinkEvent::Closed {
                            code: None,
                            reason: String::new(),
                        };
                    }
                };
                if inbound_tx.send(event).await.is_err() {
                    return;
                }
            };
            let _ = inbound_tx.send(closed).await;
        });

        Ok(DuplexLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
