//! Text-frame views over WebSocket connections.
//!
//! The accepting side of a link is an axum socket and the dialing side a
//! tokio-tungstenite socket. Both are reduced to a stream of text frames and
//! a sink of text frames so the replication loops are written once.

use std::pin::Pin;

use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures_util::future;
use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message as WireMessage};
use tokio_tungstenite::WebSocketStream;

use crate::error::LinkError;

/// Incoming text frames. A remote close surfaces as [`LinkError::Closed`].
pub type FrameStream = BoxStream<'static, Result<String, LinkError>>;

/// Outgoing text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = LinkError> + Send>>;

/// Splits a dialed connection into frame halves.
pub fn split_dialed<S>(socket: WebSocketStream<S>) -> (FrameSink, FrameStream)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = socket.split();

    let sink = sink
        .sink_map_err(|err| match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                LinkError::Closed
            }
            other => LinkError::Transport(other.to_string()),
        })
        .with(|text: String| future::ready(Ok::<_, LinkError>(WireMessage::Text(text))));

    let stream = stream
        .filter_map(|message| {
            future::ready(match message {
                Ok(WireMessage::Text(text)) => Some(Ok(text)),
                Ok(WireMessage::Binary(bytes)) => Some(binary_frame(bytes)),
                Ok(WireMessage::Close(_)) => Some(Err(LinkError::Closed)),
                Ok(_) => None,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    Some(Err(LinkError::Closed))
                }
                Err(err) => Some(Err(LinkError::Transport(err.to_string()))),
            })
        })
        .boxed();

    (Box::pin(sink), stream)
}

/// Splits an accepted connection into frame halves.
pub fn split_accepted(socket: WebSocket) -> (FrameSink, FrameStream) {
    let (sink, stream) = socket.split();

    let sink = sink
        .sink_map_err(|err| LinkError::Transport(err.to_string()))
        .with(|text: String| future::ready(Ok::<_, LinkError>(AxumMessage::Text(text))));

    let stream = stream
        .filter_map(|message| {
            future::ready(match message {
                Ok(AxumMessage::Text(text)) => Some(Ok(text)),
                Ok(AxumMessage::Binary(bytes)) => Some(binary_frame(bytes)),
                Ok(AxumMessage::Close(_)) => Some(Err(LinkError::Closed)),
                Ok(_) => None,
                Err(err) => Some(Err(LinkError::Transport(err.to_string()))),
            })
        })
        .boxed();

    (Box::pin(sink), stream)
}

fn binary_frame(bytes: Vec<u8>) -> Result<String, LinkError> {
    String::from_utf8(bytes).map_err(|err| LinkError::Malformed(err.to_string()))
}
