//! Content-Length framed byte transport, shared by the LSP child connection
//! and the MCP stdio surface (same framing, different streams).

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::message::{Frame, FrameError};

const HEADER_NAME: &str = "content-length";

/// Reads one frame at a time from a `Content-Length`-delimited byte stream.
///
/// Not `Clone` or `Sync`: a single reader task owns this side, per the
/// "one reader task demultiplexes inbound frames" design.
pub struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Reads and decodes the next frame.
    ///
    /// Returns `Ok(None)` on a decode failure for a structurally complete
    /// frame (the frame is dropped and logged, matching the spec's "dropped,
    /// session continues" contract for a bad JSON body). Any header-level or
    /// I/O failure is fatal and returned as `Err`.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let content_length = self.read_content_length().await?;
        let mut body = vec![0u8; content_length];
        self.inner
            .read_exact(&mut body)
            .await
            .map_err(|e| map_read_error(e, content_length))?;

        match Frame::decode(&body) {
            Ok(frame) => Ok(Some(frame)),
            Err(FrameError::InvalidJson(e)) => {
                warn!(error = %e, "dropping frame with invalid JSON body");
                Ok(None)
            }
            Err(FrameError::Empty(_)) => {
                warn!("dropping frame with neither method nor result/error");
                Ok(None)
            }
        }
    }

    async fn read_content_length(&mut self) -> Result<usize> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        loop {
            line.clear();
            let n = self
                .inner
                .read_line(&mut line)
                .await
                .map_err(|_| Error::TransportClosed)?;
            if n == 0 {
                return Err(Error::TransportClosed);
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            if let Some((name, value)) = trimmed.split_once(':') {
                if name.trim().eq_ignore_ascii_case(HEADER_NAME) {
                    let parsed = value.trim().parse::<usize>().map_err(|_| {
                        Error::TransportProtocol(format!("invalid Content-Length: {value}"))
                    })?;
                    content_length = Some(parsed);
                }
                // Other headers are ignored per the spec.
            }
        }
        content_length.ok_or_else(|| {
            Error::TransportProtocol("frame header missing Content-Length".into())
        })
    }
}

fn map_read_error(e: io::Error, expected_len: usize) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::TransportProtocol(format!(
            "short read: expected {expected_len} body bytes, stream ended early"
        ))
    } else {
        Error::TransportClosed
    }
}

/// Writes frames to a byte stream, serializing concurrent writers behind a
/// single lock so that one `Content-Length` header plus its body is never
/// interleaved with another writer's frame.
pub struct FrameWriter<W> {
    inner: Mutex<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub async fn write_frame(&self, frame: &Frame) -> Result<()> {
        let body = frame
            .encode()
            .map_err(|e| Error::TransportProtocol(format!("failed to encode frame: {e}")))?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        let mut writer = self.inner.lock().await;
        writer
            .write_all(header.as_bytes())
            .await
            .map_err(|_| Error::TransportClosed)?;
        writer
            .write_all(&body)
            .await
            .map_err(|_| Error::TransportClosed)?;
        writer.flush().await.map_err(|_| Error::TransportClosed)?;
        debug!(bytes = body.len(), "wrote frame");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AnyNotification, AnyRequest, RequestId};

    #[tokio::test]
    async fn round_trips_a_frame_through_a_pipe() {
        let (client, server) = tokio::io::duplex(4096);

        let writer = FrameWriter::new(client);
        let frame = Frame::Request(AnyRequest {
            id: RequestId::Number(1),
            method: "initialize".into(),
            params: serde_json::json!({"rootUri": null}),
        });
        writer.write_frame(&frame).await.unwrap();

        let mut reader = FrameReader::new(server);
        let decoded = reader.read_frame().await.unwrap().unwrap();
        match decoded {
            Frame::Request(req) => assert_eq!(req.method, "initialize"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn eof_before_header_is_transport_closed() {
        let (client, server) = tokio::io::duplex(16);
        drop(server);
        let mut reader = FrameReader::new(client);
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, Error::TransportClosed));
    }

    #[tokio::test]
    async fn malformed_json_body_is_dropped_not_fatal() {
        let (mut client, server) = tokio::io::duplex(4096);
        let body = b"{not json}";
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        client.write_all(header.as_bytes()).await.unwrap();
        client.write_all(body).await.unwrap();
        drop(client);

        let mut reader = FrameReader::new(server);
        let frame = reader.read_frame().await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn notification_round_trip() {
        let (client, server) = tokio::io::duplex(4096);

        let writer = FrameWriter::new(client);
        let notif = Frame::Notification(AnyNotification {
            method: "textDocument/publishDiagnostics".into(),
            params: serde_json::json!({"uri": "file:///a.rs", "diagnostics": []}),
        });
        writer.write_frame(&notif).await.unwrap();

        let mut reader = FrameReader::new(server);
        match reader.read_frame().await.unwrap().unwrap() {
            Frame::Notification(n) => assert_eq!(n.method, "textDocument/publishDiagnostics"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
