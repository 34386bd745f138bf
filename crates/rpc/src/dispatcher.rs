//! Request/response/notification multiplexer over a framed transport.
//!
//! A single reader task demultiplexes inbound frames by shape: `id` +
//! `method` is a server-initiated request, `id` alone (with `result` or
//! `error`) is a response to one of our requests, `method` alone is a
//! notification. Everything else about concurrent use of [`Dispatcher`] is
//! ordinary shared-state Rust: `call` parks a waiter in the pending table and
//! awaits it, `notify` just writes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::message::{
    error_codes, AnyNotification, AnyRequest, AnyResponse, Frame, JsonValue, RequestId,
    ResponseError,
};
use crate::transport::{FrameReader, FrameWriter};
use lspbridge_worker::HandlerPool;

type RequestHandler =
    Arc<dyn Fn(JsonValue) -> Pin<Box<dyn Future<Output = Result<JsonValue>> + Send>> + Send + Sync>;
type NotificationHandler = Arc<dyn Fn(JsonValue) + Send + Sync>;

struct PendingTable {
    next_id: AtomicI64,
    waiters: SyncMutex<HashMap<RequestId, oneshot::Sender<Result<JsonValue>>>>,
}

impl PendingTable {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            waiters: SyncMutex::new(HashMap::new()),
        }
    }

    fn allocate(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn park(&self, id: RequestId) -> oneshot::Receiver<Result<JsonValue>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(id, tx);
        rx
    }

    fn release(&self, id: &RequestId) {
        self.waiters.lock().remove(id);
    }

    fn complete(&self, id: &RequestId, result: Result<JsonValue>) {
        if let Some(tx) = self.waiters.lock().remove(id) {
            let _ = tx.send(result);
        }
    }

    fn fail_all(&self, err: impl Fn() -> Error) {
        let mut waiters = self.waiters.lock();
        for (_, tx) in waiters.drain() {
            let _ = tx.send(Err(err()));
        }
    }
}

/// Request/response/notification pump over a single duplex JSON-RPC session.
///
/// Generic over the write half so the same dispatcher drives both a child
/// process's stdin (the LSP connection) and the MCP stdio surface's stdout.
pub struct Dispatcher<W> {
    writer: Arc<FrameWriter<W>>,
    pending: Arc<PendingTable>,
    closed: CancellationToken,
}

impl<W: AsyncWrite + Unpin + Send + 'static> Dispatcher<W> {
    /// Spawns the reader task and returns the dispatcher handle.
    ///
    /// Server-initiated traffic is routed through the returned
    /// [`DispatcherHandlers`]; unset methods reply with `MethodNotFound`
    /// (requests) or are logged and dropped (notifications).
    pub fn spawn<R>(reader: R, writer: W, pool: Arc<HandlerPool>) -> (Self, DispatcherHandlers)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let pending = Arc::new(PendingTable::new());
        let writer = Arc::new(FrameWriter::new(writer));
        let closed = CancellationToken::new();
        let handlers = DispatcherHandlers::new();

        let reader_pending = pending.clone();
        let reader_writer = writer.clone();
        let reader_closed = closed.clone();
        let reader_handlers = handlers.clone();
        tokio::spawn(async move {
            run_reader(
                reader,
                reader_writer,
                reader_pending,
                reader_handlers,
                reader_closed,
                pool,
            )
            .await;
        });

        (
            Self {
                writer,
                pending,
                closed,
            },
            handlers,
        )
    }

    /// Issues a request and awaits its response, honoring `cancel`.
    ///
    /// Cancellation is best-effort: `$/cancelRequest` is sent, but the
    /// caller is released immediately with [`Error::Cancelled`] rather
    /// than waiting for the server's eventual (and possibly absent)
    /// terminal response. The reader task still drains that response
    /// when it arrives and discards it via `release`.
    pub async fn call(
        &self,
        method: &str,
        params: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<JsonValue> {
        if self.closed.is_cancelled() {
            return Err(Error::SessionClosed);
        }
        let id = self.pending.allocate();
        let rx = self.pending.park(id.clone());

        self.writer
            .write_frame(&Frame::Request(AnyRequest {
                id: id.clone(),
                method: method.to_string(),
                params,
            }))
            .await?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.pending.release(&id);
                let _ = self
                    .writer
                    .write_frame(&Frame::Notification(AnyNotification {
                        method: "$/cancelRequest".into(),
                        params: serde_json::json!({ "id": id }),
                    }))
                    .await;
                Err(Error::Cancelled)
            }
            _ = self.closed.cancelled() => {
                self.pending.release(&id);
                Err(Error::SessionClosed)
            }
            result = rx => {
                result.unwrap_or(Err(Error::SessionClosed))
            }
        }
    }

    /// Fire-and-forget: writes a notification frame, no response expected.
    pub async fn notify(&self, method: &str, params: JsonValue) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Error::SessionClosed);
        }
        self.writer
            .write_frame(&Frame::Notification(AnyNotification {
                method: method.to_string(),
                params,
            }))
            .await
    }

    /// Drains writers, marks the session closed, and fails every
    /// outstanding waiter with [`Error::SessionClosed`].
    pub fn close(&self) {
        self.closed.cancel();
        self.pending.fail_all(|| Error::SessionClosed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session is closed, whether by an explicit
    /// [`Self::close`] call or the reader task ending on its own (EOF,
    /// fatal transport error).
    pub async fn wait_closed(&self) {
        self.closed.cancelled().await;
    }
}

/// Registration surface for inbound (server-initiated) traffic.
#[derive(Clone)]
pub struct DispatcherHandlers {
    requests: Arc<SyncMutex<HashMap<String, RequestHandler>>>,
    notifications: Arc<SyncMutex<HashMap<String, NotificationHandler>>>,
}

impl DispatcherHandlers {
    fn new() -> Self {
        Self {
            requests: Arc::new(SyncMutex::new(HashMap::new())),
            notifications: Arc::new(SyncMutex::new(HashMap::new())),
        }
    }

    /// Registers a handler for a server-initiated request. The handler's
    /// future resolves to the JSON `result` (or an error) sent back as the reply.
    pub fn on_request<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue>> + Send + 'static,
    {
        self.requests
            .lock()
            .insert(method.into(), Arc::new(move |p| Box::pin(handler(p))));
    }

    /// Registers a handler for an inbound notification.
    pub fn on_notify<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(JsonValue) + Send + Sync + 'static,
    {
        self.notifications
            .lock()
            .insert(method.into(), Arc::new(handler));
    }
}

async fn run_reader<R, W>(
    reader: R,
    writer: Arc<FrameWriter<W>>,
    pending: Arc<PendingTable>,
    handlers: DispatcherHandlers,
    closed: CancellationToken,
    pool: Arc<HandlerPool>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut reader = FrameReader::new(reader);
    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = reader.read_frame() => frame,
        };

        match frame {
            Ok(Some(Frame::Response(resp))) => {
                pending.complete(&resp.id, resp.payload.map_err(Error::Rpc));
            }
            Ok(Some(Frame::Request(req))) => {
                let handler = handlers.requests.lock().get(&req.method).cloned();
                let writer = writer.clone();
                match handler {
                    Some(handler) => {
                        pool.submit_guarded("inbound-request", async move {
                            let reply = match handler(req.params).await {
                                Ok(result) => AnyResponse::new_ok(req.id, result),
                                Err(err) => AnyResponse::new_err(
                                    req.id,
                                    ResponseError {
                                        code: error_codes::INTERNAL_ERROR,
                                        message: err.to_string(),
                                        data: None,
                                    },
                                ),
                            };
                            if let Err(e) = writer.write_frame(&Frame::Response(reply)).await {
                                warn!(error = %e, "failed to write reply for inbound request");
                            }
                        });
                    }
                    None => {
                        debug!(method = %req.method, "no handler for inbound request");
                        let reply = AnyResponse::new_err(
                            req.id,
                            ResponseError {
                                code: error_codes::METHOD_NOT_FOUND,
                                message: format!("method not found: {}", req.method),
                                data: None,
                            },
                        );
                        if let Err(e) = writer.write_frame(&Frame::Response(reply)).await {
                            warn!(error = %e, "failed to write MethodNotFound reply");
                        }
                    }
                }
            }
            Ok(Some(Frame::Notification(notif))) => {
                let handler = handlers.notifications.lock().get(&notif.method).cloned();
                match handler {
                    Some(handler) => handler(notif.params),
                    None => debug!(method = %notif.method, "no handler for notification"),
                }
            }
            Ok(None) => continue, // malformed frame already logged by the transport
            Err(Error::TransportClosed) => {
                debug!("transport closed, ending reader loop");
                break;
            }
            Err(e) => {
                error!(error = %e, "fatal transport error, ending session");
                break;
            }
        }
    }
    closed.cancel();
    pending.fail_all(|| Error::SessionClosed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    // Drives the dispatcher against a fake peer on a duplex pipe, since
    // ChildStdin/ChildStdout aren't constructible in unit tests.
    #[tokio::test]
    async fn call_round_trips_against_fake_peer() {
        let (ours, theirs) = tokio::io::duplex(8192);
        let (our_read, our_write) = tokio::io::split(ours);
        let (their_read, their_write) = tokio::io::split(theirs);

        let pool = Arc::new(HandlerPool::new(4));
        let (dispatcher, _handlers) = Dispatcher::spawn(our_read, our_write, pool);

        // Fake peer: read one request, reply with a canned result.
        tokio::spawn(async move {
            let mut reader = FrameReader::new(their_read);
            let writer = FrameWriter::new(their_write);
            if let Ok(Some(Frame::Request(req))) = reader.read_frame().await {
                let reply = AnyResponse::new_ok(req.id, serde_json::json!({"pong": true}));
                writer.write_frame(&Frame::Response(reply)).await.unwrap();
            }
        });

        let cancel = CancellationToken::new();
        let result = dispatcher
            .call("ping", serde_json::json!({}), &cancel)
            .await
            .unwrap();
        assert_eq!(result["pong"], true);
    }

    #[tokio::test]
    async fn cancellation_releases_waiter_immediately() {
        let (ours, theirs) = tokio::io::duplex(8192);
        let (our_read, our_write) = tokio::io::split(ours);
        let (their_read, _their_write) = tokio::io::split(theirs);

        let pool = Arc::new(HandlerPool::new(4));
        let (dispatcher, _handlers) = Dispatcher::spawn(our_read, our_write, pool);

        // Peer never replies.
        tokio::spawn(async move {
            let mut reader = FrameReader::new(their_read);
            let _ = reader.read_frame().await;
        });

        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(dispatcher);
        let d2 = dispatcher.clone();
        let c2 = cancel.clone();
        let call = tokio::spawn(async move { d2.call("slow", serde_json::json!({}), &c2).await });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cancel.cancel();

        let result = tokio::time::timeout(std::time::Duration::from_millis(100), call)
            .await
            .expect("should resolve quickly")
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn unregistered_server_request_gets_method_not_found() {
        let (ours, theirs) = tokio::io::duplex(8192);
        let (our_read, our_write) = tokio::io::split(ours);
        let (their_read, their_write) = tokio::io::split(theirs);

        let pool = Arc::new(HandlerPool::new(4));
        let (_dispatcher, _handlers) = Dispatcher::spawn(our_read, our_write, pool);

        let writer = FrameWriter::new(their_write);
        writer
            .write_frame(&Frame::Request(AnyRequest {
                id: RequestId::Number(99),
                method: "client/registerCapability".into(),
                params: serde_json::json!({}),
            }))
            .await
            .unwrap();

        let mut reader = FrameReader::new(their_read);
        match reader.read_frame().await.unwrap().unwrap() {
            Frame::Response(resp) => {
                let err = resp.payload.unwrap_err();
                assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn registered_request_handler_replies() {
        let (ours, theirs) = tokio::io::duplex(8192);
        let (our_read, our_write) = tokio::io::split(ours);
        let (their_read, their_write) = tokio::io::split(theirs);

        let pool = Arc::new(HandlerPool::new(4));
        let (_dispatcher, handlers) = Dispatcher::spawn(our_read, our_write, pool);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        handlers.on_request("workspace/applyEdit", move |_params| {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({"applied": true}))
            }
        });

        let writer = FrameWriter::new(their_write);
        writer
            .write_frame(&Frame::Request(AnyRequest {
                id: RequestId::Number(1),
                method: "workspace/applyEdit".into(),
                params: serde_json::json!({}),
            }))
            .await
            .unwrap();

        let mut reader = FrameReader::new(their_read);
        match reader.read_frame().await.unwrap().unwrap() {
            Frame::Response(resp) => assert_eq!(resp.payload.unwrap()["applied"], true),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_fails_outstanding_waiters() {
        let (ours, theirs) = tokio::io::duplex(8192);
        let (our_read, our_write) = tokio::io::split(ours);
        let (their_read, _their_write) = tokio::io::split(theirs);

        let pool = Arc::new(HandlerPool::new(4));
        let (dispatcher, _handlers) = Dispatcher::spawn(our_read, our_write, pool);
        tokio::spawn(async move {
            let mut reader = FrameReader::new(their_read);
            let _ = reader.read_frame().await;
        });

        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(dispatcher);
        let d2 = dispatcher.clone();
        let c2 = cancel.clone();
        let call = tokio::spawn(async move { d2.call("slow", serde_json::json!({}), &c2).await });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        dispatcher.close();

        let result = call.await.unwrap();
        assert!(matches!(result, Err(Error::SessionClosed)));
    }
}
