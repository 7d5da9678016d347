//! RPC server: service registration, middleware chain, parallel request
//! processing, graceful shutdown.
//!
//! Request pipeline per connection:
//!
//! ```text
//! accept → reader task (frames are parsed sequentially)
//!   → per request: worker task
//!     → codec decode → middleware chain → service method → codec encode
//!     → write response under the connection's write lock
//! ```
//!
//! One reader per connection is forced by byte-stream parsing; one worker
//! per request keeps a slow handler from head-of-line blocking the rest of
//! the connection; the per-connection write lock keeps concurrent response
//! frames from interleaving.

mod service;

pub use service::{Method, Service};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};

use crate::codec::Codec;
use crate::error::{Result, RpcError};
use crate::message::{split_service_method, RpcMessage};
use crate::middleware::{chain, Context, Handler, Middleware};
use crate::protocol::{read_frame, write_frame, Header, MsgType};
use crate::registry::{Registry, ServiceInstance, DEFAULT_TTL_SECS};

/// Registration details remembered for graceful shutdown.
struct Registration {
    registry: Arc<dyn Registry>,
    advertise_addr: String,
    services: Vec<String>,
}

/// State shared between `serve` and `shutdown`.
struct Shared {
    shutdown: AtomicBool,
    shutdown_notify: Notify,
    in_flight: InFlight,
    registration: StdMutex<Option<Registration>>,
}

/// The RPC server.
///
/// Register services and middlewares first, then share the server (e.g. in
/// an `Arc`) between the task running [`serve`](Server::serve) and whoever
/// calls [`shutdown`](Server::shutdown).
pub struct Server {
    services: HashMap<String, Arc<Service>>,
    middlewares: Vec<Middleware>,
    shared: Arc<Shared>,
}

impl Server {
    /// Server with no services and no middlewares.
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
            middlewares: Vec::new(),
            shared: Arc::new(Shared {
                shutdown: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
                in_flight: InFlight::new(),
                registration: StdMutex::new(None),
            }),
        }
    }

    /// Register a service. A duplicate name replaces the previous service
    /// silently.
    pub fn register(&mut self, service: Service) {
        self.services
            .insert(service.name().to_string(), Arc::new(service));
    }

    /// Append a middleware. Middlewares run in registration order, first
    /// added outermost; the chain is composed once per `serve`.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    /// Bind `listen_addr` and process connections until shutdown.
    ///
    /// `advertise_addr` is what gets published to the registry; it differs
    /// from the listen address whenever the bind address (say `":8080"`) is
    /// not externally routable. Pass `None` to skip discovery.
    pub async fn serve(
        &self,
        listen_addr: &str,
        advertise_addr: &str,
        registry: Option<Arc<dyn Registry>>,
    ) -> Result<()> {
        // Bind before anything else so a bad address surfaces here and not
        // as a confusing accept-loop failure.
        let listener = tokio::net::TcpListener::bind(listen_addr).await?;

        let handler = chain(&self.middlewares)(business_handler(Arc::new(self.services.clone())));

        if let Some(registry) = registry {
            for name in self.services.keys() {
                registry
                    .register(name, ServiceInstance::new(advertise_addr), DEFAULT_TTL_SECS)
                    .await?;
            }
            *self.shared.registration.lock().expect("registration lock") = Some(Registration {
                registry,
                advertise_addr: advertise_addr.to_string(),
                services: self.services.keys().cloned().collect(),
            });
        }

        loop {
            tokio::select! {
                _ = self.shared.shutdown_notify.notified() => return Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!("accepted connection from {peer}");
                        tokio::spawn(handle_conn(
                            stream,
                            handler.clone(),
                            self.shared.in_flight.clone(),
                        ));
                    }
                    Err(err) => {
                        // During shutdown the listener error is expected;
                        // the flag distinguishes it from a real failure.
                        if self.shared.shutdown.load(Ordering::SeqCst) {
                            return Ok(());
                        }
                        return Err(err.into());
                    }
                },
            }
        }
    }

    /// Graceful shutdown.
    ///
    /// 1. Deregister every service so clients stop routing here.
    /// 2. Set the shutdown flag, then stop the accept loop. Flag first:
    ///    closing first would surface the listener error before the flag and
    ///    the accept loop would report it as real.
    /// 3. Wait for in-flight requests to drain, racing `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        let registration = self
            .shared
            .registration
            .lock()
            .expect("registration lock")
            .take();
        if let Some(reg) = registration {
            for service in &reg.services {
                if let Err(err) = reg.registry.deregister(service, &reg.advertise_addr).await {
                    tracing::warn!("deregister {service} failed: {err}");
                }
            }
        }

        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.shutdown_notify.notify_one();

        tokio::time::timeout(timeout, self.shared.in_flight.wait_idle())
            .await
            .map_err(|_| RpcError::ShutdownTimeout)
    }

    /// Requests currently being processed (diagnostics).
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.count()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// The innermost handler: service lookup and method invocation.
///
/// The service map is cloned into an `Arc` when the chain is built and is
/// read-only from then on, so no lock is needed.
fn business_handler(services: Arc<HashMap<String, Arc<Service>>>) -> Handler {
    Arc::new(move |ctx, req: RpcMessage| {
        let services = services.clone();
        Box::pin(async move {
            match dispatch(&services, ctx, &req).await {
                Ok(payload) => RpcMessage::reply(req.service_method.clone(), payload),
                // Lookup and handler failures become the envelope's error
                // string; they must never take the dispatcher down.
                Err(err) => RpcMessage::error_reply(err.to_string()),
            }
        })
    })
}

async fn dispatch(
    services: &HashMap<String, Arc<Service>>,
    ctx: Context,
    req: &RpcMessage,
) -> Result<Vec<u8>> {
    let (service_name, method_name) = split_service_method(&req.service_method)?;
    let service = services
        .get(service_name)
        .ok_or_else(|| RpcError::UnknownService(service_name.to_string()))?;
    let method = service
        .get(method_name)
        .ok_or_else(|| RpcError::UnknownMethod(req.service_method.clone()))?;
    method.call(ctx, &req.payload).await
}

/// Per-connection reader. Frames must be parsed by exactly one task, but
/// each request is handed to its own worker so a slow handler cannot stall
/// the connection.
async fn handle_conn(stream: TcpStream, handler: Handler, in_flight: InFlight) {
    let (mut reader, writer) = stream.into_split();
    // Shared by every worker on this connection; keeps response frames from
    // interleaving without coupling connections to each other.
    let writer = Arc::new(Mutex::new(writer));

    loop {
        let (header, body) = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!("connection reader exiting: {err}");
                return;
            }
        };

        match header.msg_type {
            // Heartbeats only prove the peer is alive.
            MsgType::Heartbeat => continue,
            MsgType::Response => {
                tracing::debug!("ignoring response frame from client (seq {})", header.seq);
                continue;
            }
            MsgType::Request => {
                // Counted before spawning so shutdown can never observe a
                // gap between accept and the worker starting.
                let guard = in_flight.enter();
                tokio::spawn(handle_request(
                    header,
                    body,
                    writer.clone(),
                    handler.clone(),
                    guard,
                ));
            }
        }
    }
}

/// One worker per request: decode, run the chain, encode, write back under
/// the connection's write lock, echoing the request's seq and codec.
async fn handle_request(
    header: Header,
    body: Bytes,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    handler: Handler,
    _guard: InFlightGuard,
) {
    let codec = Codec::for_kind(header.codec);

    let resp = match codec.decode(&body) {
        Ok(req) => handler(Context::background(), req).await,
        Err(err) => {
            tracing::warn!("undecodable request body (seq {}): {err}", header.seq);
            RpcMessage::error_reply(err.to_string())
        }
    };

    let body = match codec.encode(&resp) {
        Ok(body) => body,
        Err(err) => {
            tracing::error!("failed to encode response (seq {}): {err}", header.seq);
            return;
        }
    };

    let reply_header = Header::new(
        header.codec,
        MsgType::Response,
        header.seq,
        body.len() as u32,
    );

    let mut writer = writer.lock().await;
    if let Err(err) = write_frame(&mut *writer, &reply_header, &body).await {
        tracing::debug!("failed to write response (seq {}): {err}", header.seq);
    }
}

/// Process-wide count of requests being handled, awaitable at zero.
#[derive(Clone)]
struct InFlight {
    inner: Arc<InFlightInner>,
}

struct InFlightInner {
    count: AtomicUsize,
    drained: Notify,
}

impl InFlight {
    fn new() -> Self {
        Self {
            inner: Arc::new(InFlightInner {
                count: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }

    fn enter(&self) -> InFlightGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            inner: self.inner.clone(),
        }
    }

    fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            // Arm the notification before checking, so a decrement between
            // the check and the await cannot be missed.
            let drained = self.inner.drained.notified();
            if self.count() == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// Decrements the counter on drop, however the worker exits.
struct InFlightGuard {
    inner: Arc<InFlightInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Args {
        a: i64,
        b: i64,
    }

    #[derive(Serialize, Deserialize)]
    struct Reply {
        result: i64,
    }

    fn arith_services() -> Arc<HashMap<String, Arc<Service>>> {
        let service = Service::new("Arith").method("Add", |args: Args, _ctx| async move {
            Ok(Reply {
                result: args.a + args.b,
            })
        });
        let mut map = HashMap::new();
        map.insert("Arith".to_string(), Arc::new(service));
        Arc::new(map)
    }

    fn add_request(a: i64, b: i64) -> RpcMessage {
        RpcMessage::request("Arith.Add", serde_json::to_vec(&Args { a, b }).unwrap())
    }

    #[tokio::test]
    async fn business_handler_dispatches() {
        let handler = business_handler(arith_services());

        let resp = handler(Context::background(), add_request(1, 2)).await;
        assert!(!resp.is_error());
        assert_eq!(resp.service_method, "Arith.Add");
        let reply: Reply = serde_json::from_slice(&resp.payload).unwrap();
        assert_eq!(reply.result, 3);
    }

    #[tokio::test]
    async fn malformed_service_method_is_an_envelope_error() {
        let handler = business_handler(arith_services());

        for bad in ["NoDot", "Too.Many.Dots", ".Add", "Arith."] {
            let resp = handler(
                Context::background(),
                RpcMessage::request(bad, b"{}".to_vec()),
            )
            .await;
            assert!(resp.is_error(), "{bad} should fail");
            assert!(resp.error.contains("invalid service method"), "{bad}: {}", resp.error);
        }
    }

    #[tokio::test]
    async fn unknown_service_and_method_are_envelope_errors() {
        let handler = business_handler(arith_services());

        let resp = handler(Context::background(), RpcMessage::request("Nope.Add", vec![])).await;
        assert!(resp.error.contains("unknown service"));

        let resp = handler(Context::background(), RpcMessage::request("Arith.Nope", vec![])).await;
        assert!(resp.error.contains("unknown method"));
    }

    #[tokio::test]
    async fn bad_args_payload_is_an_envelope_error() {
        let handler = business_handler(arith_services());

        let resp = handler(
            Context::background(),
            RpcMessage::request("Arith.Add", b"not json".to_vec()),
        )
        .await;
        assert!(resp.is_error());
    }

    #[tokio::test]
    async fn in_flight_counter_drains() {
        let in_flight = InFlight::new();
        let g1 = in_flight.enter();
        let g2 = in_flight.enter();
        assert_eq!(in_flight.count(), 2);

        let waiter = {
            let in_flight = in_flight.clone();
            tokio::spawn(async move { in_flight.wait_idle().await })
        };

        drop(g1);
        drop(g2);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait_idle should finish once guards drop")
            .unwrap();
        assert_eq!(in_flight.count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_idle() {
        let in_flight = InFlight::new();
        tokio::time::timeout(Duration::from_millis(50), in_flight.wait_idle())
            .await
            .expect("idle counter should not block");
    }
}
