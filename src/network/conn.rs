//! One broker connection: TCP (+ optional TLS) with Kafka framing, SASL
//! authentication, correlation-id assignment and an in-flight table with
//! FIFO response dispatch.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Semaphore};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::errors::{Error, ErrorKind, Result};
use crate::network::codec::FrameCodec;
use crate::network::request::KafkaRequest;
use crate::network::response::KafkaResponse;
use crate::network::sasl::{SaslConfig, SaslSession};
use crate::protocol::{
    select_version, ApiKey, ApiKeys, ApiVersion, CorrelationId, ProduceResponse, RequestHeader,
    ResponseHeader, SaslAuthenticateRequest, SaslHandshakeRequest,
};

pub trait AsyncRW: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncRW for T {}

/// TLS settings already resolved into a connector; SNI uses the broker
/// host name unless overridden.
#[derive(Clone)]
pub struct TlsOptions {
    pub connector: tokio_native_tls::TlsConnector,
    pub domain: Option<String>,
}

/// Everything a connection needs to come up, owned by the pool.
#[derive(Clone)]
pub struct ConnectOptions {
    pub client_id: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_inflights: usize,
    pub max_frame_size: usize,
    pub tls: Option<TlsOptions>,
    pub sasl: Option<SaslConfig>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            client_id: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_inflights: 5,
            max_frame_size: crate::network::codec::DEFAULT_MAX_FRAME_SIZE,
            tls: None,
            sasl: None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Ready,
    Closed,
}

struct PendingRequest {
    api_keys: ApiKeys,
    api_version: ApiVersion,
    tx: oneshot::Sender<Result<KafkaResponse>>,
}

#[derive(Default)]
struct Inflight {
    pending: HashMap<CorrelationId, PendingRequest>,
    /// FIFO of correlation ids in request order; responses must arrive in
    /// exactly this order.
    order: VecDeque<CorrelationId>,
    /// Requests whose deadline expired; their responses are discarded on
    /// arrival instead of killing the connection.
    timed_out: HashSet<CorrelationId>,
}

struct ConnInner {
    addr: SocketAddr,
    client_id: Option<String>,
    request_timeout: Duration,
    correlation: AtomicI32,
    writer: tokio::sync::Mutex<FramedWrite<WriteHalf<Box<dyn AsyncRW>>, FrameCodec>>,
    inflight: Mutex<Inflight>,
    permits: Arc<Semaphore>,
    state: Mutex<ConnectionState>,
    /// Version ranges the broker advertised via ApiVersions.
    api_versions: Mutex<Option<HashMap<ApiKey, (ApiVersion, ApiVersion)>>>,
    shutdown: watch::Sender<bool>,
}

/// A shared handle to one broker connection.
#[derive(Clone)]
pub struct KafkaConnection {
    inner: Arc<ConnInner>,
}

impl fmt::Debug for KafkaConnection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("KafkaConnection")
            .field("addr", &self.inner.addr)
            .field("state", &self.state())
            .finish()
    }
}

impl KafkaConnection {
    /// Open a socket, negotiate TLS when configured, start the reader task
    /// and run SASL before handing the connection out.
    pub async fn connect(host: &str, addr: SocketAddr, options: ConnectOptions) -> Result<Self> {
        debug!("connecting to broker @ {} ({})", addr, host);

        let tcp = tokio::time::timeout(options.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::from(ErrorKind::RequestTimeout(options.connect_timeout)))??;
        tcp.set_nodelay(true)?;

        let stream: Box<dyn AsyncRW> = match &options.tls {
            Some(tls) => {
                let domain = tls.domain.as_deref().unwrap_or(host);
                trace!("starting TLS handshake with {}", domain);
                Box::new(tls.connector.connect(domain, tcp).await?)
            }
            None => Box::new(tcp),
        };

        let (read_half, write_half) = tokio::io::split(stream);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(ConnInner {
            addr,
            client_id: options.client_id.clone(),
            request_timeout: options.request_timeout,
            correlation: AtomicI32::new(0),
            writer: tokio::sync::Mutex::new(FramedWrite::new(
                write_half,
                FrameCodec::new(options.max_frame_size),
            )),
            inflight: Mutex::new(Inflight::default()),
            permits: Arc::new(Semaphore::new(options.max_inflights)),
            state: Mutex::new(ConnectionState::Connecting),
            api_versions: Mutex::new(None),
            shutdown,
        });

        tokio::spawn(read_loop(
            inner.clone(),
            FramedRead::new(read_half, FrameCodec::new(options.max_frame_size)),
            shutdown_rx,
        ));

        let conn = KafkaConnection { inner };

        if let Some(sasl) = &options.sasl {
            conn.set_state(ConnectionState::Authenticating);
            if let Err(err) = conn.authenticate(sasl).await {
                conn.close(&format!("authentication failed, {}", err));
                return Err(err);
            }
        }

        conn.set_state(ConnectionState::Ready);
        debug!("broker @ {} connected", addr);
        Ok(conn)
    }

    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    pub fn client_id(&self) -> Option<String> {
        self.inner.client_id.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().unwrap()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Requests currently awaiting a response.
    pub fn in_flight_requests(&self) -> usize {
        self.inner.inflight.lock().unwrap().pending.len()
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = self.inner.state.lock().unwrap();
        if *current != ConnectionState::Closed {
            *current = state;
        }
    }

    /// Store the version ranges the broker advertised.
    pub fn set_api_versions(&self, versions: HashMap<ApiKey, (ApiVersion, ApiVersion)>) {
        *self.inner.api_versions.lock().unwrap() = Some(versions);
    }

    pub fn has_api_versions(&self) -> bool {
        self.inner.api_versions.lock().unwrap().is_some()
    }

    /// Negotiate the version to use for an API on this connection.
    pub fn version_for(&self, api_keys: ApiKeys) -> Result<ApiVersion> {
        let range = self
            .inner
            .api_versions
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|versions| versions.get(&api_keys.key()).copied());
        select_version(api_keys, range)
    }

    /// Build a request header for this connection; the correlation id is
    /// assigned later, inside `send`.
    pub fn request_header(&self, api_keys: ApiKeys, api_version: ApiVersion) -> RequestHeader {
        RequestHeader {
            api_key: api_keys.key(),
            api_version,
            correlation_id: 0,
            client_id: self.inner.client_id.clone(),
        }
    }

    /// Send one request and await its response, observing the per-request
    /// deadline and the in-flight cap.
    pub async fn send(&self, request: KafkaRequest) -> Result<KafkaResponse> {
        self.send_with_timeout(request, self.inner.request_timeout)
            .await
    }

    /// `send` with a caller-chosen deadline, for requests the broker may
    /// legitimately hold longer than the default (JoinGroup, Fetch with a
    /// long max wait).
    pub async fn send_with_timeout(
        &self,
        mut request: KafkaRequest,
        request_timeout: Duration,
    ) -> Result<KafkaResponse> {
        if self.is_closed() {
            bail!(ErrorKind::ClientClosed(format!(
                "connection to {} closed",
                self.inner.addr
            )));
        }

        let _permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| {
                Error::from(ErrorKind::ClientClosed(format!(
                    "connection to {} closed",
                    self.inner.addr
                )))
            })?;

        let correlation_id = self.inner.correlation.fetch_add(1, Ordering::Relaxed);
        request.set_correlation_id(correlation_id);

        let api_keys = request.api_keys();
        let api_version = request.api_version();
        let response_expected = request.response_expected();

        let mut frame = BytesMut::with_capacity(256);
        request.encode(&mut frame)?;
        let frame = frame.freeze();

        trace!(
            "sending {} v{} (correlation {}) of {} bytes to {}",
            api_keys,
            api_version,
            correlation_id,
            frame.len(),
            self.inner.addr
        );

        let rx = if response_expected {
            let (tx, rx) = oneshot::channel();
            let mut inflight = self.inner.inflight.lock().unwrap();
            inflight.pending.insert(
                correlation_id,
                PendingRequest {
                    api_keys,
                    api_version,
                    tx,
                },
            );
            inflight.order.push_back(correlation_id);
            Some(rx)
        } else {
            None
        };

        if let Err(err) = self.write_frame(frame).await {
            if response_expected {
                let mut inflight = self.inner.inflight.lock().unwrap();
                inflight.pending.remove(&correlation_id);
                inflight.order.retain(|id| *id != correlation_id);
            }
            return Err(err);
        }

        let rx = match rx {
            Some(rx) => rx,
            // acks=0: succeed once the bytes are flushed
            None => {
                return Ok(KafkaResponse::Produce(ProduceResponse {
                    header: ResponseHeader { correlation_id },
                    topics: Vec::new(),
                    throttle_time_ms: None,
                }));
            }
        };

        match tokio::time::timeout(request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => bail!(ErrorKind::ClientClosed(format!(
                "connection to {} closed",
                self.inner.addr
            ))),
            Err(_) => {
                // leave the correlation in the order queue; the broker will
                // still answer in FIFO order and the reader discards it
                let mut inflight = self.inner.inflight.lock().unwrap();
                inflight.pending.remove(&correlation_id);
                inflight.timed_out.insert(correlation_id);
                bail!(ErrorKind::RequestTimeout(request_timeout))
            }
        }
    }

    async fn write_frame(&self, frame: Bytes) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;
        writer.send(frame).await
    }

    /// SaslHandshake + SaslAuthenticate rounds; must finish before any
    /// other API request is issued on this connection.
    async fn authenticate(&self, config: &SaslConfig) -> Result<()> {
        let mut session = SaslSession::new(config)?;
        let mechanism = config.mechanism();

        debug!("authenticating to {} via {}", self.inner.addr, mechanism);

        let handshake = KafkaRequest::SaslHandshake(SaslHandshakeRequest {
            header: self.request_header(ApiKeys::SaslHandshake, 1),
            mechanism: mechanism.to_owned(),
        });
        match self.send(handshake).await? {
            KafkaResponse::SaslHandshake(res) => {
                if res.error_code != 0 {
                    bail!(ErrorKind::UnsupportedSaslMechanism(format!(
                        "{} (broker offers {})",
                        mechanism,
                        res.mechanisms.join(", ")
                    )));
                }
            }
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        }

        let mut token = session.initial_response()?;
        loop {
            let authenticate = KafkaRequest::SaslAuthenticate(SaslAuthenticateRequest {
                header: self.request_header(ApiKeys::SaslAuthenticate, 1),
                auth_bytes: token,
            });
            let challenge = match self.send(authenticate).await? {
                KafkaResponse::SaslAuthenticate(res) => {
                    if res.error_code != 0 {
                        bail!(ErrorKind::SaslError(
                            res.error_message
                                .unwrap_or_else(|| format!("error code {}", res.error_code))
                        ));
                    }
                    res.auth_bytes
                }
                res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
            };

            match session.step(&challenge)? {
                Some(next) => token = next,
                None => break,
            }
        }

        debug!("authenticated to {} via {}", self.inner.addr, mechanism);
        Ok(())
    }

    /// Fail all in-flight requests and stop the reader. Idempotent; the
    /// socket itself goes down with the last handle.
    pub fn close(&self, reason: &str) {
        self.inner.shutdown_with(reason);
    }
}

impl ConnInner {
    fn shutdown_with(&self, reason: &str) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }

        debug!("connection to {} closed, {}", self.addr, reason);

        self.permits.close();
        let _ = self.shutdown.send(true);

        let mut inflight = self.inflight.lock().unwrap();
        inflight.order.clear();
        inflight.timed_out.clear();
        for (_, pending) in inflight.pending.drain() {
            let _ = pending
                .tx
                .send(Err(ErrorKind::ClientClosed(reason.to_owned()).into()));
        }
    }

    /// Route one response frame to its pending request. Any mismatch is
    /// fatal to the connection.
    fn dispatch(&self, frame: BytesMut) -> Result<()> {
        if frame.len() < 4 {
            bail!(ErrorKind::ParseError("response frame too short".into()));
        }
        let correlation_id = BigEndian::read_i32(&frame[..4]);

        let pending = {
            let mut inflight = self.inflight.lock().unwrap();

            if inflight.timed_out.remove(&correlation_id) {
                if inflight.order.front() == Some(&correlation_id) {
                    inflight.order.pop_front();
                }
                debug!(
                    "discarding late response (correlation {}) from {}",
                    correlation_id, self.addr
                );
                return Ok(());
            }

            match inflight.order.pop_front() {
                Some(expected) if expected == correlation_id => inflight
                    .pending
                    .remove(&correlation_id)
                    .ok_or_else(|| {
                        Error::from(ErrorKind::CorrelationMismatch(expected, correlation_id))
                    })?,
                Some(expected) => {
                    bail!(ErrorKind::CorrelationMismatch(expected, correlation_id))
                }
                None => bail!(ErrorKind::CorrelationMismatch(-1, correlation_id)),
            }
        };

        match KafkaResponse::parse(&frame, pending.api_keys, pending.api_version) {
            Ok(response) => {
                let _ = pending.tx.send(Ok(response));
                Ok(())
            }
            Err(err) => {
                // the stream is undecodable from here on; poison both the
                // caller and the connection
                let reason = err.to_string();
                let _ = pending
                    .tx
                    .send(Err(ErrorKind::ParseError(reason.clone()).into()));
                bail!(ErrorKind::ParseError(reason))
            }
        }
    }
}

async fn read_loop(
    inner: Arc<ConnInner>,
    mut framed: FramedRead<ReadHalf<Box<dyn AsyncRW>>, FrameCodec>,
    mut shutdown: watch::Receiver<bool>,
) {
    let reason = loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(frame)) => {
                    if let Err(err) = inner.dispatch(frame) {
                        break err.to_string();
                    }
                }
                Some(Err(err)) => break err.to_string(),
                None => break "connection closed by broker".to_owned(),
            },
            _ = shutdown.changed() => break "shutdown requested".to_owned(),
        }
    };

    inner.shutdown_with(&reason);
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A minimal in-process broker: answers every ApiVersions v0 request
    /// with an empty table, echoing the correlation id.
    async fn fake_broker(listener: TcpListener, reply: bool) {
        let (mut socket, _) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(_) => return,
        };

        loop {
            let mut size = [0u8; 4];
            if socket.read_exact(&mut size).await.is_err() {
                return;
            }
            let size = i32::from_be_bytes(size) as usize;
            let mut frame = vec![0u8; size];
            if socket.read_exact(&mut frame).await.is_err() {
                return;
            }

            if !reply {
                continue;
            }

            // request header v1: api_key(2) api_version(2) correlation(4)
            let correlation = &frame[4..8];
            let mut response = Vec::new();
            response.extend_from_slice(&10i32.to_be_bytes());
            response.extend_from_slice(correlation);
            response.extend_from_slice(&0i16.to_be_bytes()); // error_code
            response.extend_from_slice(&0i32.to_be_bytes()); // empty table
            if socket.write_all(&response).await.is_err() {
                return;
            }
        }
    }

    fn api_versions_request(conn: &KafkaConnection) -> KafkaRequest {
        KafkaRequest::ApiVersions(crate::protocol::ApiVersionsRequest {
            header: conn.request_header(ApiKeys::ApiVersions, 0),
            client_software_name: String::new(),
            client_software_version: String::new(),
        })
    }

    async fn connect_to(listener: &TcpListener, options: ConnectOptions) -> KafkaConnection {
        let addr = listener.local_addr().unwrap();
        KafkaConnection::connect("localhost", addr, options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_response_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let conn = connect_to(&listener, ConnectOptions::default()).await;
        tokio::spawn(fake_broker(listener, true));

        for _ in 0..3 {
            match conn.send(api_versions_request(&conn)).await.unwrap() {
                KafkaResponse::ApiVersions(res) => assert_eq!(res.error_code, 0),
                res => panic!("unexpected response: {:?}", res.api_keys()),
            }
        }

        assert_eq!(conn.in_flight_requests(), 0);
        assert!(conn.is_ready());
    }

    #[tokio::test]
    async fn test_pipelined_requests_settle_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let conn = connect_to(&listener, ConnectOptions::default()).await;
        tokio::spawn(fake_broker(listener, true));

        let sends = (0..5).map(|_| conn.send(api_versions_request(&conn)));
        let responses = futures::future::join_all(sends).await;
        for response in responses {
            assert!(response.unwrap().correlation_id() >= 0);
        }
    }

    #[tokio::test]
    async fn test_timeout_keeps_connection_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(fake_broker(listener, false));

        let conn = KafkaConnection::connect(
            "localhost",
            addr,
            ConnectOptions {
                request_timeout: Duration::from_millis(50),
                ..ConnectOptions::default()
            },
        )
        .await
        .unwrap();

        let err = conn.send(api_versions_request(&conn)).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::RequestTimeout(_)));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_acks_zero_resolves_at_flush() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(fake_broker(listener, false));

        let conn = KafkaConnection::connect("localhost", addr, ConnectOptions::default())
            .await
            .unwrap();

        let request = KafkaRequest::Produce(crate::protocol::ProduceRequest {
            header: conn.request_header(ApiKeys::Produce, 3),
            transactional_id: None,
            acks: 0,
            timeout_ms: 1000,
            topics: Vec::new(),
        });

        match conn.send(request).await.unwrap() {
            KafkaResponse::Produce(res) => assert!(res.topics.is_empty()),
            res => panic!("unexpected response: {:?}", res.api_keys()),
        }
        assert_eq!(conn.in_flight_requests(), 0);
    }

    #[tokio::test]
    async fn test_close_fails_pending_and_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(fake_broker(listener, false));

        let conn = KafkaConnection::connect("localhost", addr, ConnectOptions::default())
            .await
            .unwrap();

        let pending = conn.send(api_versions_request(&conn));
        let closer = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            conn.close("test shutdown");
            conn.close("test shutdown again");
        };

        let (result, _) = tokio::join!(pending, closer);
        assert!(matches!(
            result.unwrap_err().kind(),
            ErrorKind::ClientClosed(_)
        ));
        assert!(conn.is_closed());
    }
}
