//! ECHONET Lite Request Engine
//!
//! [`EchonetClient`] owns the controller's request socket, one
//! [`TransactionRegistry`] and a background receive task. Every GET/SET goes
//! through [`EchonetClient::send`]:
//!
//! 1. allocate a TID and register a pending transaction with its deadline
//! 2. encode and transmit the frame
//! 3. wait until the receive task dispatches a response for that TID, or the
//!    deadline passes
//!
//! Any number of requests may be in flight at once; each owns its TID and
//! they never wait on each other. Nothing is retried here; retry policy
//! belongs to the caller.
//!
//! Dropping the client (or calling [`EchonetClient::shutdown`]) stops the
//! receive task and fails every pending request with [`ClientError::Closed`].
//!
//! # Example
//!
//! ```no_run
//! use echonet_rs::client::{ClientConfig, EchonetClient};
//! use echonet_rs::object::ObjectIdentifier;
//! use echonet_rs::property::PropertyCode;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = EchonetClient::bind(ClientConfig::default()).await?;
//! let target = client.device_addr("192.168.1.50".parse()?);
//! let aircon = ObjectIdentifier::new(0x01, 0x30, 0x01);
//!
//! let properties = client
//!     .get(target, aircon, &[PropertyCode::OperationStatus])
//!     .await?;
//! println!("{:?}", properties);
//! # Ok(())
//! # }
//! ```

pub mod control;
pub mod details;

#[cfg(test)]
pub(crate) mod testing;

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::frame::{Frame, FrameError, ServiceCode};
use crate::object::ObjectIdentifier;
use crate::property::{Property, PropertyCode};
use crate::transaction::{Completion, RegistryError, Response, TransactionRegistry};
use crate::transport::{bind_udp, constants, DatagramTransport, TransportConfig, TransportError};
use crate::util::{edt_hex, hex_dump};
use crate::util::statistics::{CommunicationStats, StatsSnapshot};

pub use control::{apply_command, set_property, SetPropertyResult};
pub use details::{fetch_details, DeviceSnapshot, SnapshotPhase};

/// Pause after a failed receive so a persistent socket error cannot spin
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Errors returned by the request engine
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Sending the datagram failed; the request never left this host
    #[error("send failed: {0}")]
    Transport(#[from] io::Error),
    /// The request socket could not be set up
    #[error("socket setup failed: {0}")]
    Socket(#[from] TransportError),
    /// The request cannot be encoded
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] FrameError),
    /// No transaction ID could be allocated
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// No matching response within the deadline
    #[error("request to {address} for {codes:?} timed out")]
    Timeout {
        address: SocketAddr,
        codes: Vec<PropertyCode>,
    },
    /// The device answered with a service code that is not the expected
    /// response (including the not-accepted codes)
    #[error("{} answered with {}", .response.source, .response.frame.esv)]
    Rejected { response: Box<Response> },
    /// The response ended inside a property
    #[error("truncated response from {}", .response.source)]
    Malformed { response: Box<Response> },
    /// The engine shut down while the request was pending
    #[error("request engine closed")]
    Closed,
}

impl ClientError {
    /// Whether the device never answered in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }

    /// The device's response, for rejections and malformed answers
    pub fn response(&self) -> Option<&Response> {
        match self {
            ClientError::Rejected { response } | ClientError::Malformed { response } => {
                Some(response)
            }
            _ => None,
        }
    }
}

/// Request engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Request socket
    pub transport: TransportConfig,
    /// Deadline applied by [`EchonetClient::get`] and [`EchonetClient::set`]
    pub request_timeout: Duration,
    /// Port appliances listen on
    pub device_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            request_timeout: constants::DEFAULT_REQUEST_TIMEOUT,
            device_port: constants::ECHONET_LITE_PORT,
        }
    }
}

/// Asynchronous ECHONET Lite request engine
pub struct EchonetClient {
    transport: Arc<dyn DatagramTransport>,
    registry: Arc<TransactionRegistry>,
    stats: Arc<CommunicationStats>,
    config: ClientConfig,
    receiver: JoinHandle<()>,
}

impl EchonetClient {
    /// Bind the request socket described by `config` and start receiving
    pub async fn bind(config: ClientConfig) -> Result<Self, ClientError> {
        let socket = bind_udp(&config.transport)?;
        Ok(Self::with_transport(Arc::new(socket), config))
    }

    /// Run the engine over an existing transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_transport(transport: Arc<dyn DatagramTransport>, config: ClientConfig) -> Self {
        let registry = Arc::new(TransactionRegistry::new());
        let stats = Arc::new(CommunicationStats::new());
        let receiver = tokio::spawn(receive_loop(
            transport.clone(),
            registry.clone(),
            stats.clone(),
            config.transport.buffer_size,
        ));

        Self {
            transport,
            registry,
            stats,
            config,
            receiver,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Local address of the request socket
    pub fn local_address(&self) -> io::Result<SocketAddr> {
        self.transport.local_address()
    }

    /// Address of an appliance at `ip` on the configured device port
    pub fn device_addr(&self, ip: IpAddr) -> SocketAddr {
        SocketAddr::new(ip, self.config.device_port)
    }

    /// Traffic counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of requests waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.registry.pending_count()
    }

    /// Read `codes` from one object with the configured timeout
    pub async fn get(
        &self,
        target: SocketAddr,
        deoj: ObjectIdentifier,
        codes: &[PropertyCode],
    ) -> Result<Vec<Property>, ClientError> {
        let properties = codes.iter().copied().map(Property::request).collect();
        self.send(
            target,
            deoj,
            ServiceCode::Get,
            properties,
            self.config.request_timeout,
        )
        .await
    }

    /// Write `properties` (SETC) with the configured timeout
    pub async fn set(
        &self,
        target: SocketAddr,
        deoj: ObjectIdentifier,
        properties: Vec<Property>,
    ) -> Result<Vec<Property>, ClientError> {
        self.send(
            target,
            deoj,
            ServiceCode::SetC,
            properties,
            self.config.request_timeout,
        )
        .await
    }

    /// Send one request and return the response properties
    pub async fn send(
        &self,
        target: SocketAddr,
        deoj: ObjectIdentifier,
        esv: ServiceCode,
        properties: Vec<Property>,
        timeout: Duration,
    ) -> Result<Vec<Property>, ClientError> {
        self.send_request(target, deoj, esv, properties, timeout)
            .await
            .map(|response| response.frame.properties)
    }

    /// Send one request and return the whole response.
    ///
    /// Succeeds only when the response service code is the expected answer
    /// to `esv` (see [`ServiceCode::is_response_to`]) and the response is
    /// complete.
    pub async fn send_request(
        &self,
        target: SocketAddr,
        deoj: ObjectIdentifier,
        esv: ServiceCode,
        properties: Vec<Property>,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        let codes: Vec<PropertyCode> = properties.iter().map(|p| p.code).collect();
        let (completion_tx, completion_rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;

        let tid = self.registry.register_next(completion_tx, deadline)?;
        let mut guard = PendingGuard {
            registry: &self.registry,
            tid,
            armed: true,
        };

        let bytes = Frame::request(tid, deoj, esv, properties).encode()?;
        log::debug!(
            "Sending {} TID={} to {} ({}) {:?}",
            esv,
            tid,
            target,
            deoj,
            codes
        );

        if let Err(e) = self.transport.send_to(&bytes, target).await {
            self.stats.record_error();
            log::warn!("Send of TID={} to {} failed: {}", tid, target, e);
            return Err(ClientError::Transport(e));
        }
        self.stats.record_sent(bytes.len());

        let completion = self.wait(tid, deadline, completion_rx).await;
        guard.armed = false;

        match completion {
            Completion::Response(response) => self.check_response(esv, response),
            Completion::TimedOut => {
                self.stats.record_timeout();
                log::warn!("TID={} to {} timed out ({:?})", tid, target, codes);
                Err(ClientError::Timeout {
                    address: target,
                    codes,
                })
            }
            Completion::Closed => Err(ClientError::Closed),
        }
    }

    async fn wait(
        &self,
        tid: u16,
        deadline: Instant,
        mut completion: oneshot::Receiver<Completion>,
    ) -> Completion {
        match tokio::time::timeout_at(deadline, &mut completion).await {
            Ok(result) => result.unwrap_or(Completion::Closed),
            Err(_) => {
                // a response dispatched in the meantime wins; either way the
                // completion is already in the channel afterwards
                self.registry.expire(tid);
                completion.await.unwrap_or(Completion::Closed)
            }
        }
    }

    fn check_response(
        &self,
        request: ServiceCode,
        response: Response,
    ) -> Result<Response, ClientError> {
        if response.truncated {
            log::warn!(
                "Truncated response TID={} from {}",
                response.frame.tid,
                response.source
            );
            return Err(ClientError::Malformed {
                response: Box::new(response),
            });
        }

        if !response.frame.esv.is_response_to(request) {
            self.stats.record_rejection();
            log::warn!(
                "{} answered {} with {}",
                response.source,
                request,
                response.frame.esv
            );
            return Err(ClientError::Rejected {
                response: Box::new(response),
            });
        }

        Ok(response)
    }

    /// Stop receiving and fail every pending request with
    /// [`ClientError::Closed`]
    pub fn shutdown(&self) {
        self.receiver.abort();
        let failed = self.registry.close();
        if failed > 0 {
            log::debug!("Request engine closed with {} pending requests", failed);
        }
    }
}

impl Drop for EchonetClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Retracts a registered transaction whose caller never collected the
/// completion: send failure, encode failure or a dropped future.
struct PendingGuard<'a> {
    registry: &'a TransactionRegistry,
    tid: u16,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.retract(self.tid);
        }
    }
}

async fn receive_loop(
    transport: Arc<dyn DatagramTransport>,
    registry: Arc<TransactionRegistry>,
    stats: Arc<CommunicationStats>,
    buffer_size: usize,
) {
    let mut buffer = vec![0u8; buffer_size];

    loop {
        let (len, source) = match transport.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                stats.record_error();
                log::warn!("Receive error on request socket: {}", e);
                tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                continue;
            }
        };
        stats.record_received(len);
        log::trace!("Received {} bytes from {}", len, source);

        let decoded = match Frame::decode(&buffer[..len]) {
            Ok(decoded) => decoded,
            Err(e) => {
                stats.record_discarded();
                log::trace!(
                    "Discarding datagram from {}: {}\n{}",
                    source,
                    e,
                    hex_dump(&buffer[..len], "  ")
                );
                continue;
            }
        };

        let frame = decoded.frame;
        let tid = frame.tid;
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Response TID={} {} from {}", tid, frame.esv, source);
            for property in &frame.properties {
                log::debug!(
                    "  {} PDC={} EDT={}",
                    property.code,
                    property.pdc(),
                    edt_hex(property.data())
                );
            }
        }

        let response = Response {
            frame,
            source,
            truncated: decoded.truncated,
        };
        if !registry.dispatch(tid, response) {
            stats.record_discarded();
            log::trace!("No pending transaction for TID={} from {}", tid, source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{reply, response_frame, spawn_appliance, test_client, Reply, AIRCON};
    use super::*;
    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_get_returns_response_properties() {
        let appliance = spawn_appliance(|request| {
            let properties = request
                .properties
                .iter()
                .map(|p| Property::new(p.code, vec![0x30]).unwrap())
                .collect();
            vec![reply(&request, ServiceCode::GetRes, properties)]
        })
        .await;
        let client = test_client(Duration::from_secs(2)).await;

        let properties = assert_ok!(
            client
                .get(
                    appliance,
                    AIRCON,
                    &[PropertyCode::OperationStatus, PropertyCode::OperationMode]
                )
                .await
        );
        assert_eq!(properties.len(), 2);
        assert_eq!(properties[0].code, PropertyCode::OperationStatus);
        assert_eq!(properties[1].data(), &[0x30]);
        assert_eq!(client.pending_requests(), 0);

        let stats = client.stats();
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.messages_received, 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_correlated() {
        const REQUESTS: usize = 20;

        // hold every request, then answer in reverse order
        let mut held = Vec::new();
        let appliance = spawn_appliance(move |request| {
            held.push(request);
            if held.len() < REQUESTS {
                return vec![];
            }
            held.drain(..)
                .rev()
                .map(|request| {
                    let instance = request.deoj.instance();
                    let property =
                        Property::new(PropertyCode::TemperatureSetting, vec![instance]).unwrap();
                    reply(&request, ServiceCode::GetRes, vec![property])
                })
                .collect()
        })
        .await;
        let client = Arc::new(test_client(Duration::from_secs(3)).await);

        let handles: Vec<_> = (0..REQUESTS as u8)
            .map(|instance| {
                let client = client.clone();
                tokio::spawn(async move {
                    let object = ObjectIdentifier::new(0x01, 0x30, instance);
                    let properties = client
                        .get(appliance, object, &[PropertyCode::TemperatureSetting])
                        .await?;
                    Ok::<_, ClientError>((instance, properties))
                })
            })
            .collect();

        for handle in handles {
            let (instance, properties) = assert_ok!(handle.await.unwrap());
            assert_eq!(properties[0].data(), &[instance]);
        }
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_timeout_carries_address_and_codes() {
        let appliance = spawn_appliance(|_| vec![]).await;
        let client = test_client(Duration::from_millis(100)).await;

        let error = assert_err!(
            client
                .get(appliance, AIRCON, &[PropertyCode::MeasuredRoomTemperature])
                .await
        );
        match error {
            ClientError::Timeout { address, codes } => {
                assert_eq!(address, appliance);
                assert_eq!(codes, vec![PropertyCode::MeasuredRoomTemperature]);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(client.pending_requests(), 0);
        assert_eq!(client.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_not_accepted_get_is_rejected() {
        let appliance = spawn_appliance(|request| {
            let properties = request.properties.clone();
            vec![reply(&request, ServiceCode::GetSna, properties)]
        })
        .await;
        let client = test_client(Duration::from_secs(2)).await;

        let error = assert_err!(
            client
                .get(appliance, AIRCON, &[PropertyCode::MeasuredOutdoorTemperature])
                .await
        );
        assert!(matches!(error, ClientError::Rejected { .. }));
        assert_eq!(error.response().map(|r| r.frame.esv), Some(ServiceCode::GetSna));
        assert!(!error.is_timeout());
    }

    #[tokio::test]
    async fn test_truncated_response_is_malformed() {
        let appliance = spawn_appliance(|request| {
            let mut bytes = response_frame(
                &request,
                ServiceCode::GetRes,
                vec![Property::new(PropertyCode::OperationStatus, vec![0x30]).unwrap()],
            )
            .encode()
            .unwrap()
            .to_vec();
            bytes.pop();
            vec![Reply::Raw(bytes)]
        })
        .await;
        let client = test_client(Duration::from_secs(2)).await;

        let error = assert_err!(
            client
                .get(appliance, AIRCON, &[PropertyCode::OperationStatus])
                .await
        );
        assert!(matches!(error, ClientError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_foreign_traffic_is_discarded() {
        let appliance = spawn_appliance(|request| {
            let mut stray = response_frame(&request, ServiceCode::GetRes, vec![]);
            stray.tid = request.tid.wrapping_add(100);
            vec![
                Reply::Raw(vec![0x10, 0x81, 0x00]),
                stray.into(),
                reply(&request, ServiceCode::GetRes, vec![]),
            ]
        })
        .await;
        let client = test_client(Duration::from_secs(2)).await;

        assert_ok!(
            client
                .get(appliance, AIRCON, &[PropertyCode::OperationStatus])
                .await
        );
        // the stray frame may still be in flight when the answer resolves
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.stats().discarded, 2);
    }

    #[tokio::test]
    async fn test_late_response_after_timeout_is_discarded() {
        let appliance = spawn_appliance(|request| {
            let answer = response_frame(&request, ServiceCode::GetRes, vec![]);
            vec![Reply::Delayed(Duration::from_millis(300), answer)]
        })
        .await;
        let client = test_client(Duration::from_millis(100)).await;

        let error = assert_err!(
            client
                .get(appliance, AIRCON, &[PropertyCode::OperationStatus])
                .await
        );
        assert!(error.is_timeout());

        tokio::time::sleep(Duration::from_millis(400)).await;
        let stats = client.stats();
        assert_eq!(stats.messages_received, 1);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(client.pending_requests(), 0);
    }

    /// Every receive fails at once
    struct BrokenReceiveTransport;

    #[async_trait]
    impl DatagramTransport for BrokenReceiveTransport {
        async fn send_to(&self, data: &[u8], _dest: SocketAddr) -> io::Result<usize> {
            Ok(data.len())
        }

        async fn recv_from(&self, _buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"))
        }

        fn local_address(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:3610".parse().unwrap())
        }
    }

    #[tokio::test]
    async fn test_receive_errors_back_off() {
        let client =
            EchonetClient::with_transport(Arc::new(BrokenReceiveTransport), ClientConfig::default());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let errors = client.stats().errors;
        assert!(errors >= 1);
        assert!(errors <= 10, "receive loop spun {} times", errors);
    }

    struct FailingTransport;

    #[async_trait]
    impl DatagramTransport for FailingTransport {
        async fn send_to(&self, _data: &[u8], _dest: SocketAddr) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "network unreachable"))
        }

        async fn recv_from(&self, _buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            std::future::pending().await
        }

        fn local_address(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:3610".parse().unwrap())
        }
    }

    #[tokio::test]
    async fn test_send_failure_fails_immediately() {
        let client = EchonetClient::with_transport(
            Arc::new(FailingTransport),
            ClientConfig {
                request_timeout: Duration::from_secs(60),
                ..Default::default()
            },
        );

        let started = std::time::Instant::now();
        let error = assert_err!(
            client
                .get(
                    "192.168.1.50:3610".parse().unwrap(),
                    AIRCON,
                    &[PropertyCode::OperationStatus]
                )
                .await
        );
        assert!(matches!(error, ClientError::Transport(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(client.pending_requests(), 0);
        assert_eq!(client.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending_requests() {
        let appliance = spawn_appliance(|_| vec![]).await;
        let client = Arc::new(test_client(Duration::from_secs(30)).await);

        let pending = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .get(appliance, AIRCON, &[PropertyCode::OperationStatus])
                    .await
            })
        };
        while client.pending_requests() == 0 {
            tokio::task::yield_now().await;
        }

        client.shutdown();
        let error = assert_err!(pending.await.unwrap());
        assert!(matches!(error, ClientError::Closed));

        let error = assert_err!(
            client
                .get(appliance, AIRCON, &[PropertyCode::OperationStatus])
                .await
        );
        assert!(matches!(error, ClientError::Registry(RegistryError::Closed)));
    }

    #[tokio::test]
    async fn test_oversized_request_is_rejected_before_sending() {
        let appliance = spawn_appliance(|_| vec![]).await;
        let client = test_client(Duration::from_secs(1)).await;

        let properties = vec![Property::request(PropertyCode::OperationStatus); 256];
        let error = assert_err!(
            client
                .send(
                    appliance,
                    AIRCON,
                    ServiceCode::Get,
                    properties,
                    Duration::from_secs(1)
                )
                .await
        );
        assert!(matches!(
            error,
            ClientError::InvalidRequest(FrameError::TooManyProperties { count: 256 })
        ));
        assert_eq!(client.pending_requests(), 0);
        assert_eq!(client.stats().messages_sent, 0);
    }
}
