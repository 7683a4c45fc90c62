//! ECHONET Lite Transport Module
//!
//! ECHONET Lite runs directly on UDP/IPv4, port 3610. Unicast carries the
//! request/response traffic with a single appliance; discovery requests are
//! sent to the multicast group 224.0.23.0 and answered by every node that
//! hears them.
//!
//! This module owns everything socket-shaped:
//! - socket construction through `socket2` (address reuse, multicast
//!   membership, outgoing multicast interface)
//! - the [`DatagramTransport`] seam the request engine sends and receives
//!   through
//! - interface selection for multicast ([`interface`])
//! - transport configuration and default timeouts
//!
//! # Example
//!
//! ```no_run
//! use echonet_rs::transport::{bind_udp, TransportConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let socket = bind_udp(&TransportConfig::default())?;
//! println!("bound to {}", socket.local_addr()?);
//! # Ok(())
//! # }
//! ```

pub mod interface;

use std::error::Error;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

pub use interface::{FirstNonLoopback, FixedInterface, InterfaceSelector};

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while setting up a transport
#[derive(Debug)]
pub enum TransportError {
    /// I/O error
    IoError(io::Error),
    /// Joining the multicast group failed
    MulticastJoin {
        group: Ipv4Addr,
        interface: Ipv4Addr,
        source: io::Error,
    },
    /// Invalid transport configuration
    InvalidConfiguration(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::IoError(e) => write!(f, "I/O error: {}", e),
            TransportError::MulticastJoin {
                group,
                interface,
                source,
            } => write!(
                f,
                "Failed to join multicast group {} on {}: {}",
                group, interface, source
            ),
            TransportError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::IoError(e) => Some(e),
            TransportError::MulticastJoin { source, .. } => Some(source),
            TransportError::InvalidConfiguration(_) => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        TransportError::IoError(error)
    }
}

/// ECHONET Lite specific constants
pub mod constants {
    use super::Duration;
    use std::net::Ipv4Addr;

    /// ECHONET Lite UDP port
    pub const ECHONET_LITE_PORT: u16 = 3610;

    /// Discovery multicast group
    pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 23, 0);

    /// Receive buffer size; ECHONET Lite frames fit one Ethernet MTU
    pub const MAX_DATAGRAM_SIZE: usize = 1500;

    /// Default request timeout
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

    /// Default discovery window
    pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(5);
}

/// Multicast membership for a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastConfig {
    /// Group to join
    pub group: Ipv4Addr,
    /// Local interface used to join and to send multicast
    pub interface: Ipv4Addr,
    /// Deliver our own multicast back to this host
    pub loopback: bool,
    /// Multicast TTL; 1 keeps discovery on the local link
    pub ttl: u32,
}

impl MulticastConfig {
    /// Membership of the ECHONET Lite discovery group on `interface`
    pub fn echonet(interface: Ipv4Addr) -> Self {
        Self {
            group: constants::MULTICAST_GROUP,
            interface,
            loopback: true,
            ttl: 1,
        }
    }
}

/// UDP socket configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Local bind address
    pub bind_address: SocketAddrV4,
    /// Set SO_REUSEADDR so the request and scan sockets can share port 3610
    pub reuse_address: bool,
    /// Multicast membership, if any
    pub multicast: Option<MulticastConfig>,
    /// Receive buffer size
    pub buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, constants::ECHONET_LITE_PORT),
            reuse_address: true,
            multicast: None,
            buffer_size: constants::MAX_DATAGRAM_SIZE,
        }
    }
}

impl TransportConfig {
    /// Bind to an ephemeral loopback port, without multicast
    pub fn loopback() -> Self {
        Self {
            bind_address: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.buffer_size < crate::frame::HEADER_SIZE {
            return Err(TransportError::InvalidConfiguration(format!(
                "buffer size {} cannot hold a frame header",
                self.buffer_size
            )));
        }
        if let Some(multicast) = &self.multicast {
            if !multicast.group.is_multicast() {
                return Err(TransportError::InvalidConfiguration(format!(
                    "{} is not a multicast group",
                    multicast.group
                )));
            }
        }
        Ok(())
    }
}

/// Timeout configuration for the different operation types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// GET/SET round trip
    pub request_timeout: Duration,
    /// Discovery listening window
    pub scan_window: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout: constants::DEFAULT_REQUEST_TIMEOUT,
            scan_window: constants::DEFAULT_SCAN_WINDOW,
        }
    }
}

/// Create a non-blocking tokio UDP socket from `config`.
///
/// Must be called from within a tokio runtime.
pub fn bind_udp(config: &TransportConfig) -> Result<UdpSocket> {
    config.validate()?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(config.reuse_address)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::V4(config.bind_address).into())?;

    if let Some(multicast) = &config.multicast {
        socket
            .join_multicast_v4(&multicast.group, &multicast.interface)
            .map_err(|source| TransportError::MulticastJoin {
                group: multicast.group,
                interface: multicast.interface,
                source,
            })?;
        if !multicast.interface.is_unspecified() {
            socket.set_multicast_if_v4(&multicast.interface)?;
        }
        socket.set_multicast_loop_v4(multicast.loopback)?;
        socket.set_multicast_ttl_v4(multicast.ttl)?;
        log::info!(
            "Joined multicast group {} on interface {}",
            multicast.group,
            multicast.interface
        );
    }

    let socket = UdpSocket::from_std(socket.into())?;
    log::info!("ECHONET Lite socket bound to {}", socket.local_addr()?);
    Ok(socket)
}

/// Datagram I/O used by the request engine
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Send one datagram
    async fn send_to(&self, data: &[u8], dest: SocketAddr) -> io::Result<usize>;

    /// Receive one datagram with its source address
    async fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Local address
    fn local_address(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl DatagramTransport for UdpSocket {
    async fn send_to(&self, data: &[u8], dest: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, data, dest).await
    }

    async fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buffer).await
    }

    fn local_address(&self) -> io::Result<SocketAddr> {
        self.local_addr()
    }
}
