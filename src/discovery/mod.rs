//! ECHONET Lite Discovery Module
//!
//! A scan sends one GET for the node profile's self-node instance list
//! (EPC 0xD6) to the multicast group and collects answers for a fixed
//! window. Each scan opens its own socket and picks its own TID; answers
//! are matched by TID and GET_RES here, not by the request engine's
//! registry, because one request draws many uncorrelated responses.
//!
//! A node is reported once per scan, on its first valid answer; later
//! answers from the same IP address are ignored even if their content
//! differs. When the window closes the socket is dropped and the stream of
//! devices ends, whether or not anything answered. Devices found inside the
//! window are buffered for the caller, so a slow consumer never keeps the
//! socket open past the window.
//!
//! # Example
//!
//! ```no_run
//! use echonet_rs::discovery::{ScanConfig, Scanner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scanner = Scanner::new(ScanConfig::default());
//! let mut scan = scanner.scan().await?;
//! while let Some(device) = scan.next().await {
//!     println!("{} -> {:?}", device.address, device.objects);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::frame::{Frame, ServiceCode};
use crate::object::{decode_instance_list, ObjectIdentifier};
use crate::property::{Property, PropertyCode};
use crate::transport::{
    bind_udp, constants, FirstNonLoopback, InterfaceSelector, MulticastConfig, TransportConfig,
    TransportError,
};

/// Discovery configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Scan socket, normally joined to the discovery group
    pub transport: TransportConfig,
    /// Where the discovery request is sent
    pub target: SocketAddr,
    /// How long answers are collected
    pub window: Duration,
}

impl ScanConfig {
    /// Multicast scan on the interface chosen by `selector`
    pub fn with_interface(selector: &dyn InterfaceSelector) -> Self {
        let interface = selector.select();
        Self {
            transport: TransportConfig {
                multicast: Some(MulticastConfig::echonet(interface)),
                ..TransportConfig::default()
            },
            target: SocketAddr::V4(SocketAddrV4::new(
                constants::MULTICAST_GROUP,
                constants::ECHONET_LITE_PORT,
            )),
            window: constants::DEFAULT_SCAN_WINDOW,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::with_interface(&FirstNonLoopback)
    }
}

/// A node that answered a scan
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscoveredDevice {
    pub address: IpAddr,
    /// Device objects from the node's instance list
    pub objects: Vec<ObjectIdentifier>,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredDevice {
    pub fn air_conditioners(&self) -> impl Iterator<Item = ObjectIdentifier> + '_ {
        self.objects
            .iter()
            .copied()
            .filter(ObjectIdentifier::is_air_conditioner)
    }
}

/// Per-scan filter turning datagrams into first-seen devices
#[derive(Debug)]
pub struct ScanCollector {
    tid: u16,
    seen: HashSet<IpAddr>,
}

impl ScanCollector {
    pub fn new(tid: u16) -> Self {
        Self {
            tid,
            seen: HashSet::new(),
        }
    }

    /// Number of devices accepted so far
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Accept one datagram; `Some` only for the first valid answer of an
    /// address
    pub fn accept(&mut self, datagram: &[u8], source: SocketAddr) -> Option<DiscoveredDevice> {
        let address = source.ip();
        if self.seen.contains(&address) {
            log::trace!("Ignoring repeated answer from {}", address);
            return None;
        }

        let decoded = match Frame::decode(datagram) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::trace!("Discarding datagram from {}: {}", source, e);
                return None;
            }
        };
        let frame = decoded.frame;
        if frame.tid != self.tid || frame.esv != ServiceCode::GetRes {
            log::trace!(
                "Ignoring {} TID={} from {} during scan TID={}",
                frame.esv,
                frame.tid,
                source,
                self.tid
            );
            return None;
        }

        let list = frame
            .property(PropertyCode::SelfNodeInstanceListS)
            .filter(|p| p.pdc() > 0)?;
        let objects = decode_instance_list(list.data()).ok()?;

        self.seen.insert(address);
        Some(DiscoveredDevice {
            address,
            objects,
            discovered_at: Utc::now(),
        })
    }
}

/// Runs discovery scans
pub struct Scanner {
    config: ScanConfig,
    next_tid: AtomicU16,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            next_tid: AtomicU16::new(1),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn allocate_tid(&self) -> u16 {
        loop {
            let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
            if tid != 0 {
                return tid;
            }
        }
    }

    /// Open a scan socket, send the discovery request and start collecting.
    ///
    /// Socket setup and send failures are returned; once this succeeds the
    /// scan always runs its full window.
    pub async fn scan(&self) -> Result<ScanHandle, TransportError> {
        let socket = bind_udp(&self.config.transport)?;
        let tid = self.allocate_tid();

        let request = Frame::request(
            tid,
            ObjectIdentifier::NODE_PROFILE,
            ServiceCode::Get,
            vec![Property::request(PropertyCode::SelfNodeInstanceListS)],
        );
        let bytes = request
            .encode()
            .map_err(|e| TransportError::InvalidConfiguration(e.to_string()))?;

        log::info!(
            "Scanning {} for {:?} (TID={})",
            self.config.target,
            self.config.window,
            tid
        );
        socket.send_to(&bytes, self.config.target).await?;

        let (devices_tx, devices_rx) = mpsc::unbounded_channel();
        let deadline = Instant::now() + self.config.window;
        let task = tokio::spawn(collect(
            socket,
            ScanCollector::new(tid),
            deadline,
            self.config.transport.buffer_size,
            devices_tx,
        ));

        Ok(ScanHandle {
            tid,
            devices: devices_rx,
            task,
        })
    }
}

async fn collect(
    socket: UdpSocket,
    mut collector: ScanCollector,
    deadline: Instant,
    buffer_size: usize,
    devices: mpsc::UnboundedSender<DiscoveredDevice>,
) {
    let mut buffer = vec![0u8; buffer_size];

    loop {
        let (len, source) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buffer)).await
        {
            Err(_) => break,
            Ok(Err(e)) => {
                log::warn!("Receive error on scan socket: {}", e);
                continue;
            }
            Ok(Ok(received)) => received,
        };
        log::trace!("Scan received {} bytes from {}", len, source);

        if let Some(device) = collector.accept(&buffer[..len], source) {
            log::info!(
                "Discovered {} with objects [{}]",
                device.address,
                device
                    .objects
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            if devices.send(device).is_err() {
                log::debug!("Scan abandoned by its caller");
                break;
            }
        }
    }

    log::info!("Scan finished, {} devices found", collector.len());
}

/// A running scan; yields each newly discovered device and ends when the
/// window closes
pub struct ScanHandle {
    tid: u16,
    devices: mpsc::UnboundedReceiver<DiscoveredDevice>,
    task: JoinHandle<()>,
}

impl ScanHandle {
    /// TID of the discovery request
    pub fn tid(&self) -> u16 {
        self.tid
    }

    /// Next discovered device, `None` once the scan has finished
    pub async fn next(&mut self) -> Option<DiscoveredDevice> {
        self.devices.recv().await
    }

    /// Wait for the window to close and return every device found
    pub async fn collect(mut self) -> Vec<DiscoveredDevice> {
        let mut devices = Vec::new();
        while let Some(device) = self.next().await {
            devices.push(device);
        }
        devices
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
