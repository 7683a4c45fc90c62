//! Controller facade.
//!
//! [`Controller`] bundles what a front end needs: one request engine, one
//! discovery scanner and the [`EventSink`] every operation reports to.
//! Devices are addressed by IP; the engine's configured device port is
//! used for unicast requests.

use std::net::IpAddr;
use std::sync::Arc;

use crate::client::{
    apply_command, fetch_details, set_property, ClientConfig, ClientError, DeviceSnapshot,
    EchonetClient, SetPropertyResult,
};
use crate::discovery::{DiscoveredDevice, ScanConfig, Scanner};
use crate::event::{EngineEvent, EventSink};
use crate::object::{AirConditionerCommand, ObjectIdentifier};
use crate::property::PropertyCode;
use crate::transport::{TimeoutConfig, TransportError};

/// Configuration of both controller sockets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerConfig {
    pub client: ClientConfig,
    pub scan: ScanConfig,
}

impl ControllerConfig {
    /// Replace the request timeout and the scan window
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.client.request_timeout = timeouts.request_timeout;
        self.scan.window = timeouts.scan_window;
        self
    }

    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig {
            request_timeout: self.client.request_timeout,
            scan_window: self.scan.window,
        }
    }
}

/// ECHONET Lite controller reporting through an event sink
pub struct Controller {
    client: EchonetClient,
    scanner: Scanner,
    events: Arc<dyn EventSink>,
}

impl Controller {
    /// Bind the request socket and prepare the scanner
    pub async fn start(
        config: ControllerConfig,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ClientError> {
        let client = EchonetClient::bind(config.client).await?;
        Ok(Self::new(client, Scanner::new(config.scan), events))
    }

    pub fn new(client: EchonetClient, scanner: Scanner, events: Arc<dyn EventSink>) -> Self {
        Self {
            client,
            scanner,
            events,
        }
    }

    pub fn client(&self) -> &EchonetClient {
        &self.client
    }

    /// Scan for the configured window, emitting `DeviceFound` per new node
    /// and `ScanFinished` at the end.
    ///
    /// `ScanFinished` is emitted even when the scan socket cannot be set up
    /// or the request cannot be sent, so event consumers always see the end
    /// of a scan.
    pub async fn scan(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let mut scan = match self.scanner.scan().await {
            Ok(scan) => scan,
            Err(e) => {
                log::warn!("Scan of {} failed: {}", self.scanner.config().target, e);
                self.events.emit(EngineEvent::ScanFinished { devices: 0 });
                return Err(e);
            }
        };
        let mut devices = Vec::new();
        while let Some(device) = scan.next().await {
            self.events.emit(EngineEvent::DeviceFound(device.clone()));
            devices.push(device);
        }
        self.events.emit(EngineEvent::ScanFinished {
            devices: devices.len(),
        });
        Ok(devices)
    }

    /// Run a detail pass against an air conditioner object
    pub async fn device_details(&self, ip: IpAddr, object: ObjectIdentifier) -> DeviceSnapshot {
        let target = self.client.device_addr(ip);
        fetch_details(&self.client, target, object, self.events.as_ref()).await
    }

    /// Write raw property data
    pub async fn set_property(
        &self,
        ip: IpAddr,
        object: ObjectIdentifier,
        code: PropertyCode,
        data: Vec<u8>,
    ) -> SetPropertyResult {
        let target = self.client.device_addr(ip);
        set_property(&self.client, target, object, code, data, self.events.as_ref()).await
    }

    /// Apply a typed air conditioner command
    pub async fn apply(
        &self,
        ip: IpAddr,
        object: ObjectIdentifier,
        command: AirConditionerCommand,
    ) -> SetPropertyResult {
        let target = self.client.device_addr(ip);
        apply_command(&self.client, target, object, command, self.events.as_ref()).await
    }

    /// Stop the request engine; pending requests fail as closed
    pub fn shutdown(&self) {
        self.client.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::details::SnapshotPhase;
    use crate::client::testing::{answer_aircon, reply, spawn_appliance, AIRCON};
    use crate::frame::ServiceCode;
    use crate::object::encode_instance_list;
    use crate::property::Property;
    use crate::transport::TransportConfig;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn test_timeouts_apply_to_both_sockets() {
        let config = ControllerConfig {
            client: ClientConfig::default(),
            scan: ScanConfig {
                transport: TransportConfig::loopback(),
                target: "127.0.0.1:3610".parse().unwrap(),
                window: Duration::from_secs(5),
            },
        };
        assert_eq!(config.timeouts(), TimeoutConfig::default());

        let config = config.with_timeouts(TimeoutConfig {
            request_timeout: Duration::from_millis(800),
            scan_window: Duration::from_secs(2),
        });
        assert_eq!(config.client.request_timeout, Duration::from_millis(800));
        assert_eq!(config.scan.window, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failed_scan_still_finishes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = ControllerConfig {
            client: ClientConfig {
                transport: TransportConfig::loopback(),
                ..Default::default()
            },
            scan: ScanConfig {
                // TEST-NET-1, never a local address
                transport: TransportConfig {
                    bind_address: "192.0.2.77:0".parse().unwrap(),
                    ..TransportConfig::loopback()
                },
                target: "127.0.0.1:3610".parse().unwrap(),
                window: Duration::from_millis(100),
            },
        };
        let controller = Controller::start(config, Arc::new(tx)).await.unwrap();

        assert!(controller.scan().await.is_err());
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::ScanFinished { devices: 0 });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_scan_details_and_write_emit_events() {
        let appliance = spawn_appliance(|request| {
            if request.deoj == ObjectIdentifier::NODE_PROFILE {
                let list = Property::new(
                    PropertyCode::SelfNodeInstanceListS,
                    encode_instance_list(&[AIRCON]).unwrap(),
                )
                .unwrap();
                return vec![reply(&request, ServiceCode::GetRes, vec![list])];
            }
            if request.esv == ServiceCode::SetC {
                let echoed = request
                    .properties
                    .iter()
                    .map(|p| Property::request(p.code))
                    .collect();
                return vec![reply(&request, ServiceCode::SetRes, echoed)];
            }
            answer_aircon(request, &[])
        })
        .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = ControllerConfig {
            client: ClientConfig {
                transport: TransportConfig::loopback(),
                request_timeout: Duration::from_secs(2),
                device_port: appliance.port(),
            },
            scan: ScanConfig {
                transport: TransportConfig::loopback(),
                target: appliance,
                window: Duration::from_millis(200),
            },
        };
        let controller = Controller::start(config, Arc::new(tx)).await.unwrap();

        let devices = controller.scan().await.unwrap();
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        let object = device.air_conditioners().next().unwrap();

        let snapshot = controller.device_details(device.address, object).await;
        assert!(snapshot.is_complete());

        let result = controller
            .apply(device.address, object, AirConditionerCommand::Power(true))
            .await;
        assert!(result.success);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 5);
        assert!(matches!(&events[0], EngineEvent::DeviceFound(found) if found == device));
        assert_eq!(events[1], EngineEvent::ScanFinished { devices: 1 });
        assert!(matches!(
            &events[2],
            EngineEvent::DeviceDetails(s) if s.phase == SnapshotPhase::Essential
        ));
        assert_eq!(events[3], EngineEvent::DeviceDetails(snapshot));
        assert_eq!(events[4], EngineEvent::SetPropertyResult(result));
    }
}
