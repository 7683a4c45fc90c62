//! Loopback fake appliance for request engine tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{ClientConfig, EchonetClient};
use crate::frame::{Frame, ServiceCode};
use crate::object::ObjectIdentifier;
use crate::property::{Property, PropertyCode};
use crate::transport::{bind_udp, TransportConfig};

pub const AIRCON: ObjectIdentifier = ObjectIdentifier::new(0x01, 0x30, 0x01);

/// What the fake appliance sends back for one request
pub enum Reply {
    Frame(Frame),
    Raw(Vec<u8>),
    Delayed(Duration, Frame),
}

impl From<Frame> for Reply {
    fn from(frame: Frame) -> Self {
        Reply::Frame(frame)
    }
}

/// Answer frame for `request`: same TID, objects swapped
pub fn response_frame(request: &Frame, esv: ServiceCode, properties: Vec<Property>) -> Frame {
    Frame {
        tid: request.tid,
        seoj: request.deoj,
        deoj: request.seoj,
        esv,
        properties,
    }
}

pub fn reply(request: &Frame, esv: ServiceCode, properties: Vec<Property>) -> Reply {
    Reply::Frame(response_frame(request, esv, properties))
}

/// Run a fake appliance on a loopback port; `handler` sees every decoded
/// request and returns the datagrams to answer with.
pub async fn spawn_appliance<F>(mut handler: F) -> SocketAddr
where
    F: FnMut(Frame) -> Vec<Reply> + Send + 'static,
{
    let socket = Arc::new(bind_udp(&TransportConfig::loopback()).unwrap());
    let address = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buffer = [0u8; 1500];
        loop {
            let Ok((len, source)) = socket.recv_from(&mut buffer).await else {
                return;
            };
            let Ok(decoded) = Frame::decode(&buffer[..len]) else {
                continue;
            };

            for reply in handler(decoded.frame) {
                match reply {
                    Reply::Frame(frame) => {
                        let _ = socket.send_to(&frame.encode().unwrap(), source).await;
                    }
                    Reply::Raw(bytes) => {
                        let _ = socket.send_to(&bytes, source).await;
                    }
                    Reply::Delayed(delay, frame) => {
                        let socket = socket.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = socket.send_to(&frame.encode().unwrap(), source).await;
                        });
                    }
                }
            }
        }
    });

    address
}

/// Request engine on a loopback port with the given request timeout
pub async fn test_client(request_timeout: Duration) -> EchonetClient {
    EchonetClient::bind(ClientConfig {
        transport: TransportConfig::loopback(),
        request_timeout,
        ..Default::default()
    })
    .await
    .unwrap()
}

/// Value a healthy fake air conditioner reports for `code`
pub fn aircon_value(code: PropertyCode) -> u8 {
    match code {
        PropertyCode::OperationStatus => 0x30,
        PropertyCode::OperationMode => 0x42,
        PropertyCode::TemperatureSetting => 26,
        PropertyCode::AirFlowRate => 0x41,
        PropertyCode::MeasuredRoomTemperature => 24,
        PropertyCode::MeasuredRelativeHumidity => 55,
        PropertyCode::MeasuredOutdoorTemperature => 0xFE,
        PropertyCode::AirFlowDirectionVertical => 0x43,
        PropertyCode::AirFlowDirectionHorizontal => 0x44,
        _ => 0,
    }
}

/// GET handler of a fake air conditioner that never answers requests
/// touching `silent`
pub fn answer_aircon(request: Frame, silent: &[PropertyCode]) -> Vec<Reply> {
    if request.properties.iter().any(|p| silent.contains(&p.code)) {
        return vec![];
    }
    let properties = request
        .properties
        .iter()
        .map(|p| Property::new(p.code, vec![aircon_value(p.code)]).unwrap())
        .collect();
    vec![reply(&request, ServiceCode::GetRes, properties)]
}
