//! Fake Air Conditioner Example
//!
//! Runs a minimal ECHONET Lite node hosting one air conditioner (013001).
//! It answers discovery requests for the instance list, GETs for the usual
//! air conditioner properties and SETC writes, so the other examples can be
//! tried without real hardware.
//!
//! Usage: `cargo run --example responder_appliance --features demos -- [bind-address]`
//!
//! The default bind address is `0.0.0.0:3610`.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use echonet_rs::frame::{Frame, ServiceCode};
use echonet_rs::object::{encode_instance_list, ObjectIdentifier};
use echonet_rs::property::{Property, PropertyCode};
use echonet_rs::transport::constants::MULTICAST_GROUP;
use echonet_rs::util::hex_dump;

const AIRCON: ObjectIdentifier = ObjectIdentifier::new(0x01, 0x30, 0x01);

/// Writable properties of the fake unit
const SETTABLE: [PropertyCode; 7] = [
    PropertyCode::OperationStatus,
    PropertyCode::OperationMode,
    PropertyCode::TemperatureSetting,
    PropertyCode::AirFlowRate,
    PropertyCode::AirFlowDirectionVertical,
    PropertyCode::AirFlowDirectionHorizontal,
    PropertyCode::Buzzer,
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("ECHONET Lite Fake Air Conditioner");
    println!("=================================\n");

    let bind_addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0.0.0.0:3610".to_string())
        .parse()?;

    let socket = UdpSocket::bind(bind_addr)?;
    if let Err(e) = socket.join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED) {
        eprintln!("Could not join {}: {} (discovery disabled)", MULTICAST_GROUP, e);
    }
    socket.set_read_timeout(Some(Duration::from_millis(100)))?;

    let mut values: HashMap<PropertyCode, u8> = HashMap::from([
        (PropertyCode::OperationStatus, 0x31),
        (PropertyCode::OperationMode, 0x41),
        (PropertyCode::TemperatureSetting, 24),
        (PropertyCode::AirFlowRate, 0x41),
        (PropertyCode::MeasuredRoomTemperature, 23),
        (PropertyCode::MeasuredRelativeHumidity, 48),
        (PropertyCode::MeasuredOutdoorTemperature, 12),
        (PropertyCode::AirFlowDirectionVertical, 0x43),
        (PropertyCode::AirFlowDirectionHorizontal, 0x43),
    ]);

    println!("Listening on {} as {}", socket.local_addr()?, AIRCON);
    println!("Press Ctrl+C to stop.\n");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut recv_buffer = [0u8; 1500];
    let mut answered = 0;

    while running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut recv_buffer) {
            Ok((len, source)) => {
                let request = match Frame::decode(&recv_buffer[..len]) {
                    Ok(decoded) if !decoded.truncated => decoded.frame,
                    _ => {
                        println!("Ignoring datagram from {}:", source);
                        println!("{}", hex_dump(&recv_buffer[..len], "  "));
                        continue;
                    }
                };

                if let Some(response) = respond(&request, &mut values)? {
                    socket.send_to(&response.encode()?, source)?;
                    answered += 1;
                    println!(
                        "{} {} from {} -> {} ({} properties)",
                        request.esv,
                        request.deoj,
                        source,
                        response.esv,
                        response.properties.len()
                    );
                }
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => eprintln!("Error receiving: {}", e),
        }
    }

    println!("\nShutting down after {} answers", answered);
    Ok(())
}

fn respond(
    request: &Frame,
    values: &mut HashMap<PropertyCode, u8>,
) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
    let answer = |esv: ServiceCode, properties: Vec<Property>| Frame {
        tid: request.tid,
        seoj: request.deoj,
        deoj: request.seoj,
        esv,
        properties,
    };

    match (request.deoj, request.esv) {
        (ObjectIdentifier::NODE_PROFILE, ServiceCode::Get) => {
            let mut properties = Vec::new();
            let mut accepted = true;
            for property in &request.properties {
                if property.code == PropertyCode::SelfNodeInstanceListS {
                    properties.push(Property::new(
                        property.code,
                        encode_instance_list(&[AIRCON])?,
                    )?);
                } else {
                    accepted = false;
                    properties.push(Property::request(property.code));
                }
            }
            let esv = if accepted {
                ServiceCode::GetRes
            } else {
                ServiceCode::GetSna
            };
            Ok(Some(answer(esv, properties)))
        }
        (AIRCON, ServiceCode::Get) => {
            let mut properties = Vec::new();
            let mut accepted = true;
            for property in &request.properties {
                match values.get(&property.code) {
                    Some(value) => properties.push(Property::new(property.code, vec![*value])?),
                    None => {
                        accepted = false;
                        properties.push(Property::request(property.code));
                    }
                }
            }
            let esv = if accepted {
                ServiceCode::GetRes
            } else {
                ServiceCode::GetSna
            };
            Ok(Some(answer(esv, properties)))
        }
        (AIRCON, ServiceCode::SetC) => {
            let mut properties = Vec::new();
            let mut accepted = true;
            for property in &request.properties {
                match property.first_byte() {
                    Some(value) if SETTABLE.contains(&property.code) => {
                        if property.code != PropertyCode::Buzzer {
                            values.insert(property.code, value);
                        }
                        properties.push(Property::request(property.code));
                    }
                    _ => {
                        accepted = false;
                        properties.push(property.clone());
                    }
                }
            }
            let esv = if accepted {
                ServiceCode::SetRes
            } else {
                ServiceCode::SetCSna
            };
            Ok(Some(answer(esv, properties)))
        }
        _ => Ok(None),
    }
}
