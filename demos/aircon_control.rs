//! Air Conditioner Control Example
//!
//! Reads the state of one air conditioner and optionally changes its
//! set-point temperature.
//!
//! Usage:
//! `cargo run --example aircon_control --features demos -- <ip> [eoj] [set-point]`
//!
//! `eoj` defaults to `013001`.

use std::net::IpAddr;
use std::sync::Arc;

use echonet_rs::event::{EngineEvent, EventSink};
use echonet_rs::object::{AirConditionerCommand, ObjectIdentifier};
use echonet_rs::{Controller, ControllerConfig};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let Some(ip) = args.get(1) else {
        eprintln!("usage: {} <ip> [eoj] [set-point]", args[0]);
        std::process::exit(2);
    };
    let ip: IpAddr = ip.parse()?;
    let object: ObjectIdentifier = match args.get(2) {
        Some(eoj) => eoj.parse()?,
        None => ObjectIdentifier::new(0x01, 0x30, 0x01),
    };
    let set_point = args.get(3).map(|t| t.parse::<u8>()).transpose()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<EngineEvent>();
    let events: Arc<dyn EventSink> = Arc::new(tx);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::DeviceDetails(snapshot) => {
                    println!("[{:?}] {} {}", snapshot.phase, snapshot.address, snapshot.object);
                    println!("  {:?}", snapshot.state);
                }
                EngineEvent::SetPropertyResult(result) => {
                    println!(
                        "[write] {} success={} ({})",
                        result.address, result.success, result.message
                    );
                }
                other => println!("{:?}", other),
            }
        }
    });

    let controller = Controller::start(ControllerConfig::default(), events).await?;

    controller.device_details(ip, object).await;

    if let Some(celsius) = set_point {
        let command = AirConditionerCommand::temperature(celsius)?;
        controller.apply(ip, object, command).await;
        controller.device_details(ip, object).await;
    }

    let stats = controller.client().stats();
    println!(
        "\n{} sent, {} received, {} timeouts, {:.1}% success",
        stats.messages_sent,
        stats.messages_received,
        stats.timeouts,
        stats.success_rate()
    );

    drop(controller);
    printer.await?;
    Ok(())
}
