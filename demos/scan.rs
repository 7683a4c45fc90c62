//! ECHONET Lite Discovery Example
//!
//! Sends a multicast instance-list request and lists every node that
//! answers within the scan window, marking air conditioners.
//!
//! Usage: `cargo run --example scan --features demos -- [window-seconds]`

use std::time::Duration;

use echonet_rs::discovery::{ScanConfig, Scanner};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("ECHONET Lite Discovery");
    println!("======================\n");

    let mut config = ScanConfig::default();
    if let Some(seconds) = std::env::args().nth(1) {
        config.window = Duration::from_secs(seconds.parse()?);
    }
    if let Some(multicast) = &config.transport.multicast {
        println!("Interface: {}", multicast.interface);
    }
    println!("Target:    {}", config.target);
    println!("Window:    {:?}\n", config.window);

    let scanner = Scanner::new(config);
    let mut scan = scanner.scan().await?;

    let mut found = 0;
    while let Some(device) = scan.next().await {
        found += 1;
        println!("Node {} ({} objects)", device.address, device.objects.len());
        for object in &device.objects {
            let marker = if object.is_air_conditioner() {
                "  <- air conditioner"
            } else {
                ""
            };
            println!("  {}{}", object, marker);
        }
        println!();
    }

    println!("Scan finished: {} node(s) found", found);
    Ok(())
}
