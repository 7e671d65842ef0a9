//! Raw stage protocol test - minimal frames to debug communication

use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use stage_hardware::apt::{decode, AxisId, Command, LinkConfig, LinkTransport, SerialLink};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Send raw identification and position requests to the stage rack")]
struct Args {
    /// Serial port of the stage controller
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    info!("Opening {}...", args.port);
    let mut link = SerialLink::open(&LinkConfig::new(&args.port))?;
    link.set_receive_handler(Box::new(|bytes: &[u8]| {
        info!("Got {} bytes: {:02X?}", bytes.len(), bytes);
        match decode(bytes, None) {
            Ok(message) => info!("Decoded: {:?}", message),
            Err(e) => info!("Not decodable without axis context: {}", e),
        }
    }));

    let mut requests = vec![Command::hardware_info()];
    requests.extend(AxisId::ALL.into_iter().map(Command::request_status));

    for command in requests {
        info!("Sending {}: {:02X?}", command, command.encode());
        link.write(&command.encode())?;
        thread::sleep(Duration::from_millis(200));
    }

    info!("Done!");
    Ok(())
}
