//! LED server binary.
//!
use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use clap::Parser;
use led_server::{
    endpoints::router,
    led::{LedController, ACT_LED_DIR},
};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve the HTTP API on
    #[clap(long, default_value = "0.0.0.0:8000")]
    server_address: String,

    /// Directory holding the `trigger` and `brightness` files of the LED
    #[clap(long, default_value = ACT_LED_DIR)]
    led_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    common::init_logger();

    let led = LedController::sysfs(&args.led_dir);
    if !led.is_supported() {
        log::warn!(
            "No LED found in {}, requests will fail until it appears",
            args.led_dir
        );
    }

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    common::http::serve(router(Arc::new(led)), addr).await
}
