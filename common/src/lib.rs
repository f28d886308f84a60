//! Common code shared between `detect_server` and `led_server`.
pub mod http;

use env_logger::{Env, TimestampPrecision};

/// Setup the logger, honoring `RUST_LOG` and defaulting to `info`.
pub fn init_logger() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();
}
