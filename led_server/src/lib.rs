//! Status LED control over HTTP.
pub mod device;
pub mod endpoints;
pub mod error;
pub mod led;
