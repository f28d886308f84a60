//! Object detection on single camera frames, served over HTTP.
pub mod annotate;
pub mod endpoints;
pub mod error;
pub mod nn;
pub mod pipeline;
pub mod response;
pub mod sensors;
