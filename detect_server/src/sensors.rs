//! Sensors module.
//!
//! The camera is opened for a single frame and released right after, so the device is never
//! held between requests.
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, bail, ensure, Result};
use image::{ImageBuffer, RgbImage};
use rscam::{Camera, Config};

use crate::error::DetectError;

/// One captured camera image.
pub type Frame = RgbImage;

/// Pixel formats which can be turned into a [`Frame`].
pub const SUPPORTED_FORMATS: [&str; 2] = ["MJPG", "RGB3"];

/// Source of single still frames.
pub trait FrameSource: Send + Sync {
    /// Acquire exactly one frame.
    fn capture(&self) -> Result<Frame, DetectError>;

    /// Check whether the device can be opened, releasing it immediately.
    fn is_available(&self) -> bool;
}

/// Settings of the V4L2 camera.
#[derive(Clone, Debug)]
pub struct CameraSettings {
    pub device: String,
    pub format: String,
    pub resolution: Option<(u32, u32)>,
    pub frame_rate: Option<(u32, u32)>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: "/dev/video0".into(),
            format: "MJPG".into(),
            resolution: None,
            frame_rate: None,
        }
    }
}

/// Camera on a Linux machine, accessed through V4L2.
pub struct V4lCamera {
    settings: CameraSettings,
    // Held while the device is open so concurrent requests queue up instead of racing for it.
    device_lock: Mutex<()>,
}

impl V4lCamera {
    pub fn new(settings: CameraSettings) -> Result<Self> {
        ensure!(
            SUPPORTED_FORMATS.contains(&settings.format.as_str()),
            "unsupported pixel format {}, expected one of {:?}",
            settings.format,
            SUPPORTED_FORMATS
        );
        log::info!(
            "Using camera {} with format {}",
            settings.device,
            settings.format
        );

        Ok(Self {
            settings,
            device_lock: Mutex::new(()),
        })
    }

    fn open(&self) -> Result<Camera, DetectError> {
        Camera::new(&self.settings.device).map_err(|err| {
            DetectError::DeviceUnavailable(format!("{}: {err}", self.settings.device))
        })
    }
}

impl FrameSource for V4lCamera {
    fn capture(&self) -> Result<Frame, DetectError> {
        let _guard = self
            .device_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut cam = self.open()?;
        log_supported_formats(&cam, &self.settings.format);
        let format = self.settings.format.as_bytes();

        let resolution = self
            .settings
            .resolution
            .map(Ok)
            .unwrap_or_else(|| get_max_resolution(&cam, format))
            .map_err(|err| DetectError::CaptureFailed(err.to_string()))?;

        let frame_rate = self
            .settings
            .frame_rate
            .map(Ok)
            .unwrap_or_else(|| get_max_frame_rate(&cam, format, resolution))
            .map_err(|err| DetectError::CaptureFailed(err.to_string()))?;

        cam.start(&Config {
            interval: frame_rate,
            resolution,
            format,
            ..Default::default()
        })
        .map_err(|err| DetectError::CaptureFailed(format!("failed to start stream: {err}")))?;

        let frame = cam
            .capture()
            .map_err(|err| DetectError::CaptureFailed(err.to_string()))?;
        log::debug!(
            "Captured {} bytes at {}x{}",
            frame.len(),
            frame.resolution.0,
            frame.resolution.1
        );

        decode_frame(&frame[..], frame.resolution, format)
            .map_err(|err| DetectError::CaptureFailed(err.to_string()))
    }

    fn is_available(&self) -> bool {
        let _guard = self
            .device_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match self.open() {
            Ok(_cam) => true,
            Err(err) => {
                log::warn!("Camera check failed: {err}");
                false
            }
        }
    }
}

/// Turn the raw bytes of a captured frame into an RGB image.
pub fn decode_frame(data: &[u8], resolution: (u32, u32), format: &[u8]) -> Result<Frame> {
    match format {
        b"MJPG" => Ok(turbojpeg::decompress_image(data)?),
        b"RGB3" => {
            let (width, height) = resolution;
            ImageBuffer::from_raw(width, height, data.to_vec()).ok_or_else(|| {
                anyhow!(
                    "{} bytes do not make up a {}x{} RGB frame",
                    data.len(),
                    width,
                    height
                )
            })
        }
        other => bail!(
            "unsupported pixel format {}",
            String::from_utf8_lossy(other)
        ),
    }
}

/// Parse a resolution given as `<width>x<height>`.
pub fn parse_resolution(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected <width>x<height>, got {value:?}"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|err| format!("invalid width {width:?}: {err}"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|err| format!("invalid height {height:?}: {err}"))?;
    if width == 0 || height == 0 {
        return Err(format!("resolution must not be empty, got {value:?}"));
    }

    Ok((width, height))
}

/// Get the maximum supported resolution for the given format.
fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32)> {
    let resolution_info = cam.resolutions(format)?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    match resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions
            .iter()
            // Get the highest resolution in terms of number of pixels
            .max_by_key(|(width, height)| u64::from(*width) * u64::from(*height))
            .copied(),
        rscam::ResolutionInfo::Stepwise { max, .. } => Some(max),
    }
    .ok_or_else(|| anyhow!("No resolution found"))
}

/// Get the maximum supported frame rate for the given format and resolution.
///
/// V4L2 reports frame intervals as `(numerator, denominator)` seconds, so the highest frame
/// rate is the shortest interval.
fn get_max_frame_rate(cam: &Camera, format: &[u8], resolution: (u32, u32)) -> Result<(u32, u32)> {
    let interval_info = cam.intervals(format, resolution)?;
    log::debug!("Found frame intervals: {:?}", &interval_info);
    match interval_info {
        rscam::IntervalInfo::Discretes(intervals) => intervals
            .iter()
            .filter(|(numerator, denominator)| *numerator > 0 && *denominator > 0)
            // a/b < c/d  <=>  a*d < c*b
            .min_by(|(a, b), (c, d)| {
                (u64::from(*a) * u64::from(*d)).cmp(&(u64::from(*c) * u64::from(*b)))
            })
            .copied(),
        rscam::IntervalInfo::Stepwise { min, .. } => Some(min),
    }
    .ok_or_else(|| anyhow!("No frame rate found"))
}

fn log_supported_formats(cam: &Camera, format: &str) {
    let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        format
    );
}
