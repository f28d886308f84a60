//! Control of a status LED through its sysfs attributes.
//!
//! Every operation goes straight to the files, no state is kept in between. A toggle reads and
//! then writes the brightness, so two concurrent toggles can lose an update.
use std::{path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    device::{DeviceFile, SysfsFile},
    error::LedError,
};

/// LED directory of the activity LED on a Raspberry Pi.
pub const ACT_LED_DIR: &str = "/sys/class/leds/ACT";

/// Trigger which hands the LED over to manual control.
const MANUAL_TRIGGER: &str = "none";

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedState {
    On,
    Off,
}

impl LedState {
    pub fn from_brightness(brightness: u32) -> Self {
        match brightness {
            1 => LedState::On,
            _ => LedState::Off,
        }
    }

    pub fn brightness(self) -> u32 {
        match self {
            LedState::On => 1,
            LedState::Off => 0,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            LedState::On => LedState::Off,
            LedState::Off => LedState::On,
        }
    }
}

#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LedStatus {
    pub led_state: LedState,
    pub brightness: u32,
}

pub struct LedController {
    trigger: Arc<dyn DeviceFile>,
    brightness: Arc<dyn DeviceFile>,
}

impl LedController {
    pub fn new(trigger: Arc<dyn DeviceFile>, brightness: Arc<dyn DeviceFile>) -> Self {
        Self {
            trigger,
            brightness,
        }
    }

    /// Controller for the LED exposed in `led_dir`.
    pub fn sysfs(led_dir: impl AsRef<Path>) -> Self {
        let led_dir = led_dir.as_ref();
        Self::new(
            Arc::new(SysfsFile::new(led_dir.join("trigger"))),
            Arc::new(SysfsFile::new(led_dir.join("brightness"))),
        )
    }

    /// Whether the LED files are present, i.e. we run on the expected hardware.
    pub fn is_supported(&self) -> bool {
        self.brightness.exists()
    }

    pub fn status(&self) -> Result<LedStatus, LedError> {
        let brightness = self.read_brightness()?;

        Ok(LedStatus {
            led_state: LedState::from_brightness(brightness),
            brightness,
        })
    }

    /// Switch the LED off if it is on and on otherwise. Returns the new state.
    pub fn toggle(&self) -> Result<LedState, LedError> {
        if !self.is_supported() {
            return Err(LedError::DeviceNotSupported);
        }

        // Disable blink patterns so that the brightness sticks
        self.trigger.write(MANUAL_TRIGGER)?;

        let current = LedState::from_brightness(self.read_brightness()?);
        let new_state = current.toggled();
        self.brightness.write(&new_state.brightness().to_string())?;
        log::info!("LED switched {:?} -> {:?}", current, new_state);

        Ok(new_state)
    }

    fn read_brightness(&self) -> Result<u32, LedError> {
        let content = self.brightness.read()?;
        content
            .trim()
            .parse()
            .map_err(|_| LedError::InvalidBrightness(content.trim().to_owned()))
    }
}
