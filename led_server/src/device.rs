//! Files through which the operating system exposes a device.
//!
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// A single device attribute file, e.g. below `/sys/class/leds`.
pub trait DeviceFile: Send + Sync {
    fn exists(&self) -> bool;

    /// Read the whole content.
    fn read(&self) -> io::Result<String>;

    /// Replace the whole content.
    fn write(&self, value: &str) -> io::Result<()>;
}

/// Device file on the real filesystem.
#[derive(Debug)]
pub struct SysfsFile {
    path: PathBuf,
}

impl SysfsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceFile for SysfsFile {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }

    fn write(&self, value: &str) -> io::Result<()> {
        fs::write(&self.path, value)
    }
}

/// In-memory device file behaving like a sysfs attribute.
///
/// A missing file can neither be read nor created. A read-only file refuses writes with
/// [`io::ErrorKind::PermissionDenied`].
#[derive(Debug, Default)]
pub struct MemoryFile {
    content: Mutex<Option<String>>,
    read_only: bool,
}

impl MemoryFile {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Mutex::new(Some(content.into())),
            read_only: false,
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }

    pub fn read_only(content: impl Into<String>) -> Self {
        Self {
            content: Mutex::new(Some(content.into())),
            read_only: true,
        }
    }

    /// Current content, `None` if the file is missing.
    pub fn content(&self) -> Option<String> {
        self.content
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DeviceFile for MemoryFile {
    fn exists(&self) -> bool {
        self.content().is_some()
    }

    fn read(&self) -> io::Result<String> {
        self.content()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn write(&self, value: &str) -> io::Result<()> {
        let mut content = self.content.lock().unwrap_or_else(PoisonError::into_inner);
        match (content.as_mut(), self.read_only) {
            (None, _) => Err(io::Error::from(io::ErrorKind::NotFound)),
            (Some(_), true) => Err(io::Error::from(io::ErrorKind::PermissionDenied)),
            (Some(current), false) => {
                *current = value.to_owned();
                Ok(())
            }
        }
    }
}
