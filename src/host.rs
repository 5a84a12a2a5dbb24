//! Host collaborators
//!
//! The viewer does not own a window. Fullscreen switching, device detection
//! and file upload belong to whatever embeds it; these traits are the seams,
//! with headless defaults for the CLI and tests.

use serde::{Deserialize, Serialize};

use crate::pdf::DocumentSource;

pub const PDF_MIME: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Fullscreen switching for the viewer container
pub trait Fullscreen {
    /// Flip fullscreen for the container; returns the new state
    fn toggle(&mut self) -> bool;
    fn is_active(&self) -> bool;
    fn is_supported(&self) -> bool;
}

/// Device classification, only used to hide the fullscreen control
pub trait DeviceClass {
    fn is_mobile(&self) -> bool;
}

/// Fullscreen state without a display behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessFullscreen {
    active: bool,
    supported: bool,
}

impl HeadlessFullscreen {
    #[must_use]
    pub fn new(supported: bool) -> Self {
        Self {
            active: false,
            supported,
        }
    }

    #[must_use]
    pub fn active(mut self) -> Self {
        self.active = self.supported;
        self
    }
}

impl Default for HeadlessFullscreen {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Fullscreen for HeadlessFullscreen {
    fn toggle(&mut self) -> bool {
        if self.supported {
            self.active = !self.active;
        }
        self.active
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn is_supported(&self) -> bool {
        self.supported
    }
}

/// Fixed device class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticDevice {
    pub mobile: bool,
}

impl DeviceClass for StaticDevice {
    fn is_mobile(&self) -> bool {
        self.mobile
    }
}

/// Collaborators supplied by the embedding application
pub struct Host {
    pub fullscreen: Box<dyn Fullscreen>,
    pub device: Box<dyn DeviceClass>,
}

impl Host {
    #[must_use]
    pub fn new(fullscreen: Box<dyn Fullscreen>, device: Box<dyn DeviceClass>) -> Self {
        Self { fullscreen, device }
    }

    /// Headless desktop host with fullscreen support
    #[must_use]
    pub fn headless() -> Self {
        Self::new(
            Box::new(HeadlessFullscreen::default()),
            Box::new(StaticDevice::default()),
        )
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::headless()
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("fullscreen_active", &self.fullscreen.is_active())
            .field("fullscreen_supported", &self.fullscreen.is_supported())
            .field("mobile", &self.device.is_mobile())
            .finish()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("the viewer is not accepting uploads")]
    NotAccepting,

    #[error("uploaded file is empty")]
    Empty,

    #[error("file type {mime} is not accepted")]
    UnsupportedType { mime: String },

    #[error("file is {size_kb} KB, the limit is {max_kb} KB")]
    TooLarge { size_kb: u64, max_kb: u64 },
}

/// File content handed over by the upload collaborator
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedFile {
    #[must_use]
    pub fn new(name: Option<String>, data: Vec<u8>) -> Self {
        Self { name, data }
    }

    /// MIME type from the content magic, falling back to the file name
    #[must_use]
    pub fn detect_mime(&self) -> Option<&'static str> {
        if self.data.starts_with(PDF_MAGIC) {
            return Some(PDF_MIME);
        }
        self.name
            .as_deref()
            .filter(|name| name.to_ascii_lowercase().ends_with(".pdf"))
            .map(|_| PDF_MIME)
    }

    /// Size rounded up to whole kilobytes
    #[must_use]
    pub fn size_kb(&self) -> u64 {
        (self.data.len() as u64).div_ceil(1024)
    }

    #[must_use]
    pub fn into_source(self) -> DocumentSource {
        DocumentSource::from_bytes(self.name, self.data)
    }
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}

/// What the upload collaborator lets through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    /// Accepted MIME types, `*/*` for anything
    #[serde(default = "default_accept")]
    pub accept: Vec<String>,

    #[serde(default = "default_max_size_kb")]
    pub max_size_kb: u64,
}

fn default_accept() -> Vec<String> {
    vec![PDF_MIME.to_string()]
}

fn default_max_size_kb() -> u64 {
    1_000_000_000
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            accept: default_accept(),
            max_size_kb: default_max_size_kb(),
        }
    }
}

impl UploadPolicy {
    pub fn validate(&self, file: &UploadedFile) -> Result<(), UploadError> {
        if file.data.is_empty() {
            return Err(UploadError::Empty);
        }

        let mime = file.detect_mime().unwrap_or("application/octet-stream");
        let accepted = self
            .accept
            .iter()
            .any(|entry| entry == "*/*" || entry.eq_ignore_ascii_case(mime));
        if !accepted {
            return Err(UploadError::UnsupportedType {
                mime: mime.to_string(),
            });
        }

        let size_kb = file.size_kb();
        if size_kb > self.max_size_kb {
            return Err(UploadError::TooLarge {
                size_kb,
                max_kb: self.max_size_kb,
            });
        }
        Ok(())
    }
}
