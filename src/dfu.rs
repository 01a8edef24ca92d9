use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::hw::PeripheralId;

/// Leading bytes of a zip local file header.
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// Errors returned when preparing or running a firmware update.
#[derive(Debug, Error)]
pub enum DfuError {
    #[error("failed to read firmware image `{path}`")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("firmware image is empty")]
    EmptyImage,
    #[error("firmware image is not a DFU zip package")]
    NotAZip,
    #[error("firmware updater failed: {message}")]
    Updater { message: String },
}

/// A validated DFU zip package.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FirmwareImage {
    bytes: Vec<u8>,
}

impl FirmwareImage {
    /// Reads and validates a DFU package from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a zip package.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DfuError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| DfuError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(bytes)
    }

    /// Validates an in-memory DFU package.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are empty or lack the zip signature.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DfuError> {
        if bytes.is_empty() {
            return Err(DfuError::EmptyImage);
        }
        if !bytes.starts_with(&ZIP_MAGIC) {
            return Err(DfuError::NotAZip);
        }
        Ok(Self { bytes })
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Progress and outcome notifications from a firmware update.
#[derive(Debug, Clone, PartialEq)]
pub enum DfuEvent {
    Started,
    BootloaderEntered,
    UploadStarted,
    Progress {
        percent: u8,
        part: u32,
        total_parts: u32,
        /// Bytes per second.
        average_speed: f64,
    },
    UploadFinished,
    Completed,
    Aborted,
    Failed {
        message: String,
    },
}

impl DfuEvent {
    /// Returns whether no further events follow.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed { .. })
    }
}

/// Drives an update on behalf of a session.
///
/// Implementations report every state change on `events` and return once the
/// update reached a terminal state.
#[async_trait]
pub trait FirmwareUpdater: Send + Sync {
    async fn start_update(
        &self,
        peripheral: &PeripheralId,
        image: FirmwareImage,
        events: UnboundedSender<DfuEvent>,
    ) -> Result<(), DfuError>;
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Vec::new())]
    #[case(b"not a zip".to_vec())]
    fn from_bytes_rejects_non_packages(#[case] bytes: Vec<u8>) {
        assert_matches!(
            FirmwareImage::from_bytes(bytes),
            Err(DfuError::EmptyImage | DfuError::NotAZip)
        );
    }

    #[test]
    fn from_bytes_accepts_zip_signature() {
        let image = FirmwareImage::from_bytes(b"PK\x03\x04payload".to_vec()).expect("valid image");
        assert_eq!(11, image.len());
    }

    #[test]
    fn open_reports_missing_file() {
        assert_matches!(
            FirmwareImage::open("/nonexistent/blinky-dfu.zip"),
            Err(DfuError::Io { path, .. }) if path == "/nonexistent/blinky-dfu.zip"
        );
    }

    #[rstest]
    #[case(DfuEvent::Completed, true)]
    #[case(DfuEvent::Aborted, true)]
    #[case(DfuEvent::Failed { message: "crc".to_string() }, true)]
    #[case(DfuEvent::UploadStarted, false)]
    fn terminal_events(#[case] event: DfuEvent, #[case] expected: bool) {
        assert_eq!(expected, event.is_terminal());
    }
}
