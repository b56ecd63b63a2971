//! Uploaded audio and its on-disk staging
//!
//! An upload is kept in memory for the whole session so it can be played
//! back and re-analysed. Each analysis run writes it to its own temporary
//! file ([`TempAudio`]); dropping the guard deletes the file, whichever
//! way the run ends.

use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;

/// File extensions the dashboard accepts (compared case-insensitively)
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["wav", "mp3", "flac"];

/// Errors that can occur while accepting or staging an upload
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Unsupported file type: {0:?} (expected wav, mp3 or flac)")]
    UnsupportedType(String),

    #[error("Uploaded file is empty")]
    Empty,

    #[error("Failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

/// An uploaded audio file held in memory
#[derive(Debug, Clone)]
pub struct UploadedAudio {
    file_name: String,
    extension: String,
    bytes: Arc<[u8]>,
}

impl UploadedAudio {
    /// Accept an upload, checking its extension against [`ACCEPTED_EXTENSIONS`]
    pub fn new(file_name: &str, bytes: Vec<u8>) -> Result<Self, UploadError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| ACCEPTED_EXTENSIONS.contains(&e.as_str()))
            .ok_or_else(|| UploadError::UnsupportedType(file_name.to_string()))?;

        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        Ok(Self {
            file_name: file_name.to_string(),
            extension,
            bytes: bytes.into(),
        })
    }

    /// Original file name as uploaded
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Lower-cased extension without the dot
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Shared handle to the raw bytes
    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// MIME type for the browser audio player
    pub fn mime_type(&self) -> &'static str {
        match self.extension.as_str() {
            "mp3" => "audio/mpeg",
            "flac" => "audio/flac",
            _ => "audio/wav",
        }
    }

    /// Write the bytes to a uniquely named temporary file with the same extension
    pub fn persist(&self) -> Result<TempAudio, UploadError> {
        let mut file = tempfile::Builder::new()
            .prefix("audioqa-")
            .suffix(&format!(".{}", self.extension))
            .tempfile()?;
        std::io::Write::write_all(&mut file, &self.bytes)?;
        std::io::Write::flush(&mut file)?;

        tracing::debug!(
            path = %file.path().display(),
            bytes = self.bytes.len(),
            "Staged upload for analysis"
        );
        Ok(TempAudio { file })
    }
}

/// Temporary copy of an upload, removed when dropped
#[derive(Debug)]
pub struct TempAudio {
    file: NamedTempFile,
}

impl TempAudio {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for TempAudio {
    fn drop(&mut self) {
        tracing::debug!(path = %self.file.path().display(), "Removing staged upload");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_supported_types() {
        for name in ["take1.wav", "mix.MP3", "master.Flac"] {
            let upload = UploadedAudio::new(name, vec![1, 2, 3]).unwrap();
            assert_eq!(upload.file_name(), name);
            assert_eq!(upload.len(), 3);
        }
        let upload = UploadedAudio::new("mix.MP3", vec![1]).unwrap();
        assert_eq!(upload.extension(), "mp3");
        assert_eq!(upload.mime_type(), "audio/mpeg");
    }

    #[test]
    fn test_rejects_unsupported_types() {
        for name in ["notes.txt", "clip.ogg", "noextension", "wav", ".wav.exe"] {
            let err = UploadedAudio::new(name, vec![1]).unwrap_err();
            assert!(matches!(err, UploadError::UnsupportedType(_)), "{name}");
        }
    }

    #[test]
    fn test_rejects_empty_upload() {
        assert!(matches!(
            UploadedAudio::new("take1.wav", Vec::new()),
            Err(UploadError::Empty)
        ));
    }

    #[test]
    fn test_persist_keeps_extension_and_bytes() {
        let upload = UploadedAudio::new("Take 1.FLAC", b"fLaC data".to_vec()).unwrap();
        let staged = upload.persist().unwrap();

        assert_eq!(staged.path().extension().unwrap(), "flac");
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"fLaC data");
    }

    #[test]
    fn test_persist_is_unique_and_removed_on_drop() {
        let upload = UploadedAudio::new("take1.wav", b"RIFF".to_vec()).unwrap();
        let first = upload.persist().unwrap();
        let second = upload.persist().unwrap();
        assert_ne!(first.path(), second.path());

        let path = first.path().to_path_buf();
        assert!(path.exists());
        drop(first);
        assert!(!path.exists());
        assert!(second.path().exists());
    }

    #[test]
    fn test_staged_file_removed_on_panic() {
        let upload = UploadedAudio::new("take1.wav", b"RIFF".to_vec()).unwrap();
        let mut staged_path = None;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let staged = upload.persist().unwrap();
            staged_path = Some(staged.path().to_path_buf());
            panic!("runner crashed");
        }));

        assert!(result.is_err());
        assert!(!staged_path.unwrap().exists());
    }
}
