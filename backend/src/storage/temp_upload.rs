use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("cannot prepare upload directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("saved file {0} is missing or empty")]
    Empty(PathBuf),
}

/// An uploaded image staged on disk for the duration of one request.
///
/// Each artifact gets its own file name, so concurrent requests never touch
/// each other's bytes. The file is removed when the guard is dropped; a failed
/// removal is logged and otherwise ignored.
#[derive(Debug)]
pub struct TemporaryArtifact {
    path: PathBuf,
}

impl TemporaryArtifact {
    pub fn persist(
        dir: &Path,
        data: &[u8],
        content_type: Option<&str>,
    ) -> Result<Self, PersistError> {
        fs::create_dir_all(dir).map_err(|source| PersistError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(format!(
            "upload-{}.{}",
            Uuid::new_v4(),
            extension_for(content_type)
        ));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| PersistError::Write {
                path: path.clone(),
                source,
            })?;

        // From here on the guard owns the file and removes it on every exit.
        let artifact = Self { path };
        file.write_all(data)
            .and_then(|_| file.sync_all())
            .map_err(|source| PersistError::Write {
                path: artifact.path.clone(),
                source,
            })?;
        drop(file);

        match fs::metadata(&artifact.path) {
            Ok(meta) if meta.len() > 0 => Ok(artifact),
            _ => Err(PersistError::Empty(artifact.path.clone())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TemporaryArtifact {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Temporary file {} cleaned up", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("Temporary file {} already gone", self.path.display())
            }
            Err(e) => log::warn!(
                "Could not remove temporary file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// File extension for a declared upload content type. Only cosmetic: the
/// decoder sniffs the real format from the bytes.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some("image/jpeg") | Some("image/jpg") => "jpg",
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        Some("image/bmp") => "bmp",
        Some("image/tiff") => "tiff",
        _ => "upload",
    }
}
