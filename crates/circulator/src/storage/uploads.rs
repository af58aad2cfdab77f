use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// A circular saved to the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    /// Where the bytes were written.
    pub path: PathBuf,
    /// Client filename with any directory part removed; used for the
    /// attachment name.
    pub original_name: String,
}

/// Writes uploads into a single directory. Existing files are never
/// overwritten; a clashing name gets a `_2`, `_3`, ... suffix.
pub struct UploadStore {
    directory: PathBuf,
}

/// Upper bound on suffixed names tried before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

impl UploadStore {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Creates the upload directory if missing.
    pub fn ensure_directory(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.directory).map_err(|e| StorageError::CreateDirectory {
            path: self.directory.clone(),
            source: e,
        })
    }

    pub fn save(&self, client_filename: &str, content: &[u8]) -> Result<UploadedDocument, StorageError> {
        let original_name = sanitize_filename(client_filename)?;
        self.ensure_directory()?;

        let path = self.create_unique(&original_name, content)?;

        log::debug!(
            "Stored upload {} ({} bytes)",
            crate::sanitize::redact_path(&path),
            content.len()
        );

        Ok(UploadedDocument {
            path,
            original_name,
        })
    }

    /// Creates the file with `create_new`, so the existence check and the
    /// creation are one atomic step.
    fn create_unique(&self, filename: &str, content: &[u8]) -> Result<PathBuf, StorageError> {
        let (base, ext) = match filename.rfind('.') {
            Some(dot_pos) if dot_pos > 0 => (&filename[..dot_pos], Some(&filename[dot_pos..])),
            _ => (filename, None),
        };

        for counter in 1..=MAX_NAME_ATTEMPTS {
            let candidate = if counter == 1 {
                filename.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };
            let path = self.directory.join(&candidate);

            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(file) => {
                    write_or_remove(file, &path, content)?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::WriteFile { path, source: e }),
            }
        }

        Err(StorageError::FileExists(self.directory.join(filename)))
    }
}

/// Writes `content` to a freshly created file; a partial file is removed
/// when the write fails.
fn write_or_remove<W: Write>(mut file: W, path: &Path, content: &[u8]) -> Result<(), StorageError> {
    let written = file.write_all(content).and_then(|()| file.flush());
    drop(file);

    written.map_err(|source| {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!(
                "Failed to remove partial upload {}: {}",
                crate::sanitize::redact_path(path),
                e
            );
        }
        StorageError::WriteFile {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Keeps only the final component of a client-supplied name. Both `/` and
/// `\` count as separators.
fn sanitize_filename(client_filename: &str) -> Result<String, StorageError> {
    let name = client_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return Err(StorageError::InvalidFilename(client_filename.to_string()));
    }
    Ok(name.to_string())
}
