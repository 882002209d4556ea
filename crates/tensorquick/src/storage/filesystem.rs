use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Attempts before giving up on finding a free `name_N.ext`.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes generated images without overwriting existing files.
pub struct ImageStorage {
    output_directory: PathBuf,
}

impl ImageStorage {
    pub fn new<P: AsRef<Path>>(output_directory: P) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Writes `content` as `{stem}.{extension}` in the output directory,
    /// falling back to `{stem}_2.{extension}` and so on if taken.
    pub fn store(&self, content: &[u8], stem: &str, extension: &str) -> Result<PathBuf, StorageError> {
        ensure_directory(&self.output_directory)?;

        for counter in 1..=MAX_NAME_ATTEMPTS {
            let path = self.output_directory.join(numbered_name(stem, extension, counter));

            // create_new makes the existence check and creation one step
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(content).map_err(|e| StorageError::WriteFile {
                        path: path.clone(),
                        source: e,
                    })?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::WriteFile { path, source: e }),
            }
        }

        Err(StorageError::FileExists(
            self.output_directory.join(numbered_name(stem, extension, 1)),
        ))
    }
}

/// Copies an existing image into `directory`, keeping its file name unless
/// that name is taken.
pub fn export_file(source: &Path, directory: &Path) -> Result<PathBuf, StorageError> {
    if source.as_os_str().is_empty() {
        return Err(StorageError::EmptyPath);
    }
    if !source.is_file() {
        return Err(StorageError::MissingFile(source.to_path_buf()));
    }

    ensure_directory(directory)?;

    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image");
    let (stem, extension) = match file_name.rfind('.') {
        Some(dot) if dot > 0 => (&file_name[..dot], &file_name[dot + 1..]),
        _ => (file_name, ""),
    };

    let target = resolve_conflict(directory, stem, extension)?;
    std::fs::copy(source, &target).map_err(|e| StorageError::CopyFile {
        from: source.to_path_buf(),
        to: target.clone(),
        source: e,
    })?;

    Ok(target)
}

/// First `stem[_N].extension` in `directory` that does not exist yet.
fn resolve_conflict(directory: &Path, stem: &str, extension: &str) -> Result<PathBuf, StorageError> {
    for counter in 1..=MAX_NAME_ATTEMPTS {
        let path = directory.join(numbered_name(stem, extension, counter));
        if !path.exists() {
            return Ok(path);
        }
    }
    Err(StorageError::FileExists(
        directory.join(numbered_name(stem, extension, 1)),
    ))
}

fn numbered_name(stem: &str, extension: &str, counter: u32) -> String {
    let base = if counter == 1 {
        stem.to_string()
    } else {
        format!("{}_{}", stem, counter)
    };
    if extension.is_empty() {
        base
    } else {
        format!("{}.{}", base, extension)
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}
