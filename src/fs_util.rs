use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::IngestError;

const INSTRUMENT_EXTENSIONS: &[&str] = &["STP", "stp", "PEM", "pem"];

pub fn is_instrument_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| INSTRUMENT_EXTENSIONS.contains(&ext))
            .unwrap_or(false)
}

pub fn is_zip(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| IngestError::Filesystem(format!("read {}: {err}", dir.display())))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| IngestError::Filesystem(err.to_string()))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// `.STP`/`.PEM` files directly inside `dir`, sorted by name.
pub fn instrument_files(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !dir.is_dir() {
        return Err(IngestError::NotADirectory(dir.display().to_string()));
    }
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|path| is_instrument_file(path))
        .collect())
}

/// Immediate sub-directories of `dir`, sorted by name.
pub fn survey_folders(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !dir.is_dir() {
        return Err(IngestError::NotADirectory(dir.display().to_string()));
    }
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|path| path.is_dir())
        .collect())
}

/// Root to iterate after extraction: a lone top-level directory is
/// descended into, as archives usually wrap their folders in one.
pub fn archive_root(extracted: &Path) -> Result<PathBuf, IngestError> {
    let entries = sorted_entries(extracted)?;
    match entries.as_slice() {
        [only] if only.is_dir() && !survey_folders(only)?.is_empty() => Ok(only.clone()),
        _ => Ok(extracted.to_path_buf()),
    }
}

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), IngestError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| IngestError::Archive(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| IngestError::Archive(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| IngestError::Archive(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(IngestError::Archive(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| IngestError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| IngestError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
    }
    Ok(())
}
