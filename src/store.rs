//! JSON document persistence.
//!
//! Writes go to a uniquely named sibling file which is fsynced and renamed
//! over the target, so readers only ever see the previous or the new
//! document. Paths ending in `.gz` are gzip-compressed.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

fn is_gzip(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
}

/// Serialize `value` to `path` atomically, creating parent directories.
pub fn write_atomic_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_sibling(path);
    let result = write_to(value, &tmp, is_gzip(path)).and_then(|()| Ok(fs::rename(&tmp, path)?));
    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp) {
            warn!("Could not remove temp file {}: {}", tmp.display(), e);
        }
    } else {
        debug!("Wrote {}", path.display());
    }
    result
}

fn write_to<T: Serialize>(value: &T, tmp: &Path, gzip: bool) -> Result<()> {
    let file = File::create(tmp)?;
    let file = if gzip {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer_pretty(&mut encoder, value)?;
        encoder
            .finish()?
            .into_inner()
            .map_err(|e| e.into_error())?
    } else {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        writer.into_inner().map_err(|e| e.into_error())?
    };
    file.sync_all()?;
    Ok(())
}

/// Read a document, propagating any I/O or parse error.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(serde_json::from_reader(reader)?)
}

/// Read a document, returning `default` when it is missing or unreadable.
pub fn read_json_or<T: DeserializeOwned>(path: &Path, default: T) -> T {
    match read_json(path) {
        Ok(value) => value,
        Err(e) => {
            debug!("Using default for {}: {}", path.display(), e);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        values: Vec<f64>,
    }

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("route_dynamics-store-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn doc() -> Doc {
        Doc {
            name: "run".into(),
            values: vec![1.0, 2.5, -3.0],
        }
    }

    #[test]
    fn test_write_then_read_plain_and_gzip() {
        let dir = scratch_dir();
        for name in ["current_run.json", "current_run.json.gz"] {
            let path = dir.join("nested").join(name);
            write_atomic_json(&doc(), &path).unwrap();
            let back: Doc = read_json(&path).unwrap();
            assert_eq!(back, doc());
        }

        let raw = fs::read(dir.join("nested/current_run.json.gz")).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = scratch_dir();
        let path = dir.join("current_run.json");
        write_atomic_json(&doc(), &path).unwrap();
        let updated = Doc {
            name: "second".into(),
            values: vec![],
        };
        write_atomic_json(&updated, &path).unwrap();

        let back: Doc = read_json(&path).unwrap();
        assert_eq!(back, updated);
        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_read_json_or_default() {
        let dir = scratch_dir();
        let missing = dir.join("missing.json");
        let value: Vec<u32> = read_json_or(&missing, vec![7]);
        assert_eq!(value, vec![7]);

        let corrupt = dir.join("corrupt.json");
        fs::write(&corrupt, "{ not json").unwrap();
        let value: Vec<u32> = read_json_or(&corrupt, vec![]);
        assert!(value.is_empty());
        assert!(read_json::<Vec<u32>>(&corrupt).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
