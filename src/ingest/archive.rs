//! Zip archive expansion.

use color_eyre::Result;
use std::io::{Cursor, Read};
use tracing::{debug, warn};
use zip::ZipArchive;

use super::SourceFile;
use crate::core::types::FileFormat;
use crate::error::DataQueryError;

/// Members of an archive split into loadable files and excluded entries.
#[derive(Debug, Default)]
pub struct ArchiveContents {
    pub members: Vec<SourceFile>,
    /// Full member paths that were skipped, with the reason
    pub excluded: Vec<(String, String)>,
}

/// Base name of a member path (`dir/sub/a.csv` -> `a.csv`).
pub fn member_base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Read every file member of a zip archive into memory.
///
/// Directories are skipped silently; members with an unsupported extension or
/// that are archives themselves are reported as excluded.
pub fn read_members(name: &str, bytes: &[u8]) -> Result<ArchiveContents> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
        DataQueryError::LoadFailed {
            name: name.to_string(),
            reason: format!("failed to open zip archive: {e}"),
        }
        .report()
    })?;

    let mut contents = ArchiveContents::default();
    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx).map_err(|e| {
            DataQueryError::LoadFailed {
                name: name.to_string(),
                reason: format!("failed to read archive entry #{idx}: {e}"),
            }
            .report()
        })?;
        if entry.is_dir() {
            continue;
        }
        let path = entry.name().to_string();
        let base = member_base_name(&path).to_string();
        match FileFormat::from_file_name(&base) {
            Some(format) if format.is_archive() => {
                warn!("Skipping nested archive {} in {}", path, name);
                contents.excluded.push((path, "Nested archives are not expanded".into()));
            }
            Some(_) => {
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut data)?;
                debug!("Extracted {} ({} bytes) from {}", path, data.len(), name);
                contents.members.push(SourceFile::new(base, data));
            }
            None => {
                contents.excluded.push((path, "Unsupported file format".into()));
            }
        }
    }
    Ok(contents)
}
