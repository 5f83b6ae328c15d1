//! Output inspection and packaging.
//!
//! Some formats (shapefile sets, file geodatabases) are written by the
//! engine as a directory of files. Those are packed into a single zip
//! archive before publishing, so the store only ever receives one object
//! per cache key.
//!
//! Archives are built deterministically: members are sorted by path and
//! stamped with a fixed modification time, so converting the same source
//! twice yields the same bytes whenever the engine does.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::{GatewayError, GatewayResult};

/// Size of an engine output.
///
/// Returns `Ok(None)` if nothing exists at `path`, the file size for a file,
/// and the summed size of all member files for a directory.
pub fn measure_output(path: &Path) -> io::Result<Option<u64>> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    if meta.is_file() {
        return Ok(Some(meta.len()));
    }

    let mut total = 0u64;
    for member in list_members(path)? {
        total += fs::metadata(&member)?.len();
    }
    Ok(Some(total))
}

/// Every regular file below `dir`, sorted by path.
///
/// Fails on any entry that is neither a directory nor a readable regular
/// file, such as a dangling symlink, so an archive is never short a member.
fn list_members(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let paths = glob::glob(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut members = Vec::new();
    for entry in paths {
        let path = entry.map_err(io::Error::from)?;
        let meta = fs::metadata(&path).map_err(|e| {
            io::Error::new(e.kind(), format!("{}: {}", path.display(), e))
        })?;
        if meta.is_dir() {
            continue;
        }
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not a regular file", path.display()),
            ));
        }
        members.push(path);
    }
    members.sort();
    Ok(members)
}

/// Zip every file under `dir` into `archive_path`.
///
/// Member names are relative to `dir` and use `/` separators. Any member
/// that cannot be read aborts the whole archive.
///
/// # Returns
///
/// The size of the written archive in bytes.
pub fn package_directory(dir: &Path, archive_path: &Path) -> GatewayResult<u64> {
    let fail = |what: &str, e: &dyn std::fmt::Display| {
        GatewayError::PackagingFailed(format!("{} ({}): {}", what, dir.display(), e))
    };

    let members = list_members(dir).map_err(|e| fail("cannot list members", &e))?;
    if members.is_empty() {
        return Err(GatewayError::PackagingFailed(format!(
            "{} contains no files",
            dir.display()
        )));
    }

    let file = File::create(archive_path).map_err(|e| fail("cannot create archive", &e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    for member in &members {
        let name = member_name(dir, member)
            .ok_or_else(|| fail("member outside archive root", &member.display()))?;
        let mut source = File::open(member).map_err(|e| fail("cannot read member", &e))?;
        zip.start_file(name, options)
            .map_err(|e| fail("cannot add member", &e))?;
        io::copy(&mut source, &mut zip).map_err(|e| fail("cannot read member", &e))?;
    }

    let mut writer = zip.finish().map_err(|e| fail("cannot finish archive", &e))?;
    io::Write::flush(&mut writer).map_err(|e| fail("cannot flush archive", &e))?;

    let size = fs::metadata(archive_path)
        .map_err(|e| fail("cannot stat archive", &e))?
        .len();
    Ok(size)
}

/// Archive member name for `path` relative to `root`.
fn member_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
