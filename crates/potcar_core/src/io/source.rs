//! Upload source enumeration.
//!
//! # Responsibility
//! - Turn a folder or a tar / tar.gz archive into an ordered list of
//!   candidate payloads.
//!
//! # Invariants
//! - Folders are read non-recursively; only regular, non-hidden files count.
//! - Archive members are regular, non-hidden files at any depth.
//! - Candidates are ordered by name; names are labels only and never used
//!   as identity.

use crate::service::{ServiceError, ServiceResult};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One payload found in an upload source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// File name or archive member path, for reporting.
    pub label: String,
    pub contents: Vec<u8>,
}

/// Supported upload source shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Folder,
    Tar,
    TarGz,
}

impl SourceKind {
    /// Classifies `path` by file type and extension.
    pub fn detect(path: &Path) -> ServiceResult<Self> {
        if path.is_dir() {
            return Ok(Self::Folder);
        }
        if !path.is_file() {
            return Err(ServiceError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "upload source does not exist"),
            ));
        }

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".tar") {
            Ok(Self::Tar)
        } else {
            Err(ServiceError::UnsupportedSource(path.to_path_buf()))
        }
    }
}

/// Reads every candidate payload from `path`.
pub fn collect_candidates(path: &Path) -> ServiceResult<Vec<Candidate>> {
    match SourceKind::detect(path)? {
        SourceKind::Folder => collect_folder(path),
        SourceKind::Tar => {
            let file = File::open(path).map_err(|err| ServiceError::io(path, err))?;
            collect_archive(path, tar::Archive::new(file))
        }
        SourceKind::TarGz => {
            let file = File::open(path).map_err(|err| ServiceError::io(path, err))?;
            collect_archive(path, tar::Archive::new(GzDecoder::new(file)))
        }
    }
}

fn collect_folder(path: &Path) -> ServiceResult<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| {
            let entry_path = err.path().map_or_else(|| path.to_path_buf(), Path::to_path_buf);
            ServiceError::io(entry_path, std::io::Error::from(err))
        })?;
        if !entry.file_type().is_file() || is_hidden(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let contents =
            std::fs::read(entry.path()).map_err(|err| ServiceError::io(entry.path(), err))?;
        candidates.push(Candidate {
            label: entry.file_name().to_string_lossy().into_owned(),
            contents,
        });
    }
    Ok(candidates)
}

fn collect_archive<R: Read>(
    path: &Path,
    mut archive: tar::Archive<R>,
) -> ServiceResult<Vec<Candidate>> {
    let mut candidates = Vec::new();
    let entries = archive
        .entries()
        .map_err(|err| ServiceError::io(path, err))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| ServiceError::io(path, err))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let member: PathBuf = entry
            .path()
            .map_err(|err| ServiceError::io(path, err))?
            .into_owned();
        let hidden = member
            .components()
            .any(|component| is_hidden(&component.as_os_str().to_string_lossy()));
        if hidden {
            continue;
        }

        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|err| ServiceError::io(path.join(&member), err))?;
        candidates.push(Candidate {
            label: member.to_string_lossy().replace('\\', "/"),
            contents,
        });
    }
    candidates.sort_by(|left, right| left.label.cmp(&right.label));
    Ok(candidates)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}
