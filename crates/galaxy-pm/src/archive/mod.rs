//! Repository archives
//!
//! Loads built artifacts (`{namespace}-{name}-{version}.tar.gz`), validates their layout and
//! exposes an immutable [`RepositoryArchive`] that can later be extracted.
//!
//! Layout of a valid artifact:
//! ```text
//! greetings_namespace-hello-11.11.11/
//! ├── MANIFEST.json
//! ├── galaxy.toml
//! └── roles/...
//! ```

pub mod build;
mod manifest;

pub use build::{build_artifact, BuildResult, COLLECTION_INFO_FILENAME};
pub use manifest::{ArchiveManifest, CollectionInfo, MANIFEST_FILENAME, MANIFEST_FORMAT};

use crate::repository_spec::{parse_version, RepositorySpec, SpecError, SpecSource};
use crate::requirement::Requirement;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while loading or building archives
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Archive violates the single top directory / naming / marker convention
    #[error("Invalid archive format: {0}")]
    Format(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// MANIFEST.json could not be written
    #[error("Invalid archive manifest: {0}")]
    ManifestError(#[from] serde_json::Error),

    /// galaxy.toml could not be parsed
    #[error("Failed to parse collection info: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Identity or version is invalid
    #[error("Invalid collection spec: {0}")]
    Spec(#[from] SpecError),
}

/// Packaging convention of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveType {
    /// Collection artifact with a `MANIFEST.json` marker
    MultiContentArtifact,
}

impl ArchiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveType::MultiContentArtifact => "multi-content-artifact",
        }
    }
}

impl fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated archive metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub archive_type: ArchiveType,

    /// Single top-level directory, `{namespace}-{name}-{version}`
    pub top_dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    Gzip,
    None,
}

/// A loaded, validated archive
///
/// Holds the path of the backing file; nothing is extracted until [`RepositoryArchive::extract_to`].
#[derive(Debug, Clone)]
pub struct RepositoryArchive {
    info: ArchiveInfo,
    manifest: ArchiveManifest,
    repository_spec: RepositorySpec,
    path: PathBuf,
    compression: Compression,
}

impl RepositoryArchive {
    pub fn info(&self) -> &ArchiveInfo {
        &self.info
    }

    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }

    /// Identity and version encoded in the top directory
    pub fn repository_spec(&self) -> &RepositorySpec {
        &self.repository_spec
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Requirements declared by the archived collection
    pub fn requirements(&self) -> Result<Vec<Requirement>, SpecError> {
        self.manifest.collection_info.requirements()
    }

    /// SHA-256 of the archive file (hex-encoded)
    pub fn sha256(&self) -> Result<String, ArchiveError> {
        let mut file = File::open(&self.path)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    }

    /// Unpack the whole archive into `dir`
    ///
    /// Returns the path of the unpacked top directory.
    pub fn extract_to(&self, dir: &Path) -> io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let mut archive = open_tar(&self.path, self.compression)?;
        archive.set_overwrite(true);
        archive.set_preserve_permissions(true);
        archive.unpack(dir)?;

        Ok(dir.join(&self.info.top_dir))
    }
}

/// Load and validate an archive without extracting it
///
/// Only a file that cannot be opened is reported as [`ArchiveError::IoError`]; a container that
/// cannot be read, or that breaks the layout convention, is [`ArchiveError::Format`].
///
/// # Example
/// ```no_run
/// # use galaxy_pm::load_archive;
/// let archive = load_archive("greetings_namespace-hello-11.11.11.tar.gz").unwrap();
/// assert_eq!(archive.info().archive_type.as_str(), "multi-content-artifact");
/// ```
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_archive(path: impl AsRef<Path>) -> Result<RepositoryArchive, ArchiveError> {
    let path = path.as_ref();
    let compression = detect_compression(path)?;
    let mut archive = open_tar(path, compression)?;

    // past open, a read failure means a broken container, not an IO fault
    let unreadable = |e: io::Error| ArchiveError::Format(format!("unreadable archive: {}", e));

    let mut top_dirs = BTreeSet::new();
    let mut manifest_bytes: Option<Vec<u8>> = None;

    for entry in archive.entries().map_err(unreadable)? {
        let mut entry = entry.map_err(unreadable)?;
        let entry_path = entry.path().map_err(unreadable)?.into_owned();
        let components = normal_components(&entry_path)?;

        let Some(top) = components.first() else {
            continue;
        };

        if components.len() == 1 && !entry.header().entry_type().is_dir() {
            return Err(ArchiveError::Format(format!(
                "top-level entry '{}' is not a directory",
                top
            )));
        }

        if components.len() == 2 && components[1] == MANIFEST_FILENAME {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).map_err(unreadable)?;
            manifest_bytes = Some(bytes);
        }

        top_dirs.insert(top.clone());
    }

    let top_dir = match top_dirs.len() {
        1 => top_dirs.into_iter().next().unwrap_or_default(),
        0 => return Err(ArchiveError::Format("archive is empty".to_string())),
        n => {
            return Err(ArchiveError::Format(format!(
                "expected exactly one top-level directory, found {}",
                n
            )))
        }
    };

    let repository_spec = parse_top_dir(&top_dir)?.with_source(SpecSource::LocalArchive {
        path: path.to_path_buf(),
    });

    let bytes = manifest_bytes.ok_or_else(|| {
        ArchiveError::Format(format!("no {} archive type marker found", MANIFEST_FILENAME))
    })?;
    let manifest: ArchiveManifest = serde_json::from_slice(&bytes).map_err(|e| {
        ArchiveError::Format(format!("unrecognized {} marker: {}", MANIFEST_FILENAME, e))
    })?;

    if manifest.collection_info.repository_spec()? != repository_spec {
        return Err(ArchiveError::Format(format!(
            "{} describes {} but top directory is '{}'",
            MANIFEST_FILENAME,
            manifest.collection_info.repository_spec()?,
            top_dir
        )));
    }

    tracing::debug!(
        top_dir = %top_dir,
        archive_type = %ArchiveType::MultiContentArtifact,
        "Loaded archive"
    );

    Ok(RepositoryArchive {
        info: ArchiveInfo {
            archive_type: ArchiveType::MultiContentArtifact,
            top_dir,
        },
        manifest,
        repository_spec,
        path: path.to_path_buf(),
        compression,
    })
}

/// Parse `{namespace}-{name}-{version}` into a spec
///
/// Namespace and name never contain hyphens; the version may (pre-releases).
pub fn parse_top_dir(top_dir: &str) -> Result<RepositorySpec, ArchiveError> {
    let bad = |reason: String| {
        ArchiveError::Format(format!(
            "top directory '{}' is not namespace-name-version: {}",
            top_dir, reason
        ))
    };

    let mut parts = top_dir.splitn(3, '-');
    let (Some(namespace), Some(name), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(bad("missing component".to_string()));
    };

    parse_version(version).map_err(|e| bad(e.to_string()))?;
    RepositorySpec::new(namespace, name, Some(version)).map_err(|e| bad(e.to_string()))
}

/// Path components of an entry, rejecting anything that could escape the extraction root
fn normal_components(path: &Path) -> Result<Vec<String>, ArchiveError> {
    let mut out = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    ArchiveError::Format(format!("non UTF-8 entry name: {}", path.display()))
                })?;
                out.push(part.to_string());
            }
            Component::CurDir => {}
            _ => {
                return Err(ArchiveError::Format(format!(
                    "entry '{}' escapes the archive root",
                    path.display()
                )))
            }
        }
    }

    Ok(out)
}

fn detect_compression(path: &Path) -> io::Result<Compression> {
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    let n = file.read(&mut magic)?;

    Ok(if n == 2 && magic == [0x1f, 0x8b] {
        Compression::Gzip
    } else {
        Compression::None
    })
}

fn open_tar(path: &Path, compression: Compression) -> io::Result<tar::Archive<Box<dyn Read>>> {
    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = match compression {
        Compression::Gzip => Box::new(GzDecoder::new(file)),
        Compression::None => Box::new(file),
    };
    Ok(tar::Archive::new(reader))
}
