//! Artifact builder
//!
//! Packs a collection source tree into `{namespace}-{name}-{version}.tar.gz`.

use super::manifest::{ArchiveManifest, CollectionInfo, MANIFEST_FILENAME};
use super::ArchiveError;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{Builder, Header};
use tracing::instrument;

/// Collection description file at the root of a source tree
pub const COLLECTION_INFO_FILENAME: &str = "galaxy.toml";

/// Result of a build
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Path of the written artifact
    pub artifact_file_path: PathBuf,

    pub collection_info: CollectionInfo,
}

/// Build an artifact from `source_dir` into `output_dir`
///
/// Hidden entries (`.git`, editor files) and `output_dir` itself are skipped. The artifact is
/// written to a temporary file and renamed into place, so a failed build never leaves a
/// truncated artifact behind.
#[instrument(skip_all, fields(source = %source_dir.display(), output = %output_dir.display()))]
pub fn build_artifact(source_dir: &Path, output_dir: &Path) -> Result<BuildResult, ArchiveError> {
    let collection_info = CollectionInfo::from_file(&source_dir.join(COLLECTION_INFO_FILENAME))?;
    let top_dir = collection_info.top_dir();

    fs::create_dir_all(output_dir)?;
    let artifact_file_path = output_dir.join(collection_info.artifact_file_name());

    // output_dir may live inside source_dir
    let skip = fs::canonicalize(output_dir).ok();

    let tmp = tempfile::NamedTempFile::new_in(output_dir)?;
    let encoder = GzEncoder::new(tmp.reopen()?, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    builder.append_dir(&top_dir, source_dir)?;
    append_tree(&mut builder, source_dir, Path::new(&top_dir), skip.as_deref())?;

    let manifest = serde_json::to_vec_pretty(&ArchiveManifest::new(collection_info.clone()))?;
    let mut header = Header::new_gnu();
    header.set_path(format!("{}/{}", top_dir, MANIFEST_FILENAME))?;
    header.set_size(manifest.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append(&header, manifest.as_slice())?;

    let mut file = builder.into_inner()?.finish()?;
    file.flush()?;
    file.sync_all()?;

    tmp.persist(&artifact_file_path).map_err(|e| e.error)?;

    tracing::info!(artifact = %artifact_file_path.display(), "Built artifact");

    Ok(BuildResult {
        artifact_file_path,
        collection_info,
    })
}

fn append_tree<W: Write>(
    builder: &mut Builder<W>,
    dir: &Path,
    archive_dir: &Path,
    skip: Option<&Path>,
) -> Result<(), ArchiveError> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with('.') {
            continue;
        }

        let path = entry.path();
        let archive_path = archive_dir.join(&name);
        let file_type = entry.file_type()?;

        if archive_dir.components().count() == 1 && name_str == MANIFEST_FILENAME {
            tracing::warn!(path = %path.display(), "Ignoring source MANIFEST.json; it is generated");
            continue;
        }

        if file_type.is_dir() {
            if skip.is_some() && fs::canonicalize(&path).ok().as_deref() == skip {
                continue;
            }
            builder.append_dir(&archive_path, &path)?;
            append_tree(builder, &path, &archive_path, skip)?;
        } else {
            builder.append_path_with_name(&path, &archive_path)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_source(root: &Path) {
        fs::create_dir_all(root.join("roles/greeting/tasks")).unwrap();
        fs::write(
            root.join(COLLECTION_INFO_FILENAME),
            "namespace = \"some_namespace\"\nname = \"hello\"\nversion = \"1.2.3\"\n",
        )
        .unwrap();
        fs::write(root.join("roles/greeting/tasks/main.yml"), "- debug: msg=hi\n").unwrap();
        fs::write(root.join(".hidden"), "skip me").unwrap();
    }

    #[test]
    fn test_build_names_artifact_after_identity() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        write_source(&source);

        let result = build_artifact(&source, &temp.path().join("out")).unwrap();
        assert!(result.artifact_file_path.exists());
        assert_eq!(
            result.artifact_file_path.file_name().unwrap(),
            "some_namespace-hello-1.2.3.tar.gz"
        );
    }

    #[test]
    fn test_build_skips_output_inside_source() {
        let temp = TempDir::new().unwrap();
        write_source(temp.path());
        let out = temp.path().join("releases");

        // second build must not pack the first artifact
        build_artifact(temp.path(), &out).unwrap();
        let result = build_artifact(temp.path(), &out).unwrap();

        let file = fs::File::open(&result.artifact_file_path).unwrap();
        let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
        let paths: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();

        assert!(paths.iter().all(|p| !p.contains("releases")));
        assert!(paths.iter().all(|p| !p.contains(".hidden")));
        assert!(paths.contains(&"some_namespace-hello-1.2.3/MANIFEST.json".to_string()));
        assert!(paths
            .contains(&"some_namespace-hello-1.2.3/roles/greeting/tasks/main.yml".to_string()));
    }

    #[test]
    fn test_build_requires_collection_info() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            build_artifact(temp.path(), &temp.path().join("out")),
            Err(ArchiveError::IoError(_))
        ));
    }
}
