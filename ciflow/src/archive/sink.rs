//! Artifact sink trait and the filesystem implementation.

use super::{ArchivedArtifacts, ArtifactArchiveRequest, GlobPattern};
use crate::errors::ArchiveError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Destination for archived build artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Archives every file under `workspace` matching the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid, copying fails, or nothing
    /// matched and the request does not allow empty archives.
    async fn archive(
        &self,
        request: &ArtifactArchiveRequest,
        workspace: &Path,
    ) -> Result<ArchivedArtifacts, ArchiveError>;
}

/// Copies matching files into a destination directory, preserving their
/// paths relative to the workspace.
#[derive(Debug, Clone)]
pub struct FileSystemArchiveSink {
    destination: PathBuf,
}

impl FileSystemArchiveSink {
    /// Creates a sink writing into `destination`.
    #[must_use]
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    /// Returns the destination directory.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

#[async_trait]
impl ArtifactSink for FileSystemArchiveSink {
    async fn archive(
        &self,
        request: &ArtifactArchiveRequest,
        workspace: &Path,
    ) -> Result<ArchivedArtifacts, ArchiveError> {
        let glob = GlobPattern::new(&request.glob_pattern)?;
        let workspace = workspace.to_path_buf();
        let destination = self.destination.clone();
        let allow_empty = request.allow_empty;

        let files = tokio::task::spawn_blocking(move || {
            copy_matching(&glob, &workspace, &destination)
        })
        .await
        .map_err(|e| ArchiveError::Io {
            path: self.destination.clone(),
            source: std::io::Error::other(e.to_string()),
        })??;

        if files.is_empty() && !allow_empty {
            return Err(ArchiveError::NoMatches {
                pattern: request.glob_pattern.clone(),
            });
        }

        debug!(
            pattern = %request.glob_pattern,
            count = files.len(),
            "Archived artifacts"
        );

        Ok(ArchivedArtifacts {
            pattern: request.glob_pattern.clone(),
            files,
        })
    }
}

fn canonical(path: &Path) -> Result<PathBuf, ArchiveError> {
    path.canonicalize().map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn copy_matching(
    glob: &GlobPattern,
    workspace: &Path,
    destination: &Path,
) -> Result<Vec<PathBuf>, ArchiveError> {
    std::fs::create_dir_all(destination).map_err(|source| ArchiveError::Io {
        path: destination.to_path_buf(),
        source,
    })?;
    // Compare canonical paths so `./archive` and `archive` are the same directory.
    let workspace = canonical(workspace)?;
    let destination = canonical(destination)?;
    if destination == workspace {
        return Err(ArchiveError::Io {
            path: destination,
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "archive destination is the workspace itself",
            ),
        });
    }
    let nested = destination.starts_with(&workspace);
    let mut copied = Vec::new();

    let walker = WalkDir::new(&workspace)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(nested && entry.path().starts_with(&destination)));

    for entry in walker {
        let entry = entry.map_err(|e| ArchiveError::Io {
            path: e.path().map_or_else(|| workspace.clone(), Path::to_path_buf),
            source: e.into_io_error().unwrap_or_else(|| std::io::Error::other("walk error")),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(&workspace) else {
            continue;
        };
        let relative_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !glob.matches(&relative_str) {
            continue;
        }

        let target = destination.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ArchiveError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::copy(entry.path(), &target).map_err(|source| ArchiveError::Io {
            path: entry.path().to_path_buf(),
            source,
        })?;

        copied.push(relative.to_path_buf());
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_archives_matching_files_preserving_layout() {
        let workspace = tempfile::tempdir().unwrap();
        let archive_dir = tempfile::tempdir().unwrap();
        write(workspace.path(), "test-results/unit/a.xml", "<a/>");
        write(workspace.path(), "test-results/b.xml", "<b/>");
        write(workspace.path(), "src/main.rs", "fn main() {}");

        let sink = FileSystemArchiveSink::new(archive_dir.path());
        let request = ArtifactArchiveRequest::new("test-results/**/*.xml");
        let archived = sink.archive(&request, workspace.path()).await.unwrap();

        assert_eq!(archived.files.len(), 2);
        assert!(archive_dir.path().join("test-results/unit/a.xml").exists());
        assert!(archive_dir.path().join("test-results/b.xml").exists());
        assert!(!archive_dir.path().join("src/main.rs").exists());
    }

    #[tokio::test]
    async fn test_no_matches_is_error_unless_allowed() {
        let workspace = tempfile::tempdir().unwrap();
        let archive_dir = tempfile::tempdir().unwrap();
        let sink = FileSystemArchiveSink::new(archive_dir.path());

        let strict = ArtifactArchiveRequest::new("dist/**");
        let err = sink.archive(&strict, workspace.path()).await.unwrap_err();
        assert!(matches!(err, ArchiveError::NoMatches { .. }));

        let lenient = ArtifactArchiveRequest::new("dist/**").allow_empty();
        let archived = sink.archive(&lenient, workspace.path()).await.unwrap();
        assert!(archived.files.is_empty());
    }

    #[tokio::test]
    async fn test_destination_inside_workspace_is_not_rearchived() {
        let workspace = tempfile::tempdir().unwrap();
        write(workspace.path(), "report.json", "{}");
        let destination = workspace.path().join("archive");
        write(&destination, "report.json", "old");

        let sink = FileSystemArchiveSink::new(&destination);
        let archived = sink
            .archive(&ArtifactArchiveRequest::new("**/*.json"), workspace.path())
            .await
            .unwrap();

        assert_eq!(archived.files, vec![PathBuf::from("report.json")]);
        assert_eq!(fs::read_to_string(destination.join("report.json")).unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_differently_spelled_destination_is_skipped_on_rerun() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("other")).unwrap();
        write(&root.path().join("ws"), "r.json", "{}");
        let workspace = root.path().join("other/../ws");
        let sink = FileSystemArchiveSink::new(root.path().join("ws/archive"));
        let request = ArtifactArchiveRequest::new("**/*.json");

        let first = sink.archive(&request, &workspace).await.unwrap();
        let second = sink.archive(&request, &workspace).await.unwrap();

        assert_eq!(first.files, vec![PathBuf::from("r.json")]);
        assert_eq!(second.files, vec![PathBuf::from("r.json")]);
        assert!(!root.path().join("ws/archive/archive").exists());
    }

    #[tokio::test]
    async fn test_destination_equal_to_workspace_is_rejected() {
        let workspace = tempfile::tempdir().unwrap();
        write(workspace.path(), "r.json", "{}");
        let sink = FileSystemArchiveSink::new(workspace.path().join("."));

        let err = sink
            .archive(&ArtifactArchiveRequest::new("*.json"), workspace.path())
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::Io { .. }));
        assert_eq!(fs::read_to_string(workspace.path().join("r.json")).unwrap(), "{}");
    }
}
