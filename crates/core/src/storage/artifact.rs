use crate::domain::ranking::RankingSnapshot;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// A serving artifact written next to its target, waiting to be renamed into place.
#[derive(Debug)]
pub struct StagedArtifact {
    staged: PathBuf,
    target: PathBuf,
}

impl StagedArtifact {
    pub fn staged_path(&self) -> &Path {
        &self.staged
    }

    /// Atomically replaces the target with the staged file.
    pub async fn publish(self) -> anyhow::Result<PathBuf> {
        tokio::fs::rename(&self.staged, &self.target)
            .await
            .with_context(|| {
                format!(
                    "failed to publish {} -> {}",
                    self.staged.display(),
                    self.target.display()
                )
            })?;
        Ok(self.target)
    }

    pub async fn discard(self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(&self.staged).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to discard {}", self.staged.display())),
        }
    }
}

/// Serializes and validates the snapshot into a temporary sibling of `target`.
pub async fn stage_snapshot(
    target: &Path,
    snapshot: &RankingSnapshot,
) -> anyhow::Result<StagedArtifact> {
    snapshot
        .validate()
        .context("refusing to stage an invalid ranking snapshot")?;

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file_name = target
        .file_name()
        .with_context(|| format!("snapshot path has no file name: {}", target.display()))?;
    let mut staged_name = file_name.to_os_string();
    staged_name.push(".tmp");
    let staged = target.with_file_name(staged_name);

    let body = serde_json::to_vec_pretty(snapshot).context("serialize ranking snapshot failed")?;
    tokio::fs::write(&staged, body)
        .await
        .with_context(|| format!("failed to write {}", staged.display()))?;

    Ok(StagedArtifact {
        staged,
        target: target.to_path_buf(),
    })
}

pub async fn read_snapshot(path: &Path) -> anyhow::Result<RankingSnapshot> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let snapshot: RankingSnapshot = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not a valid ranking snapshot", path.display()))?;
    snapshot.validate()?;
    Ok(snapshot)
}
