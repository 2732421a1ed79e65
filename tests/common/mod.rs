#![allow(dead_code)]

use color_eyre::eyre::Result;
use git2::Repository;
use gutterline::host::{BufferId, MemoryHost, Publication};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Tests driving the git binary skip themselves when it is missing.
pub fn git_available() -> bool {
    let available = which::which("git").is_ok();
    if !available {
        eprintln!("git not found on PATH, skipping");
    }
    available
}

pub fn create_test_repo() -> Result<(TempDir, Repository, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let repo_path = fs::canonicalize(temp_dir.path())?;

    let repo = Repository::init(&repo_path)?;

    let mut config = repo.config()?;
    config.set_str("user.name", "Test User")?;
    config.set_str("user.email", "test@example.com")?;

    Ok((temp_dir, repo, repo_path))
}

pub fn create_commit(
    repo: &Repository,
    repo_path: &Path,
    filename: &str,
    content: &str,
    message: &str,
) -> Result<git2::Oid> {
    let file_path = repo_path.join(filename);
    fs::write(&file_path, content)?;

    let mut index = repo.index()?;
    index.add_path(Path::new(filename))?;
    index.write()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let signature = git2::Signature::now("Test User", "test@example.com")?;

    let parent_commit = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent_commit.iter().collect();

    let oid = repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        message,
        &tree,
        &parents,
    )?;
    Ok(oid)
}

/// Wait until `buffer` has been published more than `seen` times.
pub async fn wait_for_publish(host: &MemoryHost, buffer: BufferId, seen: usize) -> Publication {
    let mut updates = host.subscribe();
    let wait = async {
        loop {
            if host.publish_count(buffer) > seen
                && let Some(publication) = host.last_publication(buffer)
            {
                return publication;
            }
            updates.changed().await.unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(30), wait)
        .await
        .expect("no publication within 30s")
}
