use std::path::Path;

use git2::build::TreeUpdateBuilder;
use git2::{FileMode, Oid, Repository, Signature};

pub const BRANCH: &str = "main";

pub fn init_bare_repo(path: &Path) -> Result<(), String> {
    Repository::init_bare(path)
        .map_err(|err| format!("git init --bare failed for {path:?}: {err}"))?;
    Ok(())
}

pub fn init_repo(path: &Path) -> Result<Repository, String> {
    let repo =
        Repository::init(path).map_err(|err| format!("git init failed for {path:?}: {err}"))?;
    configure_test_repo(&repo)?;
    Ok(repo)
}

pub fn init_repo_with_origin(repo_dir: &Path, remote_dir: &Path) -> Result<(), String> {
    let repo = init_repo(repo_dir)?;
    add_origin_remote(&repo, remote_dir)?;
    Ok(())
}

/// Commit `content` at `path` straight onto the bare remote's branch, the
/// way another writer's push would land.
pub fn advance_remote(remote_dir: &Path, path: &str, content: &[u8]) -> Result<Oid, String> {
    let repo = Repository::open_bare(remote_dir)
        .map_err(|err| format!("open bare repo failed for {remote_dir:?}: {err}"))?;
    commit_file(&repo, path, content, "other writer")
}

/// Commit on the clone's local branch without pushing.
pub fn commit_local(repo_dir: &Path, path: &str, content: &[u8]) -> Result<Oid, String> {
    let repo = Repository::open(repo_dir)
        .map_err(|err| format!("open repo failed for {repo_dir:?}: {err}"))?;
    commit_file(&repo, path, content, "local edit")
}

pub fn branch_head(repo_dir: &Path) -> Option<Oid> {
    let repo = Repository::open(repo_dir).ok()?;
    repo.refname_to_id(&format!("refs/heads/{BRANCH}")).ok()
}

pub fn file_at_head(repo_dir: &Path, path: &str) -> Option<Vec<u8>> {
    let repo = Repository::open(repo_dir).ok()?;
    let head = repo.refname_to_id(&format!("refs/heads/{BRANCH}")).ok()?;
    let tree = repo.find_commit(head).ok()?.tree().ok()?;
    let entry = tree.get_path(Path::new(path)).ok()?;
    let blob = repo.find_blob(entry.id()).ok()?;
    Some(blob.content().to_vec())
}

fn commit_file(repo: &Repository, path: &str, content: &[u8], message: &str) -> Result<Oid, String> {
    let refname = format!("refs/heads/{BRANCH}");
    let parent = repo
        .refname_to_id(&refname)
        .ok()
        .map(|oid| repo.find_commit(oid))
        .transpose()
        .map_err(|err| format!("find parent failed: {err}"))?;
    let base = match &parent {
        Some(commit) => commit.tree().map_err(|err| format!("parent tree: {err}"))?,
        None => {
            let empty = repo
                .treebuilder(None)
                .and_then(|builder| builder.write())
                .map_err(|err| format!("empty tree: {err}"))?;
            repo.find_tree(empty).map_err(|err| format!("find tree: {err}"))?
        }
    };
    let blob = repo
        .blob(content)
        .map_err(|err| format!("write blob failed: {err}"))?;
    let mut update = TreeUpdateBuilder::new();
    update.upsert(path, blob, FileMode::Blob);
    let tree_id = update
        .create_updated(repo, &base)
        .map_err(|err| format!("update tree failed: {err}"))?;
    let tree = repo
        .find_tree(tree_id)
        .map_err(|err| format!("find tree failed: {err}"))?;
    let sig = Signature::now("Other", "other@test.com")
        .map_err(|err| format!("signature failed: {err}"))?;
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(Some(&refname), &sig, &sig, message, &tree, &parents)
        .map_err(|err| format!("commit failed: {err}"))
}

fn configure_test_repo(repo: &Repository) -> Result<(), String> {
    let mut cfg = repo
        .config()
        .map_err(|err| format!("open repo config failed: {err}"))?;
    cfg.set_str("user.name", "Test")
        .map_err(|err| format!("set user.name failed: {err}"))?;
    cfg.set_str("user.email", "test@test.com")
        .map_err(|err| format!("set user.email failed: {err}"))?;
    Ok(())
}

fn add_origin_remote(repo: &Repository, remote_dir: &Path) -> Result<(), String> {
    let remote = remote_dir
        .to_str()
        .ok_or_else(|| format!("remote dir path is not utf8: {remote_dir:?}"))?;
    repo.remote("origin", remote)
        .map_err(|err| format!("git remote add origin failed: {err}"))?;
    Ok(())
}
