use crate::errors::{RestackError, Result};
use crate::git::gateway::VcsGateway;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Repository, Signature, Sort};
use std::path::Path;
use tracing::{debug, info};

/// git2-backed working copy, the production implementation of the gateway.
///
/// A workspace starts empty; `clone_at` populates it. Listing remote branch
/// heads needs no working copy, so a freshly created workspace is enough for
/// validation runs.
pub struct GitWorkspace {
    repo: Option<Repository>,
}

impl GitWorkspace {
    pub fn new() -> Self {
        Self { repo: None }
    }

    fn repo(&self) -> Result<&Repository> {
        self.repo.as_ref().ok_or_else(|| RestackError::Vcs {
            operation: "workspace access".to_string(),
            message: "no working copy has been cloned yet".to_string(),
        })
    }

    /// Authentication for network remotes: ssh agent when the URL names a
    /// user, the configured credential helper otherwise. Local paths never
    /// invoke the callback.
    fn remote_callbacks<'a>() -> git2::RemoteCallbacks<'a> {
        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, _allowed_types| {
            if let Some(username) = username_from_url {
                git2::Cred::ssh_key_from_agent(username)
            } else {
                git2::Cred::default()
            }
        });
        callbacks
    }

    fn signature(repo: &Repository) -> Result<Signature<'static>> {
        if let Ok(config) = repo.config() {
            if let (Ok(name), Ok(email)) = (
                config.get_string("user.name"),
                config.get_string("user.email"),
            ) {
                return Signature::now(&name, &email).map_err(RestackError::Git);
            }
        }
        Signature::now("Restack", "restack@localhost").map_err(RestackError::Git)
    }

    fn checkout(repo: &Repository, name: &str) -> Result<()> {
        repo.set_head(&format!("refs/heads/{name}"))
            .map_err(|e| RestackError::vcs(format!("checkout of '{name}'"), e))?;
        let mut options = CheckoutBuilder::new();
        options.force();
        repo.checkout_head(Some(&mut options))
            .map_err(|e| RestackError::vcs(format!("checkout of '{name}'"), e))?;
        Ok(())
    }

    fn current_branch(repo: &Repository) -> Option<String> {
        repo.head().ok()?.shorthand().map(str::to_string)
    }
}

impl Default for GitWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Target summary a fixup!/squash! commit marks, if any
fn squash_target(summary: &str) -> Option<&str> {
    summary
        .strip_prefix("fixup! ")
        .or_else(|| summary.strip_prefix("squash! "))
}

fn conflict_error(branch: &str, index: &git2::Index) -> RestackError {
    let mut paths = Vec::new();
    if let Ok(conflicts) = index.conflicts() {
        for conflict in conflicts.flatten() {
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                paths.push(String::from_utf8_lossy(&entry.path).to_string());
            }
        }
    }
    RestackError::Conflict {
        branch: branch.to_string(),
        paths: paths.join(", "),
    }
}

impl VcsGateway for GitWorkspace {
    fn clone_at(&mut self, url: &str, dir: &Path, branch: &str, alias: &str) -> Result<()> {
        info!("Cloning {} at {} into {}", url, branch, dir.display());
        let alias = alias.to_string();
        let mut fetch = git2::FetchOptions::new();
        fetch.remote_callbacks(Self::remote_callbacks());
        let repo = RepoBuilder::new()
            .branch(branch)
            .fetch_options(fetch)
            .remote_create(move |repo, _name, url| repo.remote(&alias, url))
            .clone(url, dir)
            .map_err(|e| RestackError::vcs("clone", e))?;
        self.repo = Some(repo);
        Ok(())
    }

    fn add_remote(&mut self, alias: &str, url: &str) -> Result<()> {
        debug!("Adding remote {} at {}", alias, url);
        self.repo()?
            .remote(alias, url)
            .map_err(|e| RestackError::vcs(format!("remote add '{alias}'"), e))?;
        Ok(())
    }

    fn fetch(&mut self, alias: &str) -> Result<()> {
        debug!("Fetching remote {}", alias);
        let repo = self.repo()?;
        let mut remote = repo
            .find_remote(alias)
            .map_err(|e| RestackError::vcs(format!("fetch of '{alias}'"), e))?;
        let mut options = git2::FetchOptions::new();
        options.remote_callbacks(Self::remote_callbacks());
        remote
            .fetch(&[] as &[&str], Some(&mut options), None)
            .map_err(|e| RestackError::vcs(format!("fetch of '{alias}'"), e))?;
        Ok(())
    }

    fn checkout_new_branch(&mut self, name: &str, start: &str) -> Result<()> {
        debug!("Creating local branch {} from {}", name, start);
        let repo = self.repo()?;
        let vcs = |e: git2::Error| RestackError::vcs(format!("checkout of '{start}'"), e);
        let commit = repo
            .revparse_single(start)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(vcs)?;
        repo.branch(name, &commit, false)
            .map_err(|e| RestackError::vcs(format!("branch '{name}'"), e))?;
        Self::checkout(repo, name)
    }

    fn range_rebase(
        &mut self,
        branch: &str,
        exclude: &str,
        onto: &str,
        autosquash: bool,
    ) -> Result<()> {
        debug!("Rebasing {} onto {} excluding {}", branch, onto, exclude);
        let repo = self.repo()?;
        let vcs = |e: git2::Error| RestackError::vcs(format!("rebase of '{branch}'"), e);

        let head = repo
            .revparse_single(branch)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(vcs)?;
        let excluded = repo
            .revparse_single(exclude)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(vcs)?;
        let onto_commit = repo
            .revparse_single(onto)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(vcs)?;

        let mut walk = repo.revwalk().map_err(vcs)?;
        walk.push(head.id()).map_err(vcs)?;
        walk.hide(excluded.id()).map_err(vcs)?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE).map_err(vcs)?;

        // Replay the range commit by commit onto the new base. Picks are
        // merged in memory; the working tree only moves once at the end.
        let committer = Self::signature(repo)?;
        let mut tip = onto_commit;
        for oid in walk {
            let commit = repo.find_commit(oid.map_err(vcs)?).map_err(vcs)?;
            if commit.parent_count() > 1 {
                debug!("Skipping merge commit {}", commit.id());
                continue;
            }
            let summary = commit.summary().unwrap_or("").to_string();
            let fold = autosquash
                && squash_target(&summary).is_some_and(|target| tip.summary() == Some(target));

            let mut index = repo.cherrypick_commit(&commit, &tip, 0, None).map_err(vcs)?;
            if index.has_conflicts() {
                return Err(conflict_error(branch, &index));
            }
            let tree_id = index.write_tree_to(repo).map_err(vcs)?;
            if !fold && tree_id == tip.tree_id() {
                debug!("Skipping {}, already applied", commit.id());
                continue;
            }
            let tree = repo.find_tree(tree_id).map_err(vcs)?;
            let new_id = if fold {
                // fold into the commit the marker names, keeping its message
                let parents: Vec<git2::Commit> = tip.parents().collect();
                let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
                repo.commit(
                    None,
                    &tip.author(),
                    &committer,
                    tip.message().unwrap_or(""),
                    &tree,
                    &parent_refs,
                )
                .map_err(vcs)?
            } else {
                repo.commit(
                    None,
                    &commit.author(),
                    &committer,
                    commit.message().unwrap_or(""),
                    &tree,
                    &[&tip],
                )
                .map_err(vcs)?
            };
            tip = repo.find_commit(new_id).map_err(vcs)?;
        }

        repo.find_reference(&format!("refs/heads/{branch}"))
            .map_err(vcs)?
            .set_target(tip.id(), "restack: range rebase")
            .map_err(vcs)?;
        Self::checkout(repo, branch)
    }

    fn hard_reset(&mut self, branch: &str, target: &str) -> Result<()> {
        debug!("Resetting {} to {}", branch, target);
        let repo = self.repo()?;
        let vcs = |e: git2::Error| RestackError::vcs(format!("reset of '{branch}'"), e);
        let commit = repo
            .revparse_single(target)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(vcs)?;
        if Self::current_branch(repo).as_deref() == Some(branch) {
            repo.reset(commit.as_object(), git2::ResetType::Hard, None)
                .map_err(vcs)?;
        } else {
            repo.find_reference(&format!("refs/heads/{branch}"))
                .map_err(vcs)?
                .set_target(commit.id(), "restack: hard reset")
                .map_err(vcs)?;
        }
        Ok(())
    }

    fn copy_branch(&mut self, name: &str) -> Result<()> {
        debug!("Copying current tip into {}", name);
        let repo = self.repo()?;
        let vcs = |e: git2::Error| RestackError::vcs(format!("branch copy '{name}'"), e);
        let head = repo.head().and_then(|h| h.peel_to_commit()).map_err(vcs)?;
        repo.branch(name, &head, false).map_err(vcs)?;
        Ok(())
    }

    fn force_push(&mut self, alias: &str, branch: &str) -> Result<()> {
        info!("Force pushing {} to {}", branch, alias);
        let repo = self.repo()?;
        let vcs = |e: git2::Error| RestackError::vcs(format!("push of '{branch}'"), e);
        let mut remote = repo.find_remote(alias).map_err(vcs)?;
        let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");
        let mut options = git2::PushOptions::new();
        options.remote_callbacks(Self::remote_callbacks());
        remote.push(&[&refspec], Some(&mut options)).map_err(vcs)?;
        Ok(())
    }

    fn list_remote_branch_heads(&mut self, url: &str) -> Result<Vec<String>> {
        debug!("Listing branch heads at {}", url);
        let vcs = |e: git2::Error| RestackError::vcs(format!("head listing at '{url}'"), e);
        let mut remote = git2::Remote::create_detached(url).map_err(vcs)?;
        let connection = remote
            .connect_auth(git2::Direction::Fetch, Some(Self::remote_callbacks()), None)
            .map_err(vcs)?;
        let heads = connection
            .list()
            .map_err(vcs)?
            .iter()
            .filter_map(|head| head.name().strip_prefix("refs/heads/"))
            .map(str::to_string)
            .collect();
        Ok(heads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Oid;
    use tempfile::TempDir;

    /// Append a commit touching one file to a branch of a bare repository,
    /// creating the branch when it does not exist yet.
    fn seed_commit(
        repo: &Repository,
        branch: &str,
        parent: Option<Oid>,
        file: &str,
        content: &str,
        message: &str,
    ) -> Oid {
        let blob = repo.blob(content.as_bytes()).unwrap();
        let parent_commit = parent.map(|p| repo.find_commit(p).unwrap());
        let base_tree = parent_commit.as_ref().map(|c| c.tree().unwrap());
        let mut builder = repo.treebuilder(base_tree.as_ref()).unwrap();
        builder.insert(file, blob, 0o100644).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let signature = Signature::now("Fixture", "fixture@example.com").unwrap();
        let parents: Vec<&git2::Commit> = parent_commit.iter().collect();
        repo.commit(
            Some(&format!("refs/heads/{branch}")),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )
        .unwrap()
    }

    /// Bare "remote" with main = base one, base two and feature branched off
    /// the first commit with two commits of its own.
    fn remote_fixture() -> (TempDir, String) {
        let dir = TempDir::new().unwrap();
        let bare = Repository::init_bare(dir.path().join("remote.git")).unwrap();
        let m1 = seed_commit(&bare, "main", None, "base.txt", "one", "base one");
        seed_commit(&bare, "main", Some(m1), "base.txt", "two", "base two");
        let f1 = seed_commit(&bare, "feature", Some(m1), "feat.txt", "alpha", "feat one");
        seed_commit(&bare, "feature", Some(f1), "feat.txt", "beta", "feat two");
        bare.set_head("refs/heads/main").unwrap();
        let url = dir.path().join("remote.git").to_str().unwrap().to_string();
        (dir, url)
    }

    fn cloned(url: &str) -> (TempDir, GitWorkspace) {
        let work = TempDir::new().unwrap();
        let mut workspace = GitWorkspace::new();
        workspace
            .clone_at(url, work.path(), "main", "origin")
            .unwrap();
        (work, workspace)
    }

    fn summaries_oldest_first(repo: &Repository, rev: &str) -> Vec<String> {
        let tip = repo.revparse_single(rev).unwrap().peel_to_commit().unwrap();
        let mut walk = repo.revwalk().unwrap();
        walk.push(tip.id()).unwrap();
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE).unwrap();
        walk.map(|oid| {
            repo.find_commit(oid.unwrap())
                .unwrap()
                .summary()
                .unwrap()
                .to_string()
        })
        .collect()
    }

    #[test]
    fn test_clone_and_checkout_new_branch() {
        let (_remote, url) = remote_fixture();
        let (work, mut workspace) = cloned(&url);
        workspace
            .checkout_new_branch("feature", "origin/feature")
            .unwrap();

        let repo = Repository::open(work.path()).unwrap();
        assert_eq!(repo.head().unwrap().shorthand(), Some("feature"));
        assert!(work.path().join("feat.txt").exists());
    }

    #[test]
    fn test_range_rebase_replays_unique_commits_in_order() {
        let (_remote, url) = remote_fixture();
        let (work, mut workspace) = cloned(&url);
        workspace
            .checkout_new_branch("feature", "origin/feature")
            .unwrap();
        workspace
            .range_rebase("feature", "origin/main", "origin/main", true)
            .unwrap();

        let repo = Repository::open(work.path()).unwrap();
        assert_eq!(
            summaries_oldest_first(&repo, "feature"),
            vec!["base one", "base two", "feat one", "feat two"]
        );
        // the rebased checkout carries both the new base and the feature work
        assert!(work.path().join("base.txt").exists());
        assert!(work.path().join("feat.txt").exists());
    }

    #[test]
    fn test_range_rebase_folds_fixup_commits() {
        let dir = TempDir::new().unwrap();
        let bare = Repository::init_bare(dir.path().join("remote.git")).unwrap();
        let m1 = seed_commit(&bare, "main", None, "base.txt", "one", "base one");
        let f1 = seed_commit(&bare, "feature", Some(m1), "feat.txt", "draft", "feat one");
        seed_commit(
            &bare,
            "feature",
            Some(f1),
            "feat.txt",
            "final",
            "fixup! feat one",
        );
        bare.set_head("refs/heads/main").unwrap();
        let url = dir.path().join("remote.git").to_str().unwrap().to_string();

        let (work, mut workspace) = cloned(&url);
        workspace
            .checkout_new_branch("feature", "origin/feature")
            .unwrap();
        workspace
            .range_rebase("feature", "origin/main", "origin/main", true)
            .unwrap();

        let repo = Repository::open(work.path()).unwrap();
        assert_eq!(
            summaries_oldest_first(&repo, "feature"),
            vec!["base one", "feat one"]
        );
        assert_eq!(std::fs::read_to_string(work.path().join("feat.txt")).unwrap(), "final");
    }

    #[test]
    fn test_range_rebase_drops_already_applied_patches() {
        let dir = TempDir::new().unwrap();
        let bare = Repository::init_bare(dir.path().join("remote.git")).unwrap();
        let m1 = seed_commit(&bare, "main", None, "base.txt", "one", "base one");
        // the same change lands on main and at the bottom of feature
        seed_commit(&bare, "main", Some(m1), "shared.txt", "same", "shared change");
        let f1 = seed_commit(&bare, "feature", Some(m1), "shared.txt", "same", "shared change");
        seed_commit(&bare, "feature", Some(f1), "feat.txt", "alpha", "feat one");
        bare.set_head("refs/heads/main").unwrap();
        let url = dir.path().join("remote.git").to_str().unwrap().to_string();

        let (work, mut workspace) = cloned(&url);
        workspace
            .checkout_new_branch("feature", "origin/feature")
            .unwrap();
        workspace
            .range_rebase("feature", "origin/main", "origin/main", true)
            .unwrap();

        let repo = Repository::open(work.path()).unwrap();
        assert_eq!(
            summaries_oldest_first(&repo, "feature"),
            vec!["base one", "shared change", "feat one"]
        );
    }

    #[test]
    fn test_range_rebase_reports_conflicts() {
        let dir = TempDir::new().unwrap();
        let bare = Repository::init_bare(dir.path().join("remote.git")).unwrap();
        let m1 = seed_commit(&bare, "main", None, "base.txt", "one", "base one");
        seed_commit(&bare, "main", Some(m1), "base.txt", "theirs", "base two");
        seed_commit(&bare, "feature", Some(m1), "base.txt", "ours", "feat one");
        bare.set_head("refs/heads/main").unwrap();
        let url = dir.path().join("remote.git").to_str().unwrap().to_string();

        let (_work, mut workspace) = cloned(&url);
        workspace
            .checkout_new_branch("feature", "origin/feature")
            .unwrap();
        let err = workspace
            .range_rebase("feature", "origin/main", "origin/main", true)
            .unwrap_err();
        match err {
            RestackError::Conflict { branch, paths } => {
                assert_eq!(branch, "feature");
                assert!(paths.contains("base.txt"));
            }
            other => panic!("expected a conflict, got {other}"),
        }
    }

    #[test]
    fn test_hard_reset_and_copy_branch() {
        let (_remote, url) = remote_fixture();
        let (work, mut workspace) = cloned(&url);
        workspace
            .checkout_new_branch("feature", "origin/feature")
            .unwrap();
        workspace.copy_branch("feature-backup").unwrap();
        workspace.hard_reset("feature", "origin/main").unwrap();

        let repo = Repository::open(work.path()).unwrap();
        let feature = repo.revparse_single("feature").unwrap().id();
        let main = repo.revparse_single("origin/main").unwrap().id();
        let backup = repo.revparse_single("feature-backup").unwrap().id();
        let old_feature = repo.revparse_single("origin/feature").unwrap().id();
        assert_eq!(feature, main);
        assert_eq!(backup, old_feature);
        // reset of the checked-out branch also moves the working tree
        assert!(!work.path().join("feat.txt").exists());
    }

    #[test]
    fn test_force_push_updates_the_remote() {
        let (remote_dir, url) = remote_fixture();
        let (_work, mut workspace) = cloned(&url);
        workspace
            .checkout_new_branch("feature", "origin/feature")
            .unwrap();
        workspace.hard_reset("feature", "origin/main").unwrap();
        workspace.force_push("origin", "feature").unwrap();

        let bare = Repository::open(remote_dir.path().join("remote.git")).unwrap();
        let pushed = bare.revparse_single("feature").unwrap().id();
        let main = bare.revparse_single("main").unwrap().id();
        assert_eq!(pushed, main);
    }

    #[test]
    fn test_list_remote_branch_heads() {
        let (_remote, url) = remote_fixture();
        let mut workspace = GitWorkspace::new();
        let mut heads = workspace.list_remote_branch_heads(&url).unwrap();
        heads.sort();
        assert_eq!(heads, vec!["feature", "main"]);
    }

    #[test]
    fn test_operations_before_clone_fail_cleanly() {
        let mut workspace = GitWorkspace::new();
        assert!(workspace.fetch("origin").is_err());
        assert!(workspace.copy_branch("backup").is_err());
    }
}
