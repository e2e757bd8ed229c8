#![allow(dead_code)]

use git2::{Oid, Repository, Signature, Sort};
use restack_cli::cli::RunArgs;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A bare "remote" repository seeded with a small stack, plus room for
/// working copies and the stack file:
///
/// ```text
/// main:        Initial commit -> Second commit
/// feature-one: main + Add feature one
/// feature-two: feature-one + Add feature two -> Polish feature two
/// ```
pub struct StackFixture {
    pub root: TempDir,
    pub url: String,
    pub config_path: PathBuf,
    pub main_tip: Oid,
    pub feature_one_tip: Oid,
    pub feature_two_tip: Oid,
}

impl StackFixture {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let remote_path = root.path().join("remote.git");
        let bare = Repository::init_bare(&remote_path).unwrap();

        let m1 = seed_commit(&bare, "main", None, "base.txt", "v1", "Initial commit");
        let m2 = seed_commit(&bare, "main", Some(m1), "notes.txt", "notes", "Second commit");
        let f1 = seed_commit(
            &bare,
            "feature-one",
            Some(m2),
            "one.txt",
            "alpha",
            "Add feature one",
        );
        let f2a = seed_commit(
            &bare,
            "feature-two",
            Some(f1),
            "two.txt",
            "beta",
            "Add feature two",
        );
        let f2b = seed_commit(
            &bare,
            "feature-two",
            Some(f2a),
            "two.txt",
            "beta polished",
            "Polish feature two",
        );
        bare.set_head("refs/heads/main").unwrap();

        let url = remote_path.to_str().unwrap().to_string();
        let config_path = root.path().join("stack.toml");
        Self {
            root,
            url,
            config_path,
            main_tip: m2,
            feature_one_tip: f1,
            feature_two_tip: f2b,
        }
    }

    pub fn bare(&self) -> Repository {
        Repository::open(self.root.path().join("remote.git")).unwrap()
    }

    /// Append a commit to a branch of the remote, creating the branch when needed.
    pub fn seed(
        &self,
        branch: &str,
        parent: Option<Oid>,
        file: &str,
        content: &str,
        message: &str,
    ) -> Oid {
        seed_commit(&self.bare(), branch, parent, file, content, message)
    }

    /// Write the stack file with the given `[[features]]` blocks.
    pub fn write_config(&self, features: &str) {
        let content = format!(
            r#"[[remotes]]
name = "origin"
url = "{url}"

[source]
remote = "origin"
branch = "main"

[target]
remote = "origin"
branch = "integration"

{features}"#,
            url = self.url,
            features = features
        );
        fs::write(&self.config_path, content).unwrap();
    }

    /// A fresh working directory for one invocation.
    pub fn workdir(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    pub fn run_args(&self, workdir: &str) -> RunArgs {
        RunArgs {
            backup: false,
            keep: true,
            local: false,
            dir: Some(self.workdir(workdir)),
        }
    }

    /// Commit summaries of a branch on the remote, newest first.
    pub fn summaries(&self, branch: &str) -> Vec<String> {
        summaries(&self.bare(), branch)
    }

    pub fn tree_id(&self, branch: &str) -> Oid {
        self.bare()
            .revparse_single(branch)
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .tree_id()
    }

    pub fn blob(&self, branch: &str, file: &str) -> String {
        let bare = self.bare();
        let tree = bare
            .revparse_single(branch)
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .tree()
            .unwrap();
        let entry = tree.get_name(file).unwrap();
        let blob = bare.find_blob(entry.id()).unwrap();
        String::from_utf8(blob.content().to_vec()).unwrap()
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        self.bare().revparse_single(branch).is_ok()
    }
}

pub fn feature_block(name: &str, status: &str) -> String {
    format!("[[features]]\nremote = \"origin\"\nname = \"{name}\"\nstatus = \"{status}\"\n\n")
}

/// Commit summaries reachable from `rev`, newest first.
pub fn summaries(repo: &Repository, rev: &str) -> Vec<String> {
    let tip = repo.revparse_single(rev).unwrap().peel_to_commit().unwrap();
    let mut walk = repo.revwalk().unwrap();
    walk.push(tip.id()).unwrap();
    walk.set_sorting(Sort::TOPOLOGICAL).unwrap();
    walk.map(|oid| {
        repo.find_commit(oid.unwrap())
            .unwrap()
            .summary()
            .unwrap()
            .to_string()
    })
    .collect()
}

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
