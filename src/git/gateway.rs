use crate::errors::Result;
use std::path::Path;

/// Capability contract the sync engine consumes from the version control
/// layer. All refs are plain revspecs: local branch names ("feature-auth")
/// or remote-tracking names ("origin/feature-auth").
///
/// The engine only ever talks to this trait, which keeps the walk testable
/// against an in-memory fake.
pub trait VcsGateway {
    /// Clone `url` into `dir`, checked out at `branch`, with the origin
    /// remote named `alias`.
    fn clone_at(&mut self, url: &str, dir: &Path, branch: &str, alias: &str) -> Result<()>;

    /// Register an additional remote.
    fn add_remote(&mut self, alias: &str, url: &str) -> Result<()>;

    /// Fetch a registered remote's heads into remote-tracking refs.
    fn fetch(&mut self, alias: &str) -> Result<()>;

    /// Create local branch `name` at `start` and check it out.
    fn checkout_new_branch(&mut self, name: &str, start: &str) -> Result<()>;

    /// Replay the commits of `exclude..branch` onto `onto`, leaving `branch`
    /// checked out at the rebased tip. Patches already present below `onto`
    /// are dropped; with `autosquash`, fixup!/squash! commits fold into the
    /// commit they mark. Fails with a conflict error when a patch does not
    /// apply cleanly.
    fn range_rebase(&mut self, branch: &str, exclude: &str, onto: &str, autosquash: bool)
        -> Result<()>;

    /// Point `branch` at `target`, resetting the working tree when `branch`
    /// is checked out.
    fn hard_reset(&mut self, branch: &str, target: &str) -> Result<()>;

    /// Create a branch pointer at the current tip without switching to it.
    fn copy_branch(&mut self, name: &str) -> Result<()>;

    /// Force-push a local branch to a registered remote.
    fn force_push(&mut self, alias: &str, branch: &str) -> Result<()>;

    /// Branch heads advertised by the repository at `url`. Needs no working
    /// copy; results are cacheable per URL.
    fn list_remote_branch_heads(&mut self, url: &str) -> Result<Vec<String>>;
}
