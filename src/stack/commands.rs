use crate::config::{BranchRef, Feature, Operation, StackConfig, Status};
use crate::errors::{RestackError, Result};
use crate::git::GitWorkspace;
use crate::stack::engine::{SyncEngine, SyncOptions, SyncScope};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Flags shared by sync and every mutating command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Create timestamped backup branches before rewriting
    pub backup: bool,
    /// Keep the working directory after the run
    pub keep: bool,
    /// Suppress pushing; everything stays local
    pub local: bool,
    /// Working directory override; a fresh temp dir otherwise
    pub dir: Option<PathBuf>,
}

/// Full synchronization of the stack.
pub fn sync(config: &mut StackConfig, options: &RunOptions) -> Result<()> {
    run_scoped(config, options, SyncScope::Full)
}

/// Insert a new feature (default insertion point: the end of the sequence)
/// and replay the affected suffix.
pub fn insert(
    config: &mut StackConfig,
    options: &RunOptions,
    name: &str,
    remote: &str,
    after: Option<&str>,
) -> Result<()> {
    config.remote_url(remote)?;
    if config.position(name).is_some() {
        return Err(RestackError::config(format!(
            "Feature '{name}' is already part of the stack"
        )));
    }
    let index = match after {
        Some(anchor) => position(config, anchor)? + 1,
        None => config.features.len(),
    };
    config.features.insert(
        index,
        Feature {
            remote: remote.to_string(),
            name: name.to_string(),
            status: Status::Pending,
            pr: None,
            summary: None,
            integrating_from: None,
            op: Some(Operation::Add),
        },
    );
    let scope = suffix_scope(config, index);
    run_scoped(config, options, scope)
}

/// Tag a feature for removal; the engine deletes it during post-walk
/// compaction, after its commit set has become the new exclusion point.
pub fn remove(config: &mut StackConfig, options: &RunOptions, name: &str) -> Result<()> {
    let index = position(config, name)?;
    config.features[index].op = Some(Operation::Remove);
    let scope = suffix_scope(config, index);
    run_scoped(config, options, scope)
}

/// Replace a feature's content with another branch, then replay the suffix.
pub fn update(
    config: &mut StackConfig,
    options: &RunOptions,
    name: &str,
    from: BranchRef,
) -> Result<()> {
    config.remote_url(&from.remote)?;
    let index = position(config, name)?;
    let feature = &mut config.features[index];
    feature.integrating_from = Some(from);
    feature.op = Some(Operation::Update);
    let scope = suffix_scope(config, index);
    run_scoped(config, options, scope)
}

/// Mark a merging feature as folded into the base. Folding changes what
/// "already accounted for" means for everything downstream, including the
/// upstream/source reconciliation, so this always triggers a full sync.
pub fn fold_in(config: &mut StackConfig, options: &RunOptions, name: &str) -> Result<()> {
    let index = position(config, name)?;
    let feature = &mut config.features[index];
    if feature.status != Status::Merging {
        return Err(RestackError::InvalidTransition {
            operation: "integrate".to_string(),
            feature: feature.name.clone(),
            status: feature.status.to_string(),
        });
    }
    feature.op = Some(Operation::Fold);
    run_scoped(config, options, SyncScope::Full)
}

fn position(config: &StackConfig, name: &str) -> Result<usize> {
    config
        .position(name)
        .ok_or_else(|| RestackError::config(format!("Feature '{name}' is not part of the stack")))
}

/// Only the suffix starting at `index` needs replay. The anchor is the
/// feature right before it; an integrated predecessor is unusable (its
/// branch may be gone), so the run falls back to the base.
fn suffix_scope(config: &StackConfig, index: usize) -> SyncScope {
    let anchor = index
        .checked_sub(1)
        .filter(|p| config.features[*p].status != Status::Integrated);
    SyncScope::Suffix {
        start: index,
        anchor,
    }
}

fn run_scoped(config: &mut StackConfig, options: &RunOptions, scope: SyncScope) -> Result<()> {
    let workdir = match &options.dir {
        Some(dir) => dir.clone(),
        None => tempfile::Builder::new()
            .prefix("restack-")
            .tempdir()?
            .keep(),
    };
    let sync_options = SyncOptions {
        backup: options.backup,
        local: options.local,
        workdir: workdir.clone(),
    };
    let mut gateway = GitWorkspace::new();
    let result = SyncEngine::new(&mut gateway, &sync_options).sync(config, scope);
    if options.keep {
        debug!("Keeping working directory {}", workdir.display());
    } else if let Err(err) = fs::remove_dir_all(&workdir) {
        // the working copy is disposable either way
        debug!("Could not remove {}: {}", workdir.display(), err);
    }
    result
}
