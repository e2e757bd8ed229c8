use crate::config::{Feature, Operation, StackConfig, Status};
use crate::errors::{RestackError, Result};
use crate::git::VcsGateway;
use crate::stack::queue::PushQueue;
use chrono::Local;
use std::path::PathBuf;
use tracing::{debug, info};

/// Settings for one engine invocation
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Snapshot branches into timestamped backups before rewriting them
    pub backup: bool,
    /// Suppress pushing; everything stays in the working copy
    pub local: bool,
    /// Where the disposable working copy lives
    pub workdir: PathBuf,
}

/// Which part of the feature sequence a run replays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    /// Every feature, starting from the configured base
    Full,
    /// The suffix beginning at `start`. `anchor` is the index of the feature
    /// immediately preceding the suffix; `None` falls back to the base, used
    /// when nothing precedes the suffix or the preceding feature is already
    /// integrated (its branch may no longer exist, but everything integrated
    /// is reachable from the base anyway).
    Suffix { start: usize, anchor: Option<usize> },
}

/// Loop state threaded explicitly through the walk
#[derive(Debug, Clone)]
struct Accumulator {
    /// Most recent ref whose commits are already accounted for, excluded
    /// from the next replay range. Always pre-rebase remote-tracking state.
    boundary: String,
    /// Ref the next replay lands on: the local rebased branch once one
    /// exists, a remote-tracking ref before that.
    active: String,
    /// True once any non-terminal feature has been processed
    frontier: bool,
}

/// Walks the feature sequence in order, replaying each branch's unique
/// commits onto the previous active branch, and mirrors the result onto the
/// target branch. Pushes are staged in a queue and flushed only after the
/// whole walk has succeeded; the engine never persists the config.
pub struct SyncEngine<'a, G: VcsGateway> {
    gateway: &'a mut G,
    options: &'a SyncOptions,
    queue: PushQueue,
}

impl<'a, G: VcsGateway> SyncEngine<'a, G> {
    pub fn new(gateway: &'a mut G, options: &'a SyncOptions) -> Self {
        Self {
            gateway,
            options,
            queue: PushQueue::new(),
        }
    }

    /// Run one synchronization pass over `scope`.
    pub fn sync(&mut self, config: &mut StackConfig, scope: SyncScope) -> Result<()> {
        self.prepare(config)?;
        let (start, mut acc, from_base) = self.initial_state(config, scope);
        for feature in config.features[start..].iter_mut() {
            acc = self.step(feature, acc)?;
        }
        config.features.retain(|f| f.op != Some(Operation::Remove));
        self.mirror_target(config, start)?;
        if from_base {
            self.reconcile_source(config)?;
        }
        self.flush()
    }

    /// Clone the source and wire up every other declared remote.
    fn prepare(&mut self, config: &StackConfig) -> Result<()> {
        info!("Work directory at {}", self.options.workdir.display());
        let source_url = config.remote_url(&config.source.remote)?.to_string();
        self.gateway.clone_at(
            &source_url,
            &self.options.workdir,
            &config.source.branch,
            &config.source.remote,
        )?;
        for remote in &config.remotes {
            if remote.url == source_url {
                continue;
            }
            self.gateway.add_remote(&remote.name, &remote.url)?;
            self.gateway.fetch(&remote.name)?;
        }
        Ok(())
    }

    fn initial_state(
        &self,
        config: &StackConfig,
        scope: SyncScope,
    ) -> (usize, Accumulator, bool) {
        match scope {
            SyncScope::Full => (0, Self::anchored_at(config.base().tracking_ref(), false), true),
            SyncScope::Suffix {
                start,
                anchor: Some(index),
            } => (
                start,
                Self::anchored_at(config.features[index].tracking_ref(), true),
                false,
            ),
            SyncScope::Suffix {
                start,
                anchor: None,
            } => (start, Self::anchored_at(config.base().tracking_ref(), false), true),
        }
    }

    fn anchored_at(tracking_ref: String, frontier: bool) -> Accumulator {
        Accumulator {
            boundary: tracking_ref.clone(),
            active: tracking_ref,
            frontier,
        }
    }

    /// Dispatch one feature and return the re-threaded accumulator.
    fn step(&mut self, feature: &mut Feature, acc: Accumulator) -> Result<Accumulator> {
        info!(
            "Syncing feature {} with previous active {}",
            feature.name, acc.active
        );
        self.gateway
            .checkout_new_branch(&feature.name, &feature.tracking_ref())?;

        match feature.op {
            Some(Operation::Fold) => {
                // The exact commits that went upstream are unknown, but the
                // next feature must only replay what is unique to itself, so
                // this branch's old tip becomes the exclusion point.
                debug!("Feature {} folded into the base", feature.name);
                feature.op = None;
                feature.status = Status::Integrated;
                Ok(Accumulator {
                    boundary: feature.tracking_ref(),
                    ..acc
                })
            }
            Some(Operation::Remove) => {
                // No replay; the dropped branch's commit set still becomes
                // the exclusion point so the next feature's range treats it
                // as already seen. The tag survives until post-walk
                // compaction deletes the feature.
                debug!("Feature {} marked for removal", feature.name);
                Ok(Accumulator {
                    boundary: feature.tracking_ref(),
                    ..acc
                })
            }
            Some(Operation::Add) => {
                self.replay(feature, &acc, true)?;
                feature.op = None;
                feature.status = Status::Pending;
                // The insertion is a graft, not a point on the original
                // timeline: the next feature's range must still exclude the
                // pre-insertion boundary.
                Ok(Accumulator {
                    active: feature.name.clone(),
                    ..acc
                })
            }
            Some(Operation::Update) => {
                let from = feature.integrating_from.clone().ok_or_else(|| {
                    RestackError::config(format!(
                        "Feature '{}' is updating without a source branch",
                        feature.name
                    ))
                })?;
                debug!("Replacing content of {} with {}", feature.name, from);
                if self.options.backup {
                    self.backup_current(&feature.name, &feature.remote)?;
                }
                self.gateway.hard_reset(&feature.name, &from.tracking_ref())?;
                self.replay(feature, &acc, false)?;
                feature.op = None;
                feature.status = Status::Pending;
                Ok(Accumulator {
                    boundary: feature.tracking_ref(),
                    active: feature.name.clone(),
                    frontier: true,
                })
            }
            None => match &feature.status {
                Status::Integrated => {
                    if acc.frontier {
                        return Err(RestackError::OrderingViolation {
                            feature: feature.name.clone(),
                        });
                    }
                    debug!("Feature {} already integrated, nothing to do", feature.name);
                    Ok(acc)
                }
                Status::Merging | Status::Pending => {
                    self.replay(feature, &acc, true)?;
                    Ok(Accumulator {
                        boundary: feature.tracking_ref(),
                        active: feature.name.clone(),
                        frontier: true,
                    })
                }
                Status::Other(status) => Err(RestackError::UnknownStatus {
                    feature: feature.name.clone(),
                    status: status.clone(),
                }),
            },
        }
    }

    /// Replay the feature's unique commits onto the active branch and stage
    /// the result for push.
    fn replay(&mut self, feature: &Feature, acc: &Accumulator, backup: bool) -> Result<()> {
        debug!(
            "Rebasing {} onto {} until {}",
            feature.name, acc.active, acc.boundary
        );
        if backup && self.options.backup {
            self.backup_current(&feature.name, &feature.remote)?;
        }
        self.gateway
            .range_rebase(&feature.name, &acc.boundary, &acc.active, true)?;
        self.queue.stage(&feature.name, &feature.remote);
        Ok(())
    }

    fn backup_current(&mut self, branch: &str, remote: &str) -> Result<()> {
        let backup = backup_name(branch);
        debug!("Backing up {} into {}", branch, backup);
        self.gateway.copy_branch(&backup)?;
        self.queue.stage(&backup, remote);
        Ok(())
    }

    /// Make the target branch mirror the top of the stack.
    fn mirror_target(&mut self, config: &StackConfig, start: usize) -> Result<()> {
        let Some(last) = config.features.last() else {
            info!("Stack is empty, leaving {} untouched", config.target.branch);
            return Ok(());
        };
        if last.status == Status::Integrated {
            info!("All features already integrated, nothing to do");
            return Ok(());
        }
        let old_tip = last.tracking_ref();
        // The last feature only has a rebased local branch when this run's
        // suffix reached it; otherwise its remote tip is already current.
        let new_tip = if config.features.len() > start {
            last.name.clone()
        } else {
            old_tip.clone()
        };
        info!(
            "Making target branch {} based on {}",
            config.target.branch, new_tip
        );
        self.gateway
            .checkout_new_branch(&config.target.branch, &old_tip)?;
        if self.options.backup {
            self.backup_current(&config.target.branch, &config.target.remote)?;
        }
        self.gateway.hard_reset(&config.target.branch, &new_tip)?;
        self.queue
            .stage(&config.target.branch, &config.target.remote);
        Ok(())
    }

    /// When the run started from a distinct upstream, copy its content onto
    /// the source branch so source stays caught up.
    fn reconcile_source(&mut self, config: &StackConfig) -> Result<()> {
        let Some(upstream) = &config.upstream else {
            return Ok(());
        };
        if *upstream == config.source {
            return Ok(());
        }
        // the clone already owns a local branch named after the source
        let local = if upstream.branch == config.source.branch {
            format!("{}-upstream", upstream.branch)
        } else {
            upstream.branch.clone()
        };
        info!("Catching {} up to {}", config.source, upstream);
        self.gateway
            .checkout_new_branch(&local, &upstream.tracking_ref())?;
        self.gateway.hard_reset(&config.source.branch, &local)?;
        self.queue
            .stage(&config.source.branch, &config.source.remote);
        Ok(())
    }

    /// Push everything staged, oldest first, unless running locally.
    fn flush(&mut self) -> Result<()> {
        if self.options.local {
            debug!("Local run, discarding {} staged pushes", self.queue.len());
            self.queue.clear();
            return Ok(());
        }
        for entry in self.queue.drain() {
            self.gateway.force_push(&entry.remote, &entry.branch)?;
        }
        Ok(())
    }
}

/// Timestamped name for a backup branch, e.g. "feature-auth-2024-06-01"
pub fn backup_name(branch: &str) -> String {
    format!("{}-{}", branch, Local::now().format("%Y-%m-%d"))
}
