use crate::errors::{RestackError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// A named push/fetch endpoint declared in the stack file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

/// One branch on one declared remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub remote: String,
    pub branch: String,
}

impl BranchRef {
    pub fn new<R: Into<String>, B: Into<String>>(remote: R, branch: B) -> Self {
        Self {
            remote: remote.into(),
            branch: branch.into(),
        }
    }

    /// Remote-tracking name of this branch inside a working copy, e.g. "origin/feature-auth"
    pub fn tracking_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    /// Parse "remote/branch" as given on the command line
    pub fn parse(spec: &str) -> Result<Self> {
        match spec.split_once('/') {
            Some((remote, branch)) if !remote.is_empty() && !branch.is_empty() => {
                Ok(Self::new(remote, branch))
            }
            _ => Err(RestackError::config(format!(
                "Expected a remote/branch reference, got '{spec}'"
            ))),
        }
    }
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.remote, self.branch)
    }
}

/// Persisted feature status.
///
/// Loading is permissive: an unrecognized string survives as `Other` so the
/// failure can be attributed to the feature that carries it instead of the
/// whole file. The sync engine and the validator both reject `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    /// Not yet submitted upstream, kept in sync with the rest of the stack
    Pending,
    /// Under review upstream, still kept in sync
    Merging,
    /// Already part of the base; nothing left to replay
    Integrated,
    /// Anything the recognized set does not cover
    Other(String),
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => Status::Pending,
            "merging" => Status::Merging,
            "integrated" => Status::Integrated,
            _ => Status::Other(s),
        }
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        status.to_string()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Merging => write!(f, "merging"),
            Status::Integrated => write!(f, "integrated"),
            Status::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Command-scoped operation tag, consumed exactly once by the sync engine.
///
/// Tags never reach storage: `Add` resolves to `Pending`, `Fold` to
/// `Integrated`, `Update` to `Pending` with content replaced, and `Remove`
/// deletes the feature during post-walk compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Remove,
    Update,
    Fold,
}

/// One logical change, mapped 1:1 to a branch on one remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub remote: String,
    pub name: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrating_from: Option<BranchRef>,
    #[serde(skip)]
    pub op: Option<Operation>,
}

impl Feature {
    /// Remote-tracking name of this feature's branch, e.g. "origin/feature-auth"
    pub fn tracking_ref(&self) -> String {
        format!("{}/{}", self.remote, self.name)
    }
}

/// The whole stack file: remotes, the three anchor branches, and the
/// ordered feature sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub remotes: Vec<Remote>,
    pub source: BranchRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<BranchRef>,
    pub target: BranchRef,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl StackConfig {
    /// Load a stack file, failing on anything malformed or any branch
    /// reference that names an undeclared remote.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RestackError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse stack-file content; used directly by tests.
    pub fn parse(content: &str) -> Result<Self> {
        let config: StackConfig = toml::from_str(content)
            .map_err(|e| RestackError::config(format!("Failed to parse stack file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the stack file back. Transient operation tags are not
    /// serializable, so only the persisted statuses ever land on disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RestackError::config(format!("Failed to serialize stack file: {e}")))?;
        fs::write(path, content).map_err(|e| {
            RestackError::config(format!("Failed to write {}: {e}", path.display()))
        })?;
        Ok(())
    }

    /// Every branch reference must resolve into the declared remotes, and
    /// remote names must be unique.
    pub fn validate(&self) -> Result<()> {
        for (i, remote) in self.remotes.iter().enumerate() {
            if self.remotes[..i].iter().any(|r| r.name == remote.name) {
                return Err(RestackError::config(format!(
                    "Remote '{}' is declared more than once",
                    remote.name
                )));
            }
        }

        self.check_remote(&self.source.remote, "source")?;
        self.check_remote(&self.target.remote, "target")?;
        if let Some(upstream) = &self.upstream {
            self.check_remote(&upstream.remote, "upstream")?;
        }
        for feature in &self.features {
            self.check_remote(&feature.remote, &feature.name)?;
            if let Some(from) = &feature.integrating_from {
                self.check_remote(&from.remote, &feature.name)?;
            }
        }
        Ok(())
    }

    fn check_remote(&self, name: &str, referrer: &str) -> Result<()> {
        if self.remotes.iter().any(|r| r.name == name) {
            Ok(())
        } else {
            Err(RestackError::config(format!(
                "'{referrer}' references undeclared remote '{name}'"
            )))
        }
    }

    /// URL of a declared remote
    pub fn remote_url(&self, name: &str) -> Result<&str> {
        self.remotes
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.url.as_str())
            .ok_or_else(|| RestackError::config(format!("Unknown remote '{name}'")))
    }

    /// The branch full syncs start from: upstream when configured, source otherwise
    pub fn base(&self) -> &BranchRef {
        self.upstream.as_ref().unwrap_or(&self.source)
    }

    /// Position of a feature by name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }
}
