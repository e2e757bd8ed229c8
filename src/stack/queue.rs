use tracing::debug;

/// One branch staged for force-push to one remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEntry {
    pub branch: String,
    pub remote: String,
}

/// Accumulates branches to force-push once the whole walk has succeeded.
///
/// Entries are only ever flushed after the last feature has been replayed,
/// so an aborted walk leaves every remote untouched.
#[derive(Debug, Default)]
pub struct PushQueue {
    entries: Vec<PushEntry>,
}

impl PushQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a branch for force-push, preserving staging order.
    pub fn stage(&mut self, branch: &str, remote: &str) {
        debug!("Staging {} for push to {}", branch, remote);
        self.entries.push(PushEntry {
            branch: branch.to_string(),
            remote: remote.to_string(),
        });
    }

    /// Take every staged entry, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<PushEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PushEntry] {
        &self.entries
    }
}
