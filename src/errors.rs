/// Restack error types
#[derive(Debug, thiserror::Error)]
pub enum RestackError {
    /// Configuration errors (missing file, malformed TOML, unresolved remote names)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ordering invariant violations: an integrated feature after a pending one
    #[error("Feature '{feature}' is marked integrated but follows a pending feature")]
    OrderingViolation { feature: String },

    /// A feature carries a status outside the recognized set
    #[error("Feature '{feature}' has unknown status: '{status}'")]
    UnknownStatus { feature: String, status: String },

    /// A command was requested on a feature whose status does not allow it
    #[error("Cannot {operation} feature '{feature}' while its status is '{status}'")]
    InvalidTransition {
        operation: String,
        feature: String,
        status: String,
    },

    /// A gateway operation failed; carries the failing operation and git's message
    #[error("Git {operation} failed: {message}")]
    Vcs { operation: String, message: String },

    /// A replay stopped on unresolved conflicts
    #[error("Rebase of '{branch}' hit conflicts in: {paths}")]
    Conflict { branch: String, paths: String },

    /// check: a declared branch is absent from its remote, or the remote is unreachable
    #[error("Remote lookup failed for '{branch}' on '{remote}': {message}")]
    RemoteLookup {
        branch: String,
        remote: String,
        message: String,
    },

    /// Git-related errors without a gateway operation attached
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RestackError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        RestackError::Config(msg.into())
    }

    pub fn vcs<S: Into<String>>(operation: S, err: git2::Error) -> Self {
        RestackError::Vcs {
            operation: operation.into(),
            message: err.message().to_string(),
        }
    }

    /// Process exit code for this failure: config problems are reported as 2,
    /// everything that stopped a sync or a check as 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            RestackError::Config(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, RestackError>;
