pub mod commands;
pub mod engine;
pub mod queue;
pub mod validator;

pub use commands::RunOptions;
pub use engine::{SyncEngine, SyncOptions, SyncScope};
pub use queue::{PushEntry, PushQueue};
pub use validator::RemoteStatusValidator;
