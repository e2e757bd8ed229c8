use crate::cli::output::Output;
use crate::config::StackConfig;
use crate::errors::Result;
use crate::git::GitWorkspace;
use crate::stack::RemoteStatusValidator;
use std::path::Path;

pub fn run(config_path: &Path) -> Result<()> {
    let config = StackConfig::load(config_path)?;
    let mut gateway = GitWorkspace::new();
    RemoteStatusValidator::new(&mut gateway).validate(&config)?;
    Output::success(format!(
        "{} feature(s) verified against their remotes",
        config.features.len()
    ));
    Ok(())
}
