use crate::cli::output::Output;
use crate::cli::RunArgs;
use crate::config::StackConfig;
use crate::errors::Result;
use crate::stack::commands;
use std::path::Path;

pub fn run(
    config_path: &Path,
    name: &str,
    remote: &str,
    after: Option<&str>,
    args: &RunArgs,
) -> Result<()> {
    let mut config = StackConfig::load(config_path)?;
    commands::insert(&mut config, &args.options(), name, remote, after)?;
    config.save(config_path)?;
    Output::success(format!("Added feature '{name}'"));
    Ok(())
}
