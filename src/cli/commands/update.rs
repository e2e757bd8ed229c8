use crate::cli::output::Output;
use crate::cli::RunArgs;
use crate::config::{BranchRef, StackConfig};
use crate::errors::Result;
use crate::stack::commands;
use std::path::Path;

pub fn run(config_path: &Path, name: &str, from: &str, args: &RunArgs) -> Result<()> {
    let from = BranchRef::parse(from)?;
    let mut config = StackConfig::load(config_path)?;
    commands::update(&mut config, &args.options(), name, from)?;
    config.save(config_path)?;
    Output::success(format!("Updated feature '{name}'"));
    Ok(())
}
