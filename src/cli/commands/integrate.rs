use crate::cli::output::Output;
use crate::cli::RunArgs;
use crate::config::StackConfig;
use crate::errors::Result;
use crate::stack::commands;
use std::path::Path;

pub fn run(config_path: &Path, name: &str, args: &RunArgs) -> Result<()> {
    let mut config = StackConfig::load(config_path)?;
    commands::fold_in(&mut config, &args.options(), name)?;
    config.save(config_path)?;
    Output::success(format!("Integrated feature '{name}'"));
    Ok(())
}
