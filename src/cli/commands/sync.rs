use crate::cli::output::Output;
use crate::cli::RunArgs;
use crate::config::StackConfig;
use crate::errors::Result;
use crate::stack::commands;
use std::path::Path;

pub fn run(config_path: &Path, args: &RunArgs) -> Result<()> {
    let mut config = StackConfig::load(config_path)?;
    commands::sync(&mut config, &args.options())?;
    if args.local {
        Output::info("Local run, nothing was pushed");
    }
    Output::success("Stack synchronized");
    Ok(())
}
