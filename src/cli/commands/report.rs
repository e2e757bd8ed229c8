use crate::config::StackConfig;
use crate::errors::Result;
use crate::report;
use std::path::Path;

pub fn run(config_path: &Path) -> Result<()> {
    let config = StackConfig::load(config_path)?;
    print!("{}", report::render(&config)?);
    Ok(())
}
