//! Config command handler.

use anyhow::Result;
use citemerge::config::CitemergeConfig;

/// Config command.
pub fn cmd_config(config: &CitemergeConfig, show: bool) -> Result<()> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    } else {
        println!("Use --show to display configuration");
    }
    Ok(())
}
