//! `hotline check` command implementation

use std::path::Path;

use colored::Colorize;

use crate::error::CliError;

/// Execute the `hotline check` command
pub fn run(config_path: &Path) -> Result<(), CliError> {
    let config = super::load_config(config_path)?;

    println!("{} {} is valid", "✓".green(), config_path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);

    for source in &config.sources {
        if !source.exists() {
            println!("{} source {} does not exist yet", "!".yellow(), source.display());
        }
    }

    if config.build_command.is_none() {
        println!(
            "{} no build_command set; the artifact must be rebuilt externally",
            "!".yellow()
        );
    }

    Ok(())
}
