use ejector::config::{default_config_path, EjectorConfig};
use std::path::PathBuf;

/// Write a commented default configuration file
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn execute(config_path: Option<String>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(format!(
            "Config file already exists: {} (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    EjectorConfig::create_default(&config_path)?;

    println!("Created: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set [chain] and [data_api] endpoints");
    println!("  2. Provide the signing key via --private-key-file or EJECTOR_PRIVATE_KEY");
    println!("  3. Run: ejector validate-config --config {}", config_path.display());

    Ok(())
}
