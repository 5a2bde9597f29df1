use super::logging;
use super::private_key::{apply_private_key_override, PRIVATE_KEY_ENV};
use ejector::config::{default_config_path, EjectorConfig};
use std::path::PathBuf;

/// Load and validate a configuration file
///
/// The private key is resolved exactly as a running ejector would resolve it
/// (`--private-key-file`, then `EJECTOR_PRIVATE_KEY`, then the config file).
pub fn execute(
    config_path: Option<String>,
    private_key_file: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    let config = load_validated(
        &config_path,
        private_key_file.map(PathBuf::from),
        std::env::var(PRIVATE_KEY_ENV).ok(),
    )?;

    let policy = &config.ejector;
    println!("✅ {} is valid", config_path.display());
    println!();
    println!("Ejection period:       {}", humantime::format_duration(policy.ejection_period));
    println!(
        "Criteria window:       {}",
        humantime::format_duration(policy.ejection_criteria_time_window)
    );
    println!(
        "Finalization delay:    {}",
        humantime::format_duration(policy.ejection_finalization_delay)
    );
    println!(
        "Retry delay:           {}",
        humantime::format_duration(policy.ejection_retry_delay)
    );
    println!(
        "Throttle:              {} of stake per {}",
        policy.ejection_rate_limit,
        humantime::format_duration(policy.ejection_throttle_time_period)
    );
    println!(
        "Blacklist after:       {} cancelled ejections",
        policy.max_consecutive_failed_ejection_attempts
    );
    if policy.quorums.is_empty() {
        println!("Quorums:               all");
    } else {
        println!("Quorums:               {:?}", policy.quorums);
    }
    println!("Do not eject:          {} validators", policy.do_not_eject.len());

    Ok(())
}

/// Load `config_path`, apply private key overrides, and validate.
pub fn load_validated(
    config_path: &std::path::Path,
    private_key_file: Option<PathBuf>,
    env_private_key: Option<String>,
) -> Result<EjectorConfig, Box<dyn std::error::Error>> {
    let mut config = EjectorConfig::load(config_path)?;
    logging::init(&config.logging.level);

    apply_private_key_override(&mut config, private_key_file, env_private_key)?;
    config.validate()?;

    tracing::debug!(config = %config_path.display(), "configuration validated");
    Ok(config)
}
