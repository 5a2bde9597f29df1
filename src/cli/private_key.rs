use ejector::config::{EjectorConfig, PrivateKey};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the signing key.
pub const PRIVATE_KEY_ENV: &str = "EJECTOR_PRIVATE_KEY";

/// Where the signing key comes from, checked in order
#[derive(Debug, PartialEq, Eq)]
pub enum PrivateKeySource {
    /// From --private-key-file /path/to/key (container-native)
    File(PathBuf),
    /// From EJECTOR_PRIVATE_KEY env var
    EnvVar,
    /// From `[chain].private_key` in the config file (fallback, warned as insecure)
    Config,
}

/// Determine private key source from CLI arguments
///
/// 1. If private_key_file is Some, use File
/// 2. If EJECTOR_PRIVATE_KEY is set, use EnvVar
/// 3. Otherwise, use whatever the config file holds
pub fn determine_private_key_source(
    private_key_file: Option<PathBuf>,
    env_value: Option<&str>,
) -> PrivateKeySource {
    if let Some(file) = private_key_file {
        PrivateKeySource::File(file)
    } else if env_value.is_some() {
        PrivateKeySource::EnvVar
    } else {
        PrivateKeySource::Config
    }
}

/// Read the key from `source`.
///
/// Returns `Ok(None)` only for [`PrivateKeySource::Config`] when the config
/// file has no key.
pub fn read_private_key(
    source: &PrivateKeySource,
    env_value: Option<String>,
    configured: Option<PrivateKey>,
) -> Result<Option<PrivateKey>, Box<dyn std::error::Error>> {
    match source {
        PrivateKeySource::File(path) => read_key_file(path).map(Some),
        PrivateKeySource::EnvVar => {
            let key = env_value.ok_or_else(|| format!("{} env var not set", PRIVATE_KEY_ENV))?;
            let key = PrivateKey::new(key.trim().to_string());
            if key.is_empty() {
                return Err(format!("{} is empty", PRIVATE_KEY_ENV).into());
            }
            Ok(Some(key))
        }
        PrivateKeySource::Config => {
            if configured.is_some() {
                tracing::warn!(
                    "private key read from the config file; prefer --private-key-file or {}",
                    PRIVATE_KEY_ENV
                );
            }
            Ok(configured)
        }
    }
}

/// Replace `config.chain.private_key` with the key from the highest-priority
/// source.
pub fn apply_private_key_override(
    config: &mut EjectorConfig,
    private_key_file: Option<PathBuf>,
    env_value: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = determine_private_key_source(private_key_file, env_value.as_deref());
    let configured = config.chain.private_key.take();
    config.chain.private_key = read_private_key(&source, env_value, configured)?;
    Ok(())
}

fn read_key_file(path: &Path) -> Result<PrivateKey, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Private key file not found: {}", path.display()).into());
    }

    let raw = zeroize::Zeroizing::new(
        fs::read_to_string(path).map_err(|e| format!("Failed to read private key file: {}", e))?,
    );
    let key = PrivateKey::new(raw.trim().to_string());

    if key.is_empty() {
        return Err("Private key file is empty".into());
    }

    Ok(key)
}
