//! Broker host identity

use std::path::Path;

use russh_keys::key::KeyPair;

use tether_core::error::ConfigError;

/// Load the host key, or generate an Ed25519 key and persist it when the
/// file does not exist yet. A file that exists but cannot be parsed is an
/// error.
pub fn load_or_generate_host_key(path: &Path) -> Result<KeyPair, ConfigError> {
    let host_key_error = |message: String| ConfigError::HostKey {
        path: path.to_path_buf(),
        message,
    };

    if path.exists() {
        tracing::info!("Loading host key from {:?}", path);
        return russh_keys::load_secret_key(path, None).map_err(|e| host_key_error(e.to_string()));
    }

    tracing::info!("Generating new host key at {:?}", path);
    let key = KeyPair::generate_ed25519()
        .ok_or_else(|| host_key_error("Failed to generate Ed25519 key".to_string()))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| host_key_error(format!("Failed to create directory: {}", e)))?;
    }
    let file = std::fs::File::create(path).map_err(|e| host_key_error(e.to_string()))?;
    restrict_permissions(&file).map_err(|e| host_key_error(e.to_string()))?;
    russh_keys::encode_pkcs8_pem(&key, file).map_err(|e| host_key_error(e.to_string()))?;

    Ok(key)
}

#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}
