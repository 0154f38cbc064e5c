//! Operator key allow-list
//!
//! Only the operator is checked against this list; devices authenticate with
//! any key and are identified by the user name they claim.

use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use russh_keys::key::PublicKey;

use tether_core::config::BrokerConfig;

/// Public keys allowed to log in as the operator
#[derive(Debug, Default)]
pub struct OperatorKeys {
    fingerprints: HashSet<String>,
    keys: Vec<OperatorKey>,
}

/// An allowed operator key
#[derive(Debug, Clone)]
pub struct OperatorKey {
    pub fingerprint: String,
    /// Trailing comment of the key line, if any
    pub comment: Option<String>,
}

impl OperatorKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the keys named by the configuration: authorized_keys files
    /// first, then inline key lines.
    pub fn from_config(config: &BrokerConfig) -> Result<Self> {
        let mut store = Self::load_from_files(&config.operator_keys)?;
        for line in &config.operator_public_keys {
            if !store.add_line(line) {
                anyhow::bail!("Invalid operator public key: {}", line);
            }
        }
        Ok(store)
    }

    /// Load keys from authorized_keys files; missing files are skipped
    pub fn load_from_files(paths: &[impl AsRef<Path>]) -> Result<Self> {
        let mut store = Self::new();

        for path in paths {
            let path = path.as_ref();
            if path.exists() {
                store.load_from_file(path)?;
            } else {
                tracing::warn!("Operator keys file not found: {:?}", path);
            }
        }

        Ok(store)
    }

    /// Load keys from one authorized_keys file
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        let file =
            std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let reader = BufReader::new(file);
        let mut count = 0;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line
                .with_context(|| format!("Failed to read line {} of {:?}", line_num + 1, path))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if self.add_line(line) {
                count += 1;
            } else {
                tracing::warn!("Failed to parse key on line {} of {:?}", line_num + 1, path);
            }
        }

        tracing::info!("Loaded {} operator keys from {:?}", count, path);
        Ok(())
    }

    /// Add one key line, either bare base64 or `type base64 [comment]`.
    /// Returns false when the line holds no key.
    pub fn add_line(&mut self, line: &str) -> bool {
        let line = line.trim();
        let Some(key) = russh_keys::parse_public_key_base64(line)
            .ok()
            .or_else(|| parse_openssh_line(line))
        else {
            return false;
        };

        self.add_key(&key, extract_comment(line));
        true
    }

    pub fn add_key(&mut self, key: &PublicKey, comment: Option<String>) {
        let fingerprint = key.fingerprint();
        if self.fingerprints.insert(fingerprint.clone()) {
            self.keys.push(OperatorKey {
                fingerprint,
                comment,
            });
        }
    }

    pub fn is_authorized(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    pub fn list(&self) -> &[OperatorKey] {
        &self.keys
    }
}

/// Parse `type base64 [comment]`
fn parse_openssh_line(line: &str) -> Option<PublicKey> {
    let mut parts = line.split_whitespace();
    let _kind = parts.next()?;
    russh_keys::parse_public_key_base64(parts.next()?).ok()
}

fn extract_comment(line: &str) -> Option<String> {
    let parts: Vec<&str> = line.splitn(3, char::is_whitespace).collect();
    match parts.as_slice() {
        [_, _, comment] if !comment.trim().is_empty() => Some(comment.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_keys::key::KeyPair;
    use russh_keys::PublicKeyBase64;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn public_key() -> PublicKey {
        KeyPair::generate_ed25519()
            .unwrap()
            .clone_public_key()
            .unwrap()
    }

    #[test]
    fn test_load_operator_keys_file() {
        let key = public_key();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# operator laptop").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "ssh-ed25519 {} op@laptop", key.public_key_base64()).unwrap();
        writeln!(file, "ssh-ed25519 not-a-key").unwrap();

        let store = OperatorKeys::load_from_files(&[file.path()]).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.is_authorized(&key.fingerprint()));
        assert_eq!(store.list()[0].comment.as_deref(), Some("op@laptop"));
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let store = OperatorKeys::load_from_files(&["/nonexistent/tether/keys"]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_inline_keys_from_config() {
        let key = public_key();
        let config = BrokerConfig {
            operator_public_keys: vec![key.public_key_base64()],
            ..BrokerConfig::default()
        };

        let store = OperatorKeys::from_config(&config).unwrap();
        assert!(store.is_authorized(&key.fingerprint()));
        assert!(!store.is_authorized(&public_key().fingerprint()));
    }

    #[test]
    fn test_invalid_inline_key_is_an_error() {
        let config = BrokerConfig {
            operator_public_keys: vec!["ssh-ed25519 garbage".to_string()],
            ..BrokerConfig::default()
        };
        assert!(OperatorKeys::from_config(&config).is_err());
    }
}
