//! SSH key material.
//!
//! The key pair lives next to the provider file under well-known names:
//! `<group>.pub` and `<group>.key`.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Public key to authorize on new nodes plus the private key to log in with.
#[derive(Clone)]
pub struct KeyPair {
    /// OpenSSH public key line
    pub public_key: String,
    /// Private key contents
    pub private_key: String,
    /// Where the private key was read from (passed to `ssh -i`)
    pub private_key_path: PathBuf,
}

impl KeyPair {
    /// File name of the public key for a group.
    pub fn public_key_filename(group: &str) -> String {
        format!("{group}.pub")
    }

    /// File name of the private key for a group.
    pub fn private_key_filename(group: &str) -> String {
        format!("{group}.key")
    }

    /// Load `<group>.pub` and `<group>.key` from `dir`.
    pub fn load(dir: &Path, group: &str) -> Result<Self> {
        let public_path = dir.join(Self::public_key_filename(group));
        let private_path = dir.join(Self::private_key_filename(group));

        let public_key = read_key(&public_path)?.trim().to_string();
        let private_key = read_key(&private_path)?;

        if public_key.is_empty() {
            return Err(Error::config(format!(
                "public key file {} is empty",
                public_path.display()
            )));
        }

        Ok(Self {
            public_key,
            private_key,
            private_key_path: private_path,
        })
    }
}

fn read_key(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| Error::KeyLoad {
        path: path.to_path_buf(),
        source,
    })
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("private_key_path", &self.private_key_path)
            .finish()
    }
}
