use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// An OAuth token and its secret. Serialized with the remote's field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "oauth_token")]
    pub token: String,
    #[serde(rename = "oauth_token_secret")]
    pub secret: String,
}

impl TokenPair {
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }

    /// Parse a form-encoded token response
    /// (`oauth_token=...&oauth_token_secret=...&...`).
    #[must_use]
    pub fn from_form(body: &str) -> Option<Self> {
        let mut token = None;
        let mut secret = None;
        for pair in body.trim().split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(value).ok()?.into_owned();
            match key {
                "oauth_token" => token = Some(value),
                "oauth_token_secret" => secret = Some(value),
                _ => {}
            }
        }
        let pair = Self::new(token?, secret?);
        pair.is_usable().then_some(pair)
    }

    fn is_usable(&self) -> bool {
        !self.token.is_empty() && !self.secret.is_empty()
    }
}

/// File-backed storage for the access token pair.
///
/// Reads fail soft: anything other than a well-formed pair loads as `None`.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn load(&self) -> Option<TokenPair> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No token file");
                return None;
            }
        };
        if contents.trim().is_empty() {
            debug!(path = %self.path.display(), "Token file is empty");
            return None;
        }
        match serde_json::from_str::<TokenPair>(&contents) {
            Ok(pair) if pair.is_usable() => Some(pair),
            Ok(_) => {
                warn!(path = %self.path.display(), "Token file has blank fields, ignoring");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Token file is malformed, ignoring");
                None
            }
        }
    }

    /// Replace the stored pair. Writes a sibling temp file and renames it over
    /// the target so a concurrent `load` sees either the old or the new pair.
    pub fn save(&self, pair: &TokenPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::TokenStore(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(pair)?;
        let temp_path = self.path.with_extension("json.tmp");
        let write_temp = || -> std::io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
            }
            Ok(())
        };
        write_temp().map_err(|e| {
            Error::TokenStore(format!("failed to write {}: {e}", temp_path.display()))
        })?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            Error::TokenStore(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), "Saved access token");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::TokenStore(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}
