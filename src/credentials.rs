use log::debug;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use zeroize::Zeroize;

use crate::error::ChatError;

/// The key in the secrets file that holds the API key.
pub const API_KEY_FIELD: &str = "OPENAI_API_KEY";

/// An API key that never shows its value in logs or debug output.
pub struct Credential {
    inner: String,
}

impl Credential {
    /// The raw key, only for building the authorization header.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([REDACTED])")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED API KEY]")
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

/// Reads the secrets file at `path` and pulls out the API key.
///
/// The whole file is read regardless of size. It must be a JSON object with a
/// non-empty string under `OPENAI_API_KEY`; anything else fails the run.
pub fn load_credential(path: &Path) -> Result<Credential, ChatError> {
    debug!("Reading credentials from {}", path.display());

    let contents = fs::read_to_string(path).map_err(|e| {
        let reason = if e.kind() == io::ErrorKind::NotFound {
            "file does not exist".to_string()
        } else {
            format!("could not read file: {}", e)
        };
        ChatError::CredentialMissing {
            path: path.to_path_buf(),
            reason,
        }
    })?;

    let mut json: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| ChatError::CredentialParse {
            path: path.to_path_buf(),
            message: e.to_string(),
            line: e.line(),
            column: e.column(),
        })?;

    let missing = |reason: &str| ChatError::CredentialMissing {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let key = match json.get_mut(API_KEY_FIELD).map(serde_json::Value::take) {
        Some(serde_json::Value::String(key)) => key,
        Some(_) => return Err(missing("OPENAI_API_KEY is not a string")),
        None => return Err(missing("OPENAI_API_KEY is not set")),
    };

    let credential = Credential { inner: key };
    if credential.is_empty() {
        return Err(missing("OPENAI_API_KEY is empty"));
    }
    debug!("Loaded API key ({} bytes)", credential.len());
    Ok(credential)
}
