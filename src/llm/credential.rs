//! The opaque secret that authorizes calls to the inference endpoint.

use std::fmt;

use super::error::ChatError;

/// Environment variables checked for a credential, in priority order.
pub const CREDENTIAL_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "AZURE_KEY"];

/// A GitHub token or Azure key.
///
/// Held in memory only. `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Validates and wraps a secret.
    ///
    /// # Errors
    ///
    /// [`ChatError::Authentication`] if the secret is blank or contains
    /// characters that cannot travel in an HTTP header.
    pub fn new(secret: impl Into<String>) -> Result<Self, ChatError> {
        let secret = secret.into().trim().to_owned();
        if secret.is_empty() {
            return Err(ChatError::authentication(format!(
                "no credential provided; set {} or {}",
                CREDENTIAL_ENV_VARS[0], CREDENTIAL_ENV_VARS[1]
            )));
        }
        if secret.chars().any(|c| c.is_whitespace() || c.is_control() || !c.is_ascii()) {
            return Err(ChatError::authentication(
                "credential contains characters not allowed in an HTTP header",
            ));
        }
        Ok(Self(secret))
    }

    /// Reads the credential from the process environment.
    ///
    /// `GITHUB_TOKEN` wins over `AZURE_KEY`; empty values count as unset.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ChatError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let found = CREDENTIAL_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|value| !value.trim().is_empty())
            .unwrap_or_default();
        Self::new(found)
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> Result<Credential, ChatError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Credential::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn github_token_preferred() {
        let cred = lookup(&[("GITHUB_TOKEN", "gh"), ("AZURE_KEY", "az")]).unwrap();
        assert_eq!(cred.expose(), "gh");
    }

    #[test]
    fn empty_github_token_falls_back_to_azure_key() {
        let cred = lookup(&[("GITHUB_TOKEN", ""), ("AZURE_KEY", "az")]).unwrap();
        assert_eq!(cred.expose(), "az");
    }

    #[test]
    fn nothing_set_is_authentication_error() {
        let err = lookup(&[("GITHUB_TOKEN", ""), ("AZURE_KEY", "")]).unwrap_err();
        assert!(err.is_authentication());
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    fn header_unsafe_secret_rejected() {
        assert!(Credential::new("abc\ndef").unwrap_err().is_authentication());
        assert!(Credential::new("abc def").unwrap_err().is_authentication());
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(Credential::new("  tok  ").unwrap().expose(), "tok");
    }

    #[test]
    fn secret_never_formatted() {
        let cred = Credential::new("ghp_secret").unwrap();
        assert!(!format!("{cred:?}").contains("ghp_secret"));
        assert!(!cred.to_string().contains("ghp_secret"));
    }
}
