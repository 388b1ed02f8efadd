//! Database credential resolution.
//!
//! Credentials are resolved once, up front, from an ordered list of sources;
//! nothing below the CLI reads the environment or the secrets directory.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::constants::{DB_PASSWORD_ENV, DB_PASSWORD_FILE, DB_USER_ENV, DB_USER_FILE};

/// Where a credential may come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Explicit `--user` / `--password` flags.
    CommandLine {
        user: Option<String>,
        password: Option<String>,
    },
    /// `db_user.txt` and `db_password.txt` inside the given directory.
    SecretFiles(PathBuf),
    /// `DB_USER` and `DB_PASSWORD`.
    Environment,
}

/// Resolved user and password; either may be absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DbCredentials {
    pub user: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

fn read_secret(path: &Path) -> Option<String> {
    let value = fs::read_to_string(path).ok()?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    debug!("Read credential from {}", path.display());
    Some(value.to_string())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl DbCredentials {
    /// Takes the user and the password independently from the first source
    /// that provides each.
    pub fn resolve(sources: &[CredentialSource]) -> Self {
        let mut resolved = DbCredentials::default();
        for source in sources {
            let (user, password) = match source {
                CredentialSource::CommandLine { user, password } => (user.clone(), password.clone()),
                CredentialSource::SecretFiles(dir) => (
                    read_secret(&dir.join(DB_USER_FILE)),
                    read_secret(&dir.join(DB_PASSWORD_FILE)),
                ),
                CredentialSource::Environment => (read_env(DB_USER_ENV), read_env(DB_PASSWORD_ENV)),
            };
            resolved.user = resolved.user.or(user);
            resolved.password = resolved.password.or(password);
            if resolved.user.is_some() && resolved.password.is_some() {
                break;
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_wins_over_secret_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DB_USER_FILE), "file_user\n").unwrap();
        fs::write(dir.path().join(DB_PASSWORD_FILE), "file_pass\n").unwrap();

        let creds = DbCredentials::resolve(&[
            CredentialSource::CommandLine {
                user: Some("cli_user".to_string()),
                password: None,
            },
            CredentialSource::SecretFiles(dir.path().to_path_buf()),
        ]);
        assert_eq!(creds.user.as_deref(), Some("cli_user"));
        assert_eq!(creds.password.as_deref(), Some("file_pass"));
    }

    #[test]
    fn test_blank_and_missing_secret_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DB_USER_FILE), "   \n").unwrap();

        let creds = DbCredentials::resolve(&[
            CredentialSource::SecretFiles(dir.path().to_path_buf()),
            CredentialSource::CommandLine {
                user: Some("fallback".to_string()),
                password: Some("pw".to_string()),
            },
        ]);
        assert_eq!(creds.user.as_deref(), Some("fallback"));
        assert_eq!(creds.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = DbCredentials {
            user: Some("reader".to_string()),
            password: Some("hunter2".to_string()),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("reader"));
        assert!(!rendered.contains("hunter2"));
    }
}
