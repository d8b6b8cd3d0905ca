//! Environment constants and path utilities.
//!
//! This module centralizes the environment variable names and well-known
//! paths the crate consults, making the lookup order auditable in one place.

use std::path::PathBuf;

/// AWS environment variable names consulted by credential resolution.
pub mod aws {
    /// Access key id environment variable.
    pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";

    /// Secret access key environment variable.
    pub const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";

    /// Session token environment variable (temporary credentials).
    pub const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

    /// Profile override environment variable.
    pub const DEFAULT_PROFILE_VAR: &str = "AWS_DEFAULT_PROFILE";

    /// Profile used when no override is set.
    pub const DEFAULT_PROFILE: &str = "default";

    /// Credentials file location relative to the home directory.
    pub const CREDENTIALS_FILE_REL: &str = ".aws/credentials";
}

/// Extra PATH entries prepended when spawning Node-based CLI agents.
///
/// Hosts launched from a desktop environment (Finder on macOS in
/// particular) may carry a minimal PATH in which `#!/usr/bin/env node`
/// shebangs fail to resolve.
pub const CLI_PATH_EXTRAS: &[&str] = &["/usr/local/bin", "/opt/homebrew/bin"];

/// Extra PATH entries relative to the home directory.
pub const CLI_PATH_HOME_EXTRAS: &[&str] = &[".nvm/current/bin", ".local/bin"];

/// Resolve the current user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok())
        .map(PathBuf::from)
}

/// Build the AWS shared credentials file path from a home directory.
pub fn aws_credentials_file_path(home: &std::path::Path) -> PathBuf {
    home.join(aws::CREDENTIALS_FILE_REL)
}

/// Build an extended PATH value for CLI agent subprocesses.
///
/// Entries already present in `current` are not duplicated.
pub fn extended_cli_path(current: &str, home: Option<&std::path::Path>) -> String {
    let existing: Vec<&str> = current.split(':').filter(|e| !e.is_empty()).collect();
    let mut path = current.to_string();
    let mut extras: Vec<String> = CLI_PATH_EXTRAS.iter().map(|s| s.to_string()).collect();
    if let Some(home) = home {
        for rel in CLI_PATH_HOME_EXTRAS {
            extras.push(home.join(rel).to_string_lossy().into_owned());
        }
    }
    for dir in extras {
        if !existing.iter().any(|entry| *entry == dir) {
            if !path.is_empty() {
                path.push(':');
            }
            path.push_str(&dir);
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn extended_path_appends_missing_entries() {
        let path = extended_cli_path("/usr/bin", Some(Path::new("/home/alice")));
        assert!(path.starts_with("/usr/bin:"));
        assert!(path.contains("/usr/local/bin"));
        assert!(path.contains("/opt/homebrew/bin"));
        assert!(path.contains("/home/alice/.nvm/current/bin"));
        assert!(path.contains("/home/alice/.local/bin"));
    }

    #[test]
    fn extended_path_skips_present_entries() {
        let path = extended_cli_path("/usr/local/bin:/usr/bin", None);
        assert_eq!(path.matches("/usr/local/bin").count(), 1);
    }

    #[test]
    fn longer_entries_do_not_mask_their_prefixes() {
        let path = extended_cli_path("/usr/local/binx:/usr/bin", None);
        assert!(path.split(':').any(|entry| entry == "/usr/local/bin"));
    }

    #[test]
    fn credentials_path_is_under_home() {
        let path = aws_credentials_file_path(Path::new("/home/alice"));
        assert_eq!(path, Path::new("/home/alice/.aws/credentials"));
    }
}
