//! AWS credential resolution for the signed Bedrock adapter.
//!
//! Precedence is fixed and security-relevant: explicit settings first
//! (raw secrets the host chose to persist), then process environment,
//! then the shared credentials file profile. Resolution happens once per
//! adapter construction and is never repeated mid-call.

use crate::env;
use std::fmt;
use std::path::Path;

/// Where a set of resolved credentials came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialProvenance {
    Settings,
    Environment,
    Profile(String),
}

impl fmt::Display for CredentialProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialProvenance::Settings => write!(f, "settings"),
            CredentialProvenance::Environment => write!(f, "environment"),
            CredentialProvenance::Profile(name) => write!(f, "file:{name}"),
        }
    }
}

/// Resolved signing credentials plus their provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub provenance: CredentialProvenance,
}

/// Resolve credentials from explicit settings, the environment, or the
/// shared credentials file, in that order. Returns `None` when no source
/// yields both key fields.
pub fn resolve(
    settings_access_key: &str,
    settings_secret_key: &str,
    settings_session_token: &str,
) -> Option<AwsCredentials> {
    if let Some(creds) = from_settings(
        settings_access_key,
        settings_secret_key,
        settings_session_token,
    ) {
        return Some(creds);
    }
    if let Some(creds) = from_env() {
        return Some(creds);
    }
    from_default_profile()
}

fn from_settings(access_key: &str, secret_key: &str, session_token: &str) -> Option<AwsCredentials> {
    if is_blank(access_key) || is_blank(secret_key) {
        return None;
    }
    Some(AwsCredentials {
        access_key: access_key.trim().to_string(),
        secret_key: secret_key.trim().to_string(),
        session_token: normalize(session_token),
        provenance: CredentialProvenance::Settings,
    })
}

/// Credentials from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, with
/// an optional `AWS_SESSION_TOKEN`.
pub fn from_env() -> Option<AwsCredentials> {
    let access_key = std::env::var(env::aws::ACCESS_KEY_VAR).ok()?;
    let secret_key = std::env::var(env::aws::SECRET_KEY_VAR).ok()?;
    if is_blank(&access_key) || is_blank(&secret_key) {
        return None;
    }
    let session_token = std::env::var(env::aws::SESSION_TOKEN_VAR)
        .ok()
        .and_then(|t| normalize(&t));

    Some(AwsCredentials {
        access_key: access_key.trim().to_string(),
        secret_key: secret_key.trim().to_string(),
        session_token,
        provenance: CredentialProvenance::Environment,
    })
}

/// Credentials from `~/.aws/credentials` for the effective profile.
pub fn from_default_profile() -> Option<AwsCredentials> {
    let profile = effective_profile();
    let home = env::home_dir()?;
    let path = env::aws_credentials_file_path(&home);
    from_file(&path, &profile)
}

/// The profile selected by `AWS_DEFAULT_PROFILE`, or `default`.
pub fn effective_profile() -> String {
    match std::env::var(env::aws::DEFAULT_PROFILE_VAR) {
        Ok(profile) if !is_blank(&profile) => profile.trim().to_string(),
        _ => env::aws::DEFAULT_PROFILE.to_string(),
    }
}

/// Parse an INI-style credentials file and extract the named profile.
pub fn from_file(path: &Path, profile: &str) -> Option<AwsCredentials> {
    let contents = std::fs::read_to_string(path).ok()?;
    parse_credentials_file(&contents, profile)
}

fn parse_credentials_file(contents: &str, profile: &str) -> Option<AwsCredentials> {
    let mut in_profile = false;
    let mut access_key: Option<String> = None;
    let mut secret_key: Option<String> = None;
    let mut session_token: Option<String> = None;

    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if let Some(section) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            in_profile = section.trim() == profile;
            continue;
        }

        if in_profile && let Some((key, value)) = trimmed.split_once('=') {
            let value = value.trim().to_string();
            match key.trim() {
                "aws_access_key_id" => access_key = Some(value),
                "aws_secret_access_key" => secret_key = Some(value),
                "aws_session_token" => session_token = Some(value),
                _ => {}
            }
        }
    }

    let access_key = access_key.filter(|k| !is_blank(k))?;
    let secret_key = secret_key.filter(|k| !is_blank(k))?;

    Some(AwsCredentials {
        access_key: access_key.trim().to_string(),
        secret_key: secret_key.trim().to_string(),
        session_token: session_token.and_then(|t| normalize(&t)),
        provenance: CredentialProvenance::Profile(profile.to_string()),
    })
}

/// True when any of the three sources can produce valid credentials.
pub fn any_source_available(
    settings_access_key: &str,
    settings_secret_key: &str,
    settings_session_token: &str,
) -> bool {
    resolve(
        settings_access_key,
        settings_secret_key,
        settings_session_token,
    )
    .is_some()
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const SAMPLE_FILE: &str = "\
# shared credentials
[default]
aws_access_key_id = AKIADEFAULT
aws_secret_access_key = defaultsecret

; alternate profile
[pentest]
aws_access_key_id = AKIAPENTEST
aws_secret_access_key = pentestsecret
aws_session_token = pentesttoken
";

    fn clear_aws_env() {
        for var in [
            crate::env::aws::ACCESS_KEY_VAR,
            crate::env::aws::SECRET_KEY_VAR,
            crate::env::aws::SESSION_TOKEN_VAR,
            crate::env::aws::DEFAULT_PROFILE_VAR,
        ] {
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn settings_take_precedence_and_record_provenance() {
        let creds = from_settings(" AKIA123 ", "secret", "").unwrap();
        assert_eq!(creds.access_key, "AKIA123");
        assert_eq!(creds.secret_key, "secret");
        assert!(creds.session_token.is_none());
        assert_eq!(creds.provenance, CredentialProvenance::Settings);
        assert_eq!(creds.provenance.to_string(), "settings");
    }

    #[test]
    fn blank_settings_fields_are_rejected() {
        assert!(from_settings("   ", "secret", "").is_none());
        assert!(from_settings("AKIA123", "", "token").is_none());
    }

    #[test]
    fn file_parser_selects_the_requested_profile() {
        let creds = parse_credentials_file(SAMPLE_FILE, "pentest").unwrap();
        assert_eq!(creds.access_key, "AKIAPENTEST");
        assert_eq!(creds.secret_key, "pentestsecret");
        assert_eq!(creds.session_token.as_deref(), Some("pentesttoken"));
        assert_eq!(
            creds.provenance,
            CredentialProvenance::Profile("pentest".to_string())
        );
        assert_eq!(creds.provenance.to_string(), "file:pentest");
    }

    #[test]
    fn file_parser_skips_comments_and_unknown_keys() {
        let contents = "\
# comment
[default]
; another comment
aws_access_key_id = AKIAX
region = eu-west-1
aws_secret_access_key = sx
";
        let creds = parse_credentials_file(contents, "default").unwrap();
        assert_eq!(creds.access_key, "AKIAX");
        assert_eq!(creds.secret_key, "sx");
        assert!(creds.session_token.is_none());
    }

    #[test]
    fn file_parser_requires_both_key_fields() {
        let contents = "[default]\naws_access_key_id = AKIAX\n";
        assert!(parse_credentials_file(contents, "default").is_none());
        assert!(parse_credentials_file(SAMPLE_FILE, "missing").is_none());
    }

    #[test]
    fn from_file_reads_a_real_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_FILE.as_bytes()).unwrap();

        let creds = from_file(file.path(), "default").unwrap();
        assert_eq!(creds.access_key, "AKIADEFAULT");
        assert!(from_file(file.path(), "nope").is_none());
    }

    #[test]
    #[serial]
    fn env_credentials_require_both_keys() {
        clear_aws_env();
        unsafe { std::env::set_var(crate::env::aws::ACCESS_KEY_VAR, "AKIAENV") };
        assert!(from_env().is_none());

        unsafe { std::env::set_var(crate::env::aws::SECRET_KEY_VAR, "envsecret") };
        let creds = from_env().unwrap();
        assert_eq!(creds.access_key, "AKIAENV");
        assert_eq!(creds.provenance, CredentialProvenance::Environment);
        clear_aws_env();
    }

    #[test]
    #[serial]
    fn explicit_settings_win_over_environment() {
        clear_aws_env();
        unsafe { std::env::set_var(crate::env::aws::ACCESS_KEY_VAR, "AKIAENV") };
        unsafe { std::env::set_var(crate::env::aws::SECRET_KEY_VAR, "envsecret") };

        let creds = resolve("AKIASETTINGS", "settingssecret", "").unwrap();
        assert_eq!(creds.access_key, "AKIASETTINGS");
        assert_eq!(creds.provenance, CredentialProvenance::Settings);

        let creds = resolve("", "", "").unwrap();
        assert_eq!(creds.access_key, "AKIAENV");
        assert_eq!(creds.provenance, CredentialProvenance::Environment);
        clear_aws_env();
    }

    #[test]
    #[serial]
    fn resolution_falls_through_to_the_file_profile() {
        clear_aws_env();
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join(".aws")).unwrap();
        std::fs::write(home.path().join(".aws/credentials"), SAMPLE_FILE).unwrap();
        let old_home = std::env::var("HOME").ok();
        unsafe { std::env::set_var("HOME", home.path()) };

        let creds = resolve("", "", "").unwrap();
        assert_eq!(creds.access_key, "AKIADEFAULT");
        assert_eq!(
            creds.provenance,
            CredentialProvenance::Profile("default".to_string())
        );
        assert_eq!(creds.provenance.to_string(), "file:default");

        match old_home {
            Some(home) => unsafe { std::env::set_var("HOME", home) },
            None => unsafe { std::env::remove_var("HOME") },
        }
        clear_aws_env();
    }

    #[test]
    #[serial]
    fn effective_profile_honors_the_override() {
        clear_aws_env();
        assert_eq!(effective_profile(), "default");
        unsafe { std::env::set_var(crate::env::aws::DEFAULT_PROFILE_VAR, " pentest ") };
        assert_eq!(effective_profile(), "pentest");
        clear_aws_env();
    }
}
