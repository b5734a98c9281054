//! Credential export.
//!
//! Lists every user of every instance with its key and writes the result to
//! `auth.json` and `auth.csv`. Users that never logged in get a fresh random
//! password, which is exported; everyone else keeps theirs.

use crate::error::TopologyResult;
use crate::federation::Federation;
use crate::instance::Instance;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Exported instead of a password the user already changed.
pub const PASSWORD_PLACEHOLDER: &str = "Already changed by the user";

pub const JSON_FILE: &str = "auth.json";
pub const CSV_FILE: &str = "auth.csv";
/// Column names of the flat export.
pub const CSV_HEADER: [&str; 4] = ["url", "login", "authkey", "password"];

const PASSWORD_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const PASSWORD_LEN: usize = 16;

/// One exported login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub url: String,
    pub login: String,
    pub authkey: String,
    pub password: String,
}

/// 16 characters from `A-Z0-9`.
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    (0..PASSWORD_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..PASSWORD_CHARSET.len());
            PASSWORD_CHARSET[idx] as char
        })
        .collect()
}

/// Collects the credentials of every user of `instances`, in order.
///
/// Resets the password of users flagged as never logged in.
pub async fn collect_credentials<'a>(
    instances: impl IntoIterator<Item = &'a Instance>,
) -> TopologyResult<Vec<Credential>> {
    let mut credentials = Vec::new();
    for instance in instances {
        let api = instance.site_admin();
        for user in api.users().await? {
            let password = if user.change_pw {
                let password = generate_password();
                api.change_user_password(&user.id, &password).await?;
                debug!("Reset password of {} on {}", user.email, instance.name());
                password
            } else {
                PASSWORD_PLACEHOLDER.to_string()
            };
            credentials.push(Credential {
                url: instance.base_url().to_string(),
                login: user.email,
                authkey: user.authkey,
                password,
            });
        }
    }
    Ok(credentials)
}

/// Writes `auth.json` and `auth.csv` into `dir`.
pub fn write_credentials(dir: &Path, credentials: &[Credential]) -> TopologyResult<()> {
    std::fs::create_dir_all(dir)?;

    let json = File::create(dir.join(JSON_FILE))?;
    serde_json::to_writer_pretty(json, credentials)?;

    // Header written up front so an empty export still carries it.
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(dir.join(CSV_FILE))?;
    csv.write_record(CSV_HEADER)?;
    for credential in credentials {
        csv.serialize(credential)?;
    }
    csv.flush()?;

    info!("Wrote {} credentials to {}", credentials.len(), dir.display());
    Ok(())
}

/// Exports the credentials of the whole federation, spokes first, then the
/// hub.
pub async fn export_credentials(federation: &Federation, dir: &Path) -> TopologyResult<Vec<Credential>> {
    let credentials = collect_credentials(federation.spokes().chain([federation.hub()])).await?;
    write_credentials(dir, &credentials)?;
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_use_the_charset() {
        let password = generate_password();
        assert_eq!(password.len(), PASSWORD_LEN);
        assert!(password.bytes().all(|b| PASSWORD_CHARSET.contains(&b)));
    }

    #[test]
    fn empty_export_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        write_credentials(dir.path(), &[]).unwrap();
        let json = std::fs::read_to_string(dir.path().join(JSON_FILE)).unwrap();
        assert_eq!(json, "[]");
        let csv = std::fs::read_to_string(dir.path().join(CSV_FILE)).unwrap();
        assert_eq!(csv, "url,login,authkey,password\n");
    }

    #[test]
    fn csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = vec![Credential {
            url: "https://localhost:4431".into(),
            login: "first@user.local".into(),
            authkey: "k".repeat(40),
            password: PASSWORD_PLACEHOLDER.into(),
        }];
        write_credentials(dir.path(), &credentials).unwrap();

        let csv = std::fs::read_to_string(dir.path().join(CSV_FILE)).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("url,login,authkey,password"));
        assert!(lines.next().unwrap().ends_with(",Already changed by the user"));

        let json = std::fs::read_to_string(dir.path().join(JSON_FILE)).unwrap();
        let parsed: Vec<Credential> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, credentials);
    }
}
