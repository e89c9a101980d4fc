//! Locates a running Osaurus instance through shared configuration files.
//!
//! Each running server process maintains one directory under
//! `<app-support>/com.dinoki.osaurus/SharedConfiguration/` containing a
//! `configuration.json` descriptor. Scanning the whole tree instead of reading
//! a single well-known file supports several concurrently running instances;
//! the most recently updated one approximates "most likely still alive". The
//! descriptors are written atomically by the server, so reads take no locks,
//! and nothing is cached between calls.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::BaseDirs;
use serde::Deserialize;
use tracing::debug;

use crate::error::Error;

/// Bundle identifier the server uses for its shared-configuration tree.
pub const BUNDLE_IDENTIFIER: &str = "com.dinoki.osaurus";

const SHARED_CONFIGURATION_DIR: &str = "SharedConfiguration";
const DESCRIPTOR_FILE: &str = "configuration.json";
const HEALTH_RUNNING: &str = "running";

/// On-disk descriptor for one server instance, written by the server process.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    pub instance_id: String,
    pub updated_at: String,
    pub health: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub expose_to_network: Option<bool>,
}

/// A discovered instance that passed the eligibility filter.
#[derive(Debug, Clone)]
pub struct ResolvedInstance {
    pub instance_id: String,
    pub updated_at: DateTime<Utc>,
    pub address: String,
    pub port: u16,
    pub url: String,
    pub expose_to_network: bool,
}

/// Root of the shared-configuration tree for the current user, or `None` when
/// the platform's application-support directory cannot be resolved.
pub fn shared_configuration_root() -> Option<PathBuf> {
    let dirs = BaseDirs::new()?;
    Some(
        dirs.data_dir()
            .join(BUNDLE_IDENTIFIER)
            .join(SHARED_CONFIGURATION_DIR),
    )
}

/// Discovers the most recently updated running instance.
pub fn discover_latest_running_instance() -> Result<ResolvedInstance, Error> {
    let root = shared_configuration_root().ok_or(Error::Discovery)?;
    discover_in(&root)
}

/// Scans `root` for instance directories and selects the latest eligible one.
///
/// Instance directories that cannot be read or parsed are skipped rather than
/// failing the whole scan. Candidates with equal timestamps are an undefined
/// tie; the scan keeps whichever it encountered last.
pub fn discover_in(root: &Path) -> Result<ResolvedInstance, Error> {
    let entries = fs::read_dir(root).map_err(|_| Error::Discovery)?;

    let mut best: Option<ResolvedInstance> = None;
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(candidate) = read_candidate(&dir) else {
            continue;
        };
        match &best {
            Some(current) if candidate.updated_at < current.updated_at => {}
            _ => best = Some(candidate),
        }
    }

    best.ok_or(Error::Discovery)
}

/// Collapses discovery to "is any instance running".
pub fn is_running() -> bool {
    discover_latest_running_instance().is_ok()
}

fn read_candidate(dir: &Path) -> Option<ResolvedInstance> {
    let descriptor_path = dir.join(DESCRIPTOR_FILE);
    let contents = match fs::read_to_string(&descriptor_path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!(path = %descriptor_path.display(), %err, "skipping unreadable descriptor");
            return None;
        }
    };
    let descriptor: ServerDescriptor = match serde_json::from_str(&contents) {
        Ok(descriptor) => descriptor,
        Err(err) => {
            debug!(path = %descriptor_path.display(), %err, "skipping malformed descriptor");
            return None;
        }
    };

    if descriptor.health != HEALTH_RUNNING {
        return None;
    }
    let address = descriptor.address?;
    let port = descriptor.port?;

    let updated_at = parse_updated_at(&descriptor.updated_at)
        .or_else(|| directory_mtime(dir))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    // The descriptor's url field wins when it parses; otherwise synthesize
    // from the bind address and port.
    let url = match descriptor.url {
        Some(raw) if reqwest::Url::parse(&raw).is_ok() => raw,
        _ => format!("http://{address}:{port}"),
    };

    Some(ResolvedInstance {
        instance_id: descriptor.instance_id,
        updated_at,
        address,
        port,
        url,
        expose_to_network: descriptor.expose_to_network.unwrap_or(false),
    })
}

fn parse_updated_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn directory_mtime(dir: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(dir).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_descriptor(root: &Path, dir_name: &str, contents: &str) {
        let dir = root.join(dir_name);
        fs::create_dir_all(&dir).expect("Failed to create instance directory");
        fs::write(dir.join(DESCRIPTOR_FILE), contents).expect("Failed to write descriptor");
    }

    fn running_descriptor(instance_id: &str, updated_at: &str) -> String {
        format!(
            r#"{{"instanceId":"{instance_id}","updatedAt":"{updated_at}","health":"running","port":1337,"address":"127.0.0.1"}}"#
        )
    }

    #[test]
    fn selects_the_single_eligible_instance() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        write_descriptor(
            temp_dir.path(),
            "abc",
            &running_descriptor("abc", "2024-05-01T10:00:00Z"),
        );

        let instance = discover_in(temp_dir.path()).expect("discovery should succeed");
        assert_eq!(instance.instance_id, "abc");
        assert_eq!(instance.address, "127.0.0.1");
        assert_eq!(instance.port, 1337);
        assert_eq!(instance.url, "http://127.0.0.1:1337");
        assert!(!instance.expose_to_network);
    }

    #[test]
    fn selects_the_most_recently_updated_instance() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        write_descriptor(
            temp_dir.path(),
            "older",
            &running_descriptor("older", "2024-05-01T10:00:00Z"),
        );
        write_descriptor(
            temp_dir.path(),
            "newer",
            &running_descriptor("newer", "2024-05-02T09:30:00Z"),
        );
        write_descriptor(
            temp_dir.path(),
            "oldest",
            &running_descriptor("oldest", "2024-04-28T00:00:00Z"),
        );

        let instance = discover_in(temp_dir.path()).expect("discovery should succeed");
        assert_eq!(instance.instance_id, "newer");
    }

    #[test]
    fn malformed_descriptor_does_not_block_valid_siblings() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        write_descriptor(temp_dir.path(), "broken", "{ not json at all");
        write_descriptor(
            temp_dir.path(),
            "ok",
            &running_descriptor("ok", "2024-05-01T10:00:00Z"),
        );

        let instance = discover_in(temp_dir.path()).expect("discovery should succeed");
        assert_eq!(instance.instance_id, "ok");
    }

    #[test]
    fn fails_when_no_candidate_is_eligible() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        // Unhealthy.
        write_descriptor(
            temp_dir.path(),
            "stopped",
            r#"{"instanceId":"stopped","updatedAt":"2024-05-01T10:00:00Z","health":"stopped","port":1337,"address":"127.0.0.1"}"#,
        );
        // Running but missing the address.
        write_descriptor(
            temp_dir.path(),
            "no-address",
            r#"{"instanceId":"no-address","updatedAt":"2024-05-01T11:00:00Z","health":"running","port":1337}"#,
        );
        // Running but missing the port.
        write_descriptor(
            temp_dir.path(),
            "no-port",
            r#"{"instanceId":"no-port","updatedAt":"2024-05-01T12:00:00Z","health":"running","address":"127.0.0.1"}"#,
        );

        assert!(matches!(
            discover_in(temp_dir.path()),
            Err(Error::Discovery)
        ));
    }

    #[test]
    fn fails_on_missing_or_empty_root() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        assert!(matches!(
            discover_in(&temp_dir.path().join("does-not-exist")),
            Err(Error::Discovery)
        ));
        assert!(matches!(
            discover_in(temp_dir.path()),
            Err(Error::Discovery)
        ));
    }

    #[test]
    fn skips_hidden_entries_and_stray_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        write_descriptor(
            temp_dir.path(),
            ".hidden",
            &running_descriptor("hidden", "2024-06-01T00:00:00Z"),
        );
        fs::write(temp_dir.path().join("notes.txt"), "not an instance")
            .expect("Failed to write stray file");
        write_descriptor(
            temp_dir.path(),
            "visible",
            &running_descriptor("visible", "2024-05-01T00:00:00Z"),
        );

        let instance = discover_in(temp_dir.path()).expect("discovery should succeed");
        assert_eq!(instance.instance_id, "visible");
    }

    #[test]
    fn prefers_the_descriptor_url_when_it_parses() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        write_descriptor(
            temp_dir.path(),
            "with-url",
            r#"{"instanceId":"with-url","updatedAt":"2024-05-01T10:00:00Z","health":"running","port":8080,"address":"0.0.0.0","url":"http://localhost:8080","exposeToNetwork":true}"#,
        );

        let instance = discover_in(temp_dir.path()).expect("discovery should succeed");
        assert_eq!(instance.url, "http://localhost:8080");
        assert!(instance.expose_to_network);
    }

    #[test]
    fn synthesizes_url_when_the_descriptor_url_is_unparseable() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        write_descriptor(
            temp_dir.path(),
            "bad-url",
            r#"{"instanceId":"bad-url","updatedAt":"2024-05-01T10:00:00Z","health":"running","port":9090,"address":"192.168.1.5","url":"not a url"}"#,
        );

        let instance = discover_in(temp_dir.path()).expect("discovery should succeed");
        assert_eq!(instance.url, "http://192.168.1.5:9090");
    }

    #[test]
    fn falls_back_to_directory_mtime_for_unparseable_timestamps() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        write_descriptor(
            temp_dir.path(),
            "garbled",
            r#"{"instanceId":"garbled","updatedAt":"yesterday-ish","health":"running","port":1337,"address":"127.0.0.1"}"#,
        );

        let instance = discover_in(temp_dir.path()).expect("discovery should succeed");
        // The directory was just created, so the mtime fallback lands well
        // after the epoch sentinel.
        assert!(instance.updated_at > DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn equal_timestamps_still_return_an_eligible_candidate() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        write_descriptor(
            temp_dir.path(),
            "twin-a",
            &running_descriptor("twin-a", "2024-05-01T10:00:00Z"),
        );
        write_descriptor(
            temp_dir.path(),
            "twin-b",
            &running_descriptor("twin-b", "2024-05-01T10:00:00Z"),
        );

        // Enumeration order is filesystem-defined, so either twin may win.
        let instance = discover_in(temp_dir.path()).expect("discovery should succeed");
        assert!(instance.instance_id.starts_with("twin-"));
    }
}
