//! Append-only run artifacts: the ignored-requests log and per-finding
//! vulnerability records. The sitemap has its own sink in `sitemap.rs`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

use crate::intercept::ObservedRequest;

pub const IGNORED_LOG_FILE: &str = "ignored_requests.log";
pub const RUN_LOG_FILE: &str = "scan.log";
pub const SITEMAP_FILE: &str = "sitemap.log";
const VULNERABLE_PREFIX: &str = "VULNERABLE_";

static UNSAFE_PATH_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_-]").unwrap());

pub struct Artifacts {
    dir: PathBuf,
    ignored: Mutex<File>,
}

impl Artifacts {
    /// Create the output directory and truncate the per-run logs.
    pub fn prepare(dir: &Path) -> Result<Self> {
        crate::utils::ensure_dir(dir)?;
        let ignored = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(dir.join(IGNORED_LOG_FILE))
            .context("failed to open ignored-requests log")?;
        Ok(Self {
            dir: dir.to_path_buf(),
            ignored: Mutex::new(ignored),
        })
    }

    /// One timestamped line per ignored request, with the failing condition.
    pub fn log_ignored(&self, url: &str, reason: &str) {
        let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut sink = self.ignored.lock();
        if let Err(e) = writeln!(sink, "[{ts}] Ignored: {url} | Reason: {reason}") {
            tracing::error!(error = %e, "failed to write ignored-requests log");
        }
    }

    /// Persist a finding: the full original request and the anonymized
    /// replay response, verbatim, in a uniquely named record.
    pub fn write_vulnerability(
        &self,
        request: &ObservedRequest,
        replay_status: u16,
        replay_headers: &[(String, String)],
        replay_body: &str,
    ) -> Result<PathBuf> {
        let path = url::Url::parse(&request.url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        let sanitized = UNSAFE_PATH_CHARS.replace_all(&path, "_");
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let file_path = self
            .dir
            .join(format!("{VULNERABLE_PREFIX}{ts}_{sanitized}.txt"));

        let mut record = String::new();
        record.push_str("--- Original Request ---\n");
        record.push_str(&format!("URL: {}\n", request.url));
        record.push_str(&format!("Method: {}\n", request.method));
        record.push_str("Headers:\n");
        for (name, value) in &request.headers {
            record.push_str(&format!("  {name}: {value}\n"));
        }
        if let Some(body) = &request.body {
            record.push_str("Body:\n");
            record.push_str(&pretty_body(body));
            record.push('\n');
        }

        record.push_str("\n\n====================\n\n");

        record.push_str("--- Replayed Response (Anonymized) ---\n");
        record.push_str(&format!("Status Code: {replay_status}\n"));
        record.push_str(&format!("Content-Length: {}\n", replay_body.len()));
        record.push_str("Headers:\n");
        for (name, value) in replay_headers {
            record.push_str(&format!("  {name}: {value}\n"));
        }
        record.push_str("Body:\n");
        record.push_str(replay_body);

        std::fs::write(&file_path, record)
            .with_context(|| format!("failed to write finding {}", file_path.display()))?;
        Ok(file_path)
    }
}

/// JSON bodies render pretty-printed; anything else passes through lossily.
fn pretty_body(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Ok(pretty) = serde_json::to_string_pretty(&value) {
            return pretty;
        }
    }
    String::from_utf8_lossy(body).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_request() -> ObservedRequest {
        ObservedRequest {
            method: "GET".into(),
            url: "https://example.com/api/users/7?full=1".into(),
            headers: HashMap::from([("Accept".to_string(), "application/json".to_string())]),
            body: None,
            response: ObservedRequest::unresolved_response(),
        }
    }

    #[test]
    fn ignored_log_lines_carry_reason() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::prepare(dir.path()).unwrap();
        artifacts.log_ignored("https://example.com/x", "replay failed with status 403");
        drop(artifacts);

        let content = std::fs::read_to_string(dir.path().join(IGNORED_LOG_FILE)).unwrap();
        assert!(content.contains("https://example.com/x"));
        assert!(content.contains("replay failed with status 403"));
    }

    #[test]
    fn vulnerability_record_contains_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::prepare(dir.path()).unwrap();
        let path = artifacts
            .write_vulnerability(
                &sample_request(),
                200,
                &[("content-type".to_string(), "application/json".to_string())],
                r#"{"id":7}"#,
            )
            .unwrap();

        let record = std::fs::read_to_string(&path).unwrap();
        assert!(record.contains("--- Original Request ---"));
        assert!(record.contains("https://example.com/api/users/7?full=1"));
        assert!(record.contains("--- Replayed Response (Anonymized) ---"));
        assert!(record.contains("Status Code: 200"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(VULNERABLE_PREFIX));
        assert!(name.contains("_api_users_7"));
    }
}
