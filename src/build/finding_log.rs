//! Append-only aggregate finding log (JSON lines)

use crate::diagnostics::Finding;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Serialize)]
struct FindingRecord<'a> {
    timestamp: DateTime<Utc>,
    pass: u32,
    attempt: u32,
    #[serde(flatten)]
    finding: &'a Finding,
}

/// Single-writer log shared by concurrent compilations
#[derive(Debug)]
pub struct FindingLog {
    path: PathBuf,
    writer: Mutex<()>,
}

impl FindingLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, pass: u32, attempt: u32, findings: &[Finding]) -> Result<()> {
        if findings.is_empty() {
            return Ok(());
        }

        let timestamp = Utc::now();
        let mut buffer = Vec::new();
        for finding in findings {
            let record = FindingRecord {
                timestamp,
                pass,
                attempt,
                finding,
            };
            serde_json::to_writer(&mut buffer, &record)
                .context("Failed to serialize finding")?;
            buffer.push(b'\n');
        }

        let _guard = self.writer.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open finding log {}", self.path.display()))?;
        file.write_all(&buffer)
            .await
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FindingKind;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_json_lines() {
        let dir = TempDir::new().unwrap();
        let log = FindingLog::new(dir.path().join(".passbuild/findings.jsonl"));

        let first = vec![Finding::new(FindingKind::FatalCompilerError, "main", "boom").with_line(Some(3))];
        let second = vec![Finding::new(FindingKind::BibliographyEntryIssue, "irf", "Citation `x' undefined")];
        log.append(1, 1, &first).await.unwrap();
        log.append(2, 1, &second).await.unwrap();
        log.append(2, 1, &[]).await.unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["document"], "main");
        assert_eq!(lines[0]["kind"], "FatalCompilerError");
        assert_eq!(lines[0]["line"], 3);
        assert_eq!(lines[1]["pass"], 2);
        assert!(lines[1]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(FindingLog::new(dir.path().join("findings.jsonl")));

        let mut handles = Vec::new();
        for i in 0..8 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let findings: Vec<Finding> = (0..20)
                    .map(|j| {
                        Finding::new(FindingKind::BibliographyEntryIssue, format!("doc{}", i), format!("entry {}", j))
                    })
                    .collect();
                log.append(1, 1, &findings).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.lines().count(), 160);
        assert!(text
            .lines()
            .all(|l| serde_json::from_str::<serde_json::Value>(l).is_ok()));
    }
}
