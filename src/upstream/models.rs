//! Data models for upstream payloads

use serde::{Deserialize, Serialize};

/// One changed file of a pull request, as returned by the files endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub filename: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    /// Absent for binary files and very large diffs
    #[serde(default)]
    pub patch: Option<String>,
}

impl FileDiff {
    pub fn new(filename: impl Into<String>, patch: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: "modified".to_string(),
            additions: 0,
            deletions: 0,
            patch: Some(patch.into()),
        }
    }

    /// Patch text, empty when upstream sent none
    pub fn patch_text(&self) -> &str {
        self.patch.as_deref().unwrap_or("")
    }
}

/// Identifies a pull request; carried as continuation context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub pull_number: u64,
}

impl PullRequestRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, pull_number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            pull_number,
        }
    }

    /// Encode as a continuation context value
    pub fn to_context(&self) -> serde_json::Value {
        serde_json::json!({
            "owner": self.owner,
            "repo": self.repo,
            "pull_number": self.pull_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_diff_from_api_payload() {
        let payload = r#"[
            {"sha": "abc", "filename": "src/lib.rs", "status": "modified",
             "additions": 3, "deletions": 1, "changes": 4,
             "patch": "@@ -1,2 +1,4 @@\n-old\n+new"},
            {"sha": "def", "filename": "logo.png", "status": "added",
             "additions": 0, "deletions": 0, "changes": 0}
        ]"#;

        let files: Vec<FileDiff> = serde_json::from_str(payload).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].additions, 3);
        assert!(files[0].patch_text().starts_with("@@"));
        assert_eq!(files[1].patch, None);
        assert_eq!(files[1].patch_text(), "");
    }

    #[test]
    fn test_pull_request_context_round_trip() {
        let pr = PullRequestRef::new("acme", "widgets", 17);
        let parsed: PullRequestRef = serde_json::from_value(pr.to_context()).unwrap();
        assert_eq!(parsed, pr);
    }
}
