//! Engine configuration.
//!
//! The engine never loads or validates configuration files; callers build a
//! [`PolicyConfig`] however they like and hand it in at chain construction.
//! Reconfiguring means building a new chain with a new value.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Rules applied to commit metadata before any working clone exists.
#[derive(Debug, Clone, Default)]
pub struct CommitRules {
    /// Author email domains must match this pattern when set.
    pub email_domain_allow: Option<String>,
    /// Author email local parts matching this pattern are rejected.
    pub email_local_block: Option<String>,
    /// Case-insensitive substrings that block a commit message.
    pub message_block_literals: Vec<String>,
    /// Patterns that block a commit message (compiled case-insensitive).
    pub message_block_patterns: Vec<String>,
}

/// Rules applied to the added lines of the push diff.
#[derive(Debug, Clone, Default)]
pub struct DiffRules {
    /// Case-insensitive substrings that block the push wherever they appear.
    pub block_literals: Vec<String>,
    /// Patterns that block the push (compiled case-insensitive).
    pub block_patterns: Vec<String>,
    /// Named detector patterns, e.g. `"AWS access key" -> "AKIA[0-9A-Z]{16}"`.
    /// Skipped entirely for private organizations.
    pub block_providers: BTreeMap<String, String>,
}

/// One entry of the authorised-repository list.
#[derive(Debug, Clone)]
pub struct AuthorisedRepo {
    pub project: String,
    pub name: String,
    pub url: String,
    /// When false, clean pushes forward without a human decision.
    pub require_review: bool,
}

impl AuthorisedRepo {
    /// Case-insensitive match against a `project/name` key.
    pub fn matches(&self, repo: &str) -> bool {
        let key = format!("{}/{}", self.project, self.name);
        key.eq_ignore_ascii_case(repo)
    }
}

/// Everything the chain and the approval service need to know.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub commit: CommitRules,
    pub diff: DiffRules,
    /// Organizations whose pushes skip the named provider detectors.
    pub private_organizations: Vec<String>,
    /// Questions a reviewer must attest to when approving.
    pub attestation_questions: Vec<String>,
    /// Optional pre-receive hook script, executed against the working clone.
    pub pre_receive_hook: Option<PathBuf>,
    /// Upper bound for any single git invocation.
    pub git_timeout: Duration,
    /// Working clones live under this root, one directory per push id.
    pub workdir_root: PathBuf,
    /// Base URL shown to pushers waiting for approval; the push id is
    /// appended.
    pub approval_url_base: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            commit: CommitRules::default(),
            diff: DiffRules::default(),
            private_organizations: Vec::new(),
            attestation_questions: Vec::new(),
            pre_receive_hook: None,
            git_timeout: Duration::from_secs(60),
            workdir_root: std::env::temp_dir().join("warden"),
            approval_url_base: "http://localhost:8080/dashboard/push".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_match_is_case_insensitive() {
        let repo = AuthorisedRepo {
            project: "Acme".into(),
            name: "Widgets".into(),
            url: "https://git.example.com/acme/widgets.git".into(),
            require_review: true,
        };
        assert!(repo.matches("acme/widgets"));
        assert!(repo.matches("ACME/WIDGETS"));
        assert!(!repo.matches("acme/other"));
    }
}
