//! Commit-metadata policy: author emails and commit messages.
//!
//! Both processors work purely on the decoded commit data, before any
//! working clone exists, so cheap rejections happen early.

use regex::{Regex, RegexBuilder};
use warden_pack::CommitData;

use crate::action::{Action, Step};
use crate::chain::{Processor, PushContext};
use crate::config::CommitRules;
use crate::error::Error;

fn build_pattern(source: &str) -> Result<Regex, Error> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Internal(format!("bad commit rule pattern {source:?}: {e}")))
}

/// Author emails violating the configured rules, deduplicated in commit
/// order.
fn illegal_emails(commits: &[CommitData], rules: &CommitRules) -> Result<Vec<String>, Error> {
    let domain_allow = rules
        .email_domain_allow
        .as_deref()
        .map(build_pattern)
        .transpose()?;
    let local_block = rules
        .email_local_block
        .as_deref()
        .map(build_pattern)
        .transpose()?;

    let mut illegal: Vec<String> = Vec::new();
    for commit in commits {
        let email = commit.author_email.as_str();
        let violates = match email.split_once('@') {
            Some((local, domain)) => {
                domain_allow.as_ref().is_some_and(|re| !re.is_match(domain))
                    || local_block.as_ref().is_some_and(|re| re.is_match(local))
            }
            // An address without a domain can never satisfy a domain rule.
            None => domain_allow.is_some() || local_block.is_some(),
        };
        if violates && !illegal.iter().any(|seen| seen == email) {
            illegal.push(email.to_owned());
        }
    }
    Ok(illegal)
}

/// Commit messages hitting a blocked literal or pattern, deduplicated.
fn offending_messages(commits: &[CommitData], rules: &CommitRules) -> Result<Vec<String>, Error> {
    let literals: Vec<String> = rules
        .message_block_literals
        .iter()
        .map(|l| l.to_lowercase())
        .collect();
    let patterns = rules
        .message_block_patterns
        .iter()
        .map(|source| build_pattern(source))
        .collect::<Result<Vec<_>, _>>()?;

    let mut offending: Vec<String> = Vec::new();
    for commit in commits {
        let lowered = commit.message.to_lowercase();
        let hit = literals.iter().any(|literal| lowered.contains(literal))
            || patterns.iter().any(|re| re.is_match(&commit.message));
        if hit && !offending.iter().any(|seen| seen == &commit.message) {
            offending.push(commit.message.clone());
        }
    }
    Ok(offending)
}

/// Enforce the author-email rules over every pushed commit.
pub struct CheckAuthorEmails;

impl Processor for CheckAuthorEmails {
    fn name(&self) -> &'static str {
        "checkAuthorEmails"
    }

    fn skipped_when_allowed(&self) -> bool {
        true
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());
        let rules = &ctx.config.commit;

        if rules.email_domain_allow.is_none() && rules.email_local_block.is_none() {
            step.log("no author email rules configured");
        } else {
            match illegal_emails(&action.commit_data, rules) {
                Ok(illegal) if illegal.is_empty() => {
                    step.log(format!("{} commits pass email policy", action.commit_data.len()));
                }
                Ok(illegal) => step.fail(format!(
                    "The following commit author emails are not allowed: {}",
                    illegal.join(", ")
                )),
                Err(e) => step.fail(e.client_message()),
            }
        }

        action.add_step(step);
        action
    }
}

/// Enforce the commit-message rules over every pushed commit.
pub struct CheckCommitMessages;

impl Processor for CheckCommitMessages {
    fn name(&self) -> &'static str {
        "checkCommitMessages"
    }

    fn skipped_when_allowed(&self) -> bool {
        true
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());
        let rules = &ctx.config.commit;

        if rules.message_block_literals.is_empty() && rules.message_block_patterns.is_empty() {
            step.log("no commit message rules configured");
        } else {
            match offending_messages(&action.commit_data, rules) {
                Ok(offending) if offending.is_empty() => {
                    step.log(format!(
                        "{} commit messages pass policy",
                        action.commit_data.len()
                    ));
                }
                Ok(offending) => step.fail(format!(
                    "The following commit messages violate policy: {}",
                    offending
                        .iter()
                        .map(|m| format!("{:?}", m.trim_end()))
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
                Err(e) => step.fail(e.client_message()),
            }
        }

        action.add_step(step);
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smallvec::smallvec;

    fn commit(email: &str, message: &str) -> CommitData {
        CommitData {
            tree: "4b825dc642cb6eb9a060e54bf8d69288fbee4904".into(),
            parents: smallvec![],
            author: "A".into(),
            author_email: email.into(),
            committer: "A".into(),
            committer_email: email.into(),
            commit_timestamp: 1_700_000_000,
            message: message.into(),
        }
    }

    #[test]
    fn domain_allow_rejects_foreign_domains() {
        let rules = CommitRules {
            email_domain_allow: Some("example\\.com$".into()),
            ..CommitRules::default()
        };
        let commits = vec![
            commit("jane@example.com", "ok"),
            commit("eve@evil.org", "ok"),
            commit("eve@evil.org", "again"),
        ];
        let illegal = illegal_emails(&commits, &rules).unwrap();
        assert_eq!(illegal, vec!["eve@evil.org".to_string()]);
    }

    #[test]
    fn local_block_rejects_matching_local_parts() {
        let rules = CommitRules {
            email_local_block: Some("^root$".into()),
            ..CommitRules::default()
        };
        let commits = vec![commit("root@example.com", "ok"), commit("jane@example.com", "ok")];
        let illegal = illegal_emails(&commits, &rules).unwrap();
        assert_eq!(illegal, vec!["root@example.com".to_string()]);
    }

    #[test]
    fn email_without_domain_fails_when_rules_exist() {
        let rules = CommitRules {
            email_domain_allow: Some("example\\.com$".into()),
            ..CommitRules::default()
        };
        let illegal = illegal_emails(&[commit("not-an-email", "ok")], &rules).unwrap();
        assert_eq!(illegal.len(), 1);
    }

    #[test]
    fn message_literals_match_case_insensitively() {
        let rules = CommitRules {
            message_block_literals: vec!["do not merge".into()],
            ..CommitRules::default()
        };
        let commits = vec![
            commit("a@x.com", "WIP - DO NOT MERGE\n"),
            commit("a@x.com", "fine\n"),
        ];
        let offending = offending_messages(&commits, &rules).unwrap();
        assert_eq!(offending, vec!["WIP - DO NOT MERGE\n".to_string()]);
    }

    #[test]
    fn message_patterns_are_regexes() {
        let rules = CommitRules {
            message_block_patterns: vec![r"JIRA-\d+".into()],
            ..CommitRules::default()
        };
        let offending =
            offending_messages(&[commit("a@x.com", "fixes jira-123\n")], &rules).unwrap();
        assert_eq!(offending.len(), 1);
    }

    #[test]
    fn invalid_pattern_is_an_internal_error() {
        let rules = CommitRules {
            message_block_patterns: vec!["(oops".into()],
            ..CommitRules::default()
        };
        let err = offending_messages(&[commit("a@x.com", "m")], &rules).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::Internal);
    }
}
