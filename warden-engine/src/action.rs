//! The persisted push model.
//!
//! An [`Action`] is the single value threaded through the processor chain:
//! each processor appends a [`Step`] recording what it did, and terminal
//! outcomes (error, async block) propagate from the step onto the action.
//! The whole structure serializes with `serde` and is what the store upserts
//! as the audit record.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_pack::CommitData;

/// The all-zero id Git uses for "no commit" (branch creation/deletion).
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000";

/// Seconds since the Unix epoch, for persisted timestamps.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// What kind of traffic an action represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Push,
    Pull,
}

/// One answered attestation question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationAnswer {
    pub label: String,
    pub checked: bool,
}

/// The record of a reviewer approving a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub questions: Vec<AttestationAnswer>,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub reviewer: String,
    pub reviewer_git_account: String,
}

/// The record of a reviewer rejecting a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Always non-empty; enforced by the approval service.
    pub reason: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub reviewer: String,
}

/// One processor's execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub name: String,
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_message: Option<String>,
    pub logs: Vec<String>,
    /// Free-form processor output kept for the audit trail.
    #[serde(skip_serializing_if = "serde_json::Value::is_null", default)]
    pub content: serde_json::Value,
}

impl Step {
    pub fn new(name: &str) -> Self {
        Step {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            error: false,
            error_message: None,
            blocked: false,
            blocked_message: None,
            logs: Vec::new(),
            content: serde_json::Value::Null,
        }
    }

    /// Record a log line on the step and emit it through `tracing`.
    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(step = %self.name, "{message}");
        self.logs.push(message);
    }

    /// Mark the step failed with a client-visible message.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(step = %self.name, "{message}");
        self.error = true;
        self.error_message = Some(message);
    }

    /// Mark the step as an asynchronous block: the push halts without error
    /// and waits for an approval decision.
    pub fn block(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(step = %self.name, "{message}");
        self.blocked = true;
        self.blocked_message = Some(message);
    }
}

/// One intercepted request and everything that happened to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Canonical push id: `"{commit_from}__{commit_to}"`. Empty until the
    /// pack is parsed.
    pub id: String,
    pub kind: ActionKind,
    /// Repository as `project/name`.
    pub repo: String,
    /// Remote URL pushes are forwarded to.
    pub url: String,
    /// Seconds since the Unix epoch at interception time.
    pub received_at: i64,

    pub steps: Vec<Step>,
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_message: Option<String>,

    /// Set when an authorised push is re-delivered; policy processors are
    /// skipped and the push goes straight to forwarding.
    pub allow_push: bool,
    pub authorised: bool,
    pub rejected: bool,
    pub canceled: bool,
    /// Requested by the pre-receive hook; acted on after the chain completes.
    pub auto_approved: bool,
    pub auto_rejected: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_to: Option<String>,
    /// Full ref name, e.g. `refs/heads/main`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Commits in chronological order, oldest first.
    pub commit_data: Vec<CommitData>,
    /// Resolved pusher username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Attestation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,

    /// Unified diff between the commit range, captured for scanning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// Raw upstream receive-pack response, relayed to the client. Not
    /// persisted.
    #[serde(skip)]
    pub upstream_response: Option<Vec<u8>>,
}

impl Action {
    pub fn new(kind: ActionKind, repo: &str, url: &str) -> Self {
        Action {
            id: String::new(),
            kind,
            repo: repo.to_owned(),
            url: url.to_owned(),
            received_at: unix_now(),
            steps: Vec::new(),
            error: false,
            error_message: None,
            blocked: false,
            blocked_message: None,
            allow_push: false,
            authorised: false,
            rejected: false,
            canceled: false,
            auto_approved: false,
            auto_rejected: false,
            commit_from: None,
            commit_to: None,
            branch: None,
            commit_data: Vec::new(),
            user: None,
            attestation: None,
            rejection: None,
            diff: None,
            upstream_response: None,
        }
    }

    /// Record the commit range and derive the canonical push id from it.
    pub fn set_commit_range(&mut self, from: &str, to: &str) {
        self.id = format!("{from}__{to}");
        self.commit_from = Some(from.to_owned());
        self.commit_to = Some(to.to_owned());
    }

    /// Append a step, propagating its error or block state onto the action.
    pub fn add_step(&mut self, step: Step) {
        if step.error {
            self.error = true;
            self.error_message = step.error_message.clone();
        }
        if step.blocked {
            self.blocked = true;
            self.blocked_message = step.blocked_message.clone();
        }
        self.steps.push(step);
    }

    /// Whether the chain should keep executing.
    pub fn continue_ok(&self) -> bool {
        !(self.error || self.blocked)
    }

    /// Whether a lifecycle decision has been made.
    pub fn is_terminal(&self) -> bool {
        self.authorised || self.rejected || self.canceled
    }

    /// The state name of a terminal push, for error reporting.
    pub fn terminal_state(&self) -> Option<&'static str> {
        if self.authorised {
            Some("approved")
        } else if self.rejected {
            Some("rejected")
        } else if self.canceled {
            Some("canceled")
        } else {
            None
        }
    }

    /// Flip to approved. The flags are mutually exclusive.
    pub fn set_authorised(&mut self, attestation: Attestation) {
        self.authorised = true;
        self.rejected = false;
        self.canceled = false;
        self.attestation = Some(attestation);
    }

    /// Flip to rejected. The flags are mutually exclusive.
    pub fn set_rejected(&mut self, rejection: Rejection) {
        self.authorised = false;
        self.rejected = true;
        self.canceled = false;
        self.rejection = Some(rejection);
    }

    /// Flip to canceled. The flags are mutually exclusive.
    pub fn set_canceled(&mut self) {
        self.authorised = false;
        self.rejected = false;
        self.canceled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn step_error_propagates_to_the_action() {
        let mut action = Action::new(ActionKind::Push, "org/repo", "https://example.com/org/repo.git");
        let mut step = Step::new("checkCommitMessages");
        step.fail("bad message");
        action.add_step(step);
        assert!(action.error);
        assert_eq!(action.error_message.as_deref(), Some("bad message"));
        assert!(!action.continue_ok());
    }

    #[test]
    fn step_block_halts_without_error() {
        let mut action = Action::new(ActionKind::Push, "org/repo", "u");
        let mut step = Step::new("blockForAuth");
        step.block("waiting for approval");
        action.add_step(step);
        assert!(action.blocked);
        assert!(!action.error);
        assert!(!action.continue_ok());
    }

    #[test]
    fn commit_range_derives_the_push_id() {
        let mut action = Action::new(ActionKind::Push, "org/repo", "u");
        action.set_commit_range("aaaa", "bbbb");
        assert_eq!(action.id, "aaaa__bbbb");
    }

    #[test]
    fn decision_flags_are_mutually_exclusive() {
        let mut action = Action::new(ActionKind::Push, "org/repo", "u");
        action.set_rejected(Rejection {
            reason: "no".into(),
            timestamp: 1,
            reviewer: "alice".into(),
        });
        action.set_authorised(Attestation {
            questions: Vec::new(),
            timestamp: 2,
            reviewer: "bob".into(),
            reviewer_git_account: "bob-gh".into(),
        });
        assert!(action.authorised);
        assert!(!action.rejected);
        assert_eq!(action.terminal_state(), Some("approved"));
    }

    #[test]
    fn steps_get_distinct_ids() {
        let a = Step::new("x");
        let b = Step::new("x");
        assert_ne!(a.id, b.id);
    }
}
