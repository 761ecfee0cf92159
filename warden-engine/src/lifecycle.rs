//! Push approval lifecycle.
//!
//! A blocked push sits in exactly one of four states: pending, approved,
//! rejected or canceled. All transitions go through the [`ApprovalService`]
//! against the persisted record; once a push is terminal, further
//! transitions fail with [`Error::AlreadyDecided`] rather than silently
//! flipping flags back.

use std::sync::Arc;

use crate::action::{unix_now, Action, Attestation, AttestationAnswer, Rejection};
use crate::directory::{Directory, User};
use crate::error::Error;
use crate::store::PushStore;

/// Synthetic reviewer recorded for hook-driven decisions.
const SYSTEM_REVIEWER: &str = "system";

/// Result of a successful lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub message: String,
}

/// Performs approval, rejection and cancelation against the push store.
pub struct ApprovalService {
    store: Arc<dyn PushStore>,
    directory: Arc<dyn Directory>,
    /// Questions every manual approval must attest to.
    attestation_questions: Vec<String>,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn PushStore>,
        directory: Arc<dyn Directory>,
        attestation_questions: Vec<String>,
    ) -> Self {
        ApprovalService {
            store,
            directory,
            attestation_questions,
        }
    }

    fn load_pending(&self, id: &str) -> Result<Action, Error> {
        let action = self
            .store
            .get_push(id)?
            .ok_or_else(|| Error::NotFound(id.to_owned()))?;
        if let Some(state) = action.terminal_state() {
            return Err(Error::AlreadyDecided {
                id: id.to_owned(),
                state,
            });
        }
        Ok(action)
    }

    /// Shared identity checks for approving and rejecting.
    ///
    /// `action.user` holds the directory username the push permission step
    /// resolved from the authenticated git account, so the self-review
    /// guard compares usernames; matching on the pusher's email would
    /// re-derive the same user through the same directory.
    fn check_reviewer(&self, action: &Action, username: &str) -> Result<User, Error> {
        let reviewer = self
            .directory
            .get_user(username)?
            .ok_or_else(|| Error::NotFound(format!("user {username}")))?;

        if !self
            .directory
            .can_user_approve_reject_push(&action.id, username)?
        {
            return Err(Error::Permission(format!(
                "{username} is not allowed to review push {}",
                action.id
            )));
        }
        if action.user.as_deref() == Some(username) && !reviewer.admin {
            return Err(Error::Permission(
                "you cannot review your own push".into(),
            ));
        }
        Ok(reviewer)
    }

    /// Approve a pending push.
    ///
    /// The reviewer must be allowed to review, must not be the pusher
    /// (unless admin), must have a linked git account, and every configured
    /// attestation question has to be answered affirmatively.
    pub fn authorise(
        &self,
        id: &str,
        questions: Vec<AttestationAnswer>,
        username: &str,
    ) -> Result<TransitionOutcome, Error> {
        let mut action = self.load_pending(id)?;
        let reviewer = self.check_reviewer(&action, username)?;

        let Some(git_account) = reviewer.git_account.clone() else {
            return Err(Error::Permission(format!(
                "{username} has no git account associated with their user"
            )));
        };

        for label in &self.attestation_questions {
            let answered = questions
                .iter()
                .any(|answer| &answer.label == label && answer.checked);
            if !answered {
                return Err(Error::Policy(format!(
                    "attestation incomplete: {label:?} was not confirmed"
                )));
            }
        }

        action.set_authorised(Attestation {
            questions,
            timestamp: unix_now(),
            reviewer: username.to_owned(),
            reviewer_git_account: git_account,
        });
        self.store.write_audit(&action)?;
        tracing::info!(push = %id, reviewer = %username, "push approved");
        Ok(TransitionOutcome {
            message: format!("Push {id} approved"),
        })
    }

    /// Reject a pending push with a mandatory, non-empty reason.
    pub fn reject(
        &self,
        id: &str,
        reason: &str,
        username: &str,
    ) -> Result<TransitionOutcome, Error> {
        let mut action = self.load_pending(id)?;
        self.check_reviewer(&action, username)?;

        if reason.trim().is_empty() {
            return Err(Error::Policy("a rejection reason is required".into()));
        }

        action.set_rejected(Rejection {
            reason: reason.trim().to_owned(),
            timestamp: unix_now(),
            reviewer: username.to_owned(),
        });
        self.store.write_audit(&action)?;
        tracing::info!(push = %id, reviewer = %username, "push rejected");
        Ok(TransitionOutcome {
            message: format!("Push {id} rejected"),
        })
    }

    /// Cancel a pending push, typically by its own author.
    pub fn cancel(&self, id: &str, username: &str) -> Result<TransitionOutcome, Error> {
        let mut action = self.load_pending(id)?;

        if !self.directory.can_user_cancel_push(id, username)? {
            return Err(Error::Permission(format!(
                "{username} is not allowed to cancel push {id}"
            )));
        }

        action.set_canceled();
        self.store.write_audit(&action)?;
        tracing::info!(push = %id, user = %username, "push canceled");
        Ok(TransitionOutcome {
            message: format!("Push {id} canceled"),
        })
    }

    /// Apply the decision the pre-receive hook requested during the chain.
    ///
    /// Auto decisions bypass the reviewer guards: they are recorded under a
    /// synthetic system reviewer. A push that is already terminal is left
    /// alone.
    pub fn apply_auto_decision(&self, chain_result: &Action) -> Result<(), Error> {
        let Some(mut action) = self.store.get_push(&chain_result.id)? else {
            return Ok(());
        };
        if action.is_terminal() {
            return Ok(());
        }

        if chain_result.auto_approved {
            action.set_authorised(Attestation {
                questions: Vec::new(),
                timestamp: unix_now(),
                reviewer: SYSTEM_REVIEWER.to_owned(),
                reviewer_git_account: SYSTEM_REVIEWER.to_owned(),
            });
            tracing::info!(push = %action.id, "push auto-approved by pre-receive hook");
        } else if chain_result.auto_rejected {
            action.set_rejected(Rejection {
                reason: "Rejected by the pre-receive hook".into(),
                timestamp: unix_now(),
                reviewer: SYSTEM_REVIEWER.to_owned(),
            });
            tracing::info!(push = %action.id, "push auto-rejected by pre-receive hook");
        } else {
            return Ok(());
        }

        self.store.write_audit(&action)
    }
}
