//! Repository allow-list and authorisation-resume checks.

use crate::action::{Action, Step};
use crate::chain::{Processor, PushContext};

/// Reject traffic for any repository not on the authorised list.
///
/// Also the only processor of the pull chain.
pub struct CheckRepoInAuthorisedList;

impl Processor for CheckRepoInAuthorisedList {
    fn name(&self) -> &'static str {
        "checkRepoInAuthorisedList"
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());

        match ctx.directory.authorised_repos() {
            Ok(repos) => {
                if repos.iter().any(|repo| repo.matches(&ctx.repo)) {
                    step.log(format!("repository {} is authorised", ctx.repo));
                } else {
                    step.fail(format!(
                        "Rejecting repo {} not in the authorised list",
                        ctx.repo
                    ));
                }
            }
            Err(e) => step.fail(e.client_message()),
        }

        action.add_step(step);
        action
    }
}

/// Resume path: a push that was blocked and later approved is re-delivered
/// by the client byte-for-byte, lands on the same push id, and is let
/// straight through to forwarding.
///
/// The approval state is adopted from the stored record so the audit
/// written at the end of this delivery keeps the `authorised` flag and the
/// attestation instead of resetting them.
pub struct CheckIfWaitingAuth;

impl Processor for CheckIfWaitingAuth {
    fn name(&self) -> &'static str {
        "checkIfWaitingAuth"
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());

        match ctx.store.get_push(&action.id) {
            Ok(Some(existing)) if existing.authorised && !existing.error => {
                step.log("push already authorised, policy checks will be skipped");
                action.allow_push = true;
                action.authorised = true;
                action.attestation = existing.attestation;
                if action.user.is_none() {
                    action.user = existing.user;
                }
            }
            Ok(_) => step.log("no prior authorisation on record"),
            Err(e) => step.fail(e.client_message()),
        }

        action.add_step(step);
        action
    }
}
