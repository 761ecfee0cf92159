//! Pusher identity and repository push permission.

use crate::action::{Action, Step};
use crate::chain::{Processor, PushContext};

/// Resolve the authenticated git account to a known user and verify that
/// user may push to this repository. The resolved username is recorded on
/// the action; the self-approval guard in the lifecycle compares against it.
pub struct CheckUserPushPermission;

impl Processor for CheckUserPushPermission {
    fn name(&self) -> &'static str {
        "checkUserPushPermission"
    }

    fn skipped_when_allowed(&self) -> bool {
        true
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());

        let Some(account) = ctx.user.as_deref() else {
            step.fail("Unable to determine the user pushing; no git account on the request");
            action.add_step(step);
            return action;
        };

        match ctx.directory.find_user_by_git_account(account) {
            Ok(Some(user)) => match ctx.directory.is_user_push_allowed(&ctx.repo, &user.username) {
                Ok(true) => {
                    step.log(format!("{} is allowed to push to {}", user.username, ctx.repo));
                    action.user = Some(user.username);
                }
                Ok(false) => step.fail(format!(
                    "User {} is not allowed to push to {}",
                    user.username, ctx.repo
                )),
                Err(e) => step.fail(e.client_message()),
            },
            Ok(None) => step.fail(format!("No user is linked to the git account {account}")),
            Err(e) => step.fail(e.client_message()),
        }

        action.add_step(step);
        action
    }
}
