//! The manual-review gate.

use crate::action::{Action, Step};
use crate::chain::{Processor, PushContext};

/// Hold the push for a human decision.
///
/// Skipped entirely for pushes the pre-receive hook already approved, and a
/// no-op for repositories configured not to require review. Everything else
/// halts here as an asynchronous block and waits for the approval service.
pub struct BlockForAuth;

impl Processor for BlockForAuth {
    fn name(&self) -> &'static str {
        "blockForAuth"
    }

    fn skipped_when_allowed(&self) -> bool {
        true
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());

        if action.auto_approved {
            step.log("approved by the pre-receive hook, not blocking");
            action.add_step(step);
            return action;
        }

        match ctx.directory.authorised_repos() {
            Ok(repos) => {
                let require_review = repos
                    .iter()
                    .find(|repo| repo.matches(&ctx.repo))
                    .map_or(true, |repo| repo.require_review);
                if require_review {
                    step.block(format!(
                        "Your push has been received and is held for review.\n\
                         A reviewer can approve or reject it at {}/{}",
                        ctx.config.approval_url_base, action.id
                    ));
                } else {
                    step.log("repository does not require review");
                }
            }
            Err(e) => step.fail(e.client_message()),
        }

        action.add_step(step);
        action
    }
}
