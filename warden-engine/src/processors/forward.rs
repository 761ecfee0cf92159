//! The final step: hand the push to the upstream remote.

use crate::action::{Action, Step};
use crate::chain::{Processor, PushContext};

/// Forward the original request body to the upstream receive-pack endpoint
/// and keep its response for the client.
pub struct ForwardPush;

impl Processor for ForwardPush {
    fn name(&self) -> &'static str {
        "forwardPush"
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());

        match ctx.git.receive_pack(&ctx.url, &ctx.body) {
            Ok(response) => {
                step.log(format!(
                    "forwarded push to {} ({} response bytes)",
                    ctx.url,
                    response.len()
                ));
                action.upstream_response = Some(response);
            }
            Err(e) => step.fail(e.client_message()),
        }

        action.add_step(step);
        action
    }
}
