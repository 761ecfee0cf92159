//! Optional external pre-receive hook.
//!
//! The hook receives the ref-update line on stdin, exactly as a server-side
//! `pre-receive` would, and its exit status steers the push: 0 approves it
//! automatically, 1 rejects it, 2 defers to manual review. Auto approval
//! only pre-empts the manual-review block; the diff scan still runs.

use crate::action::{Action, Step};
use crate::chain::{Processor, PushContext};

pub struct ExecutePreReceiveHook;

impl Processor for ExecutePreReceiveHook {
    fn name(&self) -> &'static str {
        "executeExternalPreReceiveHook"
    }

    fn skipped_when_allowed(&self) -> bool {
        true
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());

        let Some(hook) = ctx.config.pre_receive_hook.as_deref() else {
            step.log("no pre-receive hook configured");
            action.add_step(step);
            return action;
        };
        if !hook.exists() {
            step.log(format!("pre-receive hook {} not present, skipping", hook.display()));
            action.add_step(step);
            return action;
        }

        let stdin = format!(
            "{} {} {}\n",
            action.commit_from.as_deref().unwrap_or_default(),
            action.commit_to.as_deref().unwrap_or_default(),
            action.branch.as_deref().unwrap_or_default()
        );
        let workdir = ctx.workdir(&action);

        match ctx.git.pre_receive_hook(hook, &workdir, stdin.as_bytes()) {
            Ok(outcome) => {
                if !outcome.stderr.is_empty() {
                    tracing::debug!(push = %action.id, "hook stderr: {}", outcome.stderr);
                }
                match outcome.exit_code {
                    0 => {
                        step.log("hook approved the push automatically");
                        action.auto_approved = true;
                    }
                    1 => {
                        step.fail("Pre-receive hook rejected this push");
                        action.auto_rejected = true;
                    }
                    2 => step.log("hook requires manual review"),
                    other => step.fail(format!(
                        "Pre-receive hook returned unexpected status {other}"
                    )),
                }
            }
            Err(e) => step.fail(e.client_message()),
        }

        action.add_step(step);
        action
    }
}
