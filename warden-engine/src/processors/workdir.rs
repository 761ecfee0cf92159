//! Working-clone management: clone the remote, apply the client's pack.

use crate::action::{Action, Step};
use crate::chain::{Processor, PushContext};
use crate::error::Error;

/// Clone the remote into the push's exclusive working directory.
///
/// The directory is keyed by push id; finding it already present means
/// another worker owns this push, and the step fails fast rather than
/// sharing the clone.
pub struct PullRemote;

impl Processor for PullRemote {
    fn name(&self) -> &'static str {
        "pullRemote"
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());
        let workdir = ctx.workdir(&action);

        if workdir.exists() {
            step.fail(format!(
                "Push {} is already being processed",
                action.id
            ));
        } else if let Err(e) = std::fs::create_dir_all(&ctx.config.workdir_root) {
            step.fail(Error::Internal(format!("cannot create workdir root: {e}")).client_message());
        } else {
            match ctx.git.clone_repo(&ctx.url, &workdir) {
                Ok(()) => {
                    step.log(format!("cloned {} into {}", ctx.url, workdir.display()));
                    if let Some(branch) = action.branch.as_deref() {
                        match ctx.git.fetch(&workdir, branch) {
                            Ok(()) => step.log(format!("fetched {branch} from origin")),
                            Err(e) => step.fail(e.client_message()),
                        }
                    }
                }
                Err(e) => step.fail(e.client_message()),
            }
        }

        action.add_step(step);
        action
    }
}

/// Apply the raw pack from the request body to the working clone, making
/// the pushed commits resolvable for diffing and hooks.
pub struct WritePack;

impl Processor for WritePack {
    fn name(&self) -> &'static str {
        "writePack"
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());
        let workdir = ctx.workdir(&action);

        match ctx.git.write_pack(&workdir, &ctx.body) {
            Ok(()) => step.log(format!("applied {} body bytes to the working clone", ctx.body.len())),
            Err(e) => step.fail(e.client_message()),
        }

        action.add_step(step);
        action
    }
}
