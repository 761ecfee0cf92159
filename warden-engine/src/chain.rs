//! The ordered processor pipeline.
//!
//! A [`Chain`] is data: an ordered list of boxed [`Processor`]s assembled
//! per traffic type. Execution threads one [`Action`] through the list,
//! halting on the first error or asynchronous block; cleanup, the audit
//! write and any hook-requested auto decision always run afterwards,
//! whatever happened in between.

use std::path::PathBuf;
use std::sync::Arc;

use crate::action::{Action, ActionKind};
use crate::config::PolicyConfig;
use crate::directory::Directory;
use crate::git::{self, GitRunner};
use crate::lifecycle::ApprovalService;
use crate::processors;
use crate::store::PushStore;

/// Everything a processor may consult while handling one request.
///
/// The action itself is not here; it is threaded through [`Processor::run`]
/// as a value.
pub struct PushContext {
    pub config: Arc<PolicyConfig>,
    pub store: Arc<dyn PushStore>,
    pub directory: Arc<dyn Directory>,
    pub git: Arc<dyn GitRunner>,
    /// Repository as `project/name`.
    pub repo: String,
    /// Remote URL for the working clone and the forward.
    pub url: String,
    /// Authenticated Git hosting account of the pusher, when known.
    pub user: Option<String>,
    /// Raw receive-pack request body.
    pub body: Vec<u8>,
}

impl PushContext {
    /// The exclusive working clone for this push.
    pub fn workdir(&self, action: &Action) -> PathBuf {
        git::workdir_for(&self.config.workdir_root, &action.id)
    }

    /// The organization (project) part of the repository key.
    pub fn organization(&self) -> &str {
        self.repo.split('/').next().unwrap_or("")
    }
}

/// One step of the pipeline.
pub trait Processor: Send + Sync {
    /// Stable step name recorded on the audit trail.
    fn name(&self) -> &'static str;

    /// Handle the action, returning it (with a new step appended).
    fn run(&self, ctx: &PushContext, action: Action) -> Action;

    /// Policy and approval steps are bypassed once a push has been
    /// authorised and re-delivered; parsing, the working clone and the
    /// forward still run.
    fn skipped_when_allowed(&self) -> bool {
        false
    }
}

/// An ordered processor pipeline for one traffic type.
pub struct Chain {
    processors: Vec<Box<dyn Processor>>,
}

impl Chain {
    /// The full push pipeline, in policy order.
    pub fn for_push() -> Self {
        Chain {
            processors: vec![
                Box::new(processors::ParsePackFile),
                Box::new(processors::CheckRepoInAuthorisedList),
                Box::new(processors::CheckIfWaitingAuth),
                Box::new(processors::CheckAuthorEmails),
                Box::new(processors::CheckCommitMessages),
                Box::new(processors::PullRemote),
                Box::new(processors::WritePack),
                Box::new(processors::ExecutePreReceiveHook),
                Box::new(processors::GetDiff),
                Box::new(processors::ScanDiff),
                Box::new(processors::CheckUserPushPermission),
                Box::new(processors::BlockForAuth),
                Box::new(processors::ForwardPush),
            ],
        }
    }

    /// Pulls only pass the repository allow-list.
    pub fn for_pull() -> Self {
        Chain {
            processors: vec![Box::new(processors::CheckRepoInAuthorisedList)],
        }
    }

    /// The step names in execution order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Run the pipeline over one intercepted request.
    pub fn execute(&self, ctx: &PushContext, kind: ActionKind) -> Action {
        let mut action = Action::new(kind, &ctx.repo, &ctx.url);

        for processor in &self.processors {
            if action.allow_push && processor.skipped_when_allowed() {
                tracing::debug!(step = processor.name(), push = %action.id, "skipped, push already authorised");
                continue;
            }
            tracing::info!(step = processor.name(), push = %action.id, "executing");
            action = processor.run(ctx, action);
            if !action.continue_ok() {
                tracing::info!(
                    step = processor.name(),
                    push = %action.id,
                    error = action.error,
                    blocked = action.blocked,
                    "chain halted"
                );
                break;
            }
        }

        self.finish(ctx, &mut action);
        action
    }

    /// The part that always runs: working-clone cleanup, the audit write
    /// and any auto decision the pre-receive hook requested.
    fn finish(&self, ctx: &PushContext, action: &mut Action) {
        if !action.id.is_empty() {
            let workdir = ctx.workdir(action);
            if workdir.exists() {
                if let Err(e) = std::fs::remove_dir_all(&workdir) {
                    tracing::warn!(push = %action.id, "failed to remove working clone: {e}");
                }
            }

            if let Err(e) = ctx.store.write_audit(action) {
                tracing::error!(push = %action.id, "audit write failed: {e}");
                action.error = true;
                action.error_message = Some(e.client_message());
            }

            // A hook approval only stands if nothing after it failed; a
            // hook rejection always lands on the record.
            if (action.auto_approved && !action.error) || action.auto_rejected {
                let service = ApprovalService::new(
                    Arc::clone(&ctx.store),
                    Arc::clone(&ctx.directory),
                    ctx.config.attestation_questions.clone(),
                );
                if let Err(e) = service.apply_auto_decision(action) {
                    tracing::error!(push = %action.id, "auto decision failed: {e}");
                }
            }
        } else {
            // Nothing identifiable to persist; the decode failed before a
            // commit range existed.
            tracing::warn!(repo = %action.repo, "request finished without a push id, no audit written");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_chain_runs_policy_in_the_documented_order() {
        let names = Chain::for_push().step_names();
        assert_eq!(
            names,
            vec![
                "parsePackFile",
                "checkRepoInAuthorisedList",
                "checkIfWaitingAuth",
                "checkAuthorEmails",
                "checkCommitMessages",
                "pullRemote",
                "writePack",
                "executeExternalPreReceiveHook",
                "getDiff",
                "scanDiff",
                "checkUserPushPermission",
                "blockForAuth",
                "forwardPush",
            ]
        );
    }

    #[test]
    fn pull_chain_only_checks_the_allow_list() {
        assert_eq!(
            Chain::for_pull().step_names(),
            vec!["checkRepoInAuthorisedList"]
        );
    }
}
