//! Diff capture and content scanning.

use crate::action::{Action, Step, ZERO_HASH};
use crate::chain::{Processor, PushContext};
use crate::error::Error;
use crate::scan;

/// Git's well-known empty tree, used as the diff base for root commits.
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Capture the unified diff of the pushed commit range from the working
/// clone.
pub struct GetDiff;

impl Processor for GetDiff {
    fn name(&self) -> &'static str {
        "getDiff"
    }

    fn skipped_when_allowed(&self) -> bool {
        true
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());

        let from = match action.commit_from.as_deref() {
            Some(from) if from != ZERO_HASH => from.to_owned(),
            _ => EMPTY_TREE.to_owned(),
        };
        let Some(to) = action.commit_to.clone() else {
            step.fail(Error::Internal("diff requested before the pack was parsed".into()).client_message());
            action.add_step(step);
            return action;
        };

        let workdir = ctx.workdir(&action);
        match ctx.git.diff(&workdir, &from, &to) {
            Ok(diff) => {
                step.log(format!("captured {} bytes of diff for {from}..{to}", diff.len()));
                action.diff = Some(diff);
            }
            Err(e) => step.fail(e.client_message()),
        }

        action.add_step(step);
        action
    }
}

/// Scan the captured diff's added lines against the configured content
/// rules. Any finding blocks the push with a grouped report; an empty or
/// non-textual diff is informational only.
pub struct ScanDiff;

impl Processor for ScanDiff {
    fn name(&self) -> &'static str {
        "scanDiff"
    }

    fn skipped_when_allowed(&self) -> bool {
        true
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());

        match action.diff.as_deref() {
            None => step.log("no diff captured, nothing to scan"),
            Some(diff) if diff.trim().is_empty() => {
                step.log("diff is empty or non-textual, nothing to scan");
            }
            Some(diff) => {
                let result = scan::scan(
                    diff,
                    &ctx.config.diff,
                    &ctx.config.private_organizations,
                    ctx.organization(),
                );
                match result {
                    Ok(findings) if findings.is_empty() => {
                        step.log("no policy findings in the diff");
                    }
                    Ok(findings) => {
                        step.content = serde_json::json!(findings
                            .iter()
                            .map(|f| {
                                serde_json::json!({
                                    "rule": f.rule,
                                    "file": f.file,
                                    "lines": f.lines,
                                })
                            })
                            .collect::<Vec<_>>());
                        step.fail(scan::report(&findings));
                    }
                    Err(e) => step.fail(e.client_message()),
                }
            }
        }

        action.add_step(step);
        action
    }
}
