//! Wire decoding: the first processor of every push.

use crate::action::{Action, Step, ZERO_HASH};
use crate::chain::{Processor, PushContext};
use crate::error::Error;

/// Decode the raw request body into the commit range and commit metadata.
///
/// Everything downstream depends on this step: it derives the canonical
/// push id from the `(commitFrom, commitTo)` pair and stores the decoded
/// commits in chronological order.
pub struct ParsePackFile;

impl Processor for ParsePackFile {
    fn name(&self) -> &'static str {
        "parsePackFile"
    }

    fn run(&self, ctx: &PushContext, mut action: Action) -> Action {
        let mut step = Step::new(self.name());

        match warden_pack::decode_push(&ctx.body) {
            Ok(decoded) => {
                let old = decoded.ref_update.old.to_string();
                let new = decoded.ref_update.new.to_string();

                // The wire carries objects newest-first; policy wants them
                // chronological.
                let mut commits = decoded.commits;
                commits.reverse();

                // A branch creation has no old tip; anchor the range at the
                // parent of the oldest pushed commit instead.
                let from = if decoded.ref_update.old.is_null() {
                    commits
                        .first()
                        .map_or_else(|| ZERO_HASH.to_owned(), |c| c.first_parent().to_owned())
                } else {
                    old
                };

                action.set_commit_range(&from, &new);

                if commits.is_empty() {
                    // Nothing to vet means nothing to forward: an update
                    // without commit objects is an empty branch or a
                    // corrupt pack. The range is already set, so the
                    // rejection still lands on the audit trail.
                    step.fail(format!(
                        "Push rejected: no commit data found for {}",
                        decoded.ref_update.ref_name
                    ));
                } else {
                    step.log(format!(
                        "decoded {} pack entries, {} commits for {}",
                        decoded.meta.entries,
                        commits.len(),
                        decoded.ref_update.ref_name
                    ));
                    step.content = serde_json::json!({
                        "packVersion": decoded.meta.version,
                        "entries": decoded.meta.entries,
                    });
                    action.commit_data = commits;
                }
                action.branch = Some(decoded.ref_update.ref_name);
            }
            Err(e) => step.fail(Error::from(e).client_message()),
        }

        action.add_step(step);
        action
    }
}
