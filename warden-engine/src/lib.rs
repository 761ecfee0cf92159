/*!
The policy engine of a Git push proxy.

Sitting between clients and an upstream remote, the engine subjects every
intercepted `git-receive-pack` request to an ordered chain of policy
processors: the wire body is decoded (via `warden-pack`), the repository and
user are checked against an allow-list, commit metadata and the push diff are
scanned against configured rules, and the push is either forwarded upstream,
rejected with a client-visible reason, or held for human review.

Held pushes go through an approval lifecycle (approve / reject / cancel) with
reviewer guards and attestation; an approved push is re-delivered by the
client and resumes straight at the forwarding step.

The engine owns no outer surfaces. HTTP transport, persistence, user
administration and git execution are all consumed through seams
([`store::PushStore`], [`directory::Directory`], [`git::GitRunner`]), with
in-process implementations provided for tests and embedding.
*/

#![forbid(unsafe_code)]

pub mod action;
pub mod chain;
pub mod config;
pub mod directory;
pub mod error;
pub mod git;
pub mod lifecycle;
pub mod processors;
pub mod scan;
pub mod store;

pub use action::{Action, ActionKind, Attestation, AttestationAnswer, Rejection, Step};
pub use chain::{Chain, Processor, PushContext};
pub use config::{AuthorisedRepo, CommitRules, DiffRules, PolicyConfig};
pub use directory::{Directory, MemoryDirectory, User};
pub use error::{Error, Kind};
pub use git::{FakeGitRunner, GitRunner, ProcessGitRunner};
pub use lifecycle::{ApprovalService, TransitionOutcome};
pub use store::{MemoryStore, PushQuery, PushStore};
