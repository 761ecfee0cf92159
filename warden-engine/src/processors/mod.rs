//! Built-in pipeline processors.
//!
//! Each processor is a unit struct implementing [`crate::chain::Processor`];
//! the order they run in is fixed by [`crate::chain::Chain::for_push`].

mod block;
mod commits;
mod diff;
mod forward;
mod hook;
mod parse;
mod permission;
mod repo;
mod workdir;

pub use block::BlockForAuth;
pub use commits::{CheckAuthorEmails, CheckCommitMessages};
pub use diff::{GetDiff, ScanDiff};
pub use forward::ForwardPush;
pub use hook::ExecutePreReceiveHook;
pub use parse::ParsePackFile;
pub use permission::CheckUserPushPermission;
pub use repo::{CheckIfWaitingAuth, CheckRepoInAuthorisedList};
pub use workdir::{PullRemote, WritePack};
