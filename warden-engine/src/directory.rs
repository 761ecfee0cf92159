//! User and repository directory seam.
//!
//! Account administration lives outside the engine; processors and the
//! approval service consult a [`Directory`] for the authorised-repository
//! list and for who may push, approve, reject or cancel. [`MemoryDirectory`]
//! is the in-process implementation for tests and embedding.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::config::AuthorisedRepo;
use crate::error::Error;

/// A known user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    /// Linked Git hosting account, if any. Required for approving.
    pub git_account: Option<String>,
    pub admin: bool,
}

/// Read-only view of users, permissions and the repository allow-list.
pub trait Directory: Send + Sync {
    /// All repositories the proxy accepts traffic for.
    fn authorised_repos(&self) -> Result<Vec<AuthorisedRepo>, Error>;

    /// Look up a user by username.
    fn get_user(&self, username: &str) -> Result<Option<User>, Error>;

    /// Resolve the user behind a Git hosting account.
    fn find_user_by_git_account(&self, git_account: &str) -> Result<Option<User>, Error>;

    /// Whether this user may push to the repository at all.
    fn is_user_push_allowed(&self, repo: &str, username: &str) -> Result<bool, Error>;

    /// Whether this user may approve or reject the given push.
    fn can_user_approve_reject_push(&self, id: &str, username: &str) -> Result<bool, Error>;

    /// Whether this user may cancel the given push.
    fn can_user_cancel_push(&self, id: &str, username: &str) -> Result<bool, Error>;
}

/// In-memory [`Directory`] with explicit permission sets.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    repos: Vec<AuthorisedRepo>,
    users: BTreeMap<String, User>,
    /// `repo -> usernames` allowed to push.
    pushers: BTreeMap<String, Vec<String>>,
    /// Usernames allowed to approve or reject any push.
    approvers: Vec<String>,
    /// Usernames allowed to cancel any push.
    cancelers: Vec<String>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, Error> {
        self.inner
            .lock()
            .map_err(|_| Error::Internal("directory lock poisoned".into()))
    }

    pub fn add_repo(&self, repo: AuthorisedRepo) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.repos.push(repo);
        }
    }

    pub fn add_user(&self, user: User) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.users.insert(user.username.clone(), user);
        }
    }

    pub fn allow_push(&self, repo: &str, username: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .pushers
                .entry(repo.to_ascii_lowercase())
                .or_default()
                .push(username.to_owned());
        }
    }

    pub fn allow_approval(&self, username: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.approvers.push(username.to_owned());
        }
    }

    pub fn allow_cancel(&self, username: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.cancelers.push(username.to_owned());
        }
    }
}

impl Directory for MemoryDirectory {
    fn authorised_repos(&self) -> Result<Vec<AuthorisedRepo>, Error> {
        Ok(self.lock()?.repos.clone())
    }

    fn get_user(&self, username: &str) -> Result<Option<User>, Error> {
        Ok(self.lock()?.users.get(username).cloned())
    }

    fn find_user_by_git_account(&self, git_account: &str) -> Result<Option<User>, Error> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|user| user.git_account.as_deref() == Some(git_account))
            .cloned())
    }

    fn is_user_push_allowed(&self, repo: &str, username: &str) -> Result<bool, Error> {
        Ok(self
            .lock()?
            .pushers
            .get(&repo.to_ascii_lowercase())
            .is_some_and(|names| names.iter().any(|name| name == username)))
    }

    fn can_user_approve_reject_push(&self, _id: &str, username: &str) -> Result<bool, Error> {
        Ok(self.lock()?.approvers.iter().any(|name| name == username))
    }

    fn can_user_cancel_push(&self, _id: &str, username: &str) -> Result<bool, Error> {
        Ok(self.lock()?.cancelers.iter().any(|name| name == username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_account_lookup_finds_the_linked_user() {
        let dir = MemoryDirectory::new();
        dir.add_user(User {
            username: "alice".into(),
            git_account: Some("alice-gh".into()),
            admin: false,
        });
        let found = dir.find_user_by_git_account("alice-gh").unwrap().unwrap();
        assert_eq!(found.username, "alice");
        assert!(dir.find_user_by_git_account("nobody").unwrap().is_none());
    }

    #[test]
    fn push_permission_is_per_repo_and_case_insensitive_on_repo() {
        let dir = MemoryDirectory::new();
        dir.allow_push("Org/Repo", "alice");
        assert!(dir.is_user_push_allowed("org/repo", "alice").unwrap());
        assert!(!dir.is_user_push_allowed("org/other", "alice").unwrap());
        assert!(!dir.is_user_push_allowed("org/repo", "bob").unwrap());
    }
}
