//! Error classification for the push engine.
//!
//! Every failure carries a stable [`Kind`] for programmatic handling and a
//! [`client_message`](Error::client_message) that is safe to echo back to the
//! pushing Git client. Internals (paths, stderr, store details) go to the
//! `tracing` logs only.

/// Stable high-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Malformed wire data from the client.
    Protocol,
    /// A configured policy rejected the push.
    Policy,
    /// The acting user is not allowed to do this.
    Permission,
    /// A git invocation or the upstream remote failed or timed out.
    Upstream,
    /// The referenced push record does not exist.
    NotFound,
    /// Unexpected internal condition.
    Internal,
}

/// Error type shared by the chain, the stores and the approval lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed push body or command data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A policy check failed; the message names the rule.
    #[error("policy violation: {0}")]
    Policy(String),

    /// The acting user lacks the required permission.
    #[error("permission denied: {0}")]
    Permission(String),

    /// A git subprocess or the upstream remote failed.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// No push record exists under this id.
    #[error("push {0} not found")]
    NotFound(String),

    /// A terminal push was asked to transition again.
    #[error("push {id} is already {state}")]
    AlreadyDecided { id: String, state: &'static str },

    /// Invariant breakage inside the engine itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable error kind for programmatic handling.
    pub fn kind(&self) -> Kind {
        match self {
            Error::Protocol(_) => Kind::Protocol,
            Error::Policy(_) | Error::AlreadyDecided { .. } => Kind::Policy,
            Error::Permission(_) => Kind::Permission,
            Error::Upstream(_) => Kind::Upstream,
            Error::NotFound(_) => Kind::NotFound,
            Error::Internal(_) => Kind::Internal,
        }
    }

    /// A message safe to relay to the Git client.
    ///
    /// Policy, permission and not-found text is written for the end user
    /// already; upstream and internal failures collapse to a generic line so
    /// that stderr and engine internals never leak over the wire.
    pub fn client_message(&self) -> String {
        match self {
            Error::Protocol(msg) => format!("Your push could not be parsed: {msg}"),
            Error::Policy(msg) => format!("Your push has been blocked: {msg}"),
            Error::Permission(msg) => format!("Rejecting push: {msg}"),
            Error::NotFound(id) => format!("No push found with id {id}"),
            Error::AlreadyDecided { id, state } => {
                format!("Push {id} has already been {state}")
            }
            Error::Upstream(_) => "The upstream repository could not be reached. Please try again later.".into(),
            Error::Internal(_) => "An internal error occurred while processing your push.".into(),
        }
    }
}

impl From<warden_pack::Error> for Error {
    fn from(err: warden_pack::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::Protocol("x".into()).kind(), Kind::Protocol);
        assert_eq!(Error::Policy("x".into()).kind(), Kind::Policy);
        assert_eq!(
            Error::AlreadyDecided {
                id: "a__b".into(),
                state: "rejected"
            }
            .kind(),
            Kind::Policy
        );
        assert_eq!(Error::NotFound("a__b".into()).kind(), Kind::NotFound);
    }

    #[test]
    fn upstream_and_internal_details_never_reach_the_client() {
        let msg = Error::Upstream("fatal: /srv/repos/x.git: No such file".into()).client_message();
        assert!(!msg.contains("/srv"));
        let msg = Error::Internal("mutex poisoned".into()).client_message();
        assert!(!msg.contains("mutex"));
    }
}
