/*!
Wire-level decoding of Git smart-HTTP push bodies.

A `git-receive-pack` request body consists of a packet-line framed head-info
section (the ref update command plus capabilities), terminated by a flush
packet, followed by a PACK v2 object stream. This crate reconstructs from
those raw bytes the minimum a push-policy engine needs:

- the single ref update triple `(old, new, refname)`, and
- `CommitData` for every commit object carried by the pack.

It is deliberately not a general Git implementation: no object database, no
delta resolution, no reference store. Decoding is pure and allocation-bounded;
all I/O stays with the caller.
*/

#![forbid(unsafe_code)]

pub mod commit;
pub mod pack;
pub mod pktline;

pub use commit::CommitData;
pub use pack::{ObjectKind, ObjectRecord, PackMeta};
pub use pktline::RefUpdate;

use gix_hash::ObjectId;

/// Stable high-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Malformed packet-line framing or command syntax.
    Protocol,
    /// Malformed PACK stream (signature, headers, zlib bodies).
    Pack,
    /// A commit object that does not follow the commit grammar.
    Commit,
}

/// Error type for push-body decoding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Packet-line framing or ref-update command errors.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// PACK signature, entry header or compression errors.
    #[error("invalid PACK data structure: {0}")]
    Pack(String),
    /// Commit payloads that do not parse as commits.
    #[error("invalid commit data: {0}")]
    Commit(String),
}

impl Error {
    /// Fast classification helper returning a stable error kind.
    pub fn kind(&self) -> Kind {
        match self {
            Error::Protocol(_) => Kind::Protocol,
            Error::Pack(_) => Kind::Pack,
            Error::Commit(_) => Kind::Commit,
        }
    }
}

/// Everything decoded from one push body.
#[derive(Debug, Clone)]
pub struct DecodedPush {
    /// The single ref update the push carries.
    pub ref_update: RefUpdate,
    /// PACK header metadata (signature, version, entry count).
    pub meta: PackMeta,
    /// Commit metadata in object-occurrence order (newest first on the wire).
    pub commits: Vec<CommitData>,
}

/// Decode a complete `git-receive-pack` request body.
///
/// Parses the packet-line section into the single ref update, then the PACK
/// stream that follows the flush packet, keeping only commit objects. Any
/// malformed packet, entry header, zlib body or commit aborts the whole
/// decode; partial results are never returned.
pub fn decode_push(body: &[u8]) -> Result<DecodedPush, Error> {
    if body.is_empty() {
        return Err(Error::Protocol("no body found in request".into()));
    }

    let (lines, after_flush) = pktline::split_packet_lines(body)?;
    let ref_update = pktline::parse_ref_update(&lines)?;

    let (meta, objects_buf) = pack::parse_pack_meta(&body[after_flush..])?;
    let records = pack::read_objects(objects_buf, meta.entries)?;

    let mut commits = Vec::new();
    for record in &records {
        if record.kind == ObjectKind::Commit {
            commits.push(commit::parse_commit(&record.data)?);
        }
    }

    Ok(DecodedPush {
        ref_update,
        meta,
        commits,
    })
}

/// The all-zero object id used for branch creation and rootless parents.
pub fn zero_id() -> ObjectId {
    ObjectId::null(gix_hash::Kind::Sha1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::testing::pack_with_objects;
    use pretty_assertions::assert_eq;

    fn commit_payload(parent: Option<&str>, message: &str) -> Vec<u8> {
        let mut s = String::new();
        s.push_str("tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        if let Some(p) = parent {
            s.push_str(&format!("parent {p}\n"));
        }
        s.push_str("author Jane Doe <jane@example.com> 1700000000 +0000\n");
        s.push_str("committer Jane Doe <jane@example.com> 1700000001 +0000\n");
        s.push('\n');
        s.push_str(message);
        s.into_bytes()
    }

    fn push_body(commits: &[Vec<u8>]) -> Vec<u8> {
        let cmd = "1111111111111111111111111111111111111111 \
                   2222222222222222222222222222222222222222 \
                   refs/heads/main\0report-status side-band-64k";
        let mut body = format!("{:04x}{}", cmd.len() + 4, cmd).into_bytes();
        body.extend_from_slice(b"0000");
        let objects: Vec<(ObjectKind, &[u8])> = commits
            .iter()
            .map(|c| (ObjectKind::Commit, c.as_slice()))
            .collect();
        body.extend_from_slice(&pack_with_objects(&objects));
        body
    }

    #[test]
    fn decodes_a_two_commit_push() {
        let c1 = commit_payload(Some("3333333333333333333333333333333333333333"), "second\n");
        let c2 = commit_payload(None, "first\n");
        let decoded = decode_push(&push_body(&[c1, c2])).unwrap();

        assert_eq!(decoded.meta.entries, 2);
        assert_eq!(decoded.ref_update.ref_name, "refs/heads/main");
        assert_eq!(decoded.commits.len(), 2);
        assert_eq!(decoded.commits[0].message, "second\n");
        assert_eq!(
            decoded.commits[1].first_parent(),
            "0000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn empty_body_is_a_protocol_error() {
        let err = decode_push(b"").unwrap_err();
        assert_eq!(err.kind(), Kind::Protocol);
    }

    #[test]
    fn garbage_after_flush_is_a_pack_error() {
        let cmd = "1111111111111111111111111111111111111111 \
                   2222222222222222222222222222222222222222 refs/heads/main";
        let mut body = format!("{:04x}{}", cmd.len() + 4, cmd).into_bytes();
        body.extend_from_slice(b"0000");
        body.extend_from_slice(b"NOTAPACK");

        let err = decode_push(&body).unwrap_err();
        assert_eq!(err.kind(), Kind::Pack);
    }

    #[test]
    fn malformed_commit_aborts_the_whole_decode() {
        let good = commit_payload(None, "ok\n");
        let bad = b"tree not-a-hash\n\nwhatever\n".to_vec();
        let err = decode_push(&push_body(&[good, bad])).unwrap_err();
        assert_eq!(err.kind(), Kind::Commit);
    }
}
