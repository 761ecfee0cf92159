//! Parsing of inflated commit objects.
//!
//! A commit payload is a block of header lines (`tree`, zero or more
//! `parent`, `author`, `committer`), a blank line, then the free-form
//! message. We extract exactly the fields policy checks need and reject
//! anything structurally off rather than guessing.

use crate::Error;
use bstr::ByteSlice;
use smallvec::SmallVec;

/// One person identity line, e.g. `Jane Doe <jane@example.com> 1700000000 +0100`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

/// The fields of a commit object that matter for push policy.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommitData {
    pub tree: String,
    /// Parent ids in header order; merges have more than one, root commits none.
    pub parents: SmallVec<[String; 1]>,
    pub author: String,
    pub author_email: String,
    pub committer: String,
    pub committer_email: String,
    /// Committer timestamp, seconds since the Unix epoch.
    pub commit_timestamp: i64,
    pub message: String,
}

impl CommitData {
    /// The first parent, or the all-zero id for a root commit.
    pub fn first_parent(&self) -> &str {
        self.parents
            .first()
            .map_or("0000000000000000000000000000000000000000", String::as_str)
    }
}

/// Parse one inflated commit payload.
pub fn parse_commit(data: &[u8]) -> Result<CommitData, Error> {
    let (headers, message) = split_message(data);

    let mut tree = None;
    let mut parents = SmallVec::new();
    let mut author = None;
    let mut committer = None;

    for line in headers.lines() {
        let Some(space) = line.find_byte(b' ') else {
            // Continuation lines of multi-line headers (gpgsig etc.) start
            // with a space and never reach here with a keyword; anything
            // else without a separator is noise we pass over.
            continue;
        };
        let (key, value) = (&line[..space], &line[space + 1..]);
        match key {
            b"tree" => set_once(&mut tree, parse_oid_value("tree", value)?, "tree")?,
            b"parent" => parents.push(parse_oid_value("parent", value)?),
            b"author" => set_once(&mut author, parse_identity("author", value)?, "author")?,
            b"committer" => {
                set_once(&mut committer, parse_identity("committer", value)?, "committer")?;
            }
            _ => {}
        }
    }

    let tree = tree.ok_or_else(|| Error::Commit("missing tree header".into()))?;
    let author = author.ok_or_else(|| Error::Commit("missing author header".into()))?;
    let committer = committer.ok_or_else(|| Error::Commit("missing committer header".into()))?;

    Ok(CommitData {
        tree,
        parents,
        author: author.name,
        author_email: author.email,
        committer: committer.name,
        committer_email: committer.email,
        commit_timestamp: committer.timestamp,
        message,
    })
}

/// Split a payload at the first blank line into headers and message.
///
/// A commit without a blank line has an empty message.
fn split_message(data: &[u8]) -> (&[u8], String) {
    match data.find(b"\n\n") {
        Some(pos) => (
            &data[..pos],
            String::from_utf8_lossy(&data[pos + 2..]).into_owned(),
        ),
        None => (data, String::new()),
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, what: &str) -> Result<(), Error> {
    if slot.replace(value).is_some() {
        return Err(Error::Commit(format!("duplicate {what} header")));
    }
    Ok(())
}

fn parse_oid_value(what: &str, value: &[u8]) -> Result<String, Error> {
    if value.len() == 40 && value.iter().all(u8::is_ascii_hexdigit) {
        Ok(String::from_utf8_lossy(value).into_owned())
    } else {
        Err(Error::Commit(format!(
            "{what} header is not a 40-hex object id"
        )))
    }
}

/// Parse `name <email> epoch ±zone` out of an author or committer line.
fn parse_identity(what: &str, value: &[u8]) -> Result<Identity, Error> {
    let open = value
        .find_byte(b'<')
        .ok_or_else(|| Error::Commit(format!("{what} line has no <email>")))?;
    let close = value
        .find_byte(b'>')
        .filter(|close| *close > open)
        .ok_or_else(|| Error::Commit(format!("{what} line has no <email>")))?;

    let name = String::from_utf8_lossy(value[..open].trim()).into_owned();
    let email = String::from_utf8_lossy(&value[open + 1..close]).into_owned();

    let tail = value[close + 1..].trim();
    let mut fields = tail.split_str(" ").filter(|field| !field.is_empty());
    let epoch = fields
        .next()
        .ok_or_else(|| Error::Commit(format!("{what} line has no timestamp")))?;
    let timestamp = epoch
        .to_str()
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or_else(|| Error::Commit(format!("{what} timestamp is not a number")))?;

    // The offset is sign plus digits, e.g. `+0200` or `-0730`; anything
    // else (missing, unsigned, trailing tokens) is a malformed ident line.
    let offset = fields
        .next()
        .ok_or_else(|| Error::Commit(format!("{what} line has no timezone offset")))?;
    let well_formed = matches!(offset.first(), Some(&(b'+' | b'-')))
        && offset.len() > 1
        && offset[1..].iter().all(u8::is_ascii_digit);
    if !well_formed || fields.next().is_some() {
        return Err(Error::Commit(format!(
            "{what} timezone offset is malformed"
        )));
    }

    Ok(Identity {
        name,
        email,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TREE: &str = "87c6b9a12384e9fca54ce0b48c1e26ba82dca9e1";
    const PARENT_A: &str = "a1b2c3d4e5f6a7b8c9d0a1b2c3d4e5f6a7b8c9d0";
    const PARENT_B: &str = "1111111111111111111111111111111111111111";

    fn payload(parents: &[&str], message: &str) -> Vec<u8> {
        let mut text = format!("tree {TREE}\n");
        for parent in parents {
            text.push_str(&format!("parent {parent}\n"));
        }
        text.push_str("author Jane Doe <jane@example.com> 1714000000 +0200\n");
        text.push_str("committer CI Bot <ci@example.com> 1714000060 +0000\n");
        text.push('\n');
        text.push_str(message);
        text.into_bytes()
    }

    #[test]
    fn parses_an_ordinary_commit() {
        let commit = parse_commit(&payload(&[PARENT_A], "fix: a thing\n\nlonger body\n")).unwrap();
        assert_eq!(commit.tree, TREE);
        assert_eq!(commit.parents.as_slice(), &[PARENT_A.to_string()]);
        assert_eq!(commit.author, "Jane Doe");
        assert_eq!(commit.author_email, "jane@example.com");
        assert_eq!(commit.committer, "CI Bot");
        assert_eq!(commit.committer_email, "ci@example.com");
        assert_eq!(commit.commit_timestamp, 1714000060);
        assert_eq!(commit.message, "fix: a thing\n\nlonger body\n");
    }

    #[test]
    fn root_commit_has_no_parents_and_reports_the_zero_id() {
        let commit = parse_commit(&payload(&[], "initial\n")).unwrap();
        assert!(commit.parents.is_empty());
        assert_eq!(
            commit.first_parent(),
            "0000000000000000000000000000000000000000"
        );
    }

    #[test]
    fn merge_commit_keeps_all_parents_in_order() {
        let commit = parse_commit(&payload(&[PARENT_A, PARENT_B], "merge\n")).unwrap();
        assert_eq!(
            commit.parents.as_slice(),
            &[PARENT_A.to_string(), PARENT_B.to_string()]
        );
        assert_eq!(commit.first_parent(), PARENT_A);
    }

    #[test]
    fn missing_blank_line_means_empty_message() {
        let text = format!(
            "tree {TREE}\nauthor A <a@x> 1 +0000\ncommitter B <b@x> 2 +0000"
        );
        let commit = parse_commit(text.as_bytes()).unwrap();
        assert_eq!(commit.message, "");
        assert_eq!(commit.commit_timestamp, 2);
    }

    #[test]
    fn missing_tree_is_rejected() {
        let text = "author A <a@x> 1 +0000\ncommitter B <b@x> 2 +0000\n\nmsg";
        let err = parse_commit(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("tree"));
    }

    #[test]
    fn duplicate_committer_is_rejected() {
        let text = format!(
            "tree {TREE}\nauthor A <a@x> 1 +0000\ncommitter B <b@x> 2 +0000\ncommitter C <c@x> 3 +0000\n\nmsg"
        );
        assert!(parse_commit(text.as_bytes()).is_err());
    }

    #[test]
    fn identity_without_email_brackets_is_rejected() {
        let text = format!("tree {TREE}\nauthor Nobody 1 +0000\ncommitter B <b@x> 2 +0000\n\n");
        let err = parse_commit(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("author"));
    }

    #[test]
    fn identity_without_timestamp_is_rejected() {
        let text = format!("tree {TREE}\nauthor A <a@x>\ncommitter B <b@x> 2 +0000\n\n");
        assert!(parse_commit(text.as_bytes()).is_err());
    }

    #[test]
    fn identity_with_malformed_timezone_offset_is_rejected() {
        for tail in ["1", "1 junk", "1 +", "1 +00a0", "1 0700", "1 +0000 extra"] {
            let text = format!(
                "tree {TREE}\nauthor A <a@x> {tail}\ncommitter B <b@x> 2 +0000\n\n"
            );
            let err = parse_commit(text.as_bytes()).unwrap_err();
            assert!(err.to_string().contains("author"), "accepted {tail:?}");
        }
    }

    #[test]
    fn negative_timezone_offsets_parse() {
        let text = format!(
            "tree {TREE}\nauthor A <a@x> 1 -0730\ncommitter B <b@x> 2 -0730\n\n"
        );
        assert_eq!(parse_commit(text.as_bytes()).unwrap().commit_timestamp, 2);
    }

    #[test]
    fn identity_tolerates_extra_padding_around_the_fields() {
        let text = format!(
            "tree {TREE}\nauthor  Spaced Out   <s@x>   7  +0000\ncommitter B <b@x> 2 +0000\n\n"
        );
        let commit = parse_commit(text.as_bytes()).unwrap();
        assert_eq!(commit.author, "Spaced Out");
        assert_eq!(commit.author_email, "s@x");
    }

    #[test]
    fn gpgsig_continuation_lines_are_ignored() {
        let text = format!(
            "tree {TREE}\nauthor A <a@x> 1 +0000\ncommitter B <b@x> 2 +0000\ngpgsig -----BEGIN PGP SIGNATURE-----\n abcdef\n -----END PGP SIGNATURE-----\n\nsigned\n"
        );
        let commit = parse_commit(text.as_bytes()).unwrap();
        assert_eq!(commit.message, "signed\n");
    }
}
