//! Packet-line framing and the receive-pack ref-update command.
//!
//! Smart-HTTP head-info lines are framed as a 4-hex-digit ASCII length
//! (which includes the 4 prefix bytes themselves) followed by the payload;
//! a length of `0000` is a flush packet terminating the section.

use crate::Error;
use gix_hash::ObjectId;

/// The single ref update carried by a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    /// Previous tip of the ref; all-zero for branch creation.
    pub old: ObjectId,
    /// New tip of the ref.
    pub new: ObjectId,
    /// Full ref name, e.g. `refs/heads/main`.
    pub ref_name: String,
    /// Capability list after the NUL on the command line, if any.
    pub capabilities: Option<String>,
}

/// Split the packet-line section off the front of `buf`.
///
/// Returns the payload of each packet-line (without its length prefix) up to
/// the first flush packet, plus the offset of the first byte after the flush.
pub fn split_packet_lines(buf: &[u8]) -> Result<(Vec<&[u8]>, usize), Error> {
    let mut lines = Vec::new();
    let mut offset = 0usize;

    loop {
        let Some(prefix) = buf.get(offset..offset + 4) else {
            return Err(Error::Protocol(
                "truncated packet-line length prefix".into(),
            ));
        };
        let len = parse_hex_len(prefix)?;
        if len == 0 {
            // Flush packet terminates the section.
            return Ok((lines, offset + 4));
        }
        if len < 4 {
            return Err(Error::Protocol(format!(
                "packet-line length {len} is shorter than its own prefix"
            )));
        }
        let Some(payload) = buf.get(offset + 4..offset + len) else {
            return Err(Error::Protocol(format!(
                "packet-line length {len} reads past the end of the buffer"
            )));
        };
        lines.push(payload);
        offset += len;
    }
}

fn parse_hex_len(prefix: &[u8]) -> Result<usize, Error> {
    if !prefix.iter().all(u8::is_ascii_hexdigit) {
        return Err(Error::Protocol(format!(
            "packet-line length '{}' is not hexadecimal",
            String::from_utf8_lossy(prefix)
        )));
    }
    let text = std::str::from_utf8(prefix).expect("hex digits are ASCII");
    usize::from_str_radix(text, 16)
        .map_err(|_| Error::Protocol(format!("packet-line length '{text}' is not hexadecimal")))
}

/// Extract the single ref-update command from the head-info lines.
///
/// A push must target exactly one branch: zero or multiple command lines is
/// a policy violation surfaced to the client before any pack parsing.
pub fn parse_ref_update(lines: &[&[u8]]) -> Result<RefUpdate, Error> {
    let mut updates = Vec::new();
    for line in lines {
        if let Some(update) = parse_command_line(line)? {
            updates.push(update);
        }
    }
    match updates.len() {
        0 => Err(Error::Protocol(
            "push contains no ref update command".into(),
        )),
        1 => Ok(updates.remove(0)),
        n => Err(Error::Protocol(format!(
            "push targets {n} refs; only single-branch pushes are accepted"
        ))),
    }
}

/// Parse one head-info line as `<old> <new> <refname>[\0capabilities]`.
///
/// Lines that do not start with 40 hex digits (e.g. `push-option=` records)
/// are ignored rather than rejected.
fn parse_command_line(line: &[u8]) -> Result<Option<RefUpdate>, Error> {
    let text = std::str::from_utf8(line)
        .map_err(|_| Error::Protocol("ref update line is not valid UTF-8".into()))?;
    let text = text.trim_end_matches('\n');

    let (cmd, caps) = match text.find('\0') {
        Some(pos) => (&text[..pos], Some(text[pos + 1..].to_string())),
        None => (text, None),
    };

    let mut parts = cmd.split(' ');
    let (Some(old_hex), Some(new_hex), Some(ref_name)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Ok(None);
    };
    if parts.next().is_some() {
        return Err(Error::Protocol(
            "unexpected tokens after refname in ref update".into(),
        ));
    }
    if !looks_like_oid(old_hex) {
        return Ok(None);
    }

    let old = parse_oid(old_hex)?;
    let new = parse_oid(new_hex)?;
    Ok(Some(RefUpdate {
        old,
        new,
        ref_name: ref_name.to_string(),
        capabilities: caps,
    }))
}

fn looks_like_oid(hex: &str) -> bool {
    hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit())
}

fn parse_oid(hex: &str) -> Result<ObjectId, Error> {
    ObjectId::from_hex(hex.as_bytes())
        .map_err(|e| Error::Protocol(format!("invalid object id '{hex}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const OLD: &str = "1111111111111111111111111111111111111111";
    const NEW: &str = "2222222222222222222222222222222222222222";

    fn pkt(payload: &str) -> Vec<u8> {
        format!("{:04x}{}", payload.len() + 4, payload).into_bytes()
    }

    #[test]
    fn flush_at_offset_zero_yields_no_lines() {
        let (lines, rest) = split_packet_lines(b"0000PACKdata").unwrap();
        assert!(lines.is_empty());
        assert_eq!(rest, 4);
    }

    #[test]
    fn buffer_ending_at_flush_has_zero_residual_bytes() {
        let mut buf = pkt("hello\n");
        buf.extend_from_slice(b"0000");
        let (lines, rest) = split_packet_lines(&buf).unwrap();
        assert_eq!(lines, vec![b"hello\n".as_slice()]);
        assert_eq!(rest, buf.len());
    }

    #[test]
    fn truncated_length_prefix_is_rejected() {
        let err = split_packet_lines(b"00").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn non_hex_length_is_rejected() {
        let err = split_packet_lines(b"zzzzrest").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn length_past_buffer_end_is_rejected() {
        let err = split_packet_lines(b"00ffshort").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn length_shorter_than_prefix_is_rejected() {
        let err = split_packet_lines(b"0003x").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn parses_command_and_strips_capabilities() {
        let line = format!("{OLD} {NEW} refs/heads/main\0report-status quiet");
        let update = parse_ref_update(&[line.as_bytes()]).unwrap();
        assert_eq!(update.old.to_string(), OLD);
        assert_eq!(update.new.to_string(), NEW);
        assert_eq!(update.ref_name, "refs/heads/main");
        assert_eq!(update.capabilities.as_deref(), Some("report-status quiet"));
    }

    #[test]
    fn zero_commands_is_rejected() {
        let err = parse_ref_update(&[b"push-option=notify".as_slice()]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn multiple_commands_are_rejected() {
        let a = format!("{OLD} {NEW} refs/heads/main");
        let b = format!("{NEW} {OLD} refs/heads/other");
        let err = parse_ref_update(&[a.as_bytes(), b.as_bytes()]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("single-branch"), "unexpected message: {msg}");
    }

    #[test]
    fn invalid_new_oid_is_rejected() {
        let line = format!("{OLD} zz22222222222222222222222222222222222222 refs/heads/main");
        let err = parse_ref_update(&[line.as_bytes()]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
