//! Connection-establishment handshake lines: the parent's `OK V<n>\n<mask>\n` (or
//! legacy `OK\n` for `V1`) response that follows a successful inbound
//! upgrade, and the query-string shape a child presents when it dials.
//!
//! The query-string parsing itself (API key, hostname, machine GUID, ...)
//! is §4.4 receiver territory and lives in `telem_stream::receiver`; this
//! module only covers the two framing lines both sides agree on once the
//! HTTP upgrade (out of scope) has handed the socket over.

use telem_types::Capability;

/// The parent's post-handshake response line(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeResponse {
    /// Legacy `OK\n`: no capability mask line follows; `V1` framing only.
    Legacy,
    /// `OK V<n>\n<mask>\n`: `n` is informational (the highest framing
    /// version bit set in `mask`), the mask itself is what both sides
    /// actually negotiated.
    Versioned {
        /// Informational version number carried on the `OK V<n>` line.
        version: u32,
        /// Negotiated capability mask, as a bit pattern.
        mask: Capability,
    },
}

/// Render the parent's response for a negotiated mask. A mask with no
/// framing-version bit beyond `V1` gets the legacy one-line form; any
/// wider mask gets the versioned two-line form.
#[must_use]
pub fn encode_handshake_response(mask: Capability) -> String {
    if mask.intersects(Capability::V2 | Capability::VN | Capability::VCAPS) {
        let version = highest_version_number(mask);
        format!("OK V{version}\n{}\n", mask.bits())
    } else {
        "OK\n".to_string()
    }
}

fn highest_version_number(mask: Capability) -> u32 {
    if mask.contains(Capability::VCAPS) {
        4
    } else if mask.contains(Capability::VN) {
        3
    } else if mask.contains(Capability::V2) {
        2
    } else {
        1
    }
}

/// Parse the parent's response out of its already-split lines (the
/// transport is line-oriented; callers read one or two lines depending on
/// whether the first is bare `"OK"`).
///
/// # Errors
/// Returns an error string if the first line isn't `"OK"`/`"OK V<n>"`, or
/// a versioned response is missing its mask line or the mask line isn't a
/// valid integer.
pub fn parse_handshake_response(lines: &[&str]) -> Result<HandshakeResponse, String> {
    let Some(first) = lines.first() else {
        return Err("empty handshake response".to_string());
    };
    if *first == "OK" {
        return Ok(HandshakeResponse::Legacy);
    }
    let Some(version_str) = first.strip_prefix("OK V") else {
        return Err(format!("unrecognized handshake response line {first:?}"));
    };
    let version: u32 = version_str.parse().map_err(|_| format!("bad version in {first:?}"))?;
    let mask_line = lines.get(1).ok_or("versioned OK response missing mask line")?;
    let bits: u32 = mask_line.parse().map_err(|_| format!("bad capability mask {mask_line:?}"))?;
    Ok(HandshakeResponse::Versioned {
        version,
        mask: Capability::from_bits_truncate(bits),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_only_mask_renders_legacy_response() {
        let response = encode_handshake_response(Capability::V1);
        assert_eq!(response, "OK\n");
    }

    #[test]
    fn wider_mask_renders_versioned_response() {
        let mask = Capability::V2 | Capability::HLABELS;
        let response = encode_handshake_response(mask);
        assert!(response.starts_with("OK V2\n"));
        let lines: Vec<&str> = response.lines().collect();
        let parsed = parse_handshake_response(&lines).unwrap();
        assert_eq!(parsed, HandshakeResponse::Versioned { version: 2, mask });
    }

    #[test]
    fn legacy_line_parses_back() {
        assert_eq!(parse_handshake_response(&["OK"]).unwrap(), HandshakeResponse::Legacy);
    }

    #[test]
    fn missing_mask_line_is_an_error() {
        assert!(parse_handshake_response(&["OK V2"]).is_err());
    }

    #[test]
    fn unrecognized_first_line_is_an_error() {
        assert!(parse_handshake_response(&["NOPE"]).is_err());
    }
}
