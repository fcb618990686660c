use rand::RngCore;

pub const MARKER_ENV_VAR: &str = "TUTOR_EXEC_MARKER";

/// A 128-bit hex marker generated fresh per invocation and handed to the
/// child via an environment variable. The child wraps its one JSON result
/// payload between two copies of it and writes that to the real stdout fd
/// after restoring it; anything the learner's code printed in between never
/// touches that fd, so it can't forge a passing result by printing one.
pub fn generate() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Extracts the payload between the first pair of `marker` occurrences in
/// `output`. Returns `None` if the marker doesn't appear exactly bracketing
/// some content — a missing or malformed envelope is treated as "no result",
/// never as a crash.
pub fn extract_payload<'a>(output: &'a str, marker: &str) -> Option<&'a str> {
    let start = output.find(marker)? + marker.len();
    let rest = &output[start..];
    let end = rest.find(marker)?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_markers_are_32_hex_chars_and_unique() {
        let a = generate();
        let b = generate();
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn extracts_payload_between_markers() {
        let marker = "deadbeef";
        let output = format!("noise before\n{marker}{{\"ok\":true}}{marker}\ntrailing noise");
        assert_eq!(extract_payload(&output, marker), Some(r#"{"ok":true}"#));
    }

    #[test]
    fn missing_marker_yields_none() {
        assert_eq!(extract_payload("no markers here", "deadbeef"), None);
    }

    #[test]
    fn only_one_marker_occurrence_yields_none() {
        let marker = "deadbeef";
        let output = format!("{marker}unterminated");
        assert_eq!(extract_payload(&output, marker), None);
    }
}
