//! Wire types shared between the orchestrator, the HTTP surface, and any
//! client. Nothing in this crate talks to the filesystem or spawns a
//! process; it only describes the shapes that cross a boundary.

pub mod error_code;
pub mod exec_result;
pub mod message;
pub mod problem;
pub mod session;

pub use error_code::ErrorCode;
pub use error_code::ErrorEnvelope;
pub use exec_result::ExecOutcome;
pub use exec_result::ExecResult;
pub use exec_result::RunMode;
pub use message::ClientMessage;
pub use message::ServerMessage;
pub use problem::Problem;
pub use problem::ProblemSummary;
pub use problem::TestCase;
pub use session::ChatMessage;
pub use session::InterviewPhase;
pub use session::Role;
pub use session::Session;
pub use session::SessionMode;
pub use session::SessionSummary;

/// Regex-equivalent check for the 16-hex-character session id format,
/// without pulling in a regex crate for one pattern.
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == 16 && id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// `problem_id`s are caller-supplied but bounded and restricted to a safe
/// filename alphabet so they can be used to key a counters map and (after
/// validation against the catalog) a path component.
pub fn is_valid_problem_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 100
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_validation() {
        assert!(is_valid_session_id("0123456789abcdef"));
        assert!(!is_valid_session_id("0123456789ABCDEF"));
        assert!(!is_valid_session_id("0123456789abcde"));
        assert!(!is_valid_session_id("../../etc/passwd"));
        assert!(!is_valid_session_id(""));
    }

    #[test]
    fn problem_id_validation() {
        assert!(is_valid_problem_id("two-sum"));
        assert!(is_valid_problem_id("two_sum_42"));
        assert!(!is_valid_problem_id(""));
        assert!(!is_valid_problem_id("../etc/passwd"));
        assert!(!is_valid_problem_id(&"x".repeat(101)));
    }
}
