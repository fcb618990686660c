use serde::Deserialize;
use serde::Serialize;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Run,
    Submit,
}

/// One test case's outcome. `actual` is `None` (serialized as `null`) when
/// the run errored before producing a comparable value.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecOutcome {
    pub test_num: usize,
    pub input: serde_json::Value,
    pub expected: serde_json::Value,
    pub actual: Option<serde_json::Value>,
    pub passed: bool,
    pub runtime_ms: u64,
    pub stdout: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecResult {
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<ExecOutcome>,
}

impl ExecResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.passed > 0
    }

    pub fn from_outcomes(results: Vec<ExecOutcome>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = results.len() - passed;
        Self {
            passed,
            failed,
            results,
        }
    }
}
