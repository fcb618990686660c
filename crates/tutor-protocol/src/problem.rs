use serde::Deserialize;
use serde::Serialize;

/// One problem definition, loaded once from `PROBLEMS_DIR` at startup and
/// held immutably for the life of the process (see `tutor-store::catalog`).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Problem {
    pub id: String,
    pub title: String,
    pub difficulty: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Name of the function the generated driver must call.
    pub entry_point: String,
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub starter_code: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TestCase {
    pub input: serde_json::Value,
    pub expected: serde_json::Value,
}

/// Row returned by `GET /api/problems`; omits test cases and starter code so
/// the catalog listing can't leak expected answers to the client.
#[derive(Serialize, Debug, Clone)]
pub struct ProblemSummary {
    pub id: String,
    pub title: String,
    pub difficulty: String,
    pub tags: Vec<String>,
}

impl From<&Problem> for ProblemSummary {
    fn from(p: &Problem) -> Self {
        Self {
            id: p.id.clone(),
            title: p.title.clone(),
            difficulty: p.difficulty.clone(),
            tags: p.tags.clone(),
        }
    }
}
