use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tutor_protocol::Problem;
use tutor_protocol::ProblemSummary;

/// The full set of problems, loaded once from `PROBLEMS_DIR` at startup and
/// held immutably behind an `Arc` for the life of the process. A malformed
/// problem file is skipped with a warning rather than aborting startup — one
/// bad file shouldn't take the whole catalog down.
#[derive(Clone)]
pub struct Catalog {
    problems: Arc<HashMap<String, Problem>>,
}

impl Catalog {
    /// Loads every `*.json` file directly under `dir`. Returns an empty
    /// catalog (not an error) if `dir` doesn't exist, matching the ambient
    /// tolerance this store applies to its other corruption cases.
    pub fn load(dir: &Path) -> Self {
        let mut problems = HashMap::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "problem catalog directory unreadable, starting empty");
                return Self {
                    problems: Arc::new(problems),
                };
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_one(&path) {
                Ok(problem) => {
                    if let Some(existing) = problems.insert(problem.id.clone(), problem) {
                        tracing::warn!(problem_id = %existing.id, path = %path.display(), "duplicate problem id, keeping the later file");
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed problem file");
                }
            }
        }

        tracing::info!(count = problems.len(), dir = %dir.display(), "loaded problem catalog");
        Self {
            problems: Arc::new(problems),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Problem> {
        self.problems.get(id)
    }

    pub fn list(&self) -> Vec<ProblemSummary> {
        let mut summaries: Vec<_> = self.problems.values().map(ProblemSummary::from).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

fn load_one(path: &Path) -> Result<Problem, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    let problem: Problem = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
    if problem.id.is_empty() {
        return Err("problem id must not be empty".to_string());
    }
    if problem.test_cases.is_empty() {
        return Err("problem must declare at least one test case".to_string());
    }
    Ok(problem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_problem(dir: &Path, filename: &str, json: &str) {
        std::fs::write(dir.join(filename), json).unwrap();
    }

    #[test]
    fn missing_directory_yields_empty_catalog() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::load(&dir.path().join("does-not-exist"));
        assert!(catalog.is_empty());
    }

    #[test]
    fn loads_well_formed_problems() {
        let dir = tempdir().unwrap();
        write_problem(
            dir.path(),
            "two-sum.json",
            r#"{"id":"two-sum","title":"Two Sum","difficulty":"easy","tags":["array"],
               "entry_point":"two_sum","test_cases":[{"input":[[2,7,11,15],9],"expected":[0,1]}]}"#,
        );
        let catalog = Catalog::load(dir.path());
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("two-sum").unwrap().title, "Two Sum");
    }

    #[test]
    fn skips_malformed_files_without_failing_the_whole_load() {
        let dir = tempdir().unwrap();
        write_problem(dir.path(), "broken.json", "{ not json");
        write_problem(
            dir.path(),
            "ok.json",
            r#"{"id":"ok","title":"Ok","difficulty":"easy","tags":[],
               "entry_point":"ok","test_cases":[{"input":[1],"expected":1}]}"#,
        );
        let catalog = Catalog::load(dir.path());
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("ok").is_some());
    }

    #[test]
    fn rejects_problems_with_no_test_cases() {
        let dir = tempdir().unwrap();
        write_problem(
            dir.path(),
            "empty.json",
            r#"{"id":"empty","title":"Empty","difficulty":"easy","tags":[],
               "entry_point":"f","test_cases":[]}"#,
        );
        let catalog = Catalog::load(dir.path());
        assert!(catalog.is_empty());
    }

    #[test]
    fn list_omits_test_cases_and_is_sorted() {
        let dir = tempdir().unwrap();
        write_problem(
            dir.path(),
            "b.json",
            r#"{"id":"b","title":"B","difficulty":"easy","tags":[],"entry_point":"f","test_cases":[{"input":1,"expected":1}]}"#,
        );
        write_problem(
            dir.path(),
            "a.json",
            r#"{"id":"a","title":"A","difficulty":"easy","tags":[],"entry_point":"f","test_cases":[{"input":1,"expected":1}]}"#,
        );
        let catalog = Catalog::load(dir.path());
        let ids: Vec<_> = catalog.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
