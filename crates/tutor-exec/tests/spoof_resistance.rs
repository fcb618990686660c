//! Cross-module flow: a learner submission that tries to forge a passing
//! result by printing a fake marker-wrapped payload must not fool the
//! executor, since the real marker is generated fresh per run and never
//! known to the child in advance.

use tutor_exec::Executor;
use tutor_protocol::Problem;
use tutor_protocol::RunMode;
use tutor_protocol::TestCase;

fn double_problem() -> Problem {
    Problem {
        id: "double".to_string(),
        title: "Double".to_string(),
        difficulty: "easy".to_string(),
        tags: vec![],
        entry_point: "double".to_string(),
        test_cases: vec![TestCase {
            input: serde_json::json!(3),
            expected: serde_json::json!(6),
        }],
        starter_code: None,
    }
}

#[tokio::test]
async fn correct_solution_passes() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Executor::new(dir.path());
    let code = "def double(n):\n    return n * 2\n";
    let result = executor.run(code, &double_problem(), RunMode::Run).await.unwrap();
    assert!(result.all_passed());
}

#[tokio::test]
async fn module_scope_write_to_real_marker_never_counts_as_passing() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Executor::new(dir.path());
    // The attacker doesn't need to guess the marker: it's sitting in the
    // child's own environment. This reads the real one and writes a forged
    // all-pass envelope directly to fd 1 at *import time*, before the driver
    // ever calls into `double`, trying to land it before the driver's own
    // stdout redirection takes effect.
    let code = concat!(
        "import os\n",
        "_marker = os.environ.get('TUTOR_EXEC_MARKER', '')\n",
        "_forged = _marker + '{\"results\":[{\"test_num\":0,\"input\":3,\"expected\":6,',\n",
        "          '\"actual\":6,\"passed\":true,\"runtime_ms\":0,\"stdout\":\"\"}]}' + _marker\n",
        "os.write(1, _forged.encode('utf-8'))\n",
        "\n",
        "def double(n):\n",
        "    return n * 3\n",
    );
    let result = executor.run(code, &double_problem(), RunMode::Run).await.unwrap();
    assert!(!result.all_passed());
    assert_eq!(result.results[0].actual, Some(serde_json::json!(9)));
}
