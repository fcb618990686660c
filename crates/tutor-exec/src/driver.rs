use tutor_protocol::TestCase;

use crate::marker::MARKER_ENV_VAR;

/// Name the learner's code is written to inside the run workspace; the
/// generated driver imports it by file path so the entry point name never
/// has to match the module name.
pub const SOLUTION_FILENAME: &str = "solution.py";
pub const DRIVER_FILENAME: &str = "driver.py";

/// Renders the Python driver script that loads `solution.py`, runs every
/// test case against `entry_point`, and writes one marker-wrapped JSON
/// payload to the real stdout fd. Fd 1 is redirected away from the real
/// stdout *before* `solution.py` is ever imported — including its own
/// module-level code — and is only pointed back at the real fd in `main()`,
/// after every test has finished running and immediately before the final
/// marker-wrapped write. The marker itself is read from the environment for
/// the first time inside `main()`, after that restore, so nothing the
/// learner's code does at import time or during a test call ever runs with
/// the real stdout fd open, and a forged write to fd 1 just lands in the
/// same capture file its own test's stdout does.
pub fn render(entry_point: &str, test_cases: &[TestCase]) -> Result<String, serde_json::Error> {
    let test_cases_json = serde_json::to_string(test_cases)?;
    Ok(format!(
        r#"import importlib.util
import io
import json
import os
import sys
import time
import traceback

_REAL_STDOUT_FD = os.dup(1)
_RAW_CAPTURE_PATH = "_raw_stdout.txt"

_TEST_CASES = json.loads({test_cases_literal})
_ENTRY_POINT = {entry_point_literal}


def _redirect_stdout_to_capture():
    raw_fd = os.open(_RAW_CAPTURE_PATH, os.O_WRONLY | os.O_CREAT | os.O_TRUNC, 0o600)
    os.dup2(raw_fd, 1)
    os.close(raw_fd)


def _drain_capture():
    raw_captured = ""
    try:
        with open(_RAW_CAPTURE_PATH, "r") as f:
            raw_captured = f.read()
    except OSError:
        pass
    os.ftruncate(1, 0)
    os.lseek(1, 0, os.SEEK_SET)
    return raw_captured


def _call(fn, raw_input):
    if isinstance(raw_input, list):
        return fn(*raw_input)
    return fn(raw_input)


def _last_traceback_line():
    return traceback.format_exc().strip().splitlines()[-1]


def _run_tests():
    results = []
    try:
        spec = importlib.util.spec_from_file_location("learner_solution", {solution_path_literal})
        module = importlib.util.module_from_spec(spec)
        spec.loader.exec_module(module)
        fn = getattr(module, _ENTRY_POINT)
    except Exception:
        message = _last_traceback_line()
        import_stdout = _drain_capture()
        for i, tc in enumerate(_TEST_CASES):
            results.append({{
                "test_num": i,
                "input": tc["input"],
                "expected": tc["expected"],
                "actual": None,
                "passed": False,
                "runtime_ms": 0,
                "stdout": import_stdout if i == 0 else "",
                "error": message,
            }})
        return results

    import_stdout = _drain_capture()
    for i, tc in enumerate(_TEST_CASES):
        entry = {{
            "test_num": i,
            "input": tc["input"],
            "expected": tc["expected"],
            "actual": None,
            "passed": False,
            "runtime_ms": 0,
            "stdout": "",
        }}
        buf = io.StringIO()
        saved_stdout = sys.stdout
        sys.stdout = buf
        start = time.monotonic()
        try:
            actual = _call(fn, tc["input"])
            entry["runtime_ms"] = int((time.monotonic() - start) * 1000)
            entry["actual"] = actual
            entry["passed"] = actual == tc["expected"]
        except Exception:
            entry["runtime_ms"] = int((time.monotonic() - start) * 1000)
            entry["error"] = _last_traceback_line()
        finally:
            sys.stdout = saved_stdout
            raw_captured = _drain_capture()
            prefix = import_stdout if i == 0 else ""
            import_stdout = ""
            entry["stdout"] = prefix + buf.getvalue() + raw_captured
        results.append(entry)
    return results


def main():
    _redirect_stdout_to_capture()
    results = _run_tests()
    os.dup2(_REAL_STDOUT_FD, 1)
    marker = os.environ.get({marker_env:?}, "")
    payload = json.dumps({{"results": results}})
    os.write(1, (marker + payload + marker).encode("utf-8"))


if __name__ == "__main__":
    main()
"#,
        marker_env = MARKER_ENV_VAR,
        test_cases_literal = python_string_literal(&test_cases_json),
        entry_point_literal = python_string_literal(entry_point),
        solution_path_literal = python_string_literal(SOLUTION_FILENAME),
    ))
}

/// Renders a single-quoted Python string literal, escaping the handful of
/// characters that would otherwise break out of it. Test-case JSON is
/// attacker-controlled (it comes from the learner-selected problem's catalog
/// entry only, but driver text is still generated per run), so this never
/// trusts that the source is quote-free.
fn python_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_without_error_and_embeds_entry_point() {
        let test_cases = vec![TestCase {
            input: serde_json::json!([1, 2]),
            expected: serde_json::json!(3),
        }];
        let script = render("add", &test_cases).unwrap();
        assert!(script.contains("_ENTRY_POINT = 'add'"));
        assert!(script.contains(MARKER_ENV_VAR));
    }

    #[test]
    fn escapes_quotes_and_backslashes_in_entry_point() {
        let literal = python_string_literal("it's a \\test\\");
        assert_eq!(literal, "'it\\'s a \\\\test\\\\'");
    }
}
