//! Wraps untrusted source in the runner harness.
//!
//! The submitted text is embedded verbatim; isolation is the security
//! boundary, not text filtering. After the script's top level runs, the
//! harness looks up `main`, calls it with stdout redirected into a buffer,
//! checks the return value serializes to JSON and then writes:
//!
//! ```text
//! <result separator>
//! <json result, one line>
//! <stdout separator>
//! <captured output, N bytes>
//! <stdout separator> N
//! ```
//!
//! The frame is read back from the end of the stream, so anything the script
//! prints or returns (its own source included) cannot be mistaken for it.
//!
//! Failures never write a frame. They exit with a dedicated status, a
//! diagnostic on stderr and a final `<failure marker> <status>` line so the
//! status can be told apart from a script calling `sys.exit` itself.

use uuid::Uuid;

/// `main` missing, not callable, or not callable without arguments.
pub const EXIT_MISSING_ENTRY_POINT: i32 = 3;
/// `main()` raised.
pub const EXIT_ENTRY_POINT_RAISED: i32 = 4;
/// `main()` returned a value `json.dumps` rejects.
pub const EXIT_NOT_SERIALIZABLE: i32 = 5;

/// The framing tokens for one invocation, all derived from one random token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Separators {
    pub result: String,
    pub stdout: String,
    pub failure: String,
}

impl Separators {
    /// Fresh random separators.
    pub fn generate() -> Self {
        Self::from_token(&Uuid::new_v4().simple().to_string())
    }

    pub fn from_token(token: &str) -> Self {
        Self {
            result: format!("___RESULT_SEPARATOR_{}___", token),
            stdout: format!("___STDOUT_SEPARATOR_{}___", token),
            failure: format!("___HARNESS_FAILURE_{}___", token),
        }
    }
}

/// What the harness reported on stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessStderr {
    /// Exit status the harness announced before exiting, if it failed itself.
    pub reported: Option<i32>,
    /// Stderr with the failure marker line removed.
    pub text: String,
}

/// Separate the harness's failure marker from the rest of `stderr`.
///
/// Only the last non-empty line counts; the harness writes it right before
/// exiting.
pub fn parse_stderr(stderr: &str, separators: &Separators) -> HarnessStderr {
    let trimmed = stderr.trim_end();
    let (rest, last) = trimmed.rsplit_once('\n').unwrap_or(("", trimmed));

    let reported = last
        .strip_prefix(separators.failure.as_str())
        .and_then(|status| status.trim().parse().ok());

    match reported {
        Some(status) => HarnessStderr {
            reported: Some(status),
            text: rest.to_string(),
        },
        None => HarnessStderr {
            reported: None,
            text: stderr.to_string(),
        },
    }
}

/// Build the complete program text for `source`.
pub fn build(source: &str, separators: &Separators) -> String {
    let mut program = String::with_capacity(source.len() + HARNESS_TEMPLATE.len() + 192);
    program.push_str(source);
    if !source.ends_with('\n') {
        program.push('\n');
    }
    program.push('\n');
    program.push_str(
        &HARNESS_TEMPLATE
            .replace("{missing_exit}", &EXIT_MISSING_ENTRY_POINT.to_string())
            .replace("{raised_exit}", &EXIT_ENTRY_POINT_RAISED.to_string())
            .replace("{serialize_exit}", &EXIT_NOT_SERIALIZABLE.to_string())
            .replace("{result_separator}", &separators.result)
            .replace("{stdout_separator}", &separators.stdout)
            .replace("{failure_marker}", &separators.failure),
    );
    program
}

// Imports happen inside the function so the script cannot shadow them.
// json.dumps escapes control characters, so the result is always one line.
const HARNESS_TEMPLATE: &str = r#"def __pyexec_harness():
    import contextlib
    import inspect
    import io
    import json
    import sys

    def fail(status, message):
        sys.stderr.write(message + "\n")
        sys.stderr.write("{failure_marker} %d\n" % status)
        sys.stderr.flush()
        sys.exit(status)

    entry = globals().get("main")
    if entry is None or not callable(entry):
        fail({missing_exit}, "Error: main() function not found")
    try:
        inspect.signature(entry).bind()
    except TypeError:
        fail({missing_exit}, "Error: main() must take no arguments")
    except ValueError:
        pass

    buffer = io.StringIO()
    try:
        with contextlib.redirect_stdout(buffer):
            result = entry()
    except BaseException as exc:
        fail({raised_exit}, "Error during execution: %s: %s" % (type(exc).__name__, exc))

    try:
        encoded = json.dumps(result, allow_nan=False)
    except (TypeError, ValueError, OverflowError, RecursionError) as exc:
        fail({serialize_exit}, "Error: main() must return JSON serializable data (%s)" % exc)

    captured = buffer.getvalue().encode("utf-8", "replace")
    out = sys.stdout
    out.write("{result_separator}\n")
    out.write(encoded)
    out.write("\n{stdout_separator}\n")
    out.flush()
    out.buffer.write(captured)
    out.buffer.write(b"\n{stdout_separator} %d\n" % len(captured))
    out.buffer.flush()


__pyexec_harness()
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_is_embedded_verbatim() {
        let source = "def main():\n    return {'a': \"b\\n\"}  # ___weird___ {braces}\n";
        let program = build(source, &Separators::from_token("t"));
        assert!(program.starts_with(source));
    }

    #[test]
    fn missing_trailing_newline_is_terminated() {
        let program = build("x = 1", &Separators::from_token("t"));
        assert!(program.starts_with("x = 1\n\n"));
    }

    #[test]
    fn separators_are_substituted() {
        let separators = Separators::from_token("abc123");
        let program = build("def main():\n    return 1\n", &separators);
        assert!(program.contains("___RESULT_SEPARATOR_abc123___"));
        assert!(program.contains("___STDOUT_SEPARATOR_abc123___"));
        assert!(!program.contains("{result_separator}"));
        assert!(!program.contains("{stdout_separator}"));
    }

    #[test]
    fn exit_codes_are_substituted() {
        let program = build("", &Separators::from_token("t"));
        assert!(program.contains("fail(3, "));
        assert!(program.contains("fail(4, "));
        assert!(program.contains("fail(5, "));
        assert!(!program.contains("_exit}"));
        assert!(!program.contains("{failure_marker}"));
    }

    #[test]
    fn failure_marker_is_split_from_stderr() {
        let seps = Separators::from_token("t");
        let stderr = format!("Error: main() function not found\n{} 3\n", seps.failure);

        let parsed = parse_stderr(&stderr, &seps);
        assert_eq!(parsed.reported, Some(3));
        assert_eq!(parsed.text, "Error: main() function not found");
    }

    #[test]
    fn stderr_without_marker_is_untouched() {
        let seps = Separators::from_token("t");
        let stderr = "Traceback (most recent call last):\nSystemExit: 3\n";

        let parsed = parse_stderr(stderr, &seps);
        assert_eq!(parsed.reported, None);
        assert_eq!(parsed.text, stderr);
    }

    #[test]
    fn marker_from_another_invocation_is_ignored() {
        let seps = Separators::from_token("t");
        let foreign = Separators::from_token("other");
        let stderr = format!("{} 4\n", foreign.failure);

        assert_eq!(parse_stderr(&stderr, &seps).reported, None);
    }

    #[test]
    fn generated_separators_are_distinct_and_unique() {
        let a = Separators::generate();
        let b = Separators::generate();
        assert_ne!(a.result, a.stdout);
        assert_ne!(a.stdout, a.failure);
        assert_ne!(a, b);
    }
}
