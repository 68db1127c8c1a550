//! Failure taxonomy for a single script invocation.
//!
//! Every failure the pipeline can produce is one of these variants. The HTTP
//! layer maps them onto status codes; nothing downstream inspects message text.

use std::io;
use thiserror::Error;

use super::harness::{EXIT_ENTRY_POINT_RAISED, EXIT_MISSING_ENTRY_POINT, EXIT_NOT_SERIALIZABLE};

/// Exit status the interpreter itself uses for an uncaught exception or a
/// syntax error, i.e. before the harness got a chance to run.
const EXIT_UNCAUGHT: i32 = 1;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The request was rejected before anything was executed.
    #[error("{0}")]
    Validation(String),

    /// The child process exited unsuccessfully.
    #[error("{message}")]
    Execution {
        failure: ScriptFailure,
        message: String,
    },

    /// The wall-clock limit expired and the process group was terminated.
    #[error("Execution timed out after {0} seconds")]
    Timeout(u64),

    /// The process exited cleanly but its output did not follow the framing protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Artifact could not be written or the process could not be spawned.
    #[error("{context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ExecutionError {
    pub fn resource(context: impl Into<String>, source: io::Error) -> Self {
        Self::Resource {
            context: context.into(),
            source,
        }
    }

    /// Build an execution failure from a finished process, folding the
    /// captured error stream into the message when there is one.
    ///
    /// `reported` is the status the harness announced on stderr, if any.
    pub fn from_exit(
        exit_code: Option<i32>,
        signal: Option<i32>,
        reported: Option<i32>,
        stderr: &str,
    ) -> Self {
        let failure = match signal {
            Some(_) => ScriptFailure::Infrastructure,
            None => ScriptFailure::classify(exit_code, reported),
        };

        let status = match (exit_code, signal) {
            (_, Some(sig)) => format!("terminated by signal {}", sig),
            (Some(code), None) => format!("exit code {}", code),
            (None, None) => "unknown exit status".to_string(),
        };

        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            format!("Failed to execute Python code: {} ({})", failure.describe(), status)
        } else {
            format!(
                "Failed to execute Python code: {} ({}): {}",
                failure.describe(),
                status,
                stderr
            )
        };

        Self::Execution { failure, message }
    }

    /// Whether the failure is attributable to the submitted script rather
    /// than to the service or its host.
    pub fn is_caller_fault(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::Execution { failure, .. } => failure.is_caller_fault(),
            Self::Timeout(_) | Self::Protocol(_) | Self::Resource { .. } => false,
        }
    }
}

/// Classification of a non-zero exit, derived from the harness exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFailure {
    /// No zero-argument callable named `main` after the script's top level ran.
    MissingEntryPoint,
    /// `main()` raised.
    EntryPointRaised,
    /// `main()` returned something that is not JSON-serializable.
    NotSerializable,
    /// Syntax error or exception in top-level statements.
    UncaughtError,
    /// The script ended the process itself before `main()` returned.
    EarlyExit,
    /// `main()` printed more than the configured output cap.
    OutputLimit,
    /// Anything else: interpreter missing, sandbox failure, killed by a signal.
    Infrastructure,
}

impl ScriptFailure {
    /// Classify an exit status.
    ///
    /// The harness statuses only count when the harness also announced them
    /// (`reported`). The same status without the announcement came from the
    /// script's own `sys.exit`.
    pub fn classify(code: Option<i32>, reported: Option<i32>) -> Self {
        let harness_codes = EXIT_MISSING_ENTRY_POINT..=EXIT_NOT_SERIALIZABLE;
        match code {
            Some(EXIT_MISSING_ENTRY_POINT) if reported == code => Self::MissingEntryPoint,
            Some(EXIT_ENTRY_POINT_RAISED) if reported == code => Self::EntryPointRaised,
            Some(EXIT_NOT_SERIALIZABLE) if reported == code => Self::NotSerializable,
            // Only reaches here when the success frame is missing.
            Some(0) => Self::EarlyExit,
            Some(EXIT_UNCAUGHT) => Self::UncaughtError,
            Some(code) if harness_codes.contains(&code) => Self::EarlyExit,
            _ => Self::Infrastructure,
        }
    }

    pub fn is_caller_fault(self) -> bool {
        !matches!(self, Self::Infrastructure)
    }

    fn describe(self) -> &'static str {
        match self {
            Self::MissingEntryPoint => "main() function not found",
            Self::EntryPointRaised => "main() raised an exception",
            Self::NotSerializable => "main() must return JSON serializable data",
            Self::UncaughtError => "script failed before main() was called",
            Self::EarlyExit => "script exited before main() returned",
            Self::OutputLimit => "output limit exceeded",
            Self::Infrastructure => "interpreter or sandbox failure",
        }
    }
}

/// The success-path framing could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// No frame trailer at the end of stdout: the success path never ran.
    #[error("Failed to parse execution output: result frame not found")]
    MissingFrame,

    #[error("Failed to parse execution stdout: frame declares {declared} bytes of output, {available} available")]
    LengthMismatch { declared: usize, available: usize },

    #[error("Failed to parse execution result: result separator not found")]
    MissingResultSeparator,

    #[error("Failed to parse execution stdout: stdout separator not found")]
    MissingStdoutSeparator,

    #[error("Failed to parse JSON result from Python execution: {0}")]
    InvalidResult(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_harness_statuses_are_caller_faults() {
        assert_eq!(
            ScriptFailure::classify(Some(3), Some(3)),
            ScriptFailure::MissingEntryPoint
        );
        assert_eq!(
            ScriptFailure::classify(Some(4), Some(4)),
            ScriptFailure::EntryPointRaised
        );
        assert_eq!(
            ScriptFailure::classify(Some(5), Some(5)),
            ScriptFailure::NotSerializable
        );
        assert!(ScriptFailure::classify(Some(1), None).is_caller_fault());
    }

    #[test]
    fn unreported_harness_statuses_are_early_exits() {
        for code in [3, 4, 5] {
            assert_eq!(
                ScriptFailure::classify(Some(code), None),
                ScriptFailure::EarlyExit
            );
        }
        assert_eq!(
            ScriptFailure::classify(Some(0), None),
            ScriptFailure::EarlyExit
        );
        // A marker for a different status does not vouch for this one.
        assert_eq!(
            ScriptFailure::classify(Some(4), Some(3)),
            ScriptFailure::EarlyExit
        );
        assert!(ScriptFailure::EarlyExit.is_caller_fault());
    }

    #[test]
    fn other_exit_codes_are_infrastructure() {
        for code in [2, 127, 255] {
            assert_eq!(
                ScriptFailure::classify(Some(code), None),
                ScriptFailure::Infrastructure
            );
        }
        assert_eq!(
            ScriptFailure::classify(None, None),
            ScriptFailure::Infrastructure
        );
    }

    #[test]
    fn signal_death_is_infrastructure() {
        let err = ExecutionError::from_exit(None, Some(9), None, "");
        assert!(!err.is_caller_fault());
        assert!(err.to_string().contains("signal 9"));
    }

    #[test]
    fn stderr_is_included_in_message() {
        let err = ExecutionError::from_exit(
            Some(EXIT_NOT_SERIALIZABLE),
            None,
            Some(EXIT_NOT_SERIALIZABLE),
            "Error: main() must return JSON serializable data\n",
        );
        let msg = err.to_string();
        assert!(msg.contains("JSON serializable"));
        assert!(msg.contains("exit code 5"));
        assert!(err.is_caller_fault());
    }

    #[test]
    fn empty_stderr_has_no_trailing_colon() {
        let err = ExecutionError::from_exit(Some(2), None, None, "   \n");
        assert!(!err.to_string().ends_with(':'));
        assert!(!err.is_caller_fault());
    }

    #[test]
    fn protocol_and_timeout_are_not_caller_faults() {
        assert!(!ExecutionError::Protocol(ProtocolError::MissingResultSeparator).is_caller_fault());
        assert!(!ExecutionError::Timeout(30).is_caller_fault());
    }
}
