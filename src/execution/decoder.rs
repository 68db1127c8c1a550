//! Splits a successful run's stdout into the JSON result and the output
//! `main()` printed.

use serde::Serialize;
use serde_json::Value;

use super::error::ProtocolError;
use super::harness::Separators;

/// The terminal result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutput {
    pub result: Value,
    pub stdout: String,
}

/// Decode `raw` using the invocation's separators.
///
/// The frame is located from the end of the stream: the trailer line gives
/// the captured output's length in bytes, the line before the captured
/// output must be the stdout separator, and the single line before that is
/// the result. Anything preceding the result separator (top-level prints) is
/// discarded.
pub fn decode(raw: &str, separators: &Separators) -> Result<ExecutionOutput, ProtocolError> {
    let body = raw.strip_suffix('\n').ok_or(ProtocolError::MissingFrame)?;
    let (rest, trailer) = body.rsplit_once('\n').ok_or(ProtocolError::MissingFrame)?;

    let declared: usize = trailer
        .strip_prefix(separators.stdout.as_str())
        .and_then(|len| len.strip_prefix(' '))
        .and_then(|len| len.parse().ok())
        .ok_or(ProtocolError::MissingFrame)?;

    let split = rest
        .len()
        .checked_sub(declared)
        .filter(|&at| rest.is_char_boundary(at))
        .ok_or(ProtocolError::LengthMismatch {
            declared,
            available: rest.len(),
        })?;
    let (head, captured) = rest.split_at(split);

    let stdout_line = format!("\n{}\n", separators.stdout);
    let head = head
        .strip_suffix(stdout_line.as_str())
        .ok_or(ProtocolError::MissingStdoutSeparator)?;

    let (preceding, result_json) = head
        .rsplit_once('\n')
        .ok_or(ProtocolError::MissingResultSeparator)?;
    if !preceding.ends_with(separators.result.as_str()) {
        return Err(ProtocolError::MissingResultSeparator);
    }

    let result = serde_json::from_str(result_json.trim()).map_err(ProtocolError::InvalidResult)?;

    Ok(ExecutionOutput {
        result,
        stdout: captured.trim().to_string(),
    })
}
