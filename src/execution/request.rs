use regex::Regex;
use std::sync::LazyLock;

use super::error::ExecutionError;

/// A top-level `def main():`, optionally with a return annotation.
static ENTRY_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^def\s+main\s*\(\s*\)\s*(->[^:\n]*)?:").expect("entry point pattern is valid")
});

/// An untrusted script accepted for execution.
///
/// Construction only checks for a structural marker. The harness still
/// verifies at runtime that `main` exists and is callable.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    source: String,
}

impl ExecutionRequest {
    pub fn new(source: impl Into<String>) -> Result<Self, ExecutionError> {
        let source = source.into();

        if source.trim().is_empty() {
            return Err(ExecutionError::Validation("Script is required".to_string()));
        }

        if !ENTRY_POINT.is_match(&source) {
            return Err(ExecutionError::Validation(
                "Script must contain a main() function".to_string(),
            ));
        }

        Ok(Self { source })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_main() {
        assert!(ExecutionRequest::new("def main():\n    return 1\n").is_ok());
    }

    #[test]
    fn accepts_annotated_main() {
        assert!(ExecutionRequest::new("def main() -> dict:\n    return {}\n").is_ok());
        assert!(ExecutionRequest::new("def main( ):\n    return {}\n").is_ok());
    }

    #[test]
    fn rejects_empty_script() {
        let err = ExecutionRequest::new("  \n").unwrap_err();
        assert_eq!(err.to_string(), "Script is required");
    }

    #[test]
    fn rejects_script_without_main() {
        let err = ExecutionRequest::new("x = 1").unwrap_err();
        assert_eq!(err.to_string(), "Script must contain a main() function");
    }

    #[test]
    fn rejects_main_with_parameters() {
        assert!(ExecutionRequest::new("def main(x):\n    return x\n").is_err());
    }

    #[test]
    fn rejects_nested_main() {
        let source = "class A:\n    def main():\n        return 1\n";
        assert!(ExecutionRequest::new(source).is_err());
    }

    #[test]
    fn source_is_preserved() {
        let source = "def main():\n    return 'x'";
        let request = ExecutionRequest::new(source).unwrap();
        assert_eq!(request.source(), source);
    }
}
