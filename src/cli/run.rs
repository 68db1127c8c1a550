use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

use crate::config::Config;
use crate::execution::{ExecutionRequest, ExecutionService};

#[derive(Args)]
pub struct RunArgs {
    /// Script to execute, or `-` to read it from stdin
    pub file: PathBuf,
}

pub async fn run(args: RunArgs, config: Config) -> Result<()> {
    let source = read_source(&args.file).await?;
    let request = ExecutionRequest::new(source)?;

    let service = ExecutionService::new(&config);
    let output = service.execute(&request).await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn read_source(file: &PathBuf) -> Result<String> {
    if file.as_os_str() == "-" {
        let mut source = String::new();
        tokio::io::stdin()
            .read_to_string(&mut source)
            .await
            .context("Failed to read script from stdin")?;
        return Ok(source);
    }

    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_script_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("job.py");
        std::fs::write(&path, "def main():\n    return 1\n").unwrap();

        let source = read_source(&path).await.unwrap();
        assert!(ExecutionRequest::new(source).is_ok());
    }

    #[tokio::test]
    async fn missing_file_names_the_path() {
        let err = read_source(&PathBuf::from("/nonexistent/pyexec/job.py"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pyexec/job.py"));
    }
}
