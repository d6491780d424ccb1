//! Rego validator strategies
//!
//! Validates policy source text with `opa fmt` and evaluates it with
//! `opa eval` when the OPA binary is available.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;

use crate::ValidatorError;

/// Query evaluated against curation policies
pub const DEFAULT_QUERY: &str = "data.curation.policies.allow";

/// Outcome of a syntax validation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Outcome of evaluating a policy against an input document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub result: Option<Value>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// The command line that was run, if any
    pub command: Option<String>,
}

#[async_trait]
pub trait PolicyValidator: Send + Sync {
    /// Short name of the strategy, for logs
    fn strategy(&self) -> &'static str;

    async fn validate(&self, rego: &str) -> Result<ValidationReport, ValidatorError>;

    async fn evaluate(&self, rego: &str, input: &Value) -> Result<EvaluationReport, ValidatorError>;
}

fn empty_source_errors(rego: &str) -> Option<Vec<String>> {
    if rego.trim().is_empty() {
        Some(vec!["Rego content is empty.".to_string()])
    } else {
        None
    }
}

/// Reduced-confidence checks used when OPA is not installed
#[derive(Debug, Default, Clone)]
pub struct BasicValidator;

#[async_trait]
impl PolicyValidator for BasicValidator {
    fn strategy(&self) -> &'static str {
        "basic"
    }

    async fn validate(&self, rego: &str) -> Result<ValidationReport, ValidatorError> {
        if let Some(errors) = empty_source_errors(rego) {
            return Ok(ValidationReport {
                valid: false,
                errors,
                warnings: vec![],
            });
        }

        let mut errors = Vec::new();
        if !rego.contains("package") {
            errors.push("Rego policy must contain a package declaration.".to_string());
        }

        Ok(ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings: vec![
                "OPA binary not configured; performed only basic validation.".to_string(),
            ],
        })
    }

    async fn evaluate(
        &self,
        rego: &str,
        _input: &Value,
    ) -> Result<EvaluationReport, ValidatorError> {
        if let Some(errors) = empty_source_errors(rego) {
            return Ok(EvaluationReport {
                errors,
                ..EvaluationReport::default()
            });
        }

        Ok(EvaluationReport {
            warnings: vec!["OPA binary not configured; evaluation is unavailable.".to_string()],
            ..EvaluationReport::default()
        })
    }
}

/// Validation backed by the OPA command-line tool
#[derive(Debug, Clone)]
pub struct OpaValidator {
    binary: PathBuf,
    query: String,
}

impl OpaValidator {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            query: DEFAULT_QUERY.to_string(),
        }
    }
}

fn stderr_or(output: &std::process::Output, fallback: &str) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        fallback.to_string()
    } else {
        stderr
    }
}

#[async_trait]
impl PolicyValidator for OpaValidator {
    fn strategy(&self) -> &'static str {
        "opa"
    }

    async fn validate(&self, rego: &str) -> Result<ValidationReport, ValidatorError> {
        if let Some(errors) = empty_source_errors(rego) {
            return Ok(ValidationReport {
                valid: false,
                errors,
                warnings: vec![],
            });
        }

        let workdir = tempfile::tempdir()?;
        let policy_path = workdir.path().join("policy.rego");
        tokio::fs::write(&policy_path, rego).await?;

        let output = Command::new(&self.binary)
            .arg("fmt")
            .arg(&policy_path)
            .output()
            .await?;

        if !output.status.success() {
            return Ok(ValidationReport {
                valid: false,
                errors: vec![stderr_or(
                    &output,
                    "OPA returned non-zero exit status during validation.",
                )],
                warnings: vec![],
            });
        }

        Ok(ValidationReport {
            valid: true,
            ..ValidationReport::default()
        })
    }

    async fn evaluate(
        &self,
        rego: &str,
        input: &Value,
    ) -> Result<EvaluationReport, ValidatorError> {
        if let Some(errors) = empty_source_errors(rego) {
            return Ok(EvaluationReport {
                errors,
                ..EvaluationReport::default()
            });
        }

        let workdir = tempfile::tempdir()?;
        let policy_path = workdir.path().join("policy.rego");
        let input_path = workdir.path().join("input.json");
        tokio::fs::write(&policy_path, rego).await?;
        tokio::fs::write(&input_path, serde_json::to_vec(input)?).await?;

        let args = vec![
            "eval".to_string(),
            "-f".to_string(),
            "json".to_string(),
            "-i".to_string(),
            input_path.display().to_string(),
            "-d".to_string(),
            policy_path.display().to_string(),
            self.query.clone(),
        ];
        let command = format!("{} {}", self.binary.display(), args.join(" "));

        let output = Command::new(&self.binary).args(&args).output().await?;

        let mut report = EvaluationReport {
            command: Some(command),
            ..EvaluationReport::default()
        };

        if !output.status.success() {
            report
                .errors
                .push(stderr_or(&output, "OPA evaluation failed."));
            return Ok(report);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() {
            report
                .warnings
                .push("OPA returned an empty result set.".to_string());
            return Ok(report);
        }

        match serde_json::from_str::<Value>(&stdout) {
            Ok(parsed) => report.result = Some(parsed),
            Err(_) => report.errors.push("Failed to parse OPA output.".to_string()),
        }
        Ok(report)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Search the directories of a `PATH`-style list for an executable `name`
fn find_in(paths: &std::ffi::OsStr, name: &str) -> Option<PathBuf> {
    std::env::split_paths(paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    find_in(&std::env::var_os("PATH")?, name)
}

/// Choose the validation strategy once, at startup.
///
/// An explicitly configured binary wins; otherwise `opa` is looked up on
/// `PATH`; otherwise the basic fallback is used.
pub fn select_validator(configured: Option<&Path>) -> Arc<dyn PolicyValidator> {
    let binary = configured
        .map(Path::to_path_buf)
        .or_else(|| find_on_path("opa"));

    match binary {
        Some(binary) => {
            tracing::info!("Using OPA validator at {}", binary.display());
            Arc::new(OpaValidator::new(binary))
        }
        None => {
            tracing::warn!("OPA binary not found; falling back to basic rego validation");
            Arc::new(BasicValidator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("", false, 1)]
    #[case("   \n", false, 1)]
    #[case("allow := true", false, 1)]
    #[case("package curation.policies\nallow := true", true, 0)]
    #[tokio::test]
    async fn test_basic_validation(
        #[case] rego: &str,
        #[case] valid: bool,
        #[case] error_count: usize,
    ) {
        let report = BasicValidator.validate(rego).await.unwrap();
        assert_eq!(report.valid, valid);
        assert_eq!(report.errors.len(), error_count);
    }

    #[tokio::test]
    async fn test_basic_validation_warns_about_reduced_checks() {
        let report = BasicValidator
            .validate("package curation.policies")
            .await
            .unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("basic validation"));
    }

    #[tokio::test]
    async fn test_basic_evaluation_is_unavailable() {
        let report = BasicValidator
            .evaluate("package x", &json!({}))
            .await
            .unwrap();
        assert!(report.result.is_none());
        assert!(report.errors.is_empty());
        assert!(report.command.is_none());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_configured_binary_selects_opa() {
        let validator = select_validator(Some(Path::new("/opt/opa/bin/opa")));
        assert_eq!(validator.strategy(), "opa");
    }

    #[cfg(unix)]
    #[test]
    fn test_path_lookup_skips_non_executable_files() {
        use std::os::unix::fs::PermissionsExt;

        let plain = tempfile::tempdir().unwrap();
        let runnable = tempfile::tempdir().unwrap();
        for dir in [&plain, &runnable] {
            std::fs::write(dir.path().join("opa"), "#!/bin/sh\n").unwrap();
        }
        std::fs::set_permissions(
            plain.path().join("opa"),
            std::fs::Permissions::from_mode(0o644),
        )
        .unwrap();
        std::fs::set_permissions(
            runnable.path().join("opa"),
            std::fs::Permissions::from_mode(0o755),
        )
        .unwrap();

        let only_plain = std::env::join_paths([plain.path()]).unwrap();
        assert_eq!(find_in(&only_plain, "opa"), None);

        let both = std::env::join_paths([plain.path(), runnable.path()]).unwrap();
        assert_eq!(find_in(&both, "opa"), Some(runnable.path().join("opa")));
    }

    #[tokio::test]
    async fn test_opa_rejects_empty_source_without_running() {
        let validator = OpaValidator::new("/nonexistent/opa");
        let report = validator.validate("").await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Rego content is empty."]);
    }

    #[tokio::test]
    async fn test_opa_missing_binary_is_io_error() {
        let validator = OpaValidator::new("/nonexistent/opa");
        let err = validator.validate("package x").await.unwrap_err();
        assert!(matches!(err, ValidatorError::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_opa_strategy_against_stub_binary() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let stub = dir.path().join("opa");
        std::fs::write(
            &stub,
            r#"#!/bin/sh
if [ "$1" = "fmt" ]; then
  if grep -q "^package" "$2"; then exit 0; fi
  echo "rego_parse_error: package expected" >&2
  exit 1
fi
if [ "$1" = "eval" ]; then
  echo '{"result":[{"expressions":[{"value":true}]}]}'
  exit 0
fi
exit 2
"#,
        )
        .unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let validator = OpaValidator::new(&stub);

        let ok = validator.validate("package curation.policies").await.unwrap();
        assert!(ok.valid);
        assert!(ok.errors.is_empty());

        let bad = validator.validate("allow := true").await.unwrap();
        assert!(!bad.valid);
        assert_eq!(bad.errors, vec!["rego_parse_error: package expected"]);

        let eval = validator
            .evaluate("package curation.policies", &json!({"severity": "high"}))
            .await
            .unwrap();
        assert_eq!(
            eval.result,
            Some(json!({"result": [{"expressions": [{"value": true}]}]}))
        );
        let command = eval.command.unwrap();
        assert!(command.contains("eval -f json -i"));
        assert!(command.ends_with(DEFAULT_QUERY));
    }
}
