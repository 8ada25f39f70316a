//! Edit-time validation for Divert rule snapshots.
//!
//! Catches rules that the engine would skip or misread before they are
//! persisted: malformed match specs, incomplete actions, duplicate ids and
//! references to missing groups. Usable as a library or through the
//! `divert-lint` binary.
//!
//! # Example
//!
//! ```no_run
//! use divert_lint::{lint_directory, lint_file, LintOptions};
//! use std::path::Path;
//!
//! let result = lint_file(Path::new("rules.json"), &LintOptions::default());
//! let all = lint_directory(Path::new("./snapshots"), &LintOptions::default());
//!
//! if !result.passes(false) || all.has_errors() {
//!     eprintln!("Found {} errors", result.errors + all.errors);
//! }
//! ```

mod types;
mod validator;

use std::path::{Path, PathBuf};

pub use types::{LintIssue, LintOptions, LintResult, Severity};
pub use validator::{validate_rule, validate_snapshot};

/// Failure to turn a file into a JSON document.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::Read(_) => "E001",
            LoadError::Parse(_) => "E002",
        }
    }

    fn into_issue(self, file: PathBuf) -> LintIssue {
        let code = self.code();
        let issue = LintIssue::error(code, self.to_string(), file);
        match code {
            "E002" => issue.with_suggestion("Check for JSON syntax errors"),
            _ => issue,
        }
    }
}

pub fn load_json(path: &Path) -> Result<serde_json::Value, LoadError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Lint a single snapshot file.
pub fn lint_file(path: &Path, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;

    match load_json(path) {
        Ok(value) => validate_snapshot(path, &value, &mut result, options),
        Err(e) => result.add_issue(e.into_issue(path.to_path_buf())),
    }
    result
}

/// Lint every `.json` file directly inside `path`, in name order.
pub fn lint_directory(path: &Path, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();

    let entries = match std::fs::read_dir(path) {
        Ok(e) => e,
        Err(e) => {
            result.add_issue(LintIssue::error(
                "E001",
                format!("Failed to read directory: {e}"),
                path.to_path_buf(),
            ));
            return result;
        }
    };

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    for file in files {
        result.merge(lint_file(&file, options));
    }
    result
}

/// Lint snapshot text held in memory, e.g. an import payload.
pub fn lint_json(json: &str, source_name: &str, options: &LintOptions) -> LintResult {
    let path = Path::new(source_name);
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(value) => lint_value(&value, source_name, options),
        Err(e) => {
            let mut result = LintResult::new();
            result.files_checked = 1;
            result.add_issue(LoadError::Parse(e).into_issue(path.to_path_buf()));
            result
        }
    }
}

pub fn lint_value(value: &serde_json::Value, source_name: &str, options: &LintOptions) -> LintResult {
    let mut result = LintResult::new();
    result.files_checked = 1;
    validate_snapshot(Path::new(source_name), value, &mut result, options);
    result
}
