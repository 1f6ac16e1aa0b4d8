//! CI check for `#[deprecated(...)]` annotations: every one must carry a
//! `since` and a `note` that states both a removal plan and a migration
//! path, so a deprecation never lands without telling downstream crates
//! what to do about it.
//!
//! String-based rather than AST-based on purpose — zero dependencies
//! keeps this runnable in any CI image without a `syn` pull, at the cost
//! of not understanding macro-generated attributes.

use std::{
    env,
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
};

fn main() {
    if let Err(error) = run() {
        match error {
            ToolError::Io(io_error) => {
                eprintln!("conduit-deprecation-lint: failed to read a file: {io_error}");
                std::process::exit(1);
            }
            ToolError::Policy(findings) => {
                eprintln!("conduit-deprecation-lint: found deprecation annotation violations:");
                for finding in &findings {
                    eprintln!("  - {}", finding.format());
                }
                std::process::exit(1);
            }
        }
    }
}

fn run() -> Result<(), ToolError> {
    let workspace_root = workspace_root();
    let mut files = Vec::new();
    collect_rust_files(&workspace_root, &mut files)?;

    let mut findings = Vec::new();
    for path in files {
        findings.extend(inspect_file(&workspace_root, &path)?);
    }

    if findings.is_empty() {
        Ok(())
    } else {
        Err(ToolError::Policy(findings))
    }
}

/// `CARGO_MANIFEST_DIR` points at `conduit-deprecation-lint/`, directly
/// under the workspace root.
fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("conduit-deprecation-lint must live directly under the workspace root")
        .to_path_buf()
}

fn collect_rust_files(root: &Path, files: &mut Vec<PathBuf>) -> Result<(), ToolError> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(ToolError::Io)?;
        for entry in entries {
            let entry = entry.map_err(ToolError::Io)?;
            let entry_path = entry.path();
            if entry.file_type().map_err(ToolError::Io)?.is_dir() {
                if should_skip_dir(&entry_path) {
                    continue;
                }
                stack.push(entry_path);
            } else if entry_path
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("rs"))
                .unwrap_or(false)
            {
                files.push(entry_path);
            }
        }
    }
    Ok(())
}

/// Skips build output, VCS metadata, and the read-only retrieval pack —
/// none of those are this crate's own source.
fn should_skip_dir(path: &Path) -> bool {
    path.components().any(|component| {
        matches!(
            component.as_os_str().to_str(),
            Some("target" | ".git" | "examples")
        )
    })
}

fn inspect_file(workspace_root: &Path, path: &Path) -> Result<Vec<Finding>, ToolError> {
    let content = fs::read_to_string(path).map_err(ToolError::Io)?;
    let mut findings = Vec::new();

    let mut lines = content.lines().enumerate();
    while let Some((line_index, line)) = lines.next() {
        if let Some(start) = line.find("#[deprecated") {
            if !line.trim_start().starts_with("#[deprecated") {
                continue;
            }
            let mut attribute = String::from(&line[start..]);
            let mut end_line = line_index;
            while !attribute.contains(']') {
                if let Some((next_index, next_line)) = lines.next() {
                    attribute.push('\n');
                    attribute.push_str(next_line);
                    end_line = next_index;
                } else {
                    break;
                }
            }

            if let Some(messages) = validate_attribute(&attribute) {
                let relative = path
                    .strip_prefix(workspace_root)
                    .unwrap_or(path)
                    .to_path_buf();
                for message in messages {
                    findings.push(Finding {
                        path: relative.clone(),
                        line: line_index + 1,
                        span_end: end_line + 1,
                        message,
                    });
                }
            }
        }
    }

    Ok(findings)
}

fn validate_attribute(attribute: &str) -> Option<Vec<String>> {
    let mut messages = Vec::new();
    if !attribute.contains("since") {
        messages.push("missing `since` field".to_string());
    }
    if !attribute.contains("note") {
        messages.push("missing `note` field".to_string());
    }
    if attribute.contains("\"\"") {
        messages.push("`note` field is empty".to_string());
    }
    if attribute.contains("TBD") {
        messages.push("`note` must not use a TBD placeholder".to_string());
    }
    if !attribute.contains("removal:") {
        messages.push("`note` must include a `removal:` clause".to_string());
    }
    if !attribute.contains("migration:") {
        messages.push("`note` must include a `migration:` clause".to_string());
    }

    if messages.is_empty() {
        None
    } else {
        Some(messages)
    }
}

#[derive(Debug)]
struct Finding {
    path: PathBuf,
    line: usize,
    span_end: usize,
    message: String,
}

impl Finding {
    fn format(&self) -> String {
        format!(
            "{}:{}-{} {}",
            self.path.display(),
            self.line,
            self.span_end,
            self.message
        )
    }
}

#[derive(Debug)]
enum ToolError {
    Io(io::Error),
    Policy(Vec<Finding>),
}

impl From<io::Error> for ToolError {
    fn from(error: io::Error) -> Self {
        ToolError::Io(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_removal_and_migration() {
        let attr = r#"#[deprecated(since = "0.2.0", note = "old api")]"#;
        let messages = validate_attribute(attr).expect("must flag missing clauses");
        assert!(messages.iter().any(|m| m.contains("removal:")));
        assert!(messages.iter().any(|m| m.contains("migration:")));
    }

    #[test]
    fn accepts_a_complete_annotation() {
        let attr = r#"#[deprecated(since = "0.2.0", note = "removal: 0.4.0; migration: use `new_api` instead")]"#;
        assert!(validate_attribute(attr).is_none());
    }

    #[test]
    fn rejects_tbd_placeholder() {
        let attr = r#"#[deprecated(since = "0.2.0", note = "removal: TBD; migration: TBD")]"#;
        let messages = validate_attribute(attr).expect("must flag TBD");
        assert!(messages.iter().any(|m| m.contains("TBD")));
    }
}
