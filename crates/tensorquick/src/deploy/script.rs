//! Parameter injection into deploy scripts.
//!
//! Scripts declare tunables as plain assignments such as
//! `TENSOR_QUICK_GPU_TYPE = "A100-40GB"`. Only lines of exactly that shape are
//! rewritten; this is text substitution, not parsing, so assignments split
//! across lines or using other quoting are left alone.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::JobError;

/// Prefix every overridable key carries.
pub const OVERRIDE_KEY_PREFIX: &str = "TENSOR_QUICK_";

/// Override key for the GPU type.
pub const GPU_TYPE_KEY: &str = "TENSOR_QUICK_GPU_TYPE";

static RE_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\s*)(TENSOR_QUICK_[^=]*?)\s*=\s*"([^"]*)"\s*$"#).unwrap()
});

/// Rewrites `KEY = "value"` lines whose key is in `overrides`.
///
/// Leading indentation and line endings are kept; every other line passes
/// through unchanged and in order. Returns the new text and the number of
/// rewritten lines.
pub fn apply_overrides(text: &str, overrides: &BTreeMap<String, String>) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut rewritten = 0;

    for line in text.split_inclusive('\n') {
        let (body, ending) = split_line_ending(line);

        match RE_ASSIGNMENT.captures(body) {
            Some(caps) => {
                let indent = &caps[1];
                let key = caps[2].trim_end();
                match overrides.get(key) {
                    Some(value) => {
                        out.push_str(indent);
                        out.push_str(key);
                        out.push_str(" = \"");
                        out.push_str(value);
                        out.push('"');
                        out.push_str(ending);
                        rewritten += 1;
                    }
                    None => out.push_str(line),
                }
            }
            None => out.push_str(line),
        }
    }

    (out, rewritten)
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// Applies `overrides` to the script at `path`, rewriting it in full.
pub fn apply_overrides_to_file(
    path: &Path,
    overrides: &BTreeMap<String, String>,
) -> Result<usize, JobError> {
    let script_error = |e: std::io::Error| JobError::Script {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let text = std::fs::read_to_string(path).map_err(script_error)?;
    let (updated, rewritten) = apply_overrides(&text, overrides);

    if updated != text {
        std::fs::write(path, updated).map_err(script_error)?;
    }

    log::debug!(
        "Applied {} override(s) to {}",
        rewritten,
        path.display()
    );
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu(value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(GPU_TYPE_KEY.to_string(), value.to_string())])
    }

    #[test]
    fn test_rewrites_matching_line() {
        let (out, n) = apply_overrides("TENSOR_QUICK_GPU_TYPE = \"A100-40GB\"\n", &gpu("H100"));
        assert_eq!(out, "TENSOR_QUICK_GPU_TYPE = \"H100\"\n");
        assert_eq!(n, 1);
    }

    #[test]
    fn test_keeps_indentation_and_crlf() {
        let text = "    TENSOR_QUICK_GPU_TYPE=\"T4\"\r\nx = 1\r\n";
        let (out, _) = apply_overrides(text, &gpu("L4"));
        assert_eq!(out, "    TENSOR_QUICK_GPU_TYPE = \"L4\"\r\nx = 1\r\n");
    }

    #[test]
    fn test_unknown_keys_untouched() {
        let text = "TENSOR_QUICK_TIMEOUT = \"600\"\n";
        let (out, n) = apply_overrides(text, &gpu("H100"));
        assert_eq!(out, text);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_non_literal_assignments_untouched() {
        let text = "TENSOR_QUICK_GPU_TYPE = os.environ[\"GPU\"]\nTENSOR_QUICK_GPU_TYPE = 'T4'\n";
        let (out, n) = apply_overrides(text, &gpu("H100"));
        assert_eq!(out, text);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_no_trailing_newline() {
        let (out, _) = apply_overrides("import modal\nTENSOR_QUICK_GPU_TYPE = \"T4\"", &gpu("H100"));
        assert_eq!(out, "import modal\nTENSOR_QUICK_GPU_TYPE = \"H100\"");
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(apply_overrides("", &gpu("H100")), (String::new(), 0));
    }

    #[test]
    fn test_file_rewrite() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("flux.py");
        std::fs::write(&path, "import modal\nTENSOR_QUICK_GPU_TYPE = \"A100-40GB\"\n").unwrap();

        assert_eq!(apply_overrides_to_file(&path, &gpu("H100")).unwrap(), 1);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "import modal\nTENSOR_QUICK_GPU_TYPE = \"H100\"\n"
        );
    }

    #[test]
    fn test_file_missing() {
        let err = apply_overrides_to_file(Path::new("/no/such/script.py"), &gpu("H100")).unwrap_err();
        assert!(matches!(err, JobError::Script { .. }));
    }
}
