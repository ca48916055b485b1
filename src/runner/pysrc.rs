//! Helpers for the stored Python code fragments: import-line handling for the
//! `library` field and source filtering for uploads.

/// Imports every model starts with; merged into user-provided libraries
pub fn default_library() -> Vec<String> {
    vec![
        "import numpy as np".to_string(),
        "import pandas as pd".to_string(),
        "import torch".to_string(),
        "import os".to_string(),
    ]
}

/// True for `import ...` and `from ... import ...` lines
pub fn is_import_line(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("import ") || line.starts_with("from ")
}

/// Order-preserving dedup of library lines; blanks are dropped
pub fn dedup_library<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = Vec::new();
    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        if !seen.iter().any(|s: &String| s == line) {
            seen.push(line.to_string());
        }
    }
    seen
}

/// Split uploaded source into the lines the target field keeps.
///
/// The `library` field keeps only import lines; code fields keep everything
/// else, so uploading one file can fill both sides.
pub fn filter_source(content: &str, imports_only: bool) -> Vec<String> {
    content
        .lines()
        .filter(|line| is_import_line(line) == imports_only)
        .map(|line| line.to_string())
        .collect()
}
