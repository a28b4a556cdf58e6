use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::ToolError;

const CASE_SUFFIX: &str = ".case.json";

pub fn discover_cases(dir: &Path) -> Result<Vec<PathBuf>, ToolError> {
    let mut cases = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().to_string_lossy().ends_with(CASE_SUFFIX))
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();

    if cases.is_empty() {
        return Err(ToolError::CasesEmpty {
            path: dir.to_path_buf(),
        });
    }

    cases.sort();
    Ok(cases)
}
