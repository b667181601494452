//! `.env` overrides layered on top of the supervisor's own environment.

use std::{
    io,
    path::{Path, PathBuf},
};

const ENV_FILE_NAME: &str = ".env";

/// Default lookup order: the working directory first, then the directory
/// holding the gateway binary.
pub fn default_search_paths(binary: &Path) -> Vec<PathBuf> {
    let binary_dir = binary.parent().unwrap_or_else(|| Path::new(""));
    vec![
        PathBuf::from(ENV_FILE_NAME),
        binary_dir.join(ENV_FILE_NAME),
    ]
}

/// Returns the first candidate that exists as a regular file.
pub fn find(candidates: &[PathBuf]) -> Option<&Path> {
    candidates
        .iter()
        .map(PathBuf::as_path)
        .find(|path| path.is_file())
}

pub fn load(path: &Path) -> io::Result<Vec<(String, String)>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse(&contents))
}

/// Parses `KEY=VALUE` lines. Blank lines, `#` comments and lines without `=`
/// are skipped; keys and values are trimmed.
pub fn parse(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
        .collect()
}
