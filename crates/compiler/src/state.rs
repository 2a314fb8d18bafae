//! Per-run transpiler state
//!
//! The only mutable singleton of a run, owned by the pipeline and cleared
//! at run start. Everything is partitioned into independent maps keyed by
//! absolute source path so one run never leaks into another.

use crate::includes::IncludeDirective;
use crate::symbols::FileSymbols;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct TranspilerState {
    /// Local symbol info per source file
    pub file_symbols: HashMap<PathBuf, FileSymbols>,
    /// Function name to parameters emitted by value, per file
    pub pass_by_value: HashMap<PathBuf, HashMap<String, HashSet<String>>>,
    /// User include directives as written, per file
    pub user_includes: HashMap<PathBuf, Vec<IncludeDirective>>,
    /// Include directives resolved into emitted headers, per file
    pub header_includes: HashMap<PathBuf, Vec<String>>,
    /// Header paths already emitted this run
    pub emitted_headers: HashSet<PathBuf>,
}

impl TranspilerState {
    pub fn new() -> Self {
        TranspilerState::default()
    }

    /// Reset between independent runs
    pub fn clear(&mut self) {
        self.file_symbols.clear();
        self.pass_by_value.clear();
        self.user_includes.clear();
        self.header_includes.clear();
        self.emitted_headers.clear();
    }

    pub fn record_pass_by_value(
        &mut self,
        file: &Path,
        function: &str,
        params: HashSet<String>,
    ) {
        self.pass_by_value
            .entry(file.to_path_buf())
            .or_default()
            .insert(function.to_string(), params);
    }

    pub fn mark_header_emitted(&mut self, header: &Path) -> bool {
        self.emitted_headers.insert(header.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_resets_everything() {
        let mut state = TranspilerState::new();
        state.record_pass_by_value(
            Path::new("a.cnx"),
            "f",
            HashSet::from(["x".to_string()]),
        );
        state.mark_header_emitted(Path::new("a.h"));
        assert!(!state.pass_by_value.is_empty());

        state.clear();
        assert!(state.pass_by_value.is_empty());
        assert!(state.emitted_headers.is_empty());
    }

    #[test]
    fn test_header_emitted_once() {
        let mut state = TranspilerState::new();
        assert!(state.mark_header_emitted(Path::new("x.h")));
        assert!(!state.mark_header_emitted(Path::new("x.h")));
    }
}
