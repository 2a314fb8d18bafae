//! Input-to-output path resolution
//!
//! A source's output locations are derived from its path relative to the
//! input directory it came from (the longest matching prefix wins, or an
//! explicit base path when the caller sets one). The relative path is then
//! appended to two independent roots, one for code and one for headers, so
//! nested source layouts are always mirrored and never flattened.

use std::path::{Path, PathBuf};

/// Output language flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLang {
    #[default]
    C,
    Cpp,
}

impl OutputLang {
    pub fn code_extension(self) -> &'static str {
        match self {
            OutputLang::C => "c",
            OutputLang::Cpp => "cpp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    /// Input directories sorted so the longest prefix matches first
    input_dirs: Vec<PathBuf>,
    /// Explicit base path override
    base_path: Option<PathBuf>,
}

impl PathResolver {
    pub fn new(input_dirs: &[PathBuf], base_path: Option<PathBuf>) -> Self {
        let mut input_dirs: Vec<PathBuf> = input_dirs.to_vec();
        input_dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
        PathResolver {
            input_dirs,
            base_path,
        }
    }

    /// The source path relative to its input directory, or the bare file
    /// name when no input directory is a prefix
    pub fn relative(&self, source: &Path) -> PathBuf {
        if let Some(base) = &self.base_path {
            if let Ok(rel) = source.strip_prefix(base) {
                return rel.to_path_buf();
            }
        }
        for dir in &self.input_dirs {
            if let Ok(rel) = source.strip_prefix(dir) {
                return rel.to_path_buf();
            }
        }
        source
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| source.to_path_buf())
    }

    /// Output path for the emitted code file
    pub fn code_path(&self, source: &Path, out_dir: &Path, lang: OutputLang) -> PathBuf {
        out_dir
            .join(self.relative(source))
            .with_extension(lang.code_extension())
    }

    /// Output path for the emitted header. `header_out` falls back to the
    /// code output root when unset.
    pub fn header_path(
        &self,
        source: &Path,
        out_dir: &Path,
        header_out: Option<&Path>,
    ) -> PathBuf {
        let root = header_out.unwrap_or(out_dir);
        root.join(self.relative(source)).with_extension("h")
    }

    /// The self-include string for an emitted code file: the header's path
    /// relative to the header output root, always with forward slashes
    pub fn self_include(&self, source: &Path) -> String {
        let rel = self.relative(source).with_extension("h");
        path_to_include_string(&rel)
    }
}

/// Render a relative path with forward slashes for an include directive
pub fn path_to_include_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_strips_longest_prefix() {
        let resolver = PathResolver::new(
            &[PathBuf::from("/proj"), PathBuf::from("/proj/src")],
            None,
        );
        assert_eq!(
            resolver.relative(Path::new("/proj/src/Display/Utils.cnx")),
            PathBuf::from("Display/Utils.cnx")
        );
    }

    #[test]
    fn test_relative_falls_back_to_basename() {
        let resolver = PathResolver::new(&[PathBuf::from("/proj/src")], None);
        assert_eq!(
            resolver.relative(Path::new("/elsewhere/Other.cnx")),
            PathBuf::from("Other.cnx")
        );
    }

    #[test]
    fn test_base_path_override() {
        let resolver = PathResolver::new(
            &[PathBuf::from("/proj/src")],
            Some(PathBuf::from("/proj")),
        );
        assert_eq!(
            resolver.relative(Path::new("/proj/src/main.cnx")),
            PathBuf::from("src/main.cnx")
        );
    }

    #[test]
    fn test_code_and_header_paths_mirror_structure() {
        let resolver = PathResolver::new(&[PathBuf::from("/proj/src")], None);
        let source = Path::new("/proj/src/Display/Utils.cnx");
        assert_eq!(
            resolver.code_path(source, Path::new("/proj/build"), OutputLang::C),
            PathBuf::from("/proj/build/Display/Utils.c")
        );
        assert_eq!(
            resolver.code_path(source, Path::new("/proj/build"), OutputLang::Cpp),
            PathBuf::from("/proj/build/Display/Utils.cpp")
        );
        assert_eq!(
            resolver.header_path(source, Path::new("/proj/build"), Some(Path::new("/proj/include"))),
            PathBuf::from("/proj/include/Display/Utils.h")
        );
    }

    #[test]
    fn test_header_out_falls_back_to_out_dir() {
        let resolver = PathResolver::new(&[PathBuf::from("/proj/src")], None);
        assert_eq!(
            resolver.header_path(
                Path::new("/proj/src/main.cnx"),
                Path::new("/proj/build"),
                None
            ),
            PathBuf::from("/proj/build/main.h")
        );
    }

    #[test]
    fn test_self_include_keeps_directories() {
        let resolver = PathResolver::new(&[PathBuf::from("/proj/src")], None);
        assert_eq!(
            resolver.self_include(Path::new("/proj/src/Display/Utils.cnx")),
            "Display/Utils.h"
        );
        assert_eq!(
            resolver.self_include(Path::new("/proj/src/main.cnx")),
            "main.h"
        );
    }
}
