//! Input file classification and discovery
//!
//! Files are classified purely by extension. Implementation-file extensions
//! are rejected as input with a pointed message; translation consumes only
//! `.cnx`/`.cnext` sources and sees `.h`-family files through includes.

use std::path::{Path, PathBuf};

/// What a file is, judged by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `.cnx` or `.cnext` translation input
    Source,
    /// `.h`, `.hpp`, `.hxx`
    Header,
    /// `.c`, `.cpp`, `.cc`, `.cxx`, `.c++`: never valid input
    Implementation,
    Unknown,
}

pub fn classify(path: &Path) -> FileKind {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return FileKind::Unknown;
    };
    match ext.to_ascii_lowercase().as_str() {
        "cnx" | "cnext" => FileKind::Source,
        "h" | "hpp" | "hxx" => FileKind::Header,
        "c" | "cpp" | "cc" | "cxx" | "c++" => FileKind::Implementation,
        _ => FileKind::Unknown,
    }
}

/// Validate a path given explicitly on the command line
pub fn validate_input(path: &Path) -> Result<(), String> {
    match classify(path) {
        FileKind::Source => Ok(()),
        FileKind::Implementation => Err(format!(
            "'{}' is a C/C++ implementation file and cannot be translated; \
             reference its header from a .cnx file instead",
            path.display()
        )),
        FileKind::Header => Err(format!(
            "'{}' is a header; headers are consumed through #include, not as input",
            path.display()
        )),
        FileKind::Unknown => Err(format!(
            "'{}' has an unsupported extension; expected .cnx or .cnext",
            path.display()
        )),
    }
}

/// Directory names never descended into during discovery
const IGNORED_DIRS: &[&str] = &[".git", ".pio", ".vscode", "node_modules", "build", "target"];

/// Recursively collect every source file under `dir`, sorted for
/// deterministic ordering
pub fn discover_sources(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let mut sources = Vec::new();
    walk(dir, &mut sources)?;
    sources.sort();
    Ok(sources)
}

fn walk(dir: &Path, sources: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory {}: {}", dir.display(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to read entry in {}: {}", dir.display(), e))?;
        let path = entry.path();
        if path.is_dir() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if IGNORED_DIRS.contains(&name.as_ref()) || name.starts_with('.') {
                continue;
            }
            walk(&path, sources)?;
        } else if classify(&path) == FileKind::Source {
            sources.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_classification() {
        assert_eq!(classify(Path::new("a.cnx")), FileKind::Source);
        assert_eq!(classify(Path::new("a.cnext")), FileKind::Source);
        assert_eq!(classify(Path::new("a.h")), FileKind::Header);
        assert_eq!(classify(Path::new("a.hpp")), FileKind::Header);
        assert_eq!(classify(Path::new("a.c")), FileKind::Implementation);
        assert_eq!(classify(Path::new("a.cpp")), FileKind::Implementation);
        assert_eq!(classify(Path::new("a.c++")), FileKind::Implementation);
        assert_eq!(classify(Path::new("a.txt")), FileKind::Unknown);
        assert_eq!(classify(Path::new("Makefile")), FileKind::Unknown);
    }

    #[test]
    fn test_implementation_input_rejected_with_hint() {
        let err = validate_input(Path::new("main.cpp")).unwrap_err();
        assert!(err.contains("header"));
    }

    #[test]
    fn test_unknown_input_rejected() {
        let err = validate_input(Path::new("main.py")).unwrap_err();
        assert!(err.contains("unsupported extension"));
    }

    #[test]
    fn test_discovery_recurses_and_ignores() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src/Display")).unwrap();
        fs::create_dir_all(root.join(".pio/libdeps")).unwrap();
        fs::write(root.join("src/main.cnx"), "").unwrap();
        fs::write(root.join("src/Display/Utils.cnx"), "").unwrap();
        fs::write(root.join("src/notes.txt"), "").unwrap();
        fs::write(root.join(".pio/libdeps/x.cnx"), "").unwrap();

        let sources = discover_sources(root).unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources.iter().all(|p| !p.starts_with(root.join(".pio"))));
    }
}
