//! Include resolution against an ordered search-path list
//!
//! Local (`"x"`) includes that fail to resolve are warned about and passed
//! through verbatim; system (`<x>`) misses stay silent since they usually
//! name toolchain headers the translator never sees. Already-resolved paths
//! are deduplicated across consecutive calls on the same resolver.

use crate::ast::Directive;
use crate::diagnostics::Diagnostic;
use crate::files::{FileKind, classify};
use crate::lexer::classify_directive;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// First line of every generated file; transitive header walks and the
/// clean command both key off it
pub const GENERATED_BANNER: &str = "/* Generated by cnextc. Do not edit. */";

/// One resolved or unresolved include directive
#[derive(Debug, Clone)]
pub struct IncludeDirective {
    /// Path text as written in source
    pub raw: String,
    pub system: bool,
    /// Filesystem hit, when the search found one
    pub resolved: Option<PathBuf>,
    pub line: usize,
}

/// What one resolve call produced
#[derive(Debug, Default)]
pub struct ResolveOutcome {
    /// Resolved plain C/C++ headers
    pub headers: Vec<PathBuf>,
    /// Resolved C-Next sources pulled in by include
    pub cnext_includes: Vec<PathBuf>,
    /// Every directive seen, resolved or not, in source order
    pub directives: Vec<IncludeDirective>,
    pub warnings: Vec<Diagnostic>,
}

/// Resolver with per-instance dedup of already-resolved paths
#[derive(Debug, Default)]
pub struct IncludeResolver {
    seen: HashSet<PathBuf>,
}

impl IncludeResolver {
    pub fn new() -> Self {
        IncludeResolver::default()
    }

    /// Extract and resolve every `#include` in `source`, searching
    /// `search_paths` in order and taking the first hit.
    pub fn resolve(
        &mut self,
        source: &str,
        source_path: &Path,
        search_paths: &[PathBuf],
    ) -> ResolveOutcome {
        let mut outcome = ResolveOutcome::default();

        for (index, line) in source.lines().enumerate() {
            let trimmed = line.trim_start();
            if !trimmed.starts_with('#') {
                continue;
            }
            let Directive::Include { path, system } = classify_directive(trimmed) else {
                continue;
            };
            let line_number = index + 1;
            let resolved = search_paths
                .iter()
                .map(|dir| dir.join(&path))
                .find(|candidate| candidate.is_file());

            match &resolved {
                Some(hit) => {
                    let canonical = hit.canonicalize().unwrap_or_else(|_| hit.clone());
                    if self.seen.insert(canonical.clone()) {
                        match classify(&canonical) {
                            FileKind::Source => outcome.cnext_includes.push(canonical),
                            FileKind::Header => outcome.headers.push(canonical),
                            _ => {}
                        }
                    }
                }
                None if !system => {
                    outcome.warnings.push(Diagnostic::warning(
                        source_path,
                        line_number,
                        1,
                        format!(
                            "Include '{}' not found in any search path (from {})",
                            path,
                            source_path.display()
                        ),
                    ));
                }
                // System include misses are expected (toolchain headers)
                None => {}
            }

            outcome.directives.push(IncludeDirective {
                raw: path,
                system,
                resolved,
                line: line_number,
            });
        }

        outcome
    }

    /// Transitive closure of resolvable headers in dependency order, leaves
    /// first. Headers whose first line is the generated banner are skipped;
    /// cycles are broken by visited-set admission.
    pub fn resolve_transitive_headers(
        &mut self,
        source: &str,
        source_path: &Path,
        search_paths: &[PathBuf],
    ) -> Vec<PathBuf> {
        let mut ordered = Vec::new();
        let mut visited = HashSet::new();
        self.transitive_walk(source, source_path, search_paths, &mut visited, &mut ordered);
        ordered
    }

    fn transitive_walk(
        &mut self,
        source: &str,
        source_path: &Path,
        search_paths: &[PathBuf],
        visited: &mut HashSet<PathBuf>,
        ordered: &mut Vec<PathBuf>,
    ) {
        let outcome = self.resolve(source, source_path, search_paths);
        for header in outcome.headers {
            if !visited.insert(header.clone()) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&header) else {
                continue;
            };
            if content.lines().next() == Some(GENERATED_BANNER) {
                continue;
            }
            let mut nested_paths = search_paths.to_vec();
            if let Some(parent) = header.parent() {
                nested_paths.insert(0, parent.to_path_buf());
            }
            self.transitive_walk(&content, &header, &nested_paths, visited, ordered);
            ordered.push(header);
        }
    }
}

/// Depth-first walk over a file's transitive includes. The callback runs
/// before descending; returning false prunes the subtree. Cycles are broken
/// by a visited set.
pub fn walk_include_tree<F>(
    root: &Path,
    search_paths: &[PathBuf],
    mut visit: F,
) -> Result<(), String>
where
    F: FnMut(&Path, usize) -> bool,
{
    let mut visited = HashSet::new();
    walk_node(root, search_paths, 0, &mut visited, &mut visit)
}

fn walk_node<F>(
    file: &Path,
    search_paths: &[PathBuf],
    depth: usize,
    visited: &mut HashSet<PathBuf>,
    visit: &mut F,
) -> Result<(), String>
where
    F: FnMut(&Path, usize) -> bool,
{
    let canonical = file.canonicalize().unwrap_or_else(|_| file.to_path_buf());
    if !visited.insert(canonical.clone()) {
        return Ok(());
    }
    if !visit(file, depth) {
        return Ok(());
    }
    let Ok(content) = std::fs::read_to_string(file) else {
        return Ok(());
    };
    let mut nested_paths = search_paths.to_vec();
    if let Some(parent) = file.parent() {
        nested_paths.insert(0, parent.to_path_buf());
    }
    for line in content.lines() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') {
            continue;
        }
        let Directive::Include { path, .. } = classify_directive(trimmed) else {
            continue;
        };
        if let Some(hit) = nested_paths
            .iter()
            .map(|dir| dir.join(&path))
            .find(|candidate| candidate.is_file())
        {
            walk_node(&hit, search_paths, depth + 1, visited, visit)?;
        }
    }
    Ok(())
}

/// Ancestor files/directories that mark a project root
const PROJECT_MARKERS: &[&str] = &[
    "platformio.ini",
    "cnext.config.json",
    ".cnext.json",
    ".cnextrc",
    ".git",
];

/// Walk ancestors of `start` looking for a project marker
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = if start.is_dir() {
        Some(start)
    } else {
        start.parent()
    };
    while let Some(dir) = current {
        for marker in PROJECT_MARKERS {
            if dir.join(marker).exists() {
                return Some(dir.to_path_buf());
            }
        }
        current = dir.parent();
    }
    None
}

/// Build the ordered search-path list for a source file:
/// its own directory, caller extras, project `include/` and `src/`,
/// PlatformIO library folders, then Arduino library folders.
pub fn build_search_paths(source_path: &Path, extra_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(parent) = source_path.parent() {
        paths.push(parent.to_path_buf());
    }
    paths.extend(extra_dirs.iter().cloned());

    if let Some(root) = find_project_root(source_path) {
        for common in ["include", "src"] {
            let dir = root.join(common);
            if dir.is_dir() {
                paths.push(dir);
            }
        }
        let pio_ini = root.join("platformio.ini");
        if pio_ini.is_file() {
            if let Ok(content) = std::fs::read_to_string(&pio_ini) {
                paths.extend(platformio_lib_paths(&root, &content));
            }
        }
    }

    if let Some(home_dir) = home::home_dir() {
        let arduino_libs = home_dir.join("Arduino").join("libraries");
        if let Ok(entries) = std::fs::read_dir(&arduino_libs) {
            for entry in entries.flatten() {
                let lib = entry.path();
                if !lib.is_dir() {
                    continue;
                }
                paths.push(lib.clone());
                let src = lib.join("src");
                if src.is_dir() {
                    paths.push(src);
                }
            }
        }
    }

    dedup_paths(paths)
}

fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// PlatformIO library locations: `.pio/libdeps/<env>/<lib>` (plus their
/// `src/` and `include/` subfolders) and every `lib_extra_dirs` entry.
fn platformio_lib_paths(root: &Path, ini_content: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    let libdeps = root.join(".pio").join("libdeps");
    if let Ok(envs) = std::fs::read_dir(&libdeps) {
        for env in envs.flatten() {
            let env_dir = env.path();
            if !env_dir.is_dir() {
                continue;
            }
            if let Ok(libs) = std::fs::read_dir(&env_dir) {
                for lib in libs.flatten() {
                    let lib_dir = lib.path();
                    if !lib_dir.is_dir() {
                        continue;
                    }
                    paths.push(lib_dir.clone());
                    for sub in ["src", "include"] {
                        let sub_dir = lib_dir.join(sub);
                        if sub_dir.is_dir() {
                            paths.push(sub_dir);
                        }
                    }
                }
            }
        }
    }

    for value in parse_ini_multivalue(ini_content, "lib_extra_dirs") {
        let dir = if Path::new(&value).is_absolute() {
            PathBuf::from(&value)
        } else {
            root.join(&value)
        };
        if dir.is_dir() {
            paths.push(dir);
        }
    }

    paths
}

/// Parse a possibly multi-line ini key. Values may be separated by commas
/// or newlines (continuation lines are indented), quoted, and carry inline
/// `;` comments.
fn parse_ini_multivalue(content: &str, key: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut in_key = false;
    for line in content.lines() {
        let without_comment = strip_ini_comment(line);
        let trimmed = without_comment.trim();

        if in_key {
            // Continuation lines are indented; anything else ends the key
            let is_continuation =
                without_comment.starts_with([' ', '\t']) && !trimmed.is_empty();
            if is_continuation && !trimmed.contains('=') {
                push_ini_values(trimmed, &mut values);
                continue;
            }
            in_key = false;
        }

        if let Some(eq_pos) = trimmed.find('=') {
            let (lhs, rhs) = trimmed.split_at(eq_pos);
            if lhs.trim() == key {
                push_ini_values(rhs[1..].trim(), &mut values);
                in_key = true;
            }
        }
    }
    values
}

fn strip_ini_comment(line: &str) -> &str {
    match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn push_ini_values(chunk: &str, values: &mut Vec<String>) {
    for part in chunk.split(',') {
        let cleaned = part.trim().trim_matches('"').trim_matches('\'').trim();
        if !cleaned.is_empty() {
            values.push(cleaned.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_local_and_system() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("util.h"), "int util(void);\n").unwrap();
        fs::write(root.join("dep.cnx"), "u8 helper() { return 1; }\n").unwrap();

        let source = "#include \"util.h\"\n#include \"dep.cnx\"\n#include <stdint.h>\n";
        let mut resolver = IncludeResolver::new();
        let outcome = resolver.resolve(
            source,
            &root.join("main.cnx"),
            &[root.to_path_buf()],
        );
        assert_eq!(outcome.headers.len(), 1);
        assert_eq!(outcome.cnext_includes.len(), 1);
        // stdint.h misses silently
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.directives.len(), 3);
    }

    #[test]
    fn test_local_miss_warns() {
        let temp = tempdir().unwrap();
        let mut resolver = IncludeResolver::new();
        let outcome = resolver.resolve(
            "#include \"missing.h\"\n",
            &temp.path().join("main.cnx"),
            &[temp.path().to_path_buf()],
        );
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].message.contains("missing.h"));
        assert!(outcome.warnings[0].message.contains("main.cnx"));
    }

    #[test]
    fn test_dedup_across_calls() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("util.h"), "").unwrap();

        let mut resolver = IncludeResolver::new();
        let first = resolver.resolve(
            "#include \"util.h\"\n",
            &root.join("a.cnx"),
            &[root.to_path_buf()],
        );
        let second = resolver.resolve(
            "#include \"util.h\"\n",
            &root.join("b.cnx"),
            &[root.to_path_buf()],
        );
        assert_eq!(first.headers.len(), 1);
        assert_eq!(second.headers.len(), 0);
    }

    #[test]
    fn test_first_search_path_wins() {
        let temp = tempdir().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("x.h"), "// a").unwrap();
        fs::write(b.join("x.h"), "// b").unwrap();

        let mut resolver = IncludeResolver::new();
        let outcome = resolver.resolve(
            "#include \"x.h\"\n",
            &temp.path().join("main.cnx"),
            &[a.clone(), b],
        );
        assert!(outcome.headers[0].starts_with(a.canonicalize().unwrap()));
    }

    #[test]
    fn test_transitive_headers_leaves_first() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("leaf.h"), "int leaf(void);\n").unwrap();
        fs::write(root.join("mid.h"), "#include \"leaf.h\"\nint mid(void);\n").unwrap();

        let mut resolver = IncludeResolver::new();
        let ordered = resolver.resolve_transitive_headers(
            "#include \"mid.h\"\n",
            &root.join("main.cnx"),
            &[root.to_path_buf()],
        );
        assert_eq!(ordered.len(), 2);
        assert!(ordered[0].ends_with("leaf.h"));
        assert!(ordered[1].ends_with("mid.h"));
    }

    #[test]
    fn test_transitive_skips_generated() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::write(
            root.join("gen.h"),
            format!("{}\nint gen(void);\n", GENERATED_BANNER),
        )
        .unwrap();

        let mut resolver = IncludeResolver::new();
        let ordered = resolver.resolve_transitive_headers(
            "#include \"gen.h\"\n",
            &root.join("main.cnx"),
            &[root.to_path_buf()],
        );
        assert!(ordered.is_empty());
    }

    #[test]
    fn test_include_cycle_terminates() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("a.h"), "#include \"b.h\"\n").unwrap();
        fs::write(root.join("b.h"), "#include \"a.h\"\n").unwrap();

        let mut visits = Vec::new();
        walk_include_tree(&root.join("a.h"), &[root.to_path_buf()], |path, _| {
            visits.push(path.to_path_buf());
            true
        })
        .unwrap();
        assert_eq!(visits.len(), 2);
    }

    #[test]
    fn test_walker_prune() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::write(root.join("a.h"), "#include \"b.h\"\n").unwrap();
        fs::write(root.join("b.h"), "").unwrap();

        let mut visits = 0;
        walk_include_tree(&root.join("a.h"), &[root.to_path_buf()], |_, _| {
            visits += 1;
            false // prune immediately
        })
        .unwrap();
        assert_eq!(visits, 1);
    }

    #[test]
    fn test_project_root_markers() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let nested = root.join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join("platformio.ini"), "[env:teensy40]\n").unwrap();
        assert_eq!(
            find_project_root(&nested.join("main.cnx")),
            Some(root.to_path_buf())
        );
    }

    #[test]
    fn test_search_paths_include_project_dirs() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("include")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join(".cnextrc"), "{}").unwrap();

        let paths = build_search_paths(&root.join("src").join("main.cnx"), &[]);
        assert!(paths.contains(&root.join("include")));
        assert!(paths.contains(&root.join("src")));
        // Source file's own directory comes first
        assert_eq!(paths[0], root.join("src"));
    }

    #[test]
    fn test_lib_extra_dirs_comma_separated() {
        let values =
            parse_ini_multivalue("[env]\nlib_extra_dirs = ../shared, libs/common\n", "lib_extra_dirs");
        assert_eq!(values, vec!["../shared", "libs/common"]);
    }

    #[test]
    fn test_lib_extra_dirs_multiline_quoted_with_comments() {
        let content = "[env]\nlib_extra_dirs =\n    \"../shared\" ; vendor drop\n    'libs/common'\nboard = teensy40\n";
        let values = parse_ini_multivalue(content, "lib_extra_dirs");
        assert_eq!(values, vec!["../shared", "libs/common"]);
    }

    #[test]
    fn test_platformio_libdeps_discovered() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let lib = root.join(".pio/libdeps/teensy40/FastLED");
        fs::create_dir_all(lib.join("src")).unwrap();
        fs::write(root.join("platformio.ini"), "[env:teensy40]\n").unwrap();

        let paths = platformio_lib_paths(root, "[env:teensy40]\n");
        assert!(paths.contains(&lib));
        assert!(paths.contains(&lib.join("src")));
    }
}
