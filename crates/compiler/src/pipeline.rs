//! Whole-project translation pipeline
//!
//! Orders files leaves-first along the include graph, runs symbol
//! collection across every file before any emission, then emits `.c`/`.cpp`
//! and `.h` per file, mirroring the input directory structure under the
//! output roots and rewriting include paths to match.

use crate::ast::{Directive, Program};
use crate::codegen::{CodeGen, Effect, GeneratedUnit, render_callback_typedef};
use crate::codegen::helpers::{
    CMSIS_HEADER, IRQ_WRAPPERS_HEADER, clamp_helper_definition, irq_wrappers_header_content,
};
use crate::comments::check_comments;
use crate::config::ProjectConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::files::{discover_sources, validate_input};
use crate::header::{has_public_symbols, synthesize_header};
use crate::includes::{GENERATED_BANNER, IncludeResolver, build_search_paths};
use crate::parser::Parser;
use crate::paths::{OutputLang, PathResolver, path_to_include_string};
use crate::state::TranspilerState;
use crate::symbols::{self, ProjectSymbols};
use crate::target::{TargetCapabilities, lookup_target};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options for one project run
#[derive(Debug, Clone)]
pub struct ProjectOptions {
    /// Input files or directories
    pub inputs: Vec<PathBuf>,
    pub out_dir: PathBuf,
    pub header_out_dir: Option<PathBuf>,
    pub include_dirs: Vec<PathBuf>,
    pub lang: OutputLang,
    /// Default target; a file's `#pragma target` overrides it
    pub target: Option<String>,
    /// Keep translating later files after one file fails
    pub continue_on_error: bool,
}

impl ProjectOptions {
    pub fn new(inputs: Vec<PathBuf>, out_dir: PathBuf) -> Self {
        ProjectOptions {
            inputs,
            out_dir,
            header_out_dir: None,
            include_dirs: Vec::new(),
            lang: OutputLang::C,
            target: None,
            continue_on_error: false,
        }
    }

    /// Fill unset fields from a project config file
    pub fn apply_config(&mut self, config: &ProjectConfig) {
        if let Some(header_out) = &config.header_out_dir {
            self.header_out_dir.get_or_insert_with(|| header_out.clone());
        }
        for dir in &config.include_dirs {
            if !self.include_dirs.contains(dir) {
                self.include_dirs.push(dir.clone());
            }
        }
        if self.target.is_none() {
            self.target = config.target.clone();
        }
        if config.cpp == Some(true) && self.lang == OutputLang::C {
            self.lang = OutputLang::Cpp;
        }
    }
}

/// One emitted translation unit
#[derive(Debug, Clone)]
pub struct EmittedFile {
    pub source: PathBuf,
    pub code_path: PathBuf,
    pub header_path: Option<PathBuf>,
    /// Sources this file's emission depended on (its C-Next includes)
    pub depends_on: Vec<PathBuf>,
}

/// Result of a whole run
#[derive(Debug, Default)]
pub struct RunReport {
    pub emitted: Vec<EmittedFile>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// A parsed input file with its resolved include information
struct LoadedFile {
    path: PathBuf,
    program: Program,
    /// Resolved C-Next include dependencies
    cnext_includes: Vec<PathBuf>,
    target: TargetCapabilities,
}

pub struct Pipeline {
    options: ProjectOptions,
    state: TranspilerState,
}

impl Pipeline {
    pub fn new(options: ProjectOptions) -> Self {
        Pipeline {
            options,
            state: TranspilerState::new(),
        }
    }

    /// Run the whole project translation
    pub fn run(&mut self) -> Result<RunReport, RunReport> {
        // One run never observes another's state
        self.state.clear();
        let mut sink = DiagnosticSink::new();

        let (sources, input_dirs) = match self.gather_inputs() {
            Ok(pair) => pair,
            Err(message) => {
                let mut report = RunReport::default();
                report.diagnostics.push(Diagnostic::error(Path::new("<input>"), 0, 0, message));
                return Err(report);
            }
        };
        info!(count = sources.len(), "translating project");

        let resolver = PathResolver::new(&input_dirs, None);

        // Parse every file and resolve its includes
        let mut loaded: HashMap<PathBuf, LoadedFile> = HashMap::new();
        let mut load_failed = false;
        for source in &sources {
            match self.load_file(source, &mut sink) {
                Some(file) => {
                    loaded.insert(file.path.clone(), file);
                }
                None => load_failed = true,
            }
        }
        if load_failed && !self.options.continue_on_error {
            return Err(RunReport {
                emitted: Vec::new(),
                diagnostics: sink.into_vec(),
            });
        }

        // Topological order, leaves first
        let order = topological_order(&loaded, &mut sink);

        // Symbol collection across every file before any emission
        let mut project = ProjectSymbols::default();
        let mut collect_failed = false;
        for path in &order {
            let Some(file) = loaded.get(path) else { continue };
            match symbols::collect_declarations(&file.program, path) {
                Ok(mut file_symbols) => {
                    symbols::collect_bodies(&file.program, &mut file_symbols);
                    self.state
                        .file_symbols
                        .insert(path.clone(), file_symbols.clone());
                    project.files.insert(path.clone(), file_symbols);
                    project
                        .includes
                        .insert(path.clone(), file.cnext_includes.clone());
                    project.programs.insert(path.clone(), file.program.clone());
                }
                Err(errors) => {
                    sink.extend(errors);
                    collect_failed = true;
                }
            }
        }
        let conflicts = project.check_conflicts();
        if !conflicts.is_empty() {
            sink.extend(conflicts);
            collect_failed = true;
        }
        if collect_failed {
            // Symbol errors abort the run before emission
            return Err(RunReport {
                emitted: Vec::new(),
                diagnostics: sink.into_vec(),
            });
        }
        project.propagate_mutations();

        // Emit in topological order: every include's symbols are complete
        // before its includer runs
        let mut report = RunReport::default();
        let mut needs_irq_header = false;
        for path in &order {
            let Some(file) = loaded.get(path) else { continue };
            match self.emit_file(file, &project, &resolver, &mut sink) {
                Ok(Some((emitted, wants_irq))) => {
                    needs_irq_header |= wants_irq;
                    report.emitted.push(emitted);
                }
                Ok(None) => {}
                Err(()) => {
                    if !self.options.continue_on_error {
                        report.diagnostics = sink.into_vec();
                        return Err(report);
                    }
                }
            }
        }

        if needs_irq_header {
            if let Err(message) = self.write_irq_header() {
                sink.push(Diagnostic::error(Path::new(IRQ_WRAPPERS_HEADER), 0, 0, message));
            }
        }

        report.diagnostics = sink.into_vec();
        if report.has_errors() {
            Err(report)
        } else {
            Ok(report)
        }
    }

    /// Expand inputs into a sorted source list plus the input directories
    /// used for structure-preserving output paths
    fn gather_inputs(&self) -> Result<(Vec<PathBuf>, Vec<PathBuf>), String> {
        // Canonical paths throughout so include-graph keys and prefix
        // stripping agree regardless of how the inputs were spelled
        let canonical = |path: &Path| path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut sources = Vec::new();
        let mut input_dirs = Vec::new();
        for input in &self.options.inputs {
            if input.is_dir() {
                let dir = canonical(input);
                sources.extend(discover_sources(&dir)?);
                input_dirs.push(dir);
            } else {
                validate_input(input)?;
                let file = canonical(input);
                if let Some(parent) = file.parent() {
                    input_dirs.push(parent.to_path_buf());
                }
                sources.push(file);
            }
        }
        sources.sort();
        sources.dedup();
        if sources.is_empty() {
            return Err("No .cnx source files found in the given inputs".to_string());
        }
        Ok((sources, input_dirs))
    }

    fn load_file(&mut self, source: &Path, sink: &mut DiagnosticSink) -> Option<LoadedFile> {
        let text = match std::fs::read_to_string(source) {
            Ok(text) => text,
            Err(e) => {
                sink.push(Diagnostic::error(
                    source,
                    0,
                    0,
                    format!("Failed to read {}: {}", source.display(), e),
                ));
                return None;
            }
        };

        let program = match Parser::parse_program(&text, source) {
            Ok(program) => program,
            Err(errors) => {
                sink.extend(errors);
                return None;
            }
        };

        // MISRA comment rules are reported but do not abort on their own
        sink.extend(check_comments(&program.comments, source));

        // Forbidden preprocessor forms are fatal
        let mut fatal = false;
        for directive in &program.directives {
            match &directive.directive {
                Directive::DefineValue { name } | Directive::DefineFunction { name } => {
                    sink.push(
                        Diagnostic::error(
                            source,
                            directive.loc.line,
                            directive.loc.column,
                            format!(
                                "'#define {}' with a value or arguments is not allowed; use a const variable",
                                name
                            ),
                        )
                        .with_code("E0804"),
                    );
                    fatal = true;
                }
                Directive::PragmaTarget { name } => {
                    if !name.is_empty() && lookup_target(name).is_none() {
                        sink.push(Diagnostic::warning(
                            source,
                            directive.loc.line,
                            directive.loc.column,
                            format!(
                                "Unknown target '{}'; assuming no exclusive load/store support",
                                name
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }
        if fatal {
            return None;
        }

        // Resolve includes for ordering and include-path rewriting
        let search_paths = build_search_paths(source, &self.options.include_dirs);
        let mut resolver = IncludeResolver::new();
        let outcome = resolver.resolve(&text, source, &search_paths);
        sink.extend(outcome.warnings);
        self.state
            .user_includes
            .insert(source.to_path_buf(), outcome.directives);

        let target = self.file_target(&program);

        Some(LoadedFile {
            path: source.to_path_buf(),
            program,
            cnext_includes: outcome.cnext_includes,
            target,
        })
    }

    /// A file's `#pragma target` wins over the run-level default
    fn file_target(&self, program: &Program) -> TargetCapabilities {
        let name = program
            .pragma_target
            .as_deref()
            .or(self.options.target.as_deref());
        name.and_then(lookup_target).unwrap_or_default()
    }

    /// Emit one translation unit. Returns the emitted record and whether
    /// the unit needs the IRQ wrapper header.
    fn emit_file(
        &mut self,
        file: &LoadedFile,
        project: &ProjectSymbols,
        resolver: &PathResolver,
        sink: &mut DiagnosticSink,
    ) -> Result<Option<(EmittedFile, bool)>, ()> {
        debug!(file = %file.path.display(), "emitting");
        let visible = project.visible(&file.path);
        let own = project
            .files
            .get(&file.path)
            .expect("collected before emission");

        let walker = CodeGen::new(
            &file.path,
            visible.clone(),
            own,
            self.options.lang,
            file.target,
        );
        let unit = match walker.generate(&file.program) {
            Ok(unit) => unit,
            Err(errors) => {
                sink.extend(errors);
                return Err(());
            }
        };

        // Record pass-by-value classification for tooling and tests
        let mut by_value: HashMap<String, HashSet<String>> = HashMap::new();
        for (qualified, info) in &own.functions {
            let params: HashSet<String> = info
                .params
                .iter()
                .filter(|p| !info.mutated_params.contains(&p.name))
                .map(|p| p.name.clone())
                .collect();
            by_value.insert(qualified.clone(), params);
        }
        self.state
            .pass_by_value
            .insert(file.path.clone(), by_value);

        let rel_header = resolver.relative(&file.path).with_extension("h");
        let header_text = synthesize_header(
            &file.program,
            own,
            &visible,
            self.options.lang,
            &rel_header,
        )
        .map_err(|message| {
            sink.push(Diagnostic::error(&file.path, 0, 0, message));
        })?;

        let code_text = self.assemble_code(file, &unit, project, resolver, header_text.is_some());

        let code_path = resolver.code_path(&file.path, &self.options.out_dir, self.options.lang);
        write_output(&code_path, &code_text).map_err(|message| {
            sink.push(Diagnostic::error(&file.path, 0, 0, message));
        })?;

        let header_path = match &header_text {
            Some(text) => {
                let path = resolver.header_path(
                    &file.path,
                    &self.options.out_dir,
                    self.options.header_out_dir.as_deref(),
                );
                write_output(&path, text).map_err(|message| {
                    sink.push(Diagnostic::error(&file.path, 0, 0, message));
                })?;
                self.state.mark_header_emitted(&path);
                Some(path)
            }
            None => None,
        };

        let wants_irq = unit
            .effects
            .iter()
            .any(|e| matches!(e, Effect::IrqWrappers));

        Ok(Some((
            EmittedFile {
                source: file.path.clone(),
                code_path,
                header_path,
                depends_on: file.cnext_includes.clone(),
            },
            wants_irq,
        )))
    }

    /// Fold the walk's effects into the final `.c`/`.cpp` text: banner,
    /// self-include, rewritten user includes, effect includes, helper
    /// definitions, then the body.
    fn assemble_code(
        &mut self,
        file: &LoadedFile,
        unit: &GeneratedUnit,
        project: &ProjectSymbols,
        resolver: &PathResolver,
        has_header: bool,
    ) -> String {
        let mut text = String::new();
        text.push_str(GENERATED_BANNER);
        text.push('\n');

        // Self-include uses the header's path under the header output root
        if has_header {
            let self_include = resolver.self_include(&file.path);
            text.push_str(&format!("#include \"{}\"\n", self_include));
        }

        // User includes, rewritten where they name C-Next sources
        let mut header_lines: Vec<String> = Vec::new();
        if let Some(directives) = self.state.user_includes.get(&file.path) {
            for directive in directives {
                let line = rewrite_include(directive, project, resolver);
                if let Some(line) = line {
                    header_lines.push(line);
                }
            }
        }

        // Effect includes, deduplicated against the user's own lines
        for effect in &unit.effects {
            let line = match effect {
                Effect::Include { header, system } => Some(if *system {
                    format!("#include <{}>", header)
                } else {
                    format!("#include \"{}\"", header)
                }),
                Effect::Cmsis => Some(format!("#include \"{}\"", CMSIS_HEADER)),
                Effect::IrqWrappers => Some(format!("#include \"{}\"", IRQ_WRAPPERS_HEADER)),
                _ => None,
            };
            if let Some(line) = line {
                if !header_lines.contains(&line) {
                    header_lines.push(line);
                }
            }
        }
        for line in &header_lines {
            text.push_str(line);
            text.push('\n');
        }
        text.push('\n');
        self.state
            .header_includes
            .insert(file.path.clone(), header_lines);

        // Private callback typedefs; public ones already live in the header
        for effect in &unit.effects {
            if let Effect::CallbackTypedef { name } = effect {
                let own = project.files.get(&file.path);
                let is_public_here = own
                    .and_then(|o| o.callbacks.get(name))
                    .is_some_and(|cb| cb.visibility == crate::ast::Visibility::Public);
                if is_public_here && has_header {
                    continue;
                }
                let visible = project.visible(&file.path);
                if let Some(info) = visible.find_callback(name) {
                    text.push_str(&render_callback_typedef(info, &visible));
                }
            }
        }

        // Saturating helpers, one definition per translation unit each
        for effect in &unit.effects {
            if let Effect::ClampHelper { op, kind } = effect {
                text.push_str(&clamp_helper_definition(*op, *kind));
                text.push('\n');
            }
        }

        text.push_str(&unit.code);
        text
    }

    fn write_irq_header(&mut self) -> Result<(), String> {
        let root = self
            .options
            .header_out_dir
            .as_deref()
            .unwrap_or(&self.options.out_dir);
        let path = root.join(IRQ_WRAPPERS_HEADER);
        if !self.state.mark_header_emitted(&path) {
            return Ok(());
        }
        write_output(&path, &irq_wrappers_header_content(GENERATED_BANNER))
    }

    /// Remove previously generated outputs for the given inputs. Only
    /// files carrying the generated banner are touched.
    pub fn clean(&self) -> Result<Vec<PathBuf>, String> {
        let (sources, input_dirs) = self.gather_inputs()?;
        let resolver = PathResolver::new(&input_dirs, None);
        let mut removed = Vec::new();

        let mut candidates: Vec<PathBuf> = Vec::new();
        for source in &sources {
            candidates.push(resolver.code_path(source, &self.options.out_dir, self.options.lang));
            candidates.push(resolver.header_path(
                source,
                &self.options.out_dir,
                self.options.header_out_dir.as_deref(),
            ));
        }
        let irq_root = self
            .options
            .header_out_dir
            .as_deref()
            .unwrap_or(&self.options.out_dir);
        candidates.push(irq_root.join(IRQ_WRAPPERS_HEADER));

        for candidate in candidates {
            if !candidate.is_file() {
                continue;
            }
            let generated = std::fs::read_to_string(&candidate)
                .ok()
                .and_then(|content| content.lines().next().map(|l| l == GENERATED_BANNER))
                .unwrap_or(false);
            if !generated {
                warn!(file = %candidate.display(), "skipping non-generated file");
                continue;
            }
            std::fs::remove_file(&candidate)
                .map_err(|e| format!("Failed to remove {}: {}", candidate.display(), e))?;
            removed.push(candidate);
        }
        Ok(removed)
    }
}

/// Rewrite one user include directive for the emitted file, or None to
/// drop it (a C-Next include whose target produced no header)
fn rewrite_include(
    directive: &crate::includes::IncludeDirective,
    project: &ProjectSymbols,
    resolver: &PathResolver,
) -> Option<String> {
    let is_cnext = directive.raw.ends_with(".cnx") || directive.raw.ends_with(".cnext");
    if !is_cnext {
        // Plain C headers pass through in their original spelling
        return Some(if directive.system {
            format!("#include <{}>", directive.raw)
        } else {
            format!("#include \"{}\"", directive.raw)
        });
    }

    match &directive.resolved {
        Some(resolved) => {
            let canonical = resolved.canonicalize().unwrap_or_else(|_| resolved.clone());
            let produces_header = project
                .programs
                .get(&canonical)
                .map(has_public_symbols)
                .unwrap_or(true);
            if !produces_header {
                return None;
            }
            let rel = resolver.relative(&canonical).with_extension("h");
            let include_path = path_to_include_string(&rel);
            Some(if directive.system {
                format!("#include <{}>", include_path)
            } else {
                format!("#include \"{}\"", include_path)
            })
        }
        None => {
            // Unresolved: literal rewrite of the extension only
            let fallback = directive
                .raw
                .trim_end_matches(".cnext")
                .trim_end_matches(".cnx");
            Some(if directive.system {
                format!("#include <{}.h>", fallback)
            } else {
                format!("#include \"{}.h\"", fallback)
            })
        }
    }
}

/// Leaves-first order over the loaded files. Cycles are admitted with a
/// warning; the visited set breaks recursion.
fn topological_order(
    loaded: &HashMap<PathBuf, LoadedFile>,
    sink: &mut DiagnosticSink,
) -> Vec<PathBuf> {
    let mut order = Vec::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut on_stack: HashSet<PathBuf> = HashSet::new();

    let mut roots: Vec<&PathBuf> = loaded.keys().collect();
    roots.sort();

    fn visit(
        path: &PathBuf,
        loaded: &HashMap<PathBuf, LoadedFile>,
        visited: &mut HashSet<PathBuf>,
        on_stack: &mut HashSet<PathBuf>,
        order: &mut Vec<PathBuf>,
        sink: &mut DiagnosticSink,
    ) {
        if visited.contains(path) {
            return;
        }
        if !on_stack.insert(path.clone()) {
            return;
        }
        if let Some(file) = loaded.get(path) {
            let mut deps = file.cnext_includes.clone();
            deps.sort();
            for dep in &deps {
                if on_stack.contains(dep) && !visited.contains(dep) {
                    sink.push(Diagnostic::warning(
                        path,
                        0,
                        0,
                        format!(
                            "Include cycle between {} and {}",
                            path.display(),
                            dep.display()
                        ),
                    ));
                    continue;
                }
                visit(dep, loaded, visited, on_stack, order, sink);
            }
        }
        on_stack.remove(path);
        if visited.insert(path.clone()) {
            order.push(path.clone());
        }
    }

    for root in roots {
        visit(root, loaded, &mut visited, &mut on_stack, &mut order, sink);
    }
    order
}

/// Create parent directories and write a file
fn write_output(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    std::fs::write(path, content).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn run_project(root: &Path, files: &[(&str, &str)]) -> Result<RunReport, RunReport> {
        let src = root.join("src");
        for (name, content) in files {
            let path = src.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let mut options = ProjectOptions::new(vec![src], root.join("build"));
        options.header_out_dir = Some(root.join("include"));
        Pipeline::new(options).run()
    }

    #[test]
    fn test_directory_structure_preserved() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let report = run_project(
            root,
            &[
                ("main.cnx", "scope Main { public void run() { } }\n"),
                ("Domain/App.cnx", "scope App { public void boot() { } }\n"),
                ("Display/Utils.cnx", "scope Utils { public u8 dim(u8 level) { return level; } }\n"),
            ],
        )
        .unwrap();
        assert_eq!(report.emitted.len(), 3);
        assert!(root.join("build/main.c").is_file());
        assert!(root.join("build/Domain/App.c").is_file());
        assert!(root.join("build/Display/Utils.c").is_file());
        assert!(root.join("include/Domain/App.h").is_file());
        assert!(root.join("include/Display/Utils.h").is_file());
        // Never flattened
        assert!(!root.join("build/App.c").exists());
        assert!(!root.join("build/Utils.c").exists());
    }

    #[test]
    fn test_self_include_path_keeps_directories() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        run_project(
            root,
            &[(
                "Display/Utils.cnx",
                "scope Utils { public u8 dim(u8 level) { return level; } }\n",
            )],
        )
        .unwrap();
        let code = fs::read_to_string(root.join("build/Display/Utils.c")).unwrap();
        assert!(code.contains("#include \"Display/Utils.h\""));
        assert!(!code.contains("#include \"Utils.h\""));
    }

    #[test]
    fn test_no_header_without_public_symbols() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let report = run_project(
            root,
            &[("quiet.cnx", "scope Quiet { void helper() { } }\n")],
        )
        .unwrap();
        assert!(report.emitted[0].header_path.is_none());
        let code = fs::read_to_string(root.join("build/quiet.c")).unwrap();
        assert!(!code.contains("#include \"quiet.h\""));
    }

    #[test]
    fn test_topological_emission_order() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let report = run_project(
            root,
            &[
                (
                    "app.cnx",
                    "#include \"lib.cnx\"\nscope AppMain { public void run() { } }\n",
                ),
                ("lib.cnx", "scope Lib { public u8 ping() { return 1; } }\n"),
            ],
        )
        .unwrap();
        // Property: every dependency is emitted before its dependent
        let mut seen: HashSet<PathBuf> = HashSet::new();
        for emitted in &report.emitted {
            for dep in &emitted.depends_on {
                assert!(seen.contains(dep), "dependency emitted after dependent");
            }
            seen.insert(
                emitted
                    .source
                    .canonicalize()
                    .unwrap_or_else(|_| emitted.source.clone()),
            );
        }
        // Include rewritten to the generated header
        let code = fs::read_to_string(root.join("build/app.c")).unwrap();
        assert!(code.contains("#include \"lib.h\""));
        assert!(!code.contains("lib.cnx"));
    }

    #[test]
    fn test_include_cycle_warns_but_completes() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let report = run_project(
            root,
            &[
                (
                    "a.cnx",
                    "#include \"b.cnx\"\nscope ScopeA { public void fa() { } }\n",
                ),
                (
                    "b.cnx",
                    "#include \"a.cnx\"\nscope ScopeB { public void fb() { } }\n",
                ),
            ],
        )
        .unwrap();
        assert_eq!(report.emitted.len(), 2);
        assert!(
            report
                .diagnostics
                .iter()
                .any(|d| d.message.contains("cycle"))
        );
    }

    #[test]
    fn test_clean_removes_only_generated() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        run_project(
            root,
            &[("main.cnx", "scope Main { public void run() { } }\n")],
        )
        .unwrap();
        // A stray user file in the output tree survives the clean
        fs::write(root.join("build/user.c"), "int main(void) { return 0; }\n").unwrap();

        let mut options = ProjectOptions::new(vec![root.join("src")], root.join("build"));
        options.header_out_dir = Some(root.join("include"));
        let removed = Pipeline::new(options).clean().unwrap();
        assert!(!removed.is_empty());
        assert!(!root.join("build/main.c").exists());
        assert!(root.join("build/user.c").exists());
    }

    #[test]
    fn test_run_fails_on_parse_error() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let report = run_project(root, &[("bad.cnx", "u32 x <- ;\n")]).unwrap_err();
        assert!(report.has_errors());
        assert!(report.emitted.is_empty());
    }

    #[test]
    fn test_forbidden_define_is_fatal() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let report = run_project(root, &[("bad.cnx", "#define MAX 10\nu32 x <- 1;\n")])
            .unwrap_err();
        assert!(
            report
                .diagnostics
                .iter()
                .any(|d| d.code.as_deref() == Some("E0804"))
        );
    }

    #[test]
    fn test_cross_scope_bare_access_fails_run() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let report = run_project(
            root,
            &[
                (
                    "a.cnx",
                    "scope j1939_decode {\n    public u16 getSpn(const u8 data[8]) {\n        return 100;\n    }\n}\n",
                ),
                (
                    "b.cnx",
                    "#include \"a.cnx\"\nscope j1939_bus {\n    public void handleMessage(const u8 data[8]) {\n        u16 spn <- j1939_decode.getSpn(data);\n    }\n}\n",
                ),
            ],
        )
        .unwrap_err();
        assert!(report.has_errors());
        let error = report
            .diagnostics
            .iter()
            .find(|d| d.code.as_deref() == Some("E0802"))
            .expect("expected E0802");
        assert!(error.message.contains("global.j1939_decode"));
    }

    #[test]
    fn test_irq_header_written_when_needed() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        run_project(
            root,
            &[(
                "main.cnx",
                "scope Main {\n    u32 shared <- 0;\n    public void isrSafe() {\n        critical {\n            shared <- shared + 1;\n        }\n    }\n}\n",
            )],
        )
        .unwrap();
        assert!(root.join("include/cnx_irq.h").is_file());
        let code = fs::read_to_string(root.join("build/main.c")).unwrap();
        assert!(code.contains("#include \"cnx_irq.h\""));
        assert!(code.contains("__cnx_disable_irq();"));
    }
}
