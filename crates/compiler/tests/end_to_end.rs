//! End-to-end scenarios over the public API: single-source translation and
//! whole-project runs against real directory trees.

use cnextc::paths::OutputLang;
use cnextc::pipeline::{Pipeline, ProjectOptions};
use cnextc::target::TargetCapabilities;
use cnextc::{TranspileOptions, transpile_source};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn transpile(source: &str) -> cnextc::TranspileOutput {
    transpile_source(source, &TranspileOptions::default()).expect("transpile should succeed")
}

fn write_tree(root: &Path, files: &[(&str, &str)]) -> PathBuf {
    let src = root.join("src");
    for (name, content) in files {
        let path = src.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    src
}

fn run_tree(root: &Path, files: &[(&str, &str)]) -> cnextc::RunReport {
    let src = write_tree(root, files);
    let mut options = ProjectOptions::new(vec![src], root.join("build"));
    options.header_out_dir = Some(root.join("include"));
    Pipeline::new(options).run().expect("run should succeed")
}

// ---------------------------------------------------------------------
// S1: pass-by-value signatures match between header and code
// ---------------------------------------------------------------------

#[test]
fn s1_pass_by_value_header_match() {
    let out = transpile(
        "scope MathUtils {\n    public u32 square(u32 value) { return value * value; }\n    public void increment(u32 counter) { counter <- counter + 1; }\n}\n",
    );
    let header = out.header.expect("public scope should emit a header");

    assert!(header.contains("uint32_t MathUtils_square(uint32_t value);"));
    assert!(header.contains("void MathUtils_increment(uint32_t* counter);"));
    // Never the other way around
    assert!(!header.contains("uint32_t* MathUtils_square"));
    assert!(!header.contains("increment(uint32_t counter)"));

    // Character-identical signatures in the .c
    assert!(out.code.contains("uint32_t MathUtils_square(uint32_t value)\n{"));
    assert!(out.code.contains("void MathUtils_increment(uint32_t* counter)\n{"));
}

#[test]
fn s1_signature_match_property() {
    // Every prototype in the header appears verbatim in the code file
    let out = transpile(
        "scope Api {\n    public u8 tiny(u8 v) { return v; }\n    public void grow(u32 n) { n <- n + 1; }\n    public bool check(const u8 data[4]) { return data[0] = 1; }\n}\n",
    );
    let header = out.header.unwrap();
    for line in header.lines() {
        let Some(signature) = line.strip_suffix(';') else {
            continue;
        };
        if signature.contains('(') && !signature.starts_with('#') && !signature.contains("typedef")
        {
            assert!(
                out.code.contains(signature),
                "header signature not found in code: {}",
                signature
            );
        }
    }
}

// ---------------------------------------------------------------------
// S2: scope header visibility
// ---------------------------------------------------------------------

#[test]
fn s2_scope_header_visibility() {
    let out = transpile(
        "scope TestScope {\n    u32 privateCounter <- 0;\n    public u32 publicCounter <- 10;\n}\n",
    );
    let header = out.header.unwrap();
    assert!(header.contains("extern uint32_t TestScope_publicCounter;"));
    assert!(!header.contains("TestScope_privateCounter"));
}

// ---------------------------------------------------------------------
// S3: directory structure preservation
// ---------------------------------------------------------------------

#[test]
fn s3_directory_structure_preservation() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    run_tree(
        root,
        &[
            ("main.cnx", "scope Entry { public void run() { } }\n"),
            ("Domain/App.cnx", "scope App { public void boot() { } }\n"),
            (
                "Display/Utils.cnx",
                "scope DisplayUtils { public u8 dim(u8 level) { return level; } }\n",
            ),
        ],
    );
    assert!(root.join("build/main.c").is_file());
    assert!(root.join("build/Domain/App.c").is_file());
    assert!(root.join("build/Display/Utils.c").is_file());
    assert!(root.join("include/Domain/App.h").is_file());
    assert!(root.join("include/Display/Utils.h").is_file());
    assert!(!root.join("build/App.c").exists());
}

// ---------------------------------------------------------------------
// S4: self-include path
// ---------------------------------------------------------------------

#[test]
fn s4_self_include_path() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    run_tree(
        root,
        &[(
            "Display/Utils.cnx",
            "scope DisplayUtils { public u8 dim(u8 level) { return level; } }\n",
        )],
    );
    let code = fs::read_to_string(root.join("build/Display/Utils.c")).unwrap();
    assert!(code.contains("#include \"Display/Utils.h\""));
    assert!(!code.contains("#include \"Utils.h\""));
}

// ---------------------------------------------------------------------
// S5: cross-scope bare access rejection
// ---------------------------------------------------------------------

#[test]
fn s5_cross_scope_bare_access_rejected() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    let src = write_tree(
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
    );
    let mut options = ProjectOptions::new(vec![src], root.join("build"));
    options.header_out_dir = Some(root.join("include"));
    let report = Pipeline::new(options).run().expect_err("run should fail");
    let error = report
        .diagnostics
        .iter()
        .find(|d| d.is_error())
        .expect("expected an error");
    assert!(error.message.contains("global.j1939_decode"));
}

// ---------------------------------------------------------------------
// S6: atomic 32-bit clamp add with exclusive instructions
// ---------------------------------------------------------------------

#[test]
fn s6_atomic_clamp_add_with_ldrex() {
    let options = TranspileOptions {
        lang: OutputLang::C,
        target: TargetCapabilities {
            has_ldrex_strex: true,
        },
        file_name: PathBuf::from("counter.cnx"),
    };
    let out = transpile_source(
        "scope Counter {\n    atomic u32 counter <- 0;\n    public void add() {\n        counter +<- 5;\n    }\n}\n",
        &options,
    )
    .unwrap();

    assert!(out.code.contains("__LDREXW(&Counter_counter)"));
    assert!(out.code.contains("__new = cnx_clamp_add_u32(__old, 5)"));
    assert!(out.code.contains("if (__STREXW(__new, &Counter_counter) == 0) {"));
    assert!(out.code.contains("do {"));
    assert!(out.code.contains("} while (1);"));
    // The helper is defined exactly once, and the CMSIS header is included
    assert_eq!(
        out.code.matches("static uint32_t cnx_clamp_add_u32").count(),
        1
    );
    assert!(out.code.contains("#include \"cmsis_gcc.h\""));
    // No path emits the bare compound assignment
    assert!(!out.code.contains("counter += 5"));
}

#[test]
fn s6_atomic_64_bit_falls_back_to_primask() {
    let options = TranspileOptions {
        lang: OutputLang::C,
        target: TargetCapabilities {
            has_ldrex_strex: true,
        },
        file_name: PathBuf::from("counter.cnx"),
    };
    let out = transpile_source(
        "scope Counter {\n    atomic u64 wide <- 0;\n    public void add() {\n        wide +<- 5;\n    }\n}\n",
        &options,
    )
    .unwrap();
    assert!(!out.code.contains("__LDREX"));
    assert!(out.code.contains("__cnx_get_PRIMASK()"));
    assert!(out.code.contains("cnx_clamp_add_u64"));
}

// ---------------------------------------------------------------------
// Further pipeline properties
// ---------------------------------------------------------------------

#[test]
fn property_topological_emission() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    let report = run_tree(
        root,
        &[
            (
                "app.cnx",
                "#include \"mid.cnx\"\nscope AppTop { public void run() { } }\n",
            ),
            (
                "mid.cnx",
                "#include \"leaf.cnx\"\nscope Mid { public void tick() { } }\n",
            ),
            ("leaf.cnx", "scope Leaf { public u8 id() { return 7; } }\n"),
        ],
    );
    let mut emitted_so_far: HashSet<PathBuf> = HashSet::new();
    for emitted in &report.emitted {
        for dep in &emitted.depends_on {
            assert!(
                emitted_so_far.contains(dep),
                "{} emitted before its dependency {}",
                emitted.source.display(),
                dep.display()
            );
        }
        emitted_so_far.insert(emitted.source.clone());
    }
}

#[test]
fn property_headers_only_for_public_units() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    let report = run_tree(
        root,
        &[
            ("pub.cnx", "scope Pub { public void ping() { } }\n"),
            ("priv.cnx", "scope Priv { void helper() { } }\n"),
        ],
    );
    let by_name = |stem: &str| {
        report
            .emitted
            .iter()
            .find(|e| e.source.file_stem().is_some_and(|s| s == stem))
            .unwrap()
            .clone()
    };
    assert!(by_name("pub").header_path.is_some());
    assert!(by_name("priv").header_path.is_none());
}

#[test]
fn property_generated_files_carry_banner() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    run_tree(
        root,
        &[("main.cnx", "scope Entry { public void run() { } }\n")],
    );
    for path in [root.join("build/main.c"), root.join("include/main.h")] {
        let content = fs::read_to_string(&path).unwrap();
        assert!(
            content.starts_with("/* Generated by cnextc."),
            "{} missing banner",
            path.display()
        );
    }
}

#[test]
fn cross_file_symbols_visible_through_include() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    run_tree(
        root,
        &[
            (
                "led.cnx",
                "scope Led {\n    public enum Mode { OFF, ON, BLINK }\n    public void set(Mode m) { }\n}\n",
            ),
            (
                "app.cnx",
                "#include \"led.cnx\"\nscope Application {\n    public void boot() {\n        global.Led.set(global.Led.Mode.BLINK);\n    }\n}\n",
            ),
        ],
    );
    let code = fs::read_to_string(root.join("build/app.c")).unwrap();
    assert!(code.contains("Led_set("));
    assert!(code.contains("#include \"led.h\""));
}

#[test]
fn misra_comment_rules_reported_as_warnings() {
    let out = transpile("// nested /* opener\nscope S { public void run() { } }\n");
    assert!(
        out.warnings
            .iter()
            .any(|w| w.code.as_deref() == Some("M3.1"))
    );

    let out = transpile("// trailing splice \\\nscope S { public void run() { } }\n");
    assert!(
        out.warnings
            .iter()
            .any(|w| w.code.as_deref() == Some("M3.2"))
    );
}

#[test]
fn unknown_pragma_target_warns_and_masks_interrupts() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    let report = run_tree(
        root,
        &[(
            "main.cnx",
            "#pragma target quantum9000\nscope Entry {\n    atomic u32 n <- 0;\n    public void bump() { n +<- 1; }\n}\n",
        )],
    );
    assert!(
        report
            .diagnostics
            .iter()
            .any(|d| d.message.contains("quantum9000"))
    );
    let code = fs::read_to_string(root.join("build/main.c")).unwrap();
    assert!(code.contains("__cnx_get_PRIMASK()"));
}
