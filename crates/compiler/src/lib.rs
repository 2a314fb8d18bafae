//! C-Next Transpiler Library
//!
//! Translates the C-Next embedded dialect into conventional C (or C++)
//! with safety-oriented lowering: saturating or wrapping arithmetic on
//! compound assignment, atomic read-modify-write via exclusive monitors or
//! interrupt masking, visibility-controlled scopes with name mangling,
//! bit-exact register macros, and split code/header output trees that
//! mirror the source layout.
//!
//! The [`pipeline::Pipeline`] drives whole-project runs; [`transpile_source`]
//! translates a single in-memory source for tools and tests:
//!
//! ```rust,ignore
//! use cnextc::{TranspileOptions, transpile_source};
//!
//! let out = transpile_source(
//!     "scope Led { public void on() { } }",
//!     &TranspileOptions::default(),
//! )?;
//! assert!(out.header.unwrap().contains("void Led_on(void);"));
//! ```

pub mod ast;
pub mod codegen;
pub mod comments;
pub mod config;
pub mod diagnostics;
pub mod files;
pub mod header;
pub mod includes;
pub mod lexer;
pub mod parser;
pub mod paths;
pub mod pipeline;
pub mod scopes;
pub mod state;
pub mod symbols;
pub mod target;
pub mod types;

pub use codegen::{CodeGen, Effect, PASS_BY_VALUE_MAX_STRUCT_BYTES};
pub use diagnostics::{Diagnostic, Severity};
pub use paths::OutputLang;
pub use pipeline::{Pipeline, ProjectOptions, RunReport};
pub use target::{TargetCapabilities, lookup_target};

use crate::codegen::helpers::{CMSIS_HEADER, IRQ_WRAPPERS_HEADER, clamp_helper_definition};
use crate::includes::GENERATED_BANNER;
use crate::symbols::ProjectSymbols;
use std::path::{Path, PathBuf};

/// Options for single-source translation
#[derive(Debug, Clone)]
pub struct TranspileOptions {
    pub lang: OutputLang,
    pub target: TargetCapabilities,
    /// Pseudo file name used in diagnostics and the self-include path
    pub file_name: PathBuf,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        TranspileOptions {
            lang: OutputLang::C,
            target: TargetCapabilities::default(),
            file_name: PathBuf::from("main.cnx"),
        }
    }
}

/// Result of single-source translation
#[derive(Debug)]
pub struct TranspileOutput {
    pub code: String,
    pub header: Option<String>,
    /// Non-fatal diagnostics (MISRA comment rules, unknown targets)
    pub warnings: Vec<Diagnostic>,
}

/// Translate one in-memory source to C text. File includes are not
/// resolved (there is no filesystem); a project run goes through
/// [`Pipeline`].
pub fn transpile_source(
    source: &str,
    options: &TranspileOptions,
) -> Result<TranspileOutput, Vec<Diagnostic>> {
    let file = &options.file_name;
    let program = parser::Parser::parse_program(source, file)?;

    let warnings = comments::check_comments(&program.comments, file);

    let mut file_symbols = match symbols::collect_declarations(&program, file) {
        Ok(symbols) => symbols,
        Err(errors) => return Err(errors),
    };
    symbols::collect_bodies(&program, &mut file_symbols);

    let mut project = ProjectSymbols::default();
    project.files.insert(file.clone(), file_symbols);
    project.programs.insert(file.clone(), program.clone());
    project.propagate_mutations();

    let target = program
        .pragma_target
        .as_deref()
        .and_then(lookup_target)
        .unwrap_or(options.target);

    let visible = project.visible(file);
    let own = &project.files[file];
    let walker = CodeGen::new(file, visible.clone(), own, options.lang, target);
    let unit = walker.generate(&program)?;

    let rel_header = Path::new(file.file_stem().unwrap_or_default()).with_extension("h");
    let header = header::synthesize_header(&program, own, &visible, options.lang, &rel_header)
        .map_err(|message| vec![Diagnostic::error(file, 0, 0, message)])?;

    let code = assemble_single_unit(&unit, &visible, &rel_header, header.is_some());

    Ok(TranspileOutput {
        code,
        header,
        warnings,
    })
}

/// Prelude assembly for the single-source path: banner, self-include,
/// effect includes, helper definitions, body
fn assemble_single_unit(
    unit: &codegen::GeneratedUnit,
    visible: &symbols::VisibleSymbols<'_>,
    rel_header: &Path,
    has_header: bool,
) -> String {
    let mut text = String::new();
    text.push_str(GENERATED_BANNER);
    text.push('\n');
    if has_header {
        text.push_str(&format!(
            "#include \"{}\"\n",
            paths::path_to_include_string(rel_header)
        ));
    }
    for effect in &unit.effects {
        match effect {
            Effect::Include { header, system } => {
                if *system {
                    text.push_str(&format!("#include <{}>\n", header));
                } else {
                    text.push_str(&format!("#include \"{}\"\n", header));
                }
            }
            Effect::Cmsis => text.push_str(&format!("#include \"{}\"\n", CMSIS_HEADER)),
            Effect::IrqWrappers => {
                text.push_str(&format!("#include \"{}\"\n", IRQ_WRAPPERS_HEADER));
            }
            _ => {}
        }
    }
    text.push('\n');
    for effect in &unit.effects {
        if let Effect::CallbackTypedef { name } = effect {
            if !has_header
                || visible
                    .find_callback(name)
                    .is_some_and(|cb| cb.visibility == ast::Visibility::Private)
            {
                if let Some(info) = visible.find_callback(name) {
                    text.push_str(&codegen::render_callback_typedef(info, visible));
                }
            }
        }
    }
    for effect in &unit.effects {
        if let Effect::ClampHelper { op, kind } = effect {
            text.push_str(&clamp_helper_definition(*op, *kind));
            text.push('\n');
        }
    }
    text.push_str(&unit.code);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transpile(source: &str) -> TranspileOutput {
        transpile_source(source, &TranspileOptions::default()).expect("transpile should succeed")
    }

    #[test]
    fn test_assignment_lowering() {
        let out = transpile("scope M { public void set() { u32 x <- 0; x <- 5; } }");
        assert!(out.code.contains("uint32_t x = 0;"));
        assert!(out.code.contains("x = 5;"));
    }

    #[test]
    fn test_scope_mangling_and_static() {
        let out = transpile(
            "scope Motor {\n    u32 internal <- 1;\n    public u32 speed <- 0;\n    public void stop() { speed <- 0; }\n}",
        );
        assert!(out.code.contains("static uint32_t Motor_internal = 1;"));
        assert!(out.code.contains("uint32_t Motor_speed = 0;"));
        assert!(out.code.contains("void Motor_stop(void)"));
        let header = out.header.unwrap();
        assert!(header.contains("extern uint32_t Motor_speed;"));
        assert!(!header.contains("Motor_internal"));
    }

    #[test]
    fn test_private_const_inlined() {
        let out = transpile(
            "scope Cfg {\n    const u32 LIMIT <- 42;\n    public u32 readLimit() { return LIMIT; }\n}",
        );
        assert!(out.code.contains("return 42;"));
        assert!(!out.code.contains("Cfg_LIMIT"));
    }

    #[test]
    fn test_private_const_array_emitted() {
        let out = transpile(
            "scope Tbl {\n    const u8 GAMMA[4];\n    public u8 lookup(u8 i) { return GAMMA[i]; }\n}",
        );
        assert!(out.code.contains("static const uint8_t Tbl_GAMMA[4];"));
        assert!(out.code.contains("return Tbl_GAMMA[i];"));
    }

    #[test]
    fn test_clamp_helper_for_default_overflow() {
        let out = transpile("scope C { u32 n <- 0; public void bump() { n +<- 5; } }");
        assert!(out.code.contains("C_n = cnx_clamp_add_u32(C_n, 5);"));
        // Exactly one helper definition per translation unit
        assert_eq!(out.code.matches("static uint32_t cnx_clamp_add_u32").count(), 1);
    }

    #[test]
    fn test_wrap_uses_natural_operator() {
        let out = transpile("scope C { wrap u8 n <- 0; public void bump() { n +<- 1; } }");
        assert!(out.code.contains("C_n += 1;"));
        assert!(!out.code.contains("cnx_clamp"));
    }

    #[test]
    fn test_float_compound_has_no_helper() {
        let out = transpile("scope C { f32 n <- 0.0; public void bump() { n +<- 1.5; } }");
        assert!(out.code.contains("C_n += 1.5;"));
        assert!(!out.code.contains("cnx_clamp"));
    }

    #[test]
    fn test_this_and_global_access() {
        let out = transpile(
            "scope S {\n    u32 n <- 0;\n    public void touch() {\n        this.n <- 1;\n    }\n}",
        );
        assert!(out.code.contains("S_n = 1;"));
    }

    #[test]
    fn test_enum_member_prefixing() {
        let out = transpile(
            "enum Color { RED, GREEN, BLUE }\nscope S { public void pick() { Color c <- Color.GREEN; } }",
        );
        let header = out.header.unwrap();
        assert!(header.contains("Color_RED = 0,"));
        assert!(header.contains("Color_GREEN = 1,"));
        assert!(out.code.contains("Color c = Color_GREEN;"));
    }

    #[test]
    fn test_bare_enum_member_with_expected_type() {
        let out = transpile(
            "enum Color { RED, GREEN }\nscope S { public void pick() { Color c <- GREEN; } }",
        );
        assert!(out.code.contains("Color c = Color_GREEN;"));
    }

    #[test]
    fn test_unqualified_enum_error() {
        let errors = transpile_source(
            "enum Color { RED, GREEN }\nscope S { public void pick() { u32 c <- GREEN; } }",
            &TranspileOptions::default(),
        )
        .unwrap_err();
        let error = &errors[0];
        assert_eq!(error.code.as_deref(), Some("E0424"));
        assert!(error.message.contains("did you mean 'Color.GREEN'?"));
    }

    #[test]
    fn test_register_macros() {
        let out = transpile(
            "register GPIO7 @ 0x42004000 {\n    DR: u32 rw @ 0x0,\n    PSR: u32 ro @ 0x8,\n}\n",
        );
        let header = out.header.unwrap();
        assert!(header.contains(
            "#define GPIO7_DR (*(volatile uint32_t*)(0x42004000 + 0x0))"
        ));
        assert!(header.contains(
            "#define GPIO7_PSR (*(volatile uint32_t const *)(0x42004000 + 0x8))"
        ));
    }

    #[test]
    fn test_critical_block_wrapping() {
        let out = transpile(
            "scope S {\n    u32 n <- 0;\n    public void safe() {\n        critical {\n            n <- n + 1;\n        }\n    }\n}",
        );
        assert!(out.code.contains("uint32_t __primask = __cnx_get_PRIMASK();"));
        assert!(out.code.contains("__cnx_disable_irq();"));
        assert!(out.code.contains("__cnx_set_PRIMASK(__primask);"));
        assert!(out.code.contains("#include \"cnx_irq.h\""));
    }

    #[test]
    fn test_critical_escape_rejected() {
        let errors = transpile_source(
            "scope S { public void bad() { critical { return; } } }",
            &TranspileOptions::default(),
        )
        .unwrap_err();
        assert_eq!(errors[0].code.as_deref(), Some("E0801"));
    }

    #[test]
    fn test_condition_call_rejected() {
        let errors = transpile_source(
            "scope S {\n    u8 probe() { return 1; }\n    public void bad() {\n        if (probe() = 1) { }\n    }\n}",
            &TranspileOptions::default(),
        )
        .unwrap_err();
        assert_eq!(errors[0].code.as_deref(), Some("E0702"));
    }

    #[test]
    fn test_do_while_needs_boolean() {
        let errors = transpile_source(
            "scope S { public void bad() { u8 n <- 3; do { n <- n - 1; } while (n); } }",
            &TranspileOptions::default(),
        )
        .unwrap_err();
        assert_eq!(errors[0].code.as_deref(), Some("E0701"));
    }

    #[test]
    fn test_string_lowering() {
        let out = transpile("scope S { public string<8> name <- \"init\"; }");
        assert!(out.code.contains("char S_name[9] = \"init\";"));
    }

    #[test]
    fn test_bitmap_typedef_and_access() {
        let out = transpile(
            "bitmap8 Status { ready, error, mode[2] }\nscope S {\n    Status st <- 0;\n    public u8 modeOf() { return st.mode; }\n}",
        );
        let header = out.header.unwrap();
        assert!(header.contains("typedef uint8_t Status;"));
        assert!(header.contains("mode: bits 2-3"));
        assert!(out.code.contains("((S_st >> 2) & 0x3U)"));
    }

    #[test]
    fn test_pragma_target_enables_ldrex() {
        let out = transpile(
            "#pragma target cortex-m7\nscope S {\n    atomic u32 n <- 0;\n    public void bump() { n +<- 5; }\n}",
        );
        assert!(out.code.contains("__LDREXW(&S_n)"));
        assert!(out.code.contains("cnx_clamp_add_u32(__old, 5)"));
        assert!(out.code.contains("__STREXW(__new, &S_n)"));
    }

    #[test]
    fn test_atomic_without_ldrex_masks_interrupts() {
        let out = transpile(
            "scope S {\n    atomic u32 n <- 0;\n    public void bump() { n +<- 5; }\n}",
        );
        assert!(out.code.contains("__cnx_get_PRIMASK()"));
        assert!(out.code.contains("cnx_clamp_add_u32"));
        assert!(!out.code.contains("__LDREX"));
    }
}
