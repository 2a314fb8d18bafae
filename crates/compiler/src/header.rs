//! Header synthesis
//!
//! Each translation unit with at least one public symbol gets a `.h` file:
//! include guard derived from the header's relative path, typedefs of the
//! public types, `extern` declarations of public variables, and prototypes
//! of public functions in the exact signature the `.c` file uses. Private
//! members never appear.

use crate::ast::{CommentStyle, Declaration, Program, ScopeMember, Visibility};
use crate::codegen::{
    CodeGen, c_type_text, emit_bitmap_typedef, emit_enum_typedef, render_callback_typedef,
    render_signature, render_struct_typedef,
};
use crate::includes::GENERATED_BANNER;
use crate::paths::OutputLang;
use crate::symbols::{FileSymbols, VisibleSymbols, eval_const_expr};
use crate::target::TargetCapabilities;
use crate::types::{PrimitiveKind, Type};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::OnceLock;

/// Include-guard macro from the header's relative path:
/// `Display/Utils.h` becomes `DISPLAY_UTILS_H`
pub fn include_guard(rel_header: &Path) -> String {
    rel_header
        .to_string_lossy()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// True when the unit exports anything a header would carry
pub fn has_public_symbols(program: &Program) -> bool {
    for declaration in &program.declarations {
        match declaration {
            Declaration::Scope(scope_decl) => {
                for member in &scope_decl.members {
                    if member.visibility == Visibility::Public
                        && !matches!(member.decl, Declaration::Preprocessor(_))
                    {
                        return true;
                    }
                }
            }
            Declaration::Preprocessor(_) => {}
            Declaration::Function(func) => {
                // Bodyless file-scope functions are external prototypes,
                // not exports
                if func.body.is_some() {
                    return true;
                }
            }
            _ => return true,
        }
    }
    false
}

/// Collected requirements discovered while walking public declarations
#[derive(Default)]
struct HeaderNeeds {
    stdint: bool,
    stdbool: bool,
    /// Callback typedef names in first-use order
    callbacks: Vec<String>,
    callback_set: HashSet<String>,
    /// Struct names needing a forward declaration (used in a public
    /// signature but not publicly declared here)
    forward_structs: Vec<String>,
    forward_set: HashSet<String>,
}

impl HeaderNeeds {
    fn note_type(&mut self, ty: &Type, scope: Option<&str>, visible: &VisibleSymbols<'_>) {
        match visible.classify_type(ty, scope) {
            Type::Primitive(kind) if kind.is_integer() => self.stdint = true,
            Type::Primitive(PrimitiveKind::Bool) => self.stdbool = true,
            Type::Bitmap { .. } => self.stdint = true,
            Type::Callback(name) => self.note_callback(name),
            _ => {}
        }
    }

    fn note_callback(&mut self, name: String) {
        if self.callback_set.insert(name.clone()) {
            self.callbacks.push(name);
        }
    }

    fn note_forward_struct(&mut self, name: String) {
        if self.forward_set.insert(name.clone()) {
            self.forward_structs.push(name);
        }
    }
}

/// Synthesize the header text, or None when the unit has no public symbols
pub fn synthesize_header(
    program: &Program,
    symbols: &FileSymbols,
    visible: &VisibleSymbols<'_>,
    lang: OutputLang,
    rel_header: &Path,
) -> Result<Option<String>, String> {
    if !has_public_symbols(program) {
        return Ok(None);
    }

    let guard = include_guard(rel_header);
    let mut needs = HeaderNeeds::default();
    let mut body = String::new();

    // Walk declarations in source order so the header reads like the source
    for (index, declaration) in program.declarations.iter().enumerate() {
        let comments = program.comments_for(index);
        match declaration {
            Declaration::Scope(scope_decl) => {
                for ScopeMember { visibility, decl } in &scope_decl.members {
                    if *visibility != Visibility::Public {
                        continue;
                    }
                    emit_public_member(
                        decl,
                        Some(&scope_decl.name),
                        symbols,
                        visible,
                        lang,
                        &[],
                        &mut needs,
                        &mut body,
                    )?;
                }
            }
            Declaration::Preprocessor(_) => {}
            _ => {
                emit_public_member(
                    declaration,
                    None,
                    symbols,
                    visible,
                    lang,
                    comments,
                    &mut needs,
                    &mut body,
                )?;
            }
        }
    }

    let mut text = String::new();
    let _ = writeln!(text, "{}", GENERATED_BANNER);
    let _ = writeln!(text, "#ifndef {}", guard);
    let _ = writeln!(text, "#define {}", guard);
    let _ = writeln!(text);
    if needs.stdint {
        let _ = writeln!(text, "#include <stdint.h>");
    }
    if needs.stdbool {
        let _ = writeln!(text, "#include <stdbool.h>");
    }
    if needs.stdint || needs.stdbool {
        let _ = writeln!(text);
    }
    for name in &needs.forward_structs {
        let _ = writeln!(text, "typedef struct {} {};", name, name);
    }
    if !needs.forward_structs.is_empty() {
        let _ = writeln!(text);
    }
    for name in &needs.callbacks {
        if let Some(info) = visible.find_callback(name) {
            text.push_str(&render_callback_typedef(info, visible));
        }
    }
    if !needs.callbacks.is_empty() {
        let _ = writeln!(text);
    }
    text.push_str(&body);
    let _ = writeln!(text);
    let _ = writeln!(text, "#endif /* {} */", guard);
    Ok(Some(text))
}

#[allow(clippy::too_many_arguments)]
fn emit_public_member(
    declaration: &Declaration,
    scope: Option<&str>,
    symbols: &FileSymbols,
    visible: &VisibleSymbols<'_>,
    lang: OutputLang,
    comments: &[crate::ast::Comment],
    needs: &mut HeaderNeeds,
    body: &mut String,
) -> Result<(), String> {
    let qualify = |bare: &str| match scope {
        Some(scope) => format!("{}_{}", scope, bare),
        None => bare.to_string(),
    };

    match declaration {
        Declaration::Function(func) => {
            if func.body.is_none() {
                return Ok(());
            }
            let qualified = qualify(&func.name);
            let Some(info) = symbols.functions.get(&qualified) else {
                return Ok(());
            };
            needs.note_type(&info.return_type, scope, visible);
            for param in &info.params {
                needs.note_type(&param.ty, scope, visible);
                // Struct parameters in public signatures may need a forward
                // declaration when the struct itself is not public here
                if let Type::Struct(name) = visible.classify_type(&param.ty, scope) {
                    let publicly_declared = symbols
                        .structs
                        .get(&name)
                        .is_some_and(|s| s.visibility == Visibility::Public);
                    if !publicly_declared {
                        needs.note_forward_struct(name);
                    }
                }
            }
            // Doc comments re-emit above the prototype
            for comment in comments {
                if comment.style == CommentStyle::Doc {
                    let _ = writeln!(body, "{}", comment.text);
                }
            }
            let signature = render_signature(info, visible, lang).map_err(|e| e.to_string())?;
            let _ = writeln!(body, "{};", signature);
            Ok(())
        }
        Declaration::Variable(var) => {
            let qualified = qualify(&var.name);
            let Some(info) = symbols.variables.get(&qualified) else {
                return Ok(());
            };
            needs.note_type(&info.ty, scope, visible);
            let resolved = visible.classify_type(&info.ty, scope);
            let mut line = String::from("extern ");
            if info.is_const {
                line.push_str("const ");
            }
            if info.is_volatile || info.is_atomic {
                line.push_str("volatile ");
            }
            match &resolved {
                Type::CnxString {
                    capacity: Some(expr),
                } => match eval_const_expr(expr, &|_| None) {
                    Some(n) => {
                        let _ = write!(line, "char {}[{}]", qualified, n + 1);
                    }
                    None => {
                        let _ = write!(line, "char {}[]", qualified);
                    }
                },
                _ => {
                    let _ = write!(line, "{} {}", c_type_text(&resolved, visible), qualified);
                }
            }
            for dim in &info.dimensions {
                match eval_const_expr(dim, &|_| None) {
                    Some(n) => {
                        let _ = write!(line, "[{}]", n);
                    }
                    None => {
                        let _ = write!(line, "[]");
                    }
                }
            }
            let _ = writeln!(body, "{};", line);
            Ok(())
        }
        Declaration::Enum(decl) => {
            if let Some(info) = symbols.enums.get(&qualify(&decl.name)) {
                emit_enum_typedef(info, body).map_err(|e| e.to_string())?;
            }
            Ok(())
        }
        Declaration::Bitmap(decl) => {
            if let Some(info) = symbols.bitmaps.get(&qualify(&decl.name)) {
                needs.stdint = true;
                emit_bitmap_typedef(info, body).map_err(|e| e.to_string())?;
            }
            Ok(())
        }
        Declaration::Struct(decl) => {
            if let Some(info) = symbols.structs.get(&qualify(&decl.name)) {
                for (_, field_type, _) in &info.fields {
                    needs.note_type(field_type, scope, visible);
                }
                let text = render_struct_typedef(info, visible).map_err(|e| e.to_string())?;
                body.push_str(&text);
            }
            Ok(())
        }
        Declaration::Register(decl) => {
            if let Some(info) = symbols.registers.get(&qualify(&decl.name)) {
                let prefix = match scope {
                    Some(scope) => format!("{}_", scope),
                    None => String::new(),
                };
                needs.stdint = true;
                let mut walker = header_macro_walker(visible);
                walker
                    .emit_register(info, &prefix, body)
                    .map_err(|e| e.to_string())?;
            }
            Ok(())
        }
        Declaration::Callback(decl) => {
            needs.note_callback(qualify(&decl.name));
            Ok(())
        }
        Declaration::Scope(_) | Declaration::Preprocessor(_) => Ok(()),
    }
}

/// A throwaway walker for macro synthesis inside headers. The register
/// emitter only reads types and constant expressions, so a default-target
/// walker with no own-file symbols is sufficient.
fn header_macro_walker<'a>(visible: &VisibleSymbols<'a>) -> CodeGen<'a> {
    static EMPTY: OnceLock<FileSymbols> = OnceLock::new();
    let empty = EMPTY.get_or_init(FileSymbols::default);
    CodeGen::new(
        Path::new("<header>"),
        visible.clone(),
        empty,
        OutputLang::C,
        TargetCapabilities::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_guard() {
        assert_eq!(include_guard(Path::new("Display/Utils.h")), "DISPLAY_UTILS_H");
        assert_eq!(include_guard(Path::new("main.h")), "MAIN_H");
    }
}
