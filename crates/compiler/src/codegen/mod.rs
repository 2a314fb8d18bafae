//! C code generation
//!
//! The walker is a pure-ish function from parse tree to `(text, effects)`:
//! the text is the translation unit's body and the effects are declarative
//! requests (include this header, emit this helper, typedef this callback)
//! that the pipeline folds into the file prelude after the walk finishes.
//!
//! Signatures are rendered by one function shared with the header
//! synthesizer so the `.c` and `.h` forms are character-identical.

pub mod error;
pub mod expr;
pub mod helpers;
pub mod register;
pub mod stmt;

pub use error::CodeGenError;

use crate::ast::{
    AssignOp, Comment, Declaration, Expr, Overflow, Param, Program, ScopeMember, Visibility,
};
use crate::diagnostics::Diagnostic;
use crate::paths::OutputLang;
use crate::symbols::{
    FileSymbols, FunctionInfo, VariableInfo, VisibleSymbols, eval_const_expr,
};
use crate::target::TargetCapabilities;
use crate::types::{PrimitiveKind, Type, bitmap_backing_c_type};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

/// Structs at or under this size pass by value when the body never
/// mutates them; larger ones go by const pointer/reference. Sizes are
/// computed from lowered member layouts with natural alignment.
pub const PASS_BY_VALUE_MAX_STRUCT_BYTES: usize = 16;

/// A declarative request accumulated during the walk and resolved by the
/// pipeline after the file's main text is formed
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Include { header: String, system: bool },
    ClampHelper { op: AssignOp, kind: PrimitiveKind },
    /// Translated code needs the `cnx_irq.h` PRIMASK wrappers
    IrqWrappers,
    /// Translated code needs the CMSIS exclusive-monitor intrinsics
    Cmsis,
    /// Emit the function-pointer typedef for this callback type
    CallbackTypedef { name: String },
}

impl Effect {
    fn key(&self) -> String {
        match self {
            Effect::Include { header, system } => format!("include:{}:{}", system, header),
            Effect::ClampHelper { op, kind } => {
                format!("clamp:{:?}:{}", op, kind.dialect_name())
            }
            Effect::IrqWrappers => "irq".to_string(),
            Effect::Cmsis => "cmsis".to_string(),
            Effect::CallbackTypedef { name } => format!("callback:{}", name),
        }
    }
}

/// How a parameter is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    Value,
    Pointer,
    ConstPointer,
    Reference,
    ConstReference,
    /// Array parameter with C decay semantics
    Array { is_const: bool },
}

impl PassMode {
    pub fn is_indirect(self) -> bool {
        matches!(
            self,
            PassMode::Pointer | PassMode::ConstPointer | PassMode::Reference | PassMode::ConstReference
        )
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, PassMode::Pointer | PassMode::ConstPointer)
    }
}

/// A parameter's resolved binding inside a function body
#[derive(Debug, Clone)]
pub struct ParamBinding {
    pub ty: Type,
    pub mode: PassMode,
    pub overflow: Option<Overflow>,
}

/// A local variable's binding
#[derive(Debug, Clone)]
pub struct LocalBinding {
    pub ty: Type,
    pub overflow: Option<Overflow>,
    pub is_atomic: bool,
    pub is_const: bool,
}

/// What a bare identifier resolved to
#[derive(Debug, Clone)]
pub(crate) enum ValueBinding {
    Local(LocalBinding),
    Param(ParamBinding),
    Variable(VariableInfo),
}

/// Output of one translation unit's walk
#[derive(Debug)]
pub struct GeneratedUnit {
    /// Main text, without the prelude the pipeline prepends
    pub code: String,
    pub effects: Vec<Effect>,
}

pub struct CodeGen<'a> {
    pub(crate) file: &'a Path,
    pub(crate) visible: VisibleSymbols<'a>,
    pub(crate) own: &'a FileSymbols,
    pub(crate) lang: OutputLang,
    pub(crate) target: TargetCapabilities,
    pub(crate) current_scope: Option<String>,
    pub(crate) current_return: Option<Type>,
    pub(crate) params: HashMap<String, ParamBinding>,
    pub(crate) locals: Vec<HashMap<String, LocalBinding>>,
    effects: Vec<Effect>,
    effect_keys: HashSet<String>,
    pub(crate) errors: Vec<Diagnostic>,
    temp_depth: usize,
}

impl<'a> CodeGen<'a> {
    pub fn new(
        file: &'a Path,
        visible: VisibleSymbols<'a>,
        own: &'a FileSymbols,
        lang: OutputLang,
        target: TargetCapabilities,
    ) -> Self {
        CodeGen {
            file,
            visible,
            own,
            lang,
            target,
            current_scope: None,
            current_return: None,
            params: HashMap::new(),
            locals: Vec::new(),
            effects: Vec::new(),
            effect_keys: HashSet::new(),
            errors: Vec::new(),
            temp_depth: 0,
        }
    }

    /// Walk the whole translation unit. Any collected error fails the unit.
    pub fn generate(mut self, program: &Program) -> Result<GeneratedUnit, Vec<Diagnostic>> {
        let mut code = String::new();

        for (index, declaration) in program.declarations.iter().enumerate() {
            let comments = program.comments_for(index);
            match self.emit_declaration(declaration, comments, &mut code) {
                Ok(()) => {}
                Err(CodeGenError::Logic(diagnostic)) => self.errors.push(*diagnostic),
                Err(CodeGenError::Format(e)) => {
                    self.errors.push(Diagnostic::error(
                        self.file,
                        0,
                        0,
                        format!("write error during code generation: {}", e),
                    ));
                }
            }
        }

        if self.errors.is_empty() {
            Ok(GeneratedUnit {
                code,
                effects: self.effects,
            })
        } else {
            Err(self.errors)
        }
    }

    pub(crate) fn register_effect(&mut self, effect: Effect) {
        if self.effect_keys.insert(effect.key()) {
            self.effects.push(effect);
        }
    }

    fn emit_comments(&self, comments: &[Comment], out: &mut String) -> Result<(), CodeGenError> {
        for comment in comments {
            writeln!(out, "{}", comment.text)?;
        }
        Ok(())
    }

    fn emit_declaration(
        &mut self,
        declaration: &Declaration,
        comments: &[Comment],
        out: &mut String,
    ) -> Result<(), CodeGenError> {
        match declaration {
            Declaration::Preprocessor(directive) => {
                use crate::ast::Directive;
                match &directive.directive {
                    Directive::DefineValue { name } | Directive::DefineFunction { name } => {
                        return Err(Diagnostic::error(
                            self.file,
                            directive.loc.line,
                            directive.loc.column,
                            format!(
                                "'#define {}' with a value or arguments is not allowed; use a const variable",
                                name
                            ),
                        )
                        .with_code("E0804")
                        .into());
                    }
                    _ => {
                        writeln!(out, "{}", directive.text)?;
                    }
                }
                Ok(())
            }
            Declaration::Scope(scope_decl) => {
                self.emit_comments(comments, out)?;
                self.current_scope = Some(scope_decl.name.clone());
                for ScopeMember { visibility, decl } in &scope_decl.members {
                    self.emit_scope_member(decl, *visibility, out)?;
                }
                self.current_scope = None;
                Ok(())
            }
            _ => {
                self.emit_comments(comments, out)?;
                // File-scope declarations are public across the project
                self.emit_scope_member(declaration, Visibility::Public, out)
            }
        }
    }

    fn emit_scope_member(
        &mut self,
        declaration: &Declaration,
        visibility: Visibility,
        out: &mut String,
    ) -> Result<(), CodeGenError> {
        match declaration {
            Declaration::Function(func) => self.emit_function(func, visibility, out),
            Declaration::Variable(var) => self.emit_global_variable(var, visibility, out),
            Declaration::Enum(decl) => {
                // Public typedefs live in the header the .c includes
                if visibility == Visibility::Private {
                    let qualified = self.qualify(&decl.name);
                    if let Some(info) = self.visible.find_enum(&qualified).cloned() {
                        emit_enum_typedef(&info, out)?;
                    }
                }
                Ok(())
            }
            Declaration::Bitmap(decl) => {
                if visibility == Visibility::Private {
                    let qualified = self.qualify(&decl.name);
                    if let Some(info) = self.visible.find_bitmap(&qualified).cloned() {
                        emit_bitmap_typedef(&info, out)?;
                    }
                }
                Ok(())
            }
            Declaration::Struct(decl) => {
                if visibility == Visibility::Private {
                    let qualified = self.qualify(&decl.name);
                    if let Some(info) = self.visible.find_struct(&qualified).cloned() {
                        let text = render_struct_typedef(&info, &self.visible)?;
                        out.push_str(&text);
                    }
                }
                // Callback typedefs ride as effects either way
                for field in &decl.fields {
                    if let Some(name) = field.ty.name() {
                        let qualified_cb = self.qualify(name);
                        if self.own.callback_fields_used.contains(name)
                            || self.own.callback_fields_used.contains(&qualified_cb)
                        {
                            let resolved = if self.visible.find_callback(&qualified_cb).is_some() {
                                qualified_cb
                            } else {
                                name.to_string()
                            };
                            self.register_effect(Effect::CallbackTypedef { name: resolved });
                        }
                    }
                }
                Ok(())
            }
            Declaration::Register(decl) => {
                let qualified = self.qualify(&decl.name);
                if let Some(info) = self.visible.find_register(&qualified).cloned() {
                    if visibility == Visibility::Private {
                        let prefix = self.scope_prefix();
                        self.emit_register(&info, &prefix, out)?;
                    }
                }
                Ok(())
            }
            Declaration::Callback(_) => Ok(()),
            Declaration::Scope(_) => Err(Diagnostic::error(
                self.file,
                declaration.loc().line,
                declaration.loc().column,
                "Scopes cannot be nested inside other scopes".to_string(),
            )
            .into()),
            Declaration::Preprocessor(directive) => {
                writeln!(out, "{}", directive.text)?;
                Ok(())
            }
        }
    }

    /// Qualified (mangled) name of a bare name in the current scope
    pub(crate) fn qualify(&self, bare: &str) -> String {
        match &self.current_scope {
            Some(scope) => format!("{}_{}", scope, bare),
            None => bare.to_string(),
        }
    }

    pub(crate) fn scope_prefix(&self) -> String {
        match &self.current_scope {
            Some(scope) => format!("{}_", scope),
            None => String::new(),
        }
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    fn emit_global_variable(
        &mut self,
        var: &crate::ast::VariableDecl,
        visibility: Visibility,
        out: &mut String,
    ) -> Result<(), CodeGenError> {
        // Constructor-style initialization accepts only const arguments
        if let Some(args) = &var.ctor_args {
            for arg in args {
                if !self.is_const_argument(arg) {
                    return Err(Diagnostic::error(
                        self.file,
                        var.loc.line,
                        var.loc.column,
                        format!(
                            "Constructor argument for '{}' must be a constant",
                            var.name
                        ),
                    )
                    .with_code("E0806")
                    .into());
                }
            }
        }

        let resolved = self.resolve_type(&var.ty);
        let is_array = !var.dimensions.is_empty() || matches!(resolved, Type::CnxString { .. });

        // Private scope-level const non-array values are inlined at use
        // sites and never emitted
        if visibility == Visibility::Private
            && var.is_const
            && !is_array
            && self.current_scope.is_some()
        {
            let qualified = self.qualify(&var.name);
            if self
                .visible
                .find_variable(&qualified)
                .is_some_and(|info| info.const_value.is_some())
            {
                return Ok(());
            }
        }

        if let Type::Callback(name) = &resolved {
            self.register_effect(Effect::CallbackTypedef { name: name.clone() });
        }

        let mangled = self.qualify(&var.name);
        let mut line = String::new();
        if visibility == Visibility::Private && self.current_scope.is_some() {
            line.push_str("static ");
        }
        if var.is_const {
            line.push_str("const ");
        }
        if var.is_volatile || var.is_atomic {
            line.push_str("volatile ");
        }
        let declarator = self.render_declarator(&resolved, &mangled, &var.dimensions)?;
        line.push_str(&declarator);

        if let Some(init) = &var.initializer {
            let expected = resolved.clone();
            let init_text = self.emit_expr_expected(init, Some(&expected))?;
            line.push_str(" = ");
            line.push_str(&init_text);
        } else if let Some(args) = &var.ctor_args {
            // Constructor-style lowering: brace initializer in field order
            let mut rendered = Vec::new();
            for arg in args {
                rendered.push(self.emit_expr(arg)?);
            }
            line.push_str(" = { ");
            line.push_str(&rendered.join(", "));
            line.push_str(" }");
        }
        writeln!(out, "{};", line)?;
        Ok(())
    }

    fn is_const_argument(&self, arg: &Expr) -> bool {
        match arg {
            Expr::IntLit { .. }
            | Expr::FloatLit { .. }
            | Expr::BoolLit { .. }
            | Expr::StringLit { .. }
            | Expr::CharLit { .. } => true,
            Expr::Ident { name, .. } => {
                let qualified = self.qualify(name);
                let lookup = |key: &str| {
                    self.visible
                        .find_variable(key)
                        .map(|info| info.is_const)
                        .unwrap_or(false)
                };
                lookup(&qualified) || lookup(name)
                    || self.visible.enum_of_member(name, self.current_scope.as_deref()).is_some()
            }
            Expr::Member { .. } => {
                eval_const_expr(arg, &|name| {
                    // Enum.MEMBER references are constants
                    let (enum_name, member) = name.split_once('.')?;
                    let scope = self.current_scope.as_deref();
                    let candidates = match scope {
                        Some(s) => vec![format!("{}_{}", s, enum_name), enum_name.to_string()],
                        None => vec![enum_name.to_string()],
                    };
                    candidates
                        .iter()
                        .find_map(|q| self.visible.find_enum(q))
                        .and_then(|info| info.value_of(member))
                })
                .is_some()
            }
            Expr::Paren { inner, .. } => self.is_const_argument(inner),
            Expr::Unary { operand, .. } => self.is_const_argument(operand),
            Expr::Binary { lhs, rhs, .. } => {
                self.is_const_argument(lhs) && self.is_const_argument(rhs)
            }
            _ => false,
        }
    }

    /// Render `type name[dims]` with string types lowered to char arrays
    pub(crate) fn render_declarator(
        &mut self,
        ty: &Type,
        name: &str,
        dimensions: &[Expr],
    ) -> Result<String, CodeGenError> {
        let mut text = String::new();
        match ty {
            Type::CnxString { capacity } => {
                self.register_effect(Effect::Include {
                    header: "string.h".to_string(),
                    system: true,
                });
                text.push_str("char ");
                text.push_str(name);
                match capacity {
                    Some(expr) => {
                        let capacity_text = self.dimension_text(expr)?;
                        // One extra byte for the terminator
                        match eval_const_expr(expr, &|n| self.const_lookup(n)) {
                            Some(n) => {
                                let _ = write!(text, "[{}]", n + 1);
                            }
                            None => {
                                let _ = write!(text, "[{} + 1]", capacity_text);
                            }
                        }
                    }
                    None => text.push_str("[]"),
                }
            }
            _ => {
                let type_name = self.c_type_name(ty);
                text.push_str(&type_name);
                text.push(' ');
                text.push_str(name);
            }
        }
        for dim in dimensions {
            let _ = write!(text, "[{}]", self.dimension_text(dim)?);
        }
        Ok(text)
    }

    /// Array-dimension text: the literal when compile-time evaluable,
    /// otherwise the expression verbatim (macros, enum members)
    pub(crate) fn dimension_text(&mut self, dim: &Expr) -> Result<String, CodeGenError> {
        if let Some(value) = eval_const_expr(dim, &|name| self.const_lookup(name)) {
            return Ok(value.to_string());
        }
        self.emit_expr(dim)
    }

    /// Constant lookup for dimension/enum evaluation: scope consts first,
    /// then globals, then enum members
    pub(crate) fn const_lookup(&self, name: &str) -> Option<i128> {
        if let Some(dot) = name.find('.') {
            let (enum_name, member) = name.split_at(dot);
            let member = &member[1..];
            let candidates = match self.current_scope.as_deref() {
                Some(scope) => vec![format!("{}_{}", scope, enum_name), enum_name.to_string()],
                None => vec![enum_name.to_string()],
            };
            return candidates
                .iter()
                .find_map(|q| self.visible.find_enum(q))
                .and_then(|info| info.value_of(member));
        }
        let qualified = self.qualify(name);
        self.visible
            .find_variable(&qualified)
            .or_else(|| self.visible.find_variable(name))
            .and_then(|info| info.const_value)
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn emit_function(
        &mut self,
        func: &crate::ast::FunctionDecl,
        visibility: Visibility,
        out: &mut String,
    ) -> Result<(), CodeGenError> {
        let Some(body) = &func.body else {
            return Ok(());
        };
        let qualified = self.qualify(&func.name);
        let info = self
            .visible
            .find_function(&qualified)
            .cloned()
            .ok_or_else(|| {
                Diagnostic::error(
                    self.file,
                    func.loc.line,
                    func.loc.column,
                    format!("Function '{}' missing from symbol table", qualified),
                )
            })?;

        // Bind parameters with their computed pass modes before walking
        // the body; every use site consults the binding.
        self.params.clear();
        for param in &info.params {
            let resolved = self.resolve_type(&param.ty);
            let mode = param_pass_mode(param, &resolved, &info, &self.visible, self.lang);
            self.params.insert(
                param.name.clone(),
                ParamBinding {
                    ty: resolved,
                    mode,
                    overflow: param.overflow,
                },
            );
        }

        let signature = render_signature(&info, &self.visible, self.lang)?;
        let type_includes = signature_type_effects(&info, &self.visible);
        for effect in type_includes {
            self.register_effect(effect);
        }

        writeln!(out)?;
        if visibility == Visibility::Private && self.current_scope.is_some() {
            write!(out, "static ")?;
        }
        writeln!(out, "{}", signature)?;
        writeln!(out, "{{")?;
        self.current_return = Some(self.resolve_type(&info.return_type));
        self.locals.push(HashMap::new());
        let body_result = self.emit_block_statements(body, 1, out);
        self.locals.pop();
        self.current_return = None;
        body_result?;
        writeln!(out, "}}")?;
        self.params.clear();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Types and lookups
    // ------------------------------------------------------------------

    pub(crate) fn resolve_type(&self, ty: &Type) -> Type {
        self.visible.classify_type(ty, self.current_scope.as_deref())
    }

    /// C spelling of a resolved type, registering include effects
    pub(crate) fn c_type_name(&mut self, ty: &Type) -> String {
        match ty {
            Type::Primitive(kind) => {
                if kind.is_integer() {
                    self.register_effect(Effect::Include {
                        header: "stdint.h".to_string(),
                        system: true,
                    });
                }
                if *kind == PrimitiveKind::Bool {
                    self.register_effect(Effect::Include {
                        header: "stdbool.h".to_string(),
                        system: true,
                    });
                }
                kind.c_name().to_string()
            }
            Type::Bitmap { name, .. } => name.clone(),
            _ => c_type_text(ty, &self.visible),
        }
    }

    /// Resolve a bare identifier to its C name and binding, searching
    /// locals, parameters, the current scope, then file/global scope
    pub(crate) fn lookup_value(&self, name: &str) -> Option<(String, ValueBinding)> {
        for frame in self.locals.iter().rev() {
            if let Some(local) = frame.get(name) {
                return Some((name.to_string(), ValueBinding::Local(local.clone())));
            }
        }
        if let Some(param) = self.params.get(name) {
            return Some((name.to_string(), ValueBinding::Param(param.clone())));
        }
        if self.current_scope.is_some() {
            let qualified = self.qualify(name);
            if let Some(info) = self.visible.find_variable(&qualified) {
                return Some((qualified, ValueBinding::Variable(info.clone())));
            }
        }
        self.visible
            .find_variable(name)
            .map(|info| (name.to_string(), ValueBinding::Variable(info.clone())))
    }

    pub(crate) fn declare_local(&mut self, name: &str, binding: LocalBinding) {
        if let Some(frame) = self.locals.last_mut() {
            frame.insert(name.to_string(), binding);
        }
    }

    /// Fresh-ish temp names for atomic loops; nesting bumps the suffix
    pub(crate) fn temp_names(&mut self) -> (String, String) {
        let suffix = if self.temp_depth <= 1 {
            String::new()
        } else {
            self.temp_depth.to_string()
        };
        (format!("__old{}", suffix), format!("__new{}", suffix))
    }

    pub(crate) fn enter_temp(&mut self) {
        self.temp_depth += 1;
    }

    pub(crate) fn leave_temp(&mut self) {
        self.temp_depth -= 1;
    }
}

/// Compute one parameter's pass mode from its resolved type and the
/// function's mutation analysis. This must be a pure function of the
/// symbol information so the `.c` emitter and header synthesizer agree.
pub fn param_pass_mode(
    param: &Param,
    resolved: &Type,
    info: &FunctionInfo,
    visible: &VisibleSymbols<'_>,
    lang: OutputLang,
) -> PassMode {
    let mutated = info.mutated_params.contains(&param.name);

    if !param.dimensions.is_empty() {
        return PassMode::Array {
            is_const: param.is_const || !mutated,
        };
    }

    match resolved {
        Type::CnxString { capacity: Some(_) } => PassMode::Array {
            is_const: param.is_const || !mutated,
        },
        Type::CnxString { capacity: None } => {
            if mutated {
                PassMode::Pointer
            } else {
                PassMode::ConstPointer
            }
        }
        Type::Struct(name) => {
            if mutated {
                return indirect(lang, false);
            }
            match struct_size(visible, name) {
                Some(size) if size <= PASS_BY_VALUE_MAX_STRUCT_BYTES => PassMode::Value,
                _ => indirect(lang, true),
            }
        }
        Type::Array { .. } => PassMode::Array {
            is_const: param.is_const || !mutated,
        },
        // Primitives, enums, bitmaps, callbacks, and external scalars are
        // machine words: by value unless the body writes to them
        _ => {
            if mutated {
                indirect(lang, false)
            } else {
                PassMode::Value
            }
        }
    }
}

fn indirect(lang: OutputLang, is_const: bool) -> PassMode {
    match (lang, is_const) {
        (OutputLang::C, false) => PassMode::Pointer,
        (OutputLang::C, true) => PassMode::ConstPointer,
        (OutputLang::Cpp, false) => PassMode::Reference,
        (OutputLang::Cpp, true) => PassMode::ConstReference,
    }
}

/// Total size of a struct's lowered layout with natural alignment.
/// None when any member size is unknowable at translation time.
pub fn struct_size(visible: &VisibleSymbols<'_>, qualified: &str) -> Option<usize> {
    let info = visible.find_struct(qualified)?;
    let mut offset = 0usize;
    let mut max_align = 1usize;
    for (_, field_type, dimensions) in &info.fields {
        let resolved = visible.classify_type(field_type, info.scope.as_deref());
        let (size, align) = type_size_align(visible, &resolved)?;
        let mut count = 1usize;
        for dim in dimensions {
            let n = eval_const_expr(dim, &|_| None)?;
            count = count.checked_mul(usize::try_from(n).ok()?)?;
        }
        offset = offset.div_ceil(align) * align;
        offset += size * count;
        max_align = max_align.max(align);
    }
    Some(offset.div_ceil(max_align) * max_align)
}

fn type_size_align(visible: &VisibleSymbols<'_>, ty: &Type) -> Option<(usize, usize)> {
    match ty {
        Type::Primitive(kind) => {
            let size = kind.size_bytes();
            (size > 0).then_some((size, size))
        }
        Type::Enum(_) => Some((4, 4)),
        Type::Bitmap { bit_width, .. } => {
            let bytes = match bit_width {
                8 => 1,
                16 => 2,
                _ => 4,
            };
            Some((bytes, bytes))
        }
        Type::CnxString { capacity: Some(expr) } => {
            let n = eval_const_expr(expr, &|_| None)?;
            Some((usize::try_from(n).ok()? + 1, 1))
        }
        Type::Struct(name) => {
            let size = struct_size(visible, name)?;
            // Conservative alignment for nested structs
            Some((size, 8.min(size.max(1))))
        }
        Type::Callback(_) => Some((std::mem::size_of::<usize>(), std::mem::size_of::<usize>())),
        _ => None,
    }
}

/// C spelling of a resolved type without effect registration (shared with
/// the header synthesizer)
pub fn c_type_text(ty: &Type, visible: &VisibleSymbols<'_>) -> String {
    match ty {
        Type::Primitive(kind) => kind.c_name().to_string(),
        Type::CnxString { .. } => "char".to_string(),
        Type::Array { element, .. } => c_type_text(element, visible),
        Type::Struct(name)
        | Type::Enum(name)
        | Type::Callback(name)
        | Type::Register(name)
        | Type::External(name)
        | Type::Named(name) => name.clone(),
        Type::Bitmap { name, .. } => name.clone(),
        Type::Scoped { scope, name } => format!("{}_{}", scope, name),
        Type::Qualified { outer, name } => format!("{}_{}", outer, name),
    }
}

/// Render one parameter for a signature
fn render_param_text(
    param: &Param,
    resolved: &Type,
    mode: PassMode,
    visible: &VisibleSymbols<'_>,
) -> String {
    let base = c_type_text(resolved, visible);
    match mode {
        PassMode::Value => format!("{} {}", base, param.name),
        PassMode::Pointer => format!("{}* {}", base, param.name),
        PassMode::ConstPointer => format!("const {}* {}", base, param.name),
        PassMode::Reference => format!("{}& {}", base, param.name),
        PassMode::ConstReference => format!("const {}& {}", base, param.name),
        PassMode::Array { is_const } => {
            let mut text = String::new();
            if is_const {
                text.push_str("const ");
            }
            text.push_str(&base);
            text.push(' ');
            text.push_str(&param.name);
            if let Type::CnxString { capacity: Some(expr) } = resolved {
                match eval_const_expr(expr, &|_| None) {
                    Some(n) => {
                        let _ = write!(text, "[{}]", n + 1);
                    }
                    None => text.push_str("[]"),
                }
            }
            for dim in &param.dimensions {
                match eval_const_expr(dim, &|_| None) {
                    Some(n) => {
                        let _ = write!(text, "[{}]", n);
                    }
                    None => {
                        let _ = write!(text, "[{}]", const_dimension_fallback(dim));
                    }
                }
            }
            text
        }
    }
}

/// Verbatim text for a symbolic dimension (macro or enum member name)
fn const_dimension_fallback(dim: &Expr) -> String {
    match dim {
        Expr::Ident { name, .. } => name.clone(),
        Expr::IntLit { text, .. } => crate::parser::strip_int_suffix(text).to_string(),
        Expr::Member { base, name, .. } => match base.root_ident() {
            Some(root) => format!("{}_{}", root, name),
            None => name.clone(),
        },
        _ => String::new(),
    }
}

/// Render the full C signature for a function. The header synthesizer and
/// the `.c` emitter both call this, which guarantees the two match.
pub fn render_signature(
    info: &FunctionInfo,
    visible: &VisibleSymbols<'_>,
    lang: OutputLang,
) -> Result<String, CodeGenError> {
    let return_resolved = visible.classify_type(&info.return_type, info.scope.as_deref());
    let return_text = if matches!(return_resolved, Type::Primitive(PrimitiveKind::Isr)) {
        "void".to_string()
    } else {
        c_type_text(&return_resolved, visible)
    };

    let mut text = format!("{} {}(", return_text, info.mangled());
    if info.params.is_empty() {
        text.push_str("void");
    } else {
        let rendered: Vec<String> = info
            .params
            .iter()
            .map(|param| {
                let resolved = visible.classify_type(&param.ty, info.scope.as_deref());
                let mode = param_pass_mode(param, &resolved, info, visible, lang);
                render_param_text(param, &resolved, mode, visible)
            })
            .collect();
        text.push_str(&rendered.join(", "));
    }
    text.push(')');
    Ok(text)
}

/// Include effects implied by the types in a signature
pub fn signature_type_effects(
    info: &FunctionInfo,
    visible: &VisibleSymbols<'_>,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    let mut add_for = |ty: &Type| {
        let resolved = visible.classify_type(ty, info.scope.as_deref());
        match resolved {
            Type::Primitive(kind) if kind.is_integer() => effects.push(Effect::Include {
                header: "stdint.h".to_string(),
                system: true,
            }),
            Type::Primitive(PrimitiveKind::Bool) => effects.push(Effect::Include {
                header: "stdbool.h".to_string(),
                system: true,
            }),
            Type::Callback(name) => effects.push(Effect::CallbackTypedef { name }),
            _ => {}
        }
    };
    add_for(&info.return_type);
    for param in &info.params {
        add_for(&param.ty);
    }
    effects
}

/// `typedef enum { E_A = 0, ... } E;` with mandatory member prefixing
pub fn emit_enum_typedef(
    info: &crate::symbols::EnumInfo,
    out: &mut String,
) -> Result<(), CodeGenError> {
    let qualified = match &info.scope {
        Some(scope) => format!("{}_{}", scope, info.name),
        None => info.name.clone(),
    };
    writeln!(out, "typedef enum {{")?;
    for (index, (member, value)) in info.members.iter().enumerate() {
        let comma = if index + 1 < info.members.len() { "," } else { "" };
        writeln!(out, "    {}_{} = {}{}", qualified, member, value, comma)?;
    }
    writeln!(out, "}} {};", qualified)?;
    writeln!(out)?;
    Ok(())
}

/// `typedef uintNN_t B;` preceded by a comment documenting every field's
/// bit range
pub fn emit_bitmap_typedef(
    info: &crate::symbols::BitmapInfo,
    out: &mut String,
) -> Result<(), CodeGenError> {
    let qualified = match &info.scope {
        Some(scope) => format!("{}_{}", scope, info.name),
        None => info.name.clone(),
    };
    writeln!(out, "/* {} bit layout:", qualified)?;
    for (name, offset, width) in &info.fields {
        if *width == 1 {
            writeln!(out, " *   {}: bit {}", name, offset)?;
        } else {
            writeln!(out, " *   {}: bits {}-{}", name, offset, offset + width - 1)?;
        }
    }
    writeln!(out, " */")?;
    writeln!(
        out,
        "typedef {} {};",
        bitmap_backing_c_type(info.bit_width),
        qualified
    )?;
    writeln!(out)?;
    Ok(())
}

/// `typedef struct S { ... } S;` in the named form so forward declarations
/// keep working
pub fn render_struct_typedef(
    info: &crate::symbols::StructInfo,
    visible: &VisibleSymbols<'_>,
) -> Result<String, CodeGenError> {
    let qualified = match &info.scope {
        Some(scope) => format!("{}_{}", scope, info.name),
        None => info.name.clone(),
    };
    let mut out = String::new();
    writeln!(out, "typedef struct {} {{", qualified)?;
    for (name, field_type, dimensions) in &info.fields {
        let resolved = visible.classify_type(field_type, info.scope.as_deref());
        let mut line = String::new();
        match &resolved {
            Type::CnxString { capacity: Some(expr) } => {
                match eval_const_expr(expr, &|_| None) {
                    Some(n) => {
                        let _ = write!(line, "char {}[{}]", name, n + 1);
                    }
                    None => {
                        let _ = write!(line, "char {}[{} + 1]", name, const_dimension_fallback(expr));
                    }
                }
            }
            _ => {
                let _ = write!(line, "{} {}", c_type_text(&resolved, visible), name);
            }
        }
        for dim in dimensions {
            match eval_const_expr(dim, &|_| None) {
                Some(n) => {
                    let _ = write!(line, "[{}]", n);
                }
                None => {
                    let _ = write!(line, "[{}]", const_dimension_fallback(dim));
                }
            }
        }
        writeln!(out, "    {};", line)?;
    }
    writeln!(out, "}} {};", qualified)?;
    writeln!(out)?;
    Ok(out)
}

/// Function-pointer typedef for a callback type
pub fn render_callback_typedef(
    info: &crate::symbols::CallbackInfo,
    visible: &VisibleSymbols<'_>,
) -> String {
    let qualified = match &info.scope {
        Some(scope) => format!("{}_{}", scope, info.name),
        None => info.name.clone(),
    };
    let return_resolved = visible.classify_type(&info.return_type, info.scope.as_deref());
    let params: Vec<String> = if info.params.is_empty() {
        vec!["void".to_string()]
    } else {
        info.params
            .iter()
            .map(|p| {
                let resolved = visible.classify_type(&p.ty, info.scope.as_deref());
                format!("{} {}", c_type_text(&resolved, visible), p.name)
            })
            .collect()
    };
    format!(
        "typedef {} (*{})({});\n",
        c_type_text(&return_resolved, visible),
        qualified,
        params.join(", ")
    )
}
