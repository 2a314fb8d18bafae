//! Symbol collection and cross-file resolution
//!
//! Two passes run over every file in topological order before any emission:
//!
//! 1. The declaration pass records scopes, structs, enums, bitmaps,
//!    registers, callbacks, function signatures, and top-level variables,
//!    keyed by fully qualified (scope-mangled) name.
//! 2. The body pass records which parameters each function mutates and
//!    which scope variables it touches. Mutation propagates through calls
//!    (passing a parameter to a function that takes it by pointer mutates
//!    it here too), so the project-level pass iterates to a fixed point.

use crate::ast::{
    Block, CallbackDecl, Declaration, ElseBranch, Expr, FileLocation, Overflow, Param, Program,
    ScopeMember, SourceLocation, Statement, UnaryOp, VariableDecl, Visibility,
};
use crate::diagnostics::Diagnostic;
use crate::scopes::{GLOBAL_SCOPE, ScopeArena, ScopeId};
use crate::types::Type;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A recorded function signature
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub bare_name: String,
    /// Owning scope name, None at file scope
    pub scope: Option<String>,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub visibility: Visibility,
    pub has_body: bool,
    pub location: FileLocation,
    /// Parameter names the body writes, addresses, or passes by pointer
    pub mutated_params: HashSet<String>,
}

impl FunctionInfo {
    /// The C-mangled name
    pub fn mangled(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}_{}", scope, self.bare_name),
            None => self.bare_name.clone(),
        }
    }
}

/// A recorded variable
#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub bare_name: String,
    pub scope: Option<String>,
    pub ty: Type,
    pub dimensions: Vec<Expr>,
    pub visibility: Visibility,
    pub is_const: bool,
    pub is_atomic: bool,
    pub is_volatile: bool,
    pub overflow: Option<Overflow>,
    /// Compile-time value of a const initializer, for private-const inlining
    pub const_value: Option<i128>,
    pub location: FileLocation,
}

#[derive(Debug, Clone)]
pub struct StructInfo {
    pub name: String,
    pub scope: Option<String>,
    pub visibility: Visibility,
    /// Field name to (type, dimensions)
    pub fields: Vec<(String, Type, Vec<Expr>)>,
}

impl StructInfo {
    pub fn field(&self, name: &str) -> Option<&(String, Type, Vec<Expr>)> {
        self.fields.iter().find(|(f, _, _)| f == name)
    }
}

#[derive(Debug, Clone)]
pub struct EnumInfo {
    pub name: String,
    pub scope: Option<String>,
    pub visibility: Visibility,
    /// Members in declaration order with resolved values
    pub members: Vec<(String, i128)>,
}

impl EnumInfo {
    pub fn value_of(&self, member: &str) -> Option<i128> {
        self.members
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, value)| *value)
    }
}

#[derive(Debug, Clone)]
pub struct BitmapInfo {
    pub name: String,
    pub scope: Option<String>,
    pub visibility: Visibility,
    pub bit_width: u32,
    /// Field name to (offset, width), offsets cumulative in order
    pub fields: Vec<(String, u32, u32)>,
}

impl BitmapInfo {
    pub fn field(&self, name: &str) -> Option<(u32, u32)> {
        self.fields
            .iter()
            .find(|(f, _, _)| f == name)
            .map(|(_, offset, width)| (*offset, *width))
    }
}

#[derive(Debug, Clone)]
pub struct RegisterMemberInfo {
    pub name: String,
    pub ty: Type,
    pub access: crate::ast::AccessMode,
    pub offset: Expr,
}

#[derive(Debug, Clone)]
pub struct RegisterInfo {
    pub name: String,
    pub scope: Option<String>,
    pub visibility: Visibility,
    pub base: Expr,
    pub members: Vec<RegisterMemberInfo>,
}

impl RegisterInfo {
    pub fn member(&self, name: &str) -> Option<&RegisterMemberInfo> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct CallbackInfo {
    pub name: String,
    pub scope: Option<String>,
    pub visibility: Visibility,
    pub params: Vec<Param>,
    pub return_type: Type,
}

/// Everything collected from one translation unit
#[derive(Debug, Clone, Default)]
pub struct FileSymbols {
    pub scopes: Vec<String>,
    /// Keyed by fully qualified (mangled) name
    pub functions: HashMap<String, FunctionInfo>,
    pub variables: HashMap<String, VariableInfo>,
    pub structs: HashMap<String, StructInfo>,
    pub enums: HashMap<String, EnumInfo>,
    pub bitmaps: HashMap<String, BitmapInfo>,
    pub registers: HashMap<String, RegisterInfo>,
    pub callbacks: HashMap<String, CallbackInfo>,
    /// Callback type names used as struct fields; only these need typedefs
    pub callback_fields_used: HashSet<String>,
    /// Scope variables written by some function body, by qualified name
    pub scope_vars_written: HashSet<String>,
}

fn qualify(scope: Option<&str>, bare: &str) -> String {
    match scope {
        Some(scope) => format!("{}_{}", scope, bare),
        None => bare.to_string(),
    }
}

/// Evaluate a constant expression against a name-lookup environment.
/// Used for enum values, bitmap layouts, register offsets, and array sizes.
pub fn eval_const_expr(expr: &Expr, lookup: &dyn Fn(&str) -> Option<i128>) -> Option<i128> {
    match expr {
        Expr::IntLit { value, .. } => Some(*value),
        Expr::BoolLit { value, .. } => Some(i128::from(*value)),
        Expr::Ident { name, .. } => lookup(name),
        Expr::Member { base, name, .. } => {
            // Qualified constant: Enum.MEMBER or Scope.CONST
            let base_name = base.root_ident()?;
            lookup(&format!("{}.{}", base_name, name))
        }
        Expr::Paren { inner, .. } => eval_const_expr(inner, lookup),
        Expr::Unary { op, operand, .. } => {
            let value = eval_const_expr(operand, lookup)?;
            match op {
                UnaryOp::Neg => Some(-value),
                UnaryOp::BitNot => Some(!value),
                UnaryOp::Not => Some(i128::from(value == 0)),
                UnaryOp::AddrOf => None,
            }
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            use crate::ast::BinaryOp;
            let l = eval_const_expr(lhs, lookup)?;
            let r = eval_const_expr(rhs, lookup)?;
            match op {
                BinaryOp::Add => l.checked_add(r),
                BinaryOp::Sub => l.checked_sub(r),
                BinaryOp::Mul => l.checked_mul(r),
                BinaryOp::Div => (r != 0).then(|| l / r),
                BinaryOp::Mod => (r != 0).then(|| l % r),
                BinaryOp::Shl => l.checked_shl(u32::try_from(r).ok()?),
                BinaryOp::Shr => l.checked_shr(u32::try_from(r).ok()?),
                BinaryOp::BitAnd => Some(l & r),
                BinaryOp::BitOr => Some(l | r),
                BinaryOp::BitXor => Some(l ^ r),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Declaration pass over one file. Scope nesting is tracked through an
/// arena of indexed nodes; mangled names come from the arena's ancestor
/// chain so deeper hierarchies keep working.
pub fn collect_declarations(
    program: &Program,
    file: &Path,
) -> Result<FileSymbols, Vec<Diagnostic>> {
    let mut symbols = FileSymbols::default();
    let mut errors = Vec::new();
    let mut arena = ScopeArena::new();

    for declaration in &program.declarations {
        collect_declaration(
            declaration,
            &mut arena,
            GLOBAL_SCOPE,
            Visibility::Public,
            file,
            &mut symbols,
            &mut errors,
        );
    }

    // Only callback types actually used as struct fields need typedefs
    let callback_names: HashSet<String> = symbols.callbacks.keys().cloned().collect();
    for struct_info in symbols.structs.values() {
        for (_, field_type, _) in &struct_info.fields {
            if let Some(name) = field_type.name() {
                let qualified = qualify(struct_info.scope.as_deref(), name);
                if callback_names.contains(name) {
                    symbols.callback_fields_used.insert(name.to_string());
                } else if callback_names.contains(&qualified) {
                    symbols.callback_fields_used.insert(qualified);
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(symbols)
    } else {
        Err(errors)
    }
}

fn location(file: &Path, loc: &SourceLocation) -> FileLocation {
    FileLocation {
        file: file.to_path_buf(),
        line: loc.line,
        column: loc.column,
    }
}

fn scope_name(arena: &ScopeArena, scope: ScopeId) -> Option<String> {
    if arena.is_global(scope) {
        None
    } else {
        Some(arena.chain(scope).join("_"))
    }
}

fn collect_declaration(
    declaration: &Declaration,
    arena: &mut ScopeArena,
    scope: ScopeId,
    visibility: Visibility,
    file: &Path,
    symbols: &mut FileSymbols,
    errors: &mut Vec<Diagnostic>,
) {
    let scope_label = scope_name(arena, scope);
    let scope = &scope;
    match declaration {
        Declaration::Scope(scope_decl) => {
            symbols.scopes.push(scope_decl.name.clone());
            let inner = arena.add(*scope, &scope_decl.name);
            for ScopeMember { visibility, decl } in &scope_decl.members {
                collect_declaration(decl, arena, inner, *visibility, file, symbols, errors);
            }
        }
        Declaration::Function(func) => {
            let qualified = arena.mangle(*scope, &func.name);
            let info = FunctionInfo {
                bare_name: func.name.clone(),
                scope: scope_label.clone(),
                params: func.params.clone(),
                return_type: func.return_type.clone(),
                visibility,
                has_body: func.body.is_some(),
                location: location(file, &func.loc),
                mutated_params: HashSet::new(),
            };
            if let Some(existing) = symbols.functions.insert(qualified.clone(), info) {
                errors.push(redeclaration(&qualified, &existing.location, file, &func.loc));
            }
        }
        Declaration::Variable(var) => {
            let qualified = arena.mangle(*scope, &var.name);
            let const_value = if var.is_const {
                var.initializer
                    .as_ref()
                    .and_then(|init| eval_const_expr(init, &|_| None))
            } else {
                None
            };
            let info = VariableInfo {
                bare_name: var.name.clone(),
                scope: scope_label.clone(),
                ty: var.ty.clone(),
                dimensions: var.dimensions.clone(),
                visibility,
                is_const: var.is_const,
                is_atomic: var.is_atomic,
                is_volatile: var.is_volatile,
                overflow: var.overflow,
                const_value,
                location: location(file, &var.loc),
            };
            if let Some(existing) = symbols.variables.insert(qualified.clone(), info) {
                errors.push(redeclaration(&qualified, &existing.location, file, &var.loc));
            }
        }
        Declaration::Struct(decl) => {
            let qualified = arena.mangle(*scope, &decl.name);
            let info = StructInfo {
                name: decl.name.clone(),
                scope: scope_label.clone(),
                visibility,
                fields: decl
                    .fields
                    .iter()
                    .map(|f| (f.name.clone(), f.ty.clone(), f.dimensions.clone()))
                    .collect(),
            };
            if symbols.structs.insert(qualified.clone(), info).is_some() {
                errors.push(
                    Diagnostic::error(
                        file,
                        decl.loc.line,
                        decl.loc.column,
                        format!("Struct '{}' is declared more than once", qualified),
                    )
                    .with_code("E0805"),
                );
            }
        }
        Declaration::Enum(decl) => {
            let qualified = arena.mangle(*scope, &decl.name);
            // Implicit values continue from the previous member, starting at 0.
            // Explicit values may reference earlier members and constants.
            let mut members: Vec<(String, i128)> = Vec::new();
            let mut next_value: i128 = 0;
            for member in &decl.members {
                let value = match &member.value {
                    Some(expr) => {
                        let members_ref = &members;
                        let resolved = eval_const_expr(expr, &|name: &str| {
                            let bare = name.rsplit('.').next().unwrap_or(name);
                            members_ref
                                .iter()
                                .find(|(m, _)| m == bare)
                                .map(|(_, v)| *v)
                                .or_else(|| {
                                    symbols
                                        .variables
                                        .get(name)
                                        .or_else(|| symbols.variables.get(bare))
                                        .and_then(|v| v.const_value)
                                })
                        });
                        match resolved {
                            Some(value) => value,
                            None => {
                                errors.push(Diagnostic::error(
                                    file,
                                    member.loc.line,
                                    member.loc.column,
                                    format!(
                                        "Enum member '{}.{}' has a value that is not a compile-time constant",
                                        decl.name, member.name
                                    ),
                                ));
                                next_value
                            }
                        }
                    }
                    None => next_value,
                };
                members.push((member.name.clone(), value));
                next_value = value + 1;
            }
            let info = EnumInfo {
                name: decl.name.clone(),
                scope: scope_label.clone(),
                visibility,
                members,
            };
            if symbols.enums.insert(qualified.clone(), info).is_some() {
                errors.push(
                    Diagnostic::error(
                        file,
                        decl.loc.line,
                        decl.loc.column,
                        format!("Enum '{}' is declared more than once", qualified),
                    )
                    .with_code("E0805"),
                );
            }
        }
        Declaration::Bitmap(decl) => {
            let qualified = arena.mangle(*scope, &decl.name);
            let mut fields = Vec::new();
            let mut offset = 0u32;
            for field in &decl.fields {
                fields.push((field.name.clone(), offset, field.width));
                offset += field.width;
            }
            let info = BitmapInfo {
                name: decl.name.clone(),
                scope: scope_label.clone(),
                visibility,
                bit_width: decl.bit_width,
                fields,
            };
            symbols.bitmaps.insert(qualified, info);
        }
        Declaration::Register(decl) => {
            let qualified = arena.mangle(*scope, &decl.name);
            let info = RegisterInfo {
                name: decl.name.clone(),
                scope: scope_label.clone(),
                visibility,
                base: decl.base.clone(),
                members: decl
                    .members
                    .iter()
                    .map(|m| RegisterMemberInfo {
                        name: m.name.clone(),
                        ty: m.ty.clone(),
                        access: m.access,
                        offset: m.offset.clone(),
                    })
                    .collect(),
            };
            symbols.registers.insert(qualified, info);
        }
        Declaration::Callback(CallbackDecl {
            name,
            params,
            return_type,
            ..
        }) => {
            let qualified = arena.mangle(*scope, name);
            symbols.callbacks.insert(
                qualified,
                CallbackInfo {
                    name: name.clone(),
                    scope: scope_label.clone(),
                    visibility,
                    params: params.clone(),
                    return_type: return_type.clone(),
                },
            );
        }
        Declaration::Preprocessor(_) => {}
    }
}

fn redeclaration(
    qualified: &str,
    first: &FileLocation,
    file: &Path,
    loc: &SourceLocation,
) -> Diagnostic {
    Diagnostic::error(
        file,
        loc.line,
        loc.column,
        format!(
            "'{}' is declared more than once; first declaration at {}",
            qualified, first
        ),
    )
    .with_code("E0805")
}

/// Body pass: record mutated parameters and written scope variables for
/// every function with a body.
pub fn collect_bodies(program: &Program, symbols: &mut FileSymbols) {
    for declaration in &program.declarations {
        match declaration {
            Declaration::Function(func) => {
                analyze_function(func, None, symbols);
            }
            Declaration::Scope(scope_decl) => {
                for member in &scope_decl.members {
                    if let Declaration::Function(func) = &member.decl {
                        analyze_function(func, Some(&scope_decl.name), symbols);
                    }
                }
            }
            _ => {}
        }
    }
}

fn analyze_function(func: &crate::ast::FunctionDecl, scope: Option<&str>, symbols: &mut FileSymbols) {
    let Some(body) = &func.body else {
        return;
    };
    let param_names: HashSet<String> = func.params.iter().map(|p| p.name.clone()).collect();
    let mut mutated = HashSet::new();
    let mut scope_writes = HashSet::new();
    analyze_block(body, &param_names, &mut mutated, &mut scope_writes);

    let qualified = qualify(scope, &func.name);
    if let Some(info) = symbols.functions.get_mut(&qualified) {
        info.mutated_params = mutated;
    }
    for written in scope_writes {
        let qualified_var = qualify(scope, &written);
        symbols.scope_vars_written.insert(qualified_var);
    }
}

fn analyze_block(
    block: &Block,
    params: &HashSet<String>,
    mutated: &mut HashSet<String>,
    scope_writes: &mut HashSet<String>,
) {
    for statement in &block.statements {
        analyze_statement(statement, params, mutated, scope_writes);
    }
}

fn analyze_statement(
    statement: &Statement,
    params: &HashSet<String>,
    mutated: &mut HashSet<String>,
    scope_writes: &mut HashSet<String>,
) {
    match statement {
        Statement::Assign { target, value, .. } => {
            // Writes to `p`, `p.f`, and `p[i]` all mutate the parameter
            if let Some(root) = target.root_ident() {
                if params.contains(root) {
                    mutated.insert(root.to_string());
                } else {
                    scope_writes.insert(root.to_string());
                }
            }
            analyze_expr(value, params, mutated);
        }
        Statement::VarDecl(VariableDecl {
            initializer: Some(init),
            ..
        }) => analyze_expr(init, params, mutated),
        Statement::VarDecl(_) => {}
        Statement::If {
            cond,
            then_block,
            else_branch,
            ..
        } => {
            analyze_expr(cond, params, mutated);
            analyze_block(then_block, params, mutated, scope_writes);
            match else_branch {
                Some(ElseBranch::If(statement)) => {
                    analyze_statement(statement, params, mutated, scope_writes);
                }
                Some(ElseBranch::Block(block)) => {
                    analyze_block(block, params, mutated, scope_writes);
                }
                None => {}
            }
        }
        Statement::While { cond, body, .. } => {
            analyze_expr(cond, params, mutated);
            analyze_block(body, params, mutated, scope_writes);
        }
        Statement::DoWhile { body, cond, .. } => {
            analyze_block(body, params, mutated, scope_writes);
            analyze_expr(cond, params, mutated);
        }
        Statement::For {
            init,
            cond,
            step,
            body,
            ..
        } => {
            if let Some(init) = init {
                analyze_statement(init, params, mutated, scope_writes);
            }
            if let Some(cond) = cond {
                analyze_expr(cond, params, mutated);
            }
            if let Some(step) = step {
                if let Some(root) = step.target.root_ident() {
                    if params.contains(root) {
                        mutated.insert(root.to_string());
                    } else {
                        scope_writes.insert(root.to_string());
                    }
                }
                analyze_expr(&step.value, params, mutated);
            }
            analyze_block(body, params, mutated, scope_writes);
        }
        Statement::Return { value: Some(value), .. } => analyze_expr(value, params, mutated),
        Statement::Return { value: None, .. } => {}
        Statement::Critical { body, .. } => analyze_block(body, params, mutated, scope_writes),
        Statement::Expr { expr, .. } => analyze_expr(expr, params, mutated),
        Statement::Break { .. } | Statement::Continue { .. } => {}
    }
}

fn analyze_expr(expr: &Expr, params: &HashSet<String>, mutated: &mut HashSet<String>) {
    match expr {
        // Taking a parameter's address counts as mutation
        Expr::Unary {
            op: UnaryOp::AddrOf,
            operand,
            ..
        } => {
            if let Some(root) = operand.root_ident() {
                if params.contains(root) {
                    mutated.insert(root.to_string());
                }
            }
        }
        Expr::Unary { operand, .. } => analyze_expr(operand, params, mutated),
        Expr::Binary { lhs, rhs, .. } => {
            analyze_expr(lhs, params, mutated);
            analyze_expr(rhs, params, mutated);
        }
        Expr::Ternary {
            cond,
            then_value,
            else_value,
            ..
        } => {
            analyze_expr(cond, params, mutated);
            analyze_expr(then_value, params, mutated);
            analyze_expr(else_value, params, mutated);
        }
        Expr::Call { callee, args, .. } => {
            analyze_expr(callee, params, mutated);
            for arg in args {
                analyze_expr(arg, params, mutated);
            }
        }
        Expr::Member { base, .. } => analyze_expr(base, params, mutated),
        Expr::Index { base, index, .. } => {
            analyze_expr(base, params, mutated);
            analyze_expr(index, params, mutated);
        }
        Expr::BitRange {
            base, start, width, ..
        } => {
            analyze_expr(base, params, mutated);
            analyze_expr(start, params, mutated);
            analyze_expr(width, params, mutated);
        }
        Expr::Paren { inner, .. } => analyze_expr(inner, params, mutated),
        _ => {}
    }
}

/// Project-wide symbol view: per-file stores plus the include graph
#[derive(Debug, Default)]
pub struct ProjectSymbols {
    pub files: HashMap<PathBuf, FileSymbols>,
    /// C-Next include edges: file to files it includes
    pub includes: HashMap<PathBuf, Vec<PathBuf>>,
    /// Parsed programs kept for fixed-point body analysis
    pub programs: HashMap<PathBuf, Program>,
}

impl ProjectSymbols {
    /// Cross-file redeclaration check over functions and variables; both
    /// locations are reported.
    pub fn check_conflicts(&self) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        let mut seen_functions: HashMap<&str, &FunctionInfo> = HashMap::new();
        let mut seen_variables: HashMap<&str, &VariableInfo> = HashMap::new();

        let mut paths: Vec<&PathBuf> = self.files.keys().collect();
        paths.sort();
        for path in paths {
            let symbols = &self.files[path];
            for (qualified, info) in &symbols.functions {
                if let Some(existing) = seen_functions.get(qualified.as_str()) {
                    // Prototypes matching a cross-file definition are legal
                    if !existing.has_body || !info.has_body {
                        continue;
                    }
                    errors.push(
                        Diagnostic::error(
                            &info.location.file,
                            info.location.line,
                            info.location.column,
                            format!(
                                "'{}' is declared in two places: {} and {}",
                                qualified, existing.location, info.location
                            ),
                        )
                        .with_code("E0805"),
                    );
                } else {
                    seen_functions.insert(qualified, info);
                }
            }
            for (qualified, info) in &symbols.variables {
                if let Some(existing) = seen_variables.get(qualified.as_str()) {
                    errors.push(
                        Diagnostic::error(
                            &info.location.file,
                            info.location.line,
                            info.location.column,
                            format!(
                                "'{}' is declared in two places: {} and {}",
                                qualified, existing.location, info.location
                            ),
                        )
                        .with_code("E0805"),
                    );
                } else {
                    seen_variables.insert(qualified, info);
                }
            }
        }
        errors
    }

    /// Transitive closure of C-Next includes for `file`, excluding itself
    fn reachable_includes(&self, file: &Path) -> Vec<PathBuf> {
        let mut reachable = Vec::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<PathBuf> = self
            .includes
            .get(file)
            .map(|v| v.clone())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if !visited.insert(next.clone()) {
                continue;
            }
            if let Some(nested) = self.includes.get(&next) {
                stack.extend(nested.iter().cloned());
            }
            reachable.push(next);
        }
        reachable
    }

    /// The symbols visible to `file`: everything it declares plus the public
    /// portion of every reachable include.
    pub fn visible(&self, file: &Path) -> VisibleSymbols<'_> {
        let mut layers = Vec::new();
        if let Some(own) = self.files.get(file) {
            layers.push((own, true));
        }
        for include in self.reachable_includes(file) {
            if let Some(theirs) = self.files.get(&include) {
                layers.push((theirs, false));
            }
        }
        VisibleSymbols { layers }
    }

    /// Iterate mutation propagation through call edges until stable.
    /// A parameter passed as an argument to a pointer-receiving parameter
    /// of a callee is itself mutated.
    pub fn propagate_mutations(&mut self) {
        loop {
            let snapshot: HashMap<String, HashSet<String>> = self
                .files
                .values()
                .flat_map(|f| f.functions.iter())
                .map(|(qualified, info)| (qualified.clone(), info.mutated_params.clone()))
                .collect();

            let mut changed = false;
            let paths: Vec<PathBuf> = self.programs.keys().cloned().collect();
            for path in paths {
                let program = self.programs.get(&path).cloned();
                let Some(program) = program else { continue };
                for declaration in &program.declarations {
                    match declaration {
                        Declaration::Function(func) => {
                            changed |= self.propagate_in_function(&path, func, None, &snapshot);
                        }
                        Declaration::Scope(scope_decl) => {
                            for member in &scope_decl.members {
                                if let Declaration::Function(func) = &member.decl {
                                    changed |= self.propagate_in_function(
                                        &path,
                                        func,
                                        Some(&scope_decl.name),
                                        &snapshot,
                                    );
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn propagate_in_function(
        &mut self,
        file: &Path,
        func: &crate::ast::FunctionDecl,
        scope: Option<&str>,
        snapshot: &HashMap<String, HashSet<String>>,
    ) -> bool {
        let Some(body) = &func.body else {
            return false;
        };
        let param_names: HashSet<String> = func.params.iter().map(|p| p.name.clone()).collect();
        let mut newly_mutated = HashSet::new();
        find_mutating_calls(body, &param_names, scope, snapshot, self, file, &mut newly_mutated);

        if newly_mutated.is_empty() {
            return false;
        }
        let qualified = qualify(scope, &func.name);
        let Some(info) = self
            .files
            .get_mut(file)
            .and_then(|f| f.functions.get_mut(&qualified))
        else {
            return false;
        };
        let before = info.mutated_params.len();
        info.mutated_params.extend(newly_mutated);
        info.mutated_params.len() != before
    }
}

/// Resolve a call expression to a qualified function name, given the scope
/// the call appears in. `this.f` and bare `f` resolve into the current
/// scope first, `global.S.f` to scope S, bare `f` falls back to file scope.
pub fn resolve_callee(callee: &Expr, current_scope: Option<&str>) -> Option<String> {
    match callee {
        Expr::Ident { name, .. } => Some(match current_scope {
            Some(scope) => format!("{}_{}", scope, name),
            None => name.clone(),
        }),
        Expr::Member { base, name, .. } => match &**base {
            Expr::Ident { name: base_name, .. } if base_name == "this" => {
                current_scope.map(|scope| format!("{}_{}", scope, name))
            }
            Expr::Ident { name: base_name, .. } => Some(format!("{}_{}", base_name, name)),
            Expr::Member {
                base: inner_base,
                name: scope_name,
                ..
            } => {
                // global.Scope.member
                if let Expr::Ident { name: root, .. } = &**inner_base {
                    if root == "global" {
                        return Some(format!("{}_{}", scope_name, name));
                    }
                }
                None
            }
            _ => None,
        },
        Expr::Paren { inner, .. } => resolve_callee(inner, current_scope),
        _ => None,
    }
}

fn find_mutating_calls(
    block: &Block,
    params: &HashSet<String>,
    scope: Option<&str>,
    snapshot: &HashMap<String, HashSet<String>>,
    project: &ProjectSymbols,
    file: &Path,
    newly_mutated: &mut HashSet<String>,
) {
    let mut visit_expr = |expr: &Expr, newly: &mut HashSet<String>| {
        collect_call_mutations(expr, params, scope, snapshot, project, file, newly);
    };
    walk_block_exprs(block, &mut |expr| visit_expr(expr, newly_mutated));
}

fn collect_call_mutations(
    expr: &Expr,
    params: &HashSet<String>,
    scope: Option<&str>,
    snapshot: &HashMap<String, HashSet<String>>,
    project: &ProjectSymbols,
    file: &Path,
    newly_mutated: &mut HashSet<String>,
) {
    if let Expr::Call { callee, args, .. } = expr {
        if let Some(qualified) = resolve_callee(callee, scope) {
            // Bare calls inside a scope may actually target a global function
            let callee_info = project
                .visible(file)
                .find_function(&qualified)
                .map(|f| f.clone())
                .or_else(|| {
                    if let Expr::Ident { name, .. } = &**callee {
                        project.visible(file).find_function(name).cloned()
                    } else {
                        None
                    }
                });
            if let Some(info) = callee_info {
                let callee_mutated = snapshot
                    .get(&info.mangled())
                    .cloned()
                    .unwrap_or_else(|| info.mutated_params.clone());
                for (index, arg) in args.iter().enumerate() {
                    let Some(param) = info.params.get(index) else {
                        continue;
                    };
                    if !callee_mutated.contains(&param.name) {
                        continue;
                    }
                    if let Some(root) = arg.root_ident() {
                        if params.contains(root) {
                            newly_mutated.insert(root.to_string());
                        }
                    }
                }
            }
        }
    }
}

/// Walk every expression in a block, including nested statements
fn walk_block_exprs(block: &Block, visit: &mut dyn FnMut(&Expr)) {
    for statement in &block.statements {
        walk_statement_exprs(statement, visit);
    }
}

fn walk_statement_exprs(statement: &Statement, visit: &mut dyn FnMut(&Expr)) {
    match statement {
        Statement::Assign { target, value, .. } => {
            walk_expr(target, visit);
            walk_expr(value, visit);
        }
        Statement::VarDecl(decl) => {
            if let Some(init) = &decl.initializer {
                walk_expr(init, visit);
            }
        }
        Statement::If {
            cond,
            then_block,
            else_branch,
            ..
        } => {
            walk_expr(cond, visit);
            walk_block_exprs(then_block, visit);
            match else_branch {
                Some(ElseBranch::If(statement)) => walk_statement_exprs(statement, visit),
                Some(ElseBranch::Block(block)) => walk_block_exprs(block, visit),
                None => {}
            }
        }
        Statement::While { cond, body, .. } => {
            walk_expr(cond, visit);
            walk_block_exprs(body, visit);
        }
        Statement::DoWhile { body, cond, .. } => {
            walk_block_exprs(body, visit);
            walk_expr(cond, visit);
        }
        Statement::For {
            init,
            cond,
            step,
            body,
            ..
        } => {
            if let Some(init) = init {
                walk_statement_exprs(init, visit);
            }
            if let Some(cond) = cond {
                walk_expr(cond, visit);
            }
            if let Some(step) = step {
                walk_expr(&step.target, visit);
                walk_expr(&step.value, visit);
            }
            walk_block_exprs(body, visit);
        }
        Statement::Return { value: Some(value), .. } => walk_expr(value, visit),
        Statement::Critical { body, .. } => walk_block_exprs(body, visit),
        Statement::Expr { expr, .. } => walk_expr(expr, visit),
        _ => {}
    }
}

fn walk_expr(expr: &Expr, visit: &mut dyn FnMut(&Expr)) {
    visit(expr);
    match expr {
        Expr::Member { base, .. } => walk_expr(base, visit),
        Expr::Index { base, index, .. } => {
            walk_expr(base, visit);
            walk_expr(index, visit);
        }
        Expr::BitRange {
            base, start, width, ..
        } => {
            walk_expr(base, visit);
            walk_expr(start, visit);
            walk_expr(width, visit);
        }
        Expr::Call { callee, args, .. } => {
            walk_expr(callee, visit);
            for arg in args {
                walk_expr(arg, visit);
            }
        }
        Expr::Unary { operand, .. } => walk_expr(operand, visit),
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, visit);
            walk_expr(rhs, visit);
        }
        Expr::Ternary {
            cond,
            then_value,
            else_value,
            ..
        } => {
            walk_expr(cond, visit);
            walk_expr(then_value, visit);
            walk_expr(else_value, visit);
        }
        Expr::Paren { inner, .. } => walk_expr(inner, visit),
        _ => {}
    }
}

/// Layered view over a file's own symbols and its includes' public symbols
#[derive(Clone)]
pub struct VisibleSymbols<'a> {
    /// (symbols, is_own_file)
    layers: Vec<(&'a FileSymbols, bool)>,
}

impl<'a> VisibleSymbols<'a> {
    fn lookup<T>(
        &self,
        get: impl Fn(&'a FileSymbols) -> Option<&'a T>,
        visibility: impl Fn(&'a T) -> Visibility,
    ) -> Option<&'a T> {
        for (symbols, is_own) in &self.layers {
            if let Some(item) = get(symbols) {
                if *is_own || visibility(item) == Visibility::Public {
                    return Some(item);
                }
            }
        }
        None
    }

    pub fn find_function(&self, qualified: &str) -> Option<&'a FunctionInfo> {
        self.lookup(|s| s.functions.get(qualified), |f| f.visibility)
    }

    pub fn find_variable(&self, qualified: &str) -> Option<&'a VariableInfo> {
        self.lookup(|s| s.variables.get(qualified), |v| v.visibility)
    }

    pub fn find_struct(&self, qualified: &str) -> Option<&'a StructInfo> {
        self.lookup(|s| s.structs.get(qualified), |v| v.visibility)
    }

    pub fn find_enum(&self, qualified: &str) -> Option<&'a EnumInfo> {
        self.lookup(|s| s.enums.get(qualified), |v| v.visibility)
    }

    pub fn find_bitmap(&self, qualified: &str) -> Option<&'a BitmapInfo> {
        self.lookup(|s| s.bitmaps.get(qualified), |v| v.visibility)
    }

    pub fn find_register(&self, qualified: &str) -> Option<&'a RegisterInfo> {
        self.lookup(|s| s.registers.get(qualified), |v| v.visibility)
    }

    pub fn find_callback(&self, qualified: &str) -> Option<&'a CallbackInfo> {
        self.lookup(|s| s.callbacks.get(qualified), |v| v.visibility)
    }

    pub fn is_scope(&self, name: &str) -> bool {
        self.layers
            .iter()
            .any(|(symbols, _)| symbols.scopes.iter().any(|s| s == name))
    }

    /// The enum (by qualified name) declaring `member`, searching the given
    /// scope first, then file scope
    pub fn enum_of_member(&self, member: &str, scope: Option<&str>) -> Option<(&'a str, i128)> {
        let mut candidates: Vec<&'a EnumInfo> = Vec::new();
        for (symbols, is_own) in &self.layers {
            for info in symbols.enums.values() {
                if *is_own || info.visibility == Visibility::Public {
                    candidates.push(info);
                }
            }
        }
        // Prefer enums declared in the current scope
        candidates.sort_by_key(|info| (info.scope.as_deref() != scope, info.name.clone()));
        for info in candidates {
            if let Some(value) = info.value_of(member) {
                let qualified = qualify(info.scope.as_deref(), &info.name);
                // Leak-free: find the stored key to return a borrowed name
                for (symbols, _) in &self.layers {
                    if let Some((key, _)) = symbols.enums.get_key_value(&qualified) {
                        return Some((key.as_str(), value));
                    }
                }
            }
        }
        None
    }

    /// Reclassify a parse-time named type into its resolved variant
    pub fn classify_type(&self, ty: &Type, scope: Option<&str>) -> Type {
        match ty {
            Type::Named(name) => {
                // Current scope first, then file scope
                let candidates = match scope {
                    Some(scope_name) => vec![format!("{}_{}", scope_name, name), name.clone()],
                    None => vec![name.clone()],
                };
                for qualified in &candidates {
                    if let Some(info) = self.find_struct(qualified) {
                        return Type::Struct(qualify(info.scope.as_deref(), &info.name));
                    }
                    if let Some(info) = self.find_enum(qualified) {
                        return Type::Enum(qualify(info.scope.as_deref(), &info.name));
                    }
                    if let Some(info) = self.find_bitmap(qualified) {
                        return Type::Bitmap {
                            name: qualify(info.scope.as_deref(), &info.name),
                            bit_width: info.bit_width,
                        };
                    }
                    if let Some(info) = self.find_callback(qualified) {
                        return Type::Callback(qualify(info.scope.as_deref(), &info.name));
                    }
                    if let Some(info) = self.find_register(qualified) {
                        return Type::Register(qualify(info.scope.as_deref(), &info.name));
                    }
                }
                Type::External(name.clone())
            }
            Type::Scoped { scope: outer, name } => {
                let qualified = format!("{}_{}", outer, name);
                self.classify_type(&Type::Named(qualified), None)
            }
            Type::Array {
                element,
                dimensions,
            } => Type::Array {
                element: Box::new(self.classify_type(element, scope)),
                dimensions: dimensions.clone(),
            },
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn collect(source: &str) -> FileSymbols {
        let program = Parser::parse_program(source, Path::new("test.cnx")).unwrap();
        let mut symbols = collect_declarations(&program, Path::new("test.cnx")).unwrap();
        collect_bodies(&program, &mut symbols);
        symbols
    }

    #[test]
    fn test_scope_members_qualified() {
        let symbols = collect("scope Motor {\n    public u32 speed <- 0;\n    public void stop() { speed <- 0; }\n}");
        assert!(symbols.variables.contains_key("Motor_speed"));
        assert!(symbols.functions.contains_key("Motor_stop"));
        assert_eq!(
            symbols.functions["Motor_stop"].mangled(),
            "Motor_stop"
        );
    }

    #[test]
    fn test_enum_implicit_values() {
        let symbols = collect("enum Color { RED, GREEN, BLUE }");
        let info = &symbols.enums["Color"];
        assert_eq!(info.members, vec![
            ("RED".to_string(), 0),
            ("GREEN".to_string(), 1),
            ("BLUE".to_string(), 2),
        ]);
    }

    #[test]
    fn test_enum_explicit_and_continued_values() {
        let symbols = collect("enum Prio { LOW, HIGH <- 10, MAX, }");
        let info = &symbols.enums["Prio"];
        assert_eq!(info.value_of("LOW"), Some(0));
        assert_eq!(info.value_of("HIGH"), Some(10));
        assert_eq!(info.value_of("MAX"), Some(11));
    }

    #[test]
    fn test_enum_value_referencing_member() {
        let symbols = collect("enum Flags { A <- 1, B <- A + 4 }");
        assert_eq!(symbols.enums["Flags"].value_of("B"), Some(5));
    }

    #[test]
    fn test_bitmap_cumulative_offsets() {
        let symbols = collect("bitmap8 Status { ready, error, mode[2], rest[4] }");
        let info = &symbols.bitmaps["Status"];
        assert_eq!(info.field("ready"), Some((0, 1)));
        assert_eq!(info.field("error"), Some((1, 1)));
        assert_eq!(info.field("mode"), Some((2, 2)));
        assert_eq!(info.field("rest"), Some((4, 4)));
    }

    #[test]
    fn test_mutated_param_detection() {
        let symbols = collect(
            "scope M {\n    public void inc(u32 counter) { counter <- counter + 1; }\n    public u32 square(u32 value) { return value * value; }\n}",
        );
        assert!(symbols.functions["M_inc"].mutated_params.contains("counter"));
        assert!(symbols.functions["M_square"].mutated_params.is_empty());
    }

    #[test]
    fn test_member_and_index_writes_mutate() {
        let symbols = collect(
            "void f(Point p, u8 buffer[8]) { p.x <- 1; buffer[0] <- 2; }",
        );
        let info = &symbols.functions["f"];
        assert!(info.mutated_params.contains("p"));
        assert!(info.mutated_params.contains("buffer"));
    }

    #[test]
    fn test_address_of_mutates() {
        let symbols = collect("void f(u32 value) { observe(&value); }");
        assert!(symbols.functions["f"].mutated_params.contains("value"));
    }

    #[test]
    fn test_redeclaration_in_file() {
        let program =
            Parser::parse_program("u32 x <- 0;\nu32 x <- 1;\n", Path::new("t.cnx")).unwrap();
        let errors = collect_declarations(&program, Path::new("t.cnx")).unwrap_err();
        assert_eq!(errors[0].code.as_deref(), Some("E0805"));
    }

    #[test]
    fn test_cross_file_conflict() {
        let mut project = ProjectSymbols::default();
        for (name, source) in [("a.cnx", "u32 shared <- 0;"), ("b.cnx", "u32 shared <- 1;")] {
            let path = PathBuf::from(name);
            let program = Parser::parse_program(source, &path).unwrap();
            let symbols = collect_declarations(&program, &path).unwrap();
            project.files.insert(path.clone(), symbols);
            project.programs.insert(path, program);
        }
        let errors = project.check_conflicts();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("a.cnx"));
        assert!(errors[0].message.contains("b.cnx"));
    }

    #[test]
    fn test_visibility_gate_across_files() {
        let mut project = ProjectSymbols::default();
        let lib = PathBuf::from("lib.cnx");
        let app = PathBuf::from("app.cnx");
        let lib_program = Parser::parse_program(
            "scope Lib {\n    public u32 shared <- 0;\n    u32 hidden <- 1;\n}",
            &lib,
        )
        .unwrap();
        let app_program = Parser::parse_program("void main() { }", &app).unwrap();
        project
            .files
            .insert(lib.clone(), collect_declarations(&lib_program, &lib).unwrap());
        project
            .files
            .insert(app.clone(), collect_declarations(&app_program, &app).unwrap());
        project.includes.insert(app.clone(), vec![lib.clone()]);

        let visible = project.visible(&app);
        assert!(visible.find_variable("Lib_shared").is_some());
        assert!(visible.find_variable("Lib_hidden").is_none());

        // The declaring file itself sees its private members
        let own = project.visible(&lib);
        assert!(own.find_variable("Lib_hidden").is_some());
    }

    #[test]
    fn test_mutation_propagates_through_calls() {
        let mut project = ProjectSymbols::default();
        let path = PathBuf::from("m.cnx");
        let source = "void store(u32 slot) { slot <- 1; }\nvoid outer(u32 value) { store(value); }\n";
        let program = Parser::parse_program(source, &path).unwrap();
        let mut symbols = collect_declarations(&program, &path).unwrap();
        collect_bodies(&program, &mut symbols);
        project.files.insert(path.clone(), symbols);
        project.programs.insert(path.clone(), program);

        project.propagate_mutations();
        assert!(
            project.files[&path].functions["outer"]
                .mutated_params
                .contains("value")
        );
    }

    #[test]
    fn test_callback_field_usage_tracked() {
        let symbols = collect(
            "callback void Handler(u8 pin);\nstruct Button {\n    Handler onPress;\n    u8 pin;\n}",
        );
        assert!(symbols.callback_fields_used.contains("Handler"));
    }

    #[test]
    fn test_classify_type() {
        let mut project = ProjectSymbols::default();
        let path = PathBuf::from("t.cnx");
        let program = Parser::parse_program(
            "struct Point { u8 x; u8 y; }\nenum Color { RED }\nbitmap8 Flags { on }\n",
            &path,
        )
        .unwrap();
        project
            .files
            .insert(path.clone(), collect_declarations(&program, &path).unwrap());
        let visible = project.visible(&path);
        assert_eq!(
            visible.classify_type(&Type::Named("Point".into()), None),
            Type::Struct("Point".into())
        );
        assert_eq!(
            visible.classify_type(&Type::Named("Color".into()), None),
            Type::Enum("Color".into())
        );
        assert!(matches!(
            visible.classify_type(&Type::Named("Flags".into()), None),
            Type::Bitmap { .. }
        ));
        assert_eq!(
            visible.classify_type(&Type::Named("Mystery".into()), None),
            Type::External("Mystery".into())
        );
    }

    #[test]
    fn test_resolve_callee_forms() {
        let this_call = Expr::Member {
            base: Box::new(Expr::Ident {
                name: "this".into(),
                loc: SourceLocation::default(),
            }),
            name: "reset".into(),
            loc: SourceLocation::default(),
        };
        assert_eq!(
            resolve_callee(&this_call, Some("Motor")),
            Some("Motor_reset".into())
        );

        let global_call = Expr::Member {
            base: Box::new(Expr::Member {
                base: Box::new(Expr::Ident {
                    name: "global".into(),
                    loc: SourceLocation::default(),
                }),
                name: "decode".into(),
                loc: SourceLocation::default(),
            }),
            name: "getSpn".into(),
            loc: SourceLocation::default(),
        };
        assert_eq!(
            resolve_callee(&global_call, Some("bus")),
            Some("decode_getSpn".into())
        );
    }
}
