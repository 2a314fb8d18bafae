//! Statement lowering
//!
//! Carries the dialect's safety rules: overflow behavior on compound
//! assignment (clamp saturates through a helper, wrap keeps the natural C
//! operator), atomic read-modify-write as exclusive-monitor loops or
//! interrupt-masked windows, `critical` blocks, and the condition
//! restrictions (no calls in conditions, boolean `do-while`).

use crate::ast::{
    AssignOp, Block, ElseBranch, Expr, Overflow, SourceLocation, Statement, VariableDecl,
};
use crate::diagnostics::Diagnostic;
use crate::types::{PrimitiveKind, Type};
use std::fmt::Write as _;

use super::error::CodeGenError;
use super::expr::Place;
use super::helpers::clamp_helper_name;
use super::{CodeGen, Effect, LocalBinding};

fn indent_text(indent: usize) -> String {
    "    ".repeat(indent)
}

impl CodeGen<'_> {
    pub(crate) fn emit_block_statements(
        &mut self,
        block: &Block,
        indent: usize,
        out: &mut String,
    ) -> Result<(), CodeGenError> {
        for statement in &block.statements {
            self.emit_statement(statement, indent, out)?;
        }
        Ok(())
    }

    fn emit_statement(
        &mut self,
        statement: &Statement,
        indent: usize,
        out: &mut String,
    ) -> Result<(), CodeGenError> {
        let pad = indent_text(indent);
        match statement {
            Statement::VarDecl(decl) => {
                let text = self.render_local_decl(decl)?;
                writeln!(out, "{}{};", pad, text)?;
                Ok(())
            }
            Statement::Assign {
                target, op, value, loc,
            } => {
                let text = self.render_assignment(target, *op, value, loc, indent)?;
                writeln!(out, "{}", text)?;
                Ok(())
            }
            Statement::If {
                cond,
                then_block,
                else_branch,
                loc,
            } => {
                self.check_condition(cond, loc, "if")?;
                let cond_text = self.emit_expr(cond)?;
                writeln!(out, "{}if ({}) {{", pad, cond_text)?;
                self.emit_nested_block(then_block, indent + 1, out)?;
                match else_branch {
                    Some(ElseBranch::If(nested)) => {
                        write!(out, "{}}} else ", pad)?;
                        // Re-emit the chained if on the same line
                        let mut chained = String::new();
                        self.emit_statement(nested, indent, &mut chained)?;
                        out.push_str(chained.trim_start_matches(&pad));
                        Ok(())
                    }
                    Some(ElseBranch::Block(block)) => {
                        writeln!(out, "{}}} else {{", pad)?;
                        self.emit_nested_block(block, indent + 1, out)?;
                        writeln!(out, "{}}}", pad)?;
                        Ok(())
                    }
                    None => {
                        writeln!(out, "{}}}", pad)?;
                        Ok(())
                    }
                }
            }
            Statement::While { cond, body, loc } => {
                self.check_condition(cond, loc, "while")?;
                let cond_text = self.emit_expr(cond)?;
                writeln!(out, "{}while ({}) {{", pad, cond_text)?;
                self.emit_nested_block(body, indent + 1, out)?;
                writeln!(out, "{}}}", pad)?;
                Ok(())
            }
            Statement::DoWhile { body, cond, loc } => {
                self.check_condition(cond, loc, "do-while")?;
                if !self.is_boolean_expr(cond) {
                    return Err(Diagnostic::error(
                        self.file,
                        loc.line,
                        loc.column,
                        "do-while condition must be a boolean expression".to_string(),
                    )
                    .with_code("E0701")
                    .into());
                }
                writeln!(out, "{}do {{", pad)?;
                self.emit_nested_block(body, indent + 1, out)?;
                let cond_text = self.emit_expr(cond)?;
                writeln!(out, "{}}} while ({});", pad, cond_text)?;
                Ok(())
            }
            Statement::For {
                init,
                cond,
                step,
                body,
                loc,
            } => {
                if let Some(cond) = cond {
                    self.check_condition(cond, loc, "for")?;
                }
                self.locals.push(Default::default());
                let init_text = match init {
                    Some(statement) => self.render_for_clause(statement)?,
                    None => String::new(),
                };
                let cond_text = match cond {
                    Some(expr) => self.emit_expr(expr)?,
                    None => String::new(),
                };
                // Loop steps keep the natural C operator: a saturating
                // counter would never terminate the loop
                let step_text = match step {
                    Some(step) => {
                        let place = self.emit_place(&step.target)?;
                        let value_text = self.emit_expr(&step.value)?;
                        match step.op.binary_operator() {
                            Some(_) => {
                                format!("{} {} {}", place.read_text(), step.op.c_operator(), value_text)
                            }
                            None => format!("{} = {}", place.read_text(), value_text),
                        }
                    }
                    None => String::new(),
                };
                writeln!(
                    out,
                    "{}for ({}; {}; {}) {{",
                    pad, init_text, cond_text, step_text
                )?;
                self.emit_block_statements(body, indent + 1, out)?;
                self.locals.pop();
                writeln!(out, "{}}}", pad)?;
                Ok(())
            }
            Statement::Return { value, .. } => {
                match value {
                    Some(expr) => {
                        let expected = self.current_return.clone();
                        let text = self.emit_expr_expected(expr, expected.as_ref())?;
                        writeln!(out, "{}return {};", pad, text)?;
                    }
                    None => writeln!(out, "{}return;", pad)?,
                }
                Ok(())
            }
            Statement::Break { .. } => {
                writeln!(out, "{}break;", pad)?;
                Ok(())
            }
            Statement::Continue { .. } => {
                writeln!(out, "{}continue;", pad)?;
                Ok(())
            }
            Statement::Critical { body, loc } => self.emit_critical(body, loc, indent, out),
            Statement::Expr { expr, .. } => {
                let text = self.emit_expr(expr)?;
                writeln!(out, "{}{};", pad, text)?;
                Ok(())
            }
        }
    }

    fn emit_nested_block(
        &mut self,
        block: &Block,
        indent: usize,
        out: &mut String,
    ) -> Result<(), CodeGenError> {
        self.locals.push(Default::default());
        let result = self.emit_block_statements(block, indent, out);
        self.locals.pop();
        result
    }

    /// Local declaration text without the trailing semicolon
    fn render_local_decl(&mut self, decl: &VariableDecl) -> Result<String, CodeGenError> {
        if let Some(args) = &decl.ctor_args {
            for arg in args {
                if !self.is_const_argument(arg) {
                    return Err(Diagnostic::error(
                        self.file,
                        decl.loc.line,
                        decl.loc.column,
                        format!("Constructor argument for '{}' must be a constant", decl.name),
                    )
                    .with_code("E0806")
                    .into());
                }
            }
        }

        let resolved = self.resolve_type(&decl.ty);
        self.declare_local(
            &decl.name,
            LocalBinding {
                ty: if decl.dimensions.is_empty() {
                    resolved.clone()
                } else {
                    Type::Array {
                        element: Box::new(resolved.clone()),
                        dimensions: decl.dimensions.clone(),
                    }
                },
                overflow: decl.overflow,
                is_atomic: decl.is_atomic,
                is_const: decl.is_const,
            },
        );

        let mut text = String::new();
        if decl.is_const {
            text.push_str("const ");
        }
        if decl.is_volatile || decl.is_atomic {
            text.push_str("volatile ");
        }
        let declarator = self.render_declarator(&resolved, &decl.name, &decl.dimensions)?;
        text.push_str(&declarator);

        if let Some(init) = &decl.initializer {
            let init_text = self.emit_expr_expected(init, Some(&resolved))?;
            text.push_str(" = ");
            text.push_str(&init_text);
        } else if let Some(args) = &decl.ctor_args {
            let mut rendered = Vec::new();
            for arg in args {
                rendered.push(self.emit_expr(arg)?);
            }
            text.push_str(" = { ");
            text.push_str(&rendered.join(", "));
            text.push_str(" }");
        }
        Ok(text)
    }

    /// `for` init clause: a declaration or assignment without `;`
    fn render_for_clause(&mut self, statement: &Statement) -> Result<String, CodeGenError> {
        match statement {
            Statement::VarDecl(decl) => self.render_local_decl(decl),
            Statement::Assign {
                target, op, value, ..
            } => {
                let place = self.emit_place(target)?;
                let value_text = self.emit_expr(value)?;
                Ok(format!(
                    "{} {} {}",
                    place.read_text(),
                    op.c_operator(),
                    value_text
                ))
            }
            _ => Ok(String::new()),
        }
    }

    // ------------------------------------------------------------------
    // Assignment lowering
    // ------------------------------------------------------------------

    fn render_assignment(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
        loc: &SourceLocation,
        indent: usize,
    ) -> Result<String, CodeGenError> {
        let pad = indent_text(indent);
        let place = self.emit_place(target)?;

        match &place {
            Place::Bits { base, start, mask } => {
                // Read-modify-write of the selected bit field
                let base_text = base.read_text();
                let value_text = self.emit_value_operand(value, None)?;
                let new_field = match op.binary_operator() {
                    None => value_text,
                    Some(binop) => format!(
                        "(({} >> {}) & {}) {} {}",
                        base_text, start, mask, binop, value_text
                    ),
                };
                Ok(format!(
                    "{}{} = ({} & ~({} << {})) | ((({}) & {}) << {});",
                    pad, base_text, base_text, mask, start, new_field, mask, start
                ))
            }
            Place::Direct {
                text,
                ty,
                overflow,
                is_atomic,
            } => {
                let text = text.clone();
                let ty = ty.clone();
                let overflow = *overflow;
                let is_atomic = *is_atomic;

                if is_atomic && op != AssignOp::Assign {
                    return self.render_atomic_rmw(&text, &ty, overflow, op, value, loc, indent);
                }

                let expected = ty.clone();
                if op == AssignOp::Assign {
                    let value_text = self.emit_expr_expected(value, expected.as_ref())?;
                    return Ok(format!("{}{} = {};", pad, text, value_text));
                }

                match self.clamp_call(&text, &ty, overflow, op, value)? {
                    Some(call) => Ok(format!("{}{} = {};", pad, text, call)),
                    None => {
                        let value_text = self.emit_value_operand(value, expected.as_ref())?;
                        Ok(format!("{}{} {} {};", pad, text, op.c_operator(), value_text))
                    }
                }
            }
        }
    }

    /// The saturating-helper call for a compound assignment, or None when
    /// the natural C operator applies (wrap behavior, floats, and the
    /// non-arithmetic compound forms)
    fn clamp_call(
        &mut self,
        current_text: &str,
        ty: &Option<Type>,
        overflow: Option<Overflow>,
        op: AssignOp,
        value: &Expr,
    ) -> Result<Option<String>, CodeGenError> {
        let Some(kind) = ty.as_ref().and_then(Type::primitive) else {
            return Ok(None);
        };
        if !kind.is_integer() || !op.is_clampable() {
            return Ok(None);
        }
        // Clamp is the default for integer arithmetic when no modifier is
        // present; wrap must be asked for
        let behavior = overflow.unwrap_or(Overflow::Clamp);
        if behavior == Overflow::Wrap {
            return Ok(None);
        }
        self.register_effect(Effect::ClampHelper { op, kind });
        let value_text = self.emit_expr(value)?;
        Ok(Some(format!(
            "{}({}, {})",
            clamp_helper_name(op, kind),
            current_text,
            value_text
        )))
    }

    /// Value operand with parentheses when operator precedence could bite
    fn emit_value_operand(
        &mut self,
        value: &Expr,
        expected: Option<&Type>,
    ) -> Result<String, CodeGenError> {
        let text = self.emit_expr_expected(value, expected)?;
        let needs_parens = matches!(value, Expr::Binary { .. } | Expr::Ternary { .. });
        Ok(if needs_parens {
            format!("({})", text)
        } else {
            text
        })
    }

    /// Atomic read-modify-write: an exclusive-monitor retry loop when the
    /// target supports it and the type fits, otherwise an interrupt-masked
    /// window. No path emits a bare `x op= y`.
    #[allow(clippy::too_many_arguments)]
    fn render_atomic_rmw(
        &mut self,
        target_text: &str,
        ty: &Option<Type>,
        overflow: Option<Overflow>,
        op: AssignOp,
        value: &Expr,
        loc: &SourceLocation,
        indent: usize,
    ) -> Result<String, CodeGenError> {
        let pad = indent_text(indent);
        let kind = ty.as_ref().and_then(Type::primitive).ok_or_else(|| {
            Diagnostic::error(
                self.file,
                loc.line,
                loc.column,
                "atomic compound assignment requires an integer variable".to_string(),
            )
        })?;
        let width = kind.bit_width().ok_or_else(|| {
            Diagnostic::error(
                self.file,
                loc.line,
                loc.column,
                "atomic compound assignment requires an integer variable".to_string(),
            )
        })?;

        let exclusive_suffix = match width {
            8 => Some("B"),
            16 => Some("H"),
            32 => Some("W"),
            _ => None,
        };

        if self.target.has_ldrex_strex {
            if let Some(suffix) = exclusive_suffix {
                return self.render_ldrex_loop(
                    target_text,
                    kind,
                    suffix,
                    overflow,
                    op,
                    value,
                    &pad,
                );
            }
        }

        // 64-bit or no exclusive instructions: mask interrupts around the
        // plain lowering
        self.register_effect(Effect::IrqWrappers);
        let inner = match self.clamp_call(target_text, ty, overflow, op, value)? {
            Some(call) => format!("{} = {};", target_text, call),
            None => {
                let value_text = self.emit_value_operand(value, ty.as_ref())?;
                format!("{} {} {};", target_text, op.c_operator(), value_text)
            }
        };
        let inner_pad = indent_text(indent + 1);
        let mut out = String::new();
        writeln!(out, "{}{{", pad)?;
        writeln!(out, "{}uint32_t __primask = __cnx_get_PRIMASK();", inner_pad)?;
        writeln!(out, "{}__cnx_disable_irq();", inner_pad)?;
        writeln!(out, "{}{}", inner_pad, inner)?;
        writeln!(out, "{}__cnx_set_PRIMASK(__primask);", inner_pad)?;
        write!(out, "{}}}", pad)?;
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn render_ldrex_loop(
        &mut self,
        target_text: &str,
        kind: PrimitiveKind,
        suffix: &str,
        overflow: Option<Overflow>,
        op: AssignOp,
        value: &Expr,
        pad: &str,
    ) -> Result<String, CodeGenError> {
        self.register_effect(Effect::Cmsis);
        self.enter_temp();
        let (old_name, new_name) = self.temp_names();

        let behavior = overflow.unwrap_or(Overflow::Clamp);
        let inner = if op.is_clampable() && behavior == Overflow::Clamp {
            self.register_effect(Effect::ClampHelper { op, kind });
            let value_text = self.emit_expr(value)?;
            format!("{}({}, {})", clamp_helper_name(op, kind), old_name, value_text)
        } else {
            let value_text = self.emit_value_operand(value, None)?;
            let binop = op
                .binary_operator()
                .expect("compound op checked by render_assignment");
            format!("{} {} {}", old_name, binop, value_text)
        };

        let c_type = kind.c_name();
        let address = expr_address_text(target_text);
        let inner_pad = format!("{}    ", pad);
        let check_pad = format!("{}    ", inner_pad);
        let mut out = String::new();
        writeln!(out, "{}do {{", pad)?;
        writeln!(
            out,
            "{}{} {} = __LDREX{}({});",
            inner_pad, c_type, old_name, suffix, address
        )?;
        writeln!(out, "{}{} {} = {};", inner_pad, c_type, new_name, inner)?;
        writeln!(
            out,
            "{}if (__STREX{}({}, {}) == 0) {{",
            inner_pad, suffix, new_name, address
        )?;
        writeln!(out, "{}break;", check_pad)?;
        writeln!(out, "{}}}", inner_pad)?;
        write!(out, "{}}} while (1);", pad)?;
        self.leave_temp();
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Critical blocks
    // ------------------------------------------------------------------

    fn emit_critical(
        &mut self,
        body: &Block,
        loc: &SourceLocation,
        indent: usize,
        out: &mut String,
    ) -> Result<(), CodeGenError> {
        self.check_critical_escapes(body, loc)?;
        self.register_effect(Effect::IrqWrappers);
        let pad = indent_text(indent);
        let inner_pad = indent_text(indent + 1);
        writeln!(out, "{}{{", pad)?;
        writeln!(out, "{}uint32_t __primask = __cnx_get_PRIMASK();", inner_pad)?;
        writeln!(out, "{}__cnx_disable_irq();", inner_pad)?;
        self.emit_nested_block(body, indent + 1, out)?;
        writeln!(out, "{}__cnx_set_PRIMASK(__primask);", inner_pad)?;
        writeln!(out, "{}}}", pad)?;
        Ok(())
    }

    /// Reject control flow that would leave a critical block with
    /// interrupts still disabled: any `return`, and `break`/`continue`
    /// not enclosed by a loop inside the block
    fn check_critical_escapes(
        &self,
        body: &Block,
        loc: &SourceLocation,
    ) -> Result<(), CodeGenError> {
        fn walk(
            walker: &CodeGen<'_>,
            block: &Block,
            loop_depth: usize,
            loc: &SourceLocation,
        ) -> Result<(), CodeGenError> {
            for statement in &block.statements {
                match statement {
                    Statement::Return { loc: stmt_loc, .. } => {
                        return Err(escape_error(walker, stmt_loc, "return"));
                    }
                    Statement::Break { loc: stmt_loc } if loop_depth == 0 => {
                        return Err(escape_error(walker, stmt_loc, "break"));
                    }
                    Statement::Continue { loc: stmt_loc } if loop_depth == 0 => {
                        return Err(escape_error(walker, stmt_loc, "continue"));
                    }
                    Statement::If {
                        then_block,
                        else_branch,
                        ..
                    } => {
                        walk(walker, then_block, loop_depth, loc)?;
                        match else_branch {
                            Some(ElseBranch::Block(block)) => walk(walker, block, loop_depth, loc)?,
                            Some(ElseBranch::If(nested)) => {
                                let wrapper = Block {
                                    statements: vec![(**nested).clone()],
                                };
                                walk(walker, &wrapper, loop_depth, loc)?;
                            }
                            None => {}
                        }
                    }
                    Statement::While { body, .. }
                    | Statement::DoWhile { body, .. }
                    | Statement::For { body, .. } => {
                        walk(walker, body, loop_depth + 1, loc)?;
                    }
                    Statement::Critical { body, .. } => walk(walker, body, loop_depth, loc)?,
                    _ => {}
                }
            }
            Ok(())
        }

        fn escape_error(walker: &CodeGen<'_>, loc: &SourceLocation, keyword: &str) -> CodeGenError {
            Diagnostic::error(
                walker.file,
                loc.line,
                loc.column,
                format!("'{}' cannot leave a critical block", keyword),
            )
            .with_code("E0801")
            .into()
        }

        walk(self, body, 0, loc)
    }

    // ------------------------------------------------------------------
    // Condition validation
    // ------------------------------------------------------------------

    /// Conditions may not contain function calls (E0702)
    fn check_condition(
        &self,
        cond: &Expr,
        loc: &SourceLocation,
        construct: &str,
    ) -> Result<(), CodeGenError> {
        if cond.contains_call() {
            return Err(Diagnostic::error(
                self.file,
                loc.line,
                loc.column,
                format!(
                    "Function calls are not allowed in a {} condition; call it before the {} and test the result",
                    construct, construct
                ),
            )
            .with_code("E0702")
            .into());
        }
        Ok(())
    }

    /// Conservative boolean-ness for the do-while rule
    fn is_boolean_expr(&self, expr: &Expr) -> bool {
        match expr {
            Expr::BoolLit { .. } => true,
            Expr::Binary { op, .. } => op.is_boolean(),
            Expr::Unary {
                op: crate::ast::UnaryOp::Not,
                ..
            } => true,
            Expr::Paren { inner, .. } => self.is_boolean_expr(inner),
            Expr::Ident { name, .. } => self
                .lookup_value(name)
                .and_then(|(_, binding)| match binding {
                    super::ValueBinding::Local(local) => Some(local.ty),
                    super::ValueBinding::Param(param) => Some(param.ty),
                    super::ValueBinding::Variable(info) => Some(info.ty),
                })
                .is_some_and(|ty| ty.is_bool()),
            _ => false,
        }
    }
}

/// `&x` text for an emitted place, collapsing a pointer-parameter deref
pub(crate) fn expr_address_text(text: &str) -> String {
    if let Some(inner) = text.strip_prefix("(*").and_then(|t| t.strip_suffix(')')) {
        if inner.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return inner.to_string();
        }
    }
    format!("&{}", text)
}
