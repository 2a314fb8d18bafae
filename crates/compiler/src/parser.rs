//! Recursive-descent parser for the C-Next grammar
//!
//! Parse errors are collected rather than printed; any error aborts the
//! translation unit after the whole file has been scanned, so one run can
//! report several problems. Recovery skips to the next `;` or balanced `}`.
//!
//! Operator disambiguation relies on token positions (the lexer already
//! performed maximal munch), never on re-scanning source text.

use crate::ast::{
    AccessMode, AssignOp, BinaryOp, BitmapDecl, BitmapField, Block, CallbackDecl, Comment,
    Declaration, Directive, DirectiveToken, ElseBranch, EnumDecl, EnumMember, Expr, ForStep,
    FunctionDecl, Overflow, Param, Program, RegisterDecl, RegisterMember, ScopeDecl, ScopeMember,
    SourceLocation, Statement, StructDecl, StructField, UnaryOp, VariableDecl, Visibility,
};
use crate::diagnostics::Diagnostic;
use crate::lexer::{self, Token, TokenKind};
use crate::types::{PrimitiveKind, Type};
use std::path::{Path, PathBuf};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: PathBuf,
    errors: Vec<Diagnostic>,
}

impl Parser {
    pub fn new(source: &str, file: &Path) -> (Self, crate::lexer::LexOutput) {
        let lexed = lexer::tokenize(source, file);
        let parser = Parser {
            tokens: lexed.tokens.clone(),
            pos: 0,
            file: file.to_path_buf(),
            errors: lexed.errors.clone(),
        };
        (parser, lexed)
    }

    /// Parse a whole translation unit. Errors abort the unit but the
    /// returned list carries every problem found.
    pub fn parse_program(source: &str, file: &Path) -> Result<Program, Vec<Diagnostic>> {
        let (mut parser, lexed) = Parser::new(source, file);
        let mut program = Program::new();
        program.comments = lexed.comments;

        for directive in &lexed.directives {
            match &directive.directive {
                Directive::Include { .. } => program.includes.push(directive.clone()),
                Directive::PragmaTarget { name } => {
                    program.pragma_target = Some(name.clone());
                    program.directives.push(directive.clone());
                }
                _ => program.directives.push(directive.clone()),
            }
        }

        while !parser.is_at_end() {
            match parser.parse_declaration() {
                Ok(decl) => program.declarations.push(decl),
                Err(diagnostic) => {
                    parser.errors.push(diagnostic);
                    parser.synchronize();
                }
            }
        }

        merge_conditional_directives(&mut program);
        attach_comments(&mut program);

        if parser.errors.is_empty() {
            Ok(program)
        } else {
            Err(parser.errors)
        }
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn is_at_end(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_text(&self) -> &str {
        &self.current().text
    }

    fn peek_ahead(&self, n: usize) -> Option<&Token> {
        let idx = self.pos + n;
        let token = self.tokens.get(idx)?;
        (token.kind != TokenKind::Eof).then_some(token)
    }

    fn loc(&self) -> SourceLocation {
        self.current().loc()
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, text: &str) -> bool {
        self.current().text == text
    }

    fn check_ahead(&self, n: usize, text: &str) -> bool {
        self.peek_ahead(n).is_some_and(|t| t.text == text)
    }

    fn consume(&mut self, text: &str) -> bool {
        if self.check(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> Result<Token, Diagnostic> {
        if self.check(text) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!(
                "Expected '{}', found '{}'",
                text,
                self.display_current()
            )))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<Token, Diagnostic> {
        if self.current().kind == TokenKind::Ident {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!(
                "Expected {}, found '{}'",
                what,
                self.display_current()
            )))
        }
    }

    fn display_current(&self) -> String {
        if self.is_at_end() {
            "end of file".to_string()
        } else {
            self.current().text.clone()
        }
    }

    fn error_here(&self, message: String) -> Diagnostic {
        let token = self.current();
        Diagnostic::error(&self.file, token.line, token.column, message)
    }

    fn error_at(&self, loc: &SourceLocation, message: String) -> Diagnostic {
        Diagnostic::error(&self.file, loc.line, loc.column, message)
    }

    /// Skip to the next statement/declaration boundary after an error
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        while !self.is_at_end() {
            match self.peek_text() {
                ";" if depth == 0 => {
                    self.advance();
                    return;
                }
                "{" => {
                    depth += 1;
                    self.advance();
                }
                "}" => {
                    self.advance();
                    if depth <= 1 {
                        return;
                    }
                    depth -= 1;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_declaration(&mut self) -> Result<Declaration, Diagnostic> {
        match self.peek_text() {
            "scope" => self.parse_scope().map(Declaration::Scope),
            "register" => self.parse_register().map(Declaration::Register),
            "struct" => self.parse_struct().map(Declaration::Struct),
            "enum" => self.parse_enum().map(Declaration::Enum),
            "bitmap8" | "bitmap16" | "bitmap24" | "bitmap32" => {
                self.parse_bitmap().map(Declaration::Bitmap)
            }
            "callback" => self.parse_callback().map(Declaration::Callback),
            _ => self.parse_function_or_variable(),
        }
    }

    fn parse_scope(&mut self) -> Result<ScopeDecl, Diagnostic> {
        let loc = self.loc();
        self.expect("scope")?;
        let name = self.expect_ident("scope name")?.text;
        self.expect("{")?;

        let mut members = Vec::new();
        while !self.check("}") {
            if self.is_at_end() {
                return Err(self.error_at(&loc, format!("Unexpected end of file in scope '{}'", name)));
            }
            // Default visibility for an unmarked member is private
            let visibility = if self.consume("public") {
                Visibility::Public
            } else {
                self.consume("private");
                Visibility::Private
            };
            let decl = self.parse_declaration()?;
            if matches!(decl, Declaration::Scope(_)) {
                return Err(self.error_at(
                    &decl.loc(),
                    "Scopes cannot be nested inside other scopes".to_string(),
                ));
            }
            members.push(ScopeMember { visibility, decl });
        }
        self.expect("}")?;

        Ok(ScopeDecl { name, members, loc })
    }

    fn parse_register(&mut self) -> Result<RegisterDecl, Diagnostic> {
        let loc = self.loc();
        self.expect("register")?;
        let name = self.expect_ident("register name")?.text;
        self.expect("@")?;
        let base = self.parse_expression()?;
        self.expect("{")?;

        let mut members = Vec::new();
        while !self.check("}") {
            if self.is_at_end() {
                return Err(
                    self.error_at(&loc, format!("Unexpected end of file in register '{}'", name))
                );
            }
            let member_loc = self.loc();
            let member_name = self.expect_ident("register member name")?.text;
            self.expect(":")?;
            let ty = self.parse_type()?;
            let access_token = self.expect_ident("access mode")?;
            let access = AccessMode::from_keyword(&access_token.text).ok_or_else(|| {
                self.error_at(
                    &access_token.loc(),
                    format!(
                        "Invalid access mode '{}'; expected rw, ro, wo, w1c, or w1s",
                        access_token.text
                    ),
                )
            })?;
            self.expect("@")?;
            let offset = self.parse_expression()?;
            self.consume(",");
            members.push(RegisterMember {
                name: member_name,
                ty,
                access,
                offset,
                loc: member_loc,
            });
        }
        self.expect("}")?;

        Ok(RegisterDecl {
            name,
            base,
            members,
            loc,
        })
    }

    fn parse_struct(&mut self) -> Result<StructDecl, Diagnostic> {
        let loc = self.loc();
        self.expect("struct")?;
        let name = self.expect_ident("struct name")?.text;
        self.expect("{")?;

        let mut fields = Vec::new();
        while !self.check("}") {
            if self.is_at_end() {
                return Err(
                    self.error_at(&loc, format!("Unexpected end of file in struct '{}'", name))
                );
            }
            let field_loc = self.loc();
            let ty = self.parse_type()?;
            let field_name = self.expect_ident("field name")?.text;
            let dimensions = self.parse_array_dimensions()?;
            self.expect(";")?;
            fields.push(StructField {
                name: field_name,
                ty,
                dimensions,
                loc: field_loc,
            });
        }
        self.expect("}")?;
        // Optional trailing semicolon after the closing brace
        self.consume(";");

        Ok(StructDecl { name, fields, loc })
    }

    fn parse_enum(&mut self) -> Result<EnumDecl, Diagnostic> {
        let loc = self.loc();
        self.expect("enum")?;
        let name = self.expect_ident("enum name")?.text;
        self.expect("{")?;

        let mut members = Vec::new();
        while !self.check("}") {
            if self.is_at_end() {
                return Err(self.error_at(&loc, format!("Unexpected end of file in enum '{}'", name)));
            }
            let member_loc = self.loc();
            let member_name = self.expect_ident("enum member name")?.text;
            let value = if self.consume("<-") {
                Some(self.parse_expression()?)
            } else {
                None
            };
            members.push(EnumMember {
                name: member_name,
                value,
                loc: member_loc,
            });
            if !self.consume(",") && !self.check("}") {
                return Err(self.error_here(format!(
                    "Expected ',' or '}}' in enum '{}', found '{}'",
                    name,
                    self.display_current()
                )));
            }
        }
        self.expect("}")?;
        self.consume(";");

        if members.is_empty() {
            return Err(self.error_at(&loc, format!("Enum '{}' must have at least one member", name)));
        }

        Ok(EnumDecl { name, members, loc })
    }

    fn parse_bitmap(&mut self) -> Result<BitmapDecl, Diagnostic> {
        let loc = self.loc();
        let keyword = self.advance().text;
        let bit_width: u32 = keyword
            .trim_start_matches("bitmap")
            .parse()
            .expect("bitmap keyword checked by caller");
        let name = self.expect_ident("bitmap name")?.text;
        self.expect("{")?;

        let mut fields = Vec::new();
        while !self.check("}") {
            if self.is_at_end() {
                return Err(
                    self.error_at(&loc, format!("Unexpected end of file in bitmap '{}'", name))
                );
            }
            let field_loc = self.loc();
            let field_name = self.expect_ident("bitmap field name")?.text;
            let width = if self.consume("[") {
                let width_token = self.advance();
                let width: u32 = width_token.text.parse().map_err(|_| {
                    self.error_at(
                        &width_token.loc(),
                        format!("Bitmap field width must be an integer, found '{}'", width_token.text),
                    )
                })?;
                self.expect("]")?;
                width
            } else {
                1
            };
            fields.push(BitmapField {
                name: field_name,
                width,
                loc: field_loc,
            });
            if !self.consume(",") && !self.check("}") {
                return Err(self.error_here(format!(
                    "Expected ',' or '}}' in bitmap '{}', found '{}'",
                    name,
                    self.display_current()
                )));
            }
        }
        self.expect("}")?;
        self.consume(";");

        // Cumulative field widths must fit the backing integer
        let total: u32 = fields.iter().map(|f| f.width).sum();
        if total > bit_width {
            return Err(self.error_at(
                &loc,
                format!(
                    "Bitmap '{}' declares {} bits of fields but is only {} bits wide",
                    name, total, bit_width
                ),
            ));
        }

        Ok(BitmapDecl {
            name,
            bit_width,
            fields,
            loc,
        })
    }

    fn parse_callback(&mut self) -> Result<CallbackDecl, Diagnostic> {
        let loc = self.loc();
        self.expect("callback")?;
        let return_type = self.parse_type()?;
        let name = self.expect_ident("callback name")?.text;
        self.expect("(")?;
        let params = self.parse_params()?;
        self.expect(";")?;
        Ok(CallbackDecl {
            name,
            params,
            return_type,
            loc,
        })
    }

    /// Functions, variables, and constructor-style initializations all start
    /// with modifiers followed by a type and a name; the token after the name
    /// decides which they are.
    fn parse_function_or_variable(&mut self) -> Result<Declaration, Diagnostic> {
        let loc = self.loc();
        let mut is_atomic = false;
        let mut is_volatile = false;
        let mut is_const = false;
        let mut overflow = None;

        loop {
            match self.peek_text() {
                "atomic" => {
                    is_atomic = true;
                    self.advance();
                }
                "volatile" => {
                    is_volatile = true;
                    self.advance();
                }
                "const" => {
                    is_const = true;
                    self.advance();
                }
                "clamp" => {
                    overflow = Some(Overflow::Clamp);
                    self.advance();
                }
                "wrap" => {
                    overflow = Some(Overflow::Wrap);
                    self.advance();
                }
                _ => break,
            }
        }

        let ty = self.parse_type()?;
        let name = self.expect_ident("declaration name")?.text;

        if self.check("(") && !is_atomic && !is_volatile && self.looks_like_function() {
            self.expect("(")?;
            let params = self.parse_params()?;
            let body = if self.check("{") {
                Some(self.parse_block()?)
            } else {
                self.expect(";")?;
                None
            };
            return Ok(Declaration::Function(FunctionDecl {
                name,
                params,
                return_type: ty,
                body,
                loc,
            }));
        }

        // Constructor-style initialization: `Type name(arg, ...)`
        let ctor_args = if self.check("(") {
            self.expect("(")?;
            let mut args = Vec::new();
            while !self.check(")") {
                args.push(self.parse_expression()?);
                if !self.consume(",") {
                    break;
                }
            }
            self.expect(")")?;
            Some(args)
        } else {
            None
        };

        let dimensions = self.parse_array_dimensions()?;
        let initializer = if self.consume("<-") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(";")?;

        Ok(Declaration::Variable(VariableDecl {
            name,
            ty,
            dimensions,
            is_const,
            is_volatile,
            is_atomic,
            overflow,
            initializer,
            ctor_args,
            loc,
        }))
    }

    /// After `type name (` decide function vs constructor-style variable by
    /// looking at the token layout inside the parentheses.
    fn looks_like_function(&self) -> bool {
        // Empty parens can only be a parameterless function
        if self.check_ahead(1, ")") {
            return true;
        }
        let Some(first) = self.peek_ahead(1) else {
            return true;
        };
        if first.text == "const"
            || PrimitiveKind::from_keyword(&first.text).is_some()
            || first.text == "string"
        {
            return true;
        }
        // `Type name` is a parameter; `name` alone (or a literal) is a
        // constructor argument
        if first.kind == TokenKind::Ident {
            if let Some(second) = self.peek_ahead(2) {
                if second.kind == TokenKind::Ident {
                    return true;
                }
                // Scoped parameter type: `Scope.Type name`
                if second.text == "."
                    && self
                        .peek_ahead(4)
                        .is_some_and(|t| t.kind == TokenKind::Ident)
                {
                    return true;
                }
            }
        }
        false
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, Diagnostic> {
        let mut params = Vec::new();
        while !self.check(")") {
            if self.is_at_end() {
                return Err(self.error_here("Unexpected end of file in parameter list".to_string()));
            }
            let loc = self.loc();
            let mut is_const = false;
            let mut overflow = None;
            loop {
                match self.peek_text() {
                    "const" => {
                        is_const = true;
                        self.advance();
                    }
                    "clamp" => {
                        overflow = Some(Overflow::Clamp);
                        self.advance();
                    }
                    "wrap" => {
                        overflow = Some(Overflow::Wrap);
                        self.advance();
                    }
                    _ => break,
                }
            }
            let ty = self.parse_type()?;
            if ty.is_void() && self.check(")") {
                // `f(void)` style empty parameter list
                break;
            }
            let name = self.expect_ident("parameter name")?.text;
            let dimensions = self.parse_array_dimensions()?;
            params.push(Param {
                name,
                ty,
                is_const,
                dimensions,
                overflow,
                loc,
            });
            if !self.consume(",") {
                break;
            }
        }
        self.expect(")")?;
        Ok(params)
    }

    fn parse_type(&mut self) -> Result<Type, Diagnostic> {
        let token = self.expect_ident("type name")?;
        if let Some(kind) = PrimitiveKind::from_keyword(&token.text) {
            return Ok(Type::Primitive(kind));
        }
        if token.text == "string" {
            // string<N> with a constant capacity, or unsized for parameters.
            // The capacity is a literal or symbolic name, parsed below the
            // relational level so the closing '>' is never taken as an
            // operator.
            if self.consume("<") {
                let capacity = self.parse_postfix()?;
                self.expect(">")?;
                return Ok(Type::CnxString {
                    capacity: Some(capacity),
                });
            }
            return Ok(Type::CnxString { capacity: None });
        }
        // `Scope.Type` form, but only when followed by another identifier
        // (otherwise the dot belongs to an expression, not a type)
        if self.check(".")
            && self
                .peek_ahead(1)
                .is_some_and(|t| t.kind == TokenKind::Ident)
            && self
                .peek_ahead(2)
                .is_some_and(|t| t.kind == TokenKind::Ident)
        {
            self.advance();
            let inner = self.expect_ident("scoped type name")?.text;
            return Ok(Type::Scoped {
                scope: token.text,
                name: inner,
            });
        }
        Ok(Type::Named(token.text))
    }

    fn parse_array_dimensions(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut dimensions = Vec::new();
        while self.check("[") {
            self.advance();
            let dim = self.parse_expression()?;
            self.expect("]")?;
            dimensions.push(dim);
        }
        Ok(dimensions)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> Result<Block, Diagnostic> {
        self.expect("{")?;
        let mut statements = Vec::new();
        while !self.check("}") {
            if self.is_at_end() {
                return Err(self.error_here("Unexpected end of file in block".to_string()));
            }
            statements.push(self.parse_statement()?);
        }
        self.expect("}")?;
        Ok(Block { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, Diagnostic> {
        match self.peek_text() {
            "if" => self.parse_if(),
            "while" => self.parse_while(),
            "do" => self.parse_do_while(),
            "for" => self.parse_for(),
            "return" => self.parse_return(),
            "break" => {
                let loc = self.loc();
                self.advance();
                self.expect(";")?;
                Ok(Statement::Break { loc })
            }
            "continue" => {
                let loc = self.loc();
                self.advance();
                self.expect(";")?;
                Ok(Statement::Continue { loc })
            }
            "critical" => {
                let loc = self.loc();
                self.advance();
                let body = self.parse_block()?;
                Ok(Statement::Critical { body, loc })
            }
            _ => {
                if self.statement_starts_declaration() {
                    let loc = self.loc();
                    match self.parse_function_or_variable()? {
                        Declaration::Variable(decl) => Ok(Statement::VarDecl(decl)),
                        _ => Err(self.error_at(
                            &loc,
                            "Function declarations are not allowed inside a body".to_string(),
                        )),
                    }
                } else {
                    self.parse_assignment_or_expr()
                }
            }
        }
    }

    /// A statement is a declaration when it starts with a modifier keyword,
    /// a primitive/string type, or `Type name` / `Scope.Type name` layout.
    fn statement_starts_declaration(&self) -> bool {
        let token = self.current();
        if matches!(
            token.text.as_str(),
            "atomic" | "volatile" | "const" | "clamp" | "wrap" | "string"
        ) {
            return true;
        }
        if PrimitiveKind::from_keyword(&token.text).is_some() {
            return true;
        }
        if token.kind == TokenKind::Ident {
            if self.peek_ahead(1).is_some_and(|t| t.kind == TokenKind::Ident) {
                return true;
            }
            // Scope.Type name
            if self.check_ahead(1, ".")
                && self
                    .peek_ahead(2)
                    .is_some_and(|t| t.kind == TokenKind::Ident)
                && self
                    .peek_ahead(3)
                    .is_some_and(|t| t.kind == TokenKind::Ident)
            {
                return true;
            }
        }
        false
    }

    fn parse_if(&mut self) -> Result<Statement, Diagnostic> {
        let loc = self.loc();
        self.expect("if")?;
        self.expect("(")?;
        let cond = self.parse_expression()?;
        self.expect(")")?;
        let then_block = self.parse_block()?;
        let else_branch = if self.consume("else") {
            if self.check("if") {
                Some(ElseBranch::If(Box::new(self.parse_if()?)))
            } else {
                Some(ElseBranch::Block(self.parse_block()?))
            }
        } else {
            None
        };
        Ok(Statement::If {
            cond,
            then_block,
            else_branch,
            loc,
        })
    }

    fn parse_while(&mut self) -> Result<Statement, Diagnostic> {
        let loc = self.loc();
        self.expect("while")?;
        self.expect("(")?;
        let cond = self.parse_expression()?;
        self.expect(")")?;
        let body = self.parse_block()?;
        Ok(Statement::While { cond, body, loc })
    }

    fn parse_do_while(&mut self) -> Result<Statement, Diagnostic> {
        let loc = self.loc();
        self.expect("do")?;
        let body = self.parse_block()?;
        self.expect("while")?;
        self.expect("(")?;
        let cond = self.parse_expression()?;
        self.expect(")")?;
        self.expect(";")?;
        Ok(Statement::DoWhile { body, cond, loc })
    }

    fn parse_for(&mut self) -> Result<Statement, Diagnostic> {
        let loc = self.loc();
        self.expect("for")?;
        self.expect("(")?;

        let init = if self.consume(";") {
            None
        } else {
            let statement = if self.statement_starts_declaration() {
                match self.parse_function_or_variable()? {
                    Declaration::Variable(decl) => Statement::VarDecl(decl),
                    _ => {
                        return Err(self.error_at(
                            &loc,
                            "Only variable declarations may initialize a for loop".to_string(),
                        ));
                    }
                }
            } else {
                self.parse_assignment_or_expr()?
            };
            Some(Box::new(statement))
        };

        let cond = if self.check(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(";")?;

        let step = if self.check(")") {
            None
        } else {
            let target = self.parse_expression()?;
            let op = self.parse_assign_op().ok_or_else(|| {
                self.error_here("Expected assignment in for-loop step".to_string())
            })?;
            let value = self.parse_expression()?;
            Some(ForStep { target, op, value })
        };
        self.expect(")")?;

        let body = self.parse_block()?;
        Ok(Statement::For {
            init,
            cond,
            step,
            body,
            loc,
        })
    }

    fn parse_return(&mut self) -> Result<Statement, Diagnostic> {
        let loc = self.loc();
        self.expect("return")?;
        let value = if self.check(";") {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(";")?;
        Ok(Statement::Return { value, loc })
    }

    fn parse_assign_op(&mut self) -> Option<AssignOp> {
        let op = match self.peek_text() {
            "<-" => AssignOp::Assign,
            "+<-" => AssignOp::Add,
            "-<-" => AssignOp::Sub,
            "*<-" => AssignOp::Mul,
            "/<-" => AssignOp::Div,
            "%<-" => AssignOp::Mod,
            "&<-" => AssignOp::And,
            "|<-" => AssignOp::Or,
            "^<-" => AssignOp::Xor,
            "<<<-" => AssignOp::Shl,
            ">><-" => AssignOp::Shr,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_assignment_or_expr(&mut self) -> Result<Statement, Diagnostic> {
        let loc = self.loc();
        let target = self.parse_expression()?;
        if let Some(op) = self.parse_assign_op() {
            let value = self.parse_expression()?;
            self.expect(";")?;
            return Ok(Statement::Assign {
                target,
                op,
                value,
                loc,
            });
        }
        self.expect(";")?;
        Ok(Statement::Expr { expr: target, loc })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub(crate) fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_ternary()
    }

    /// `(cond) ? a : b`: the condition must be parenthesized and neither
    /// branch may itself contain a ternary.
    fn parse_ternary(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_logical_or()?;
        if self.check("?") {
            let loc = self.loc();
            if !matches!(expr, Expr::Paren { .. }) {
                return Err(self.error_at(
                    &loc,
                    "Ternary condition must be parenthesized: (cond) ? a : b".to_string(),
                ));
            }
            self.advance();
            let then_value = self.parse_logical_or()?;
            self.expect(":")?;
            let else_value = self.parse_logical_or()?;
            let ternary = Expr::Ternary {
                cond: Box::new(expr),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
                loc: loc.clone(),
            };
            if let Expr::Ternary {
                cond,
                then_value,
                else_value,
                ..
            } = &ternary
            {
                if cond.contains_ternary()
                    || then_value.contains_ternary()
                    || else_value.contains_ternary()
                {
                    return Err(self
                        .error_at(&loc, "Nested ternary expressions are not allowed".to_string())
                        .with_code("E0803"));
                }
            }
            return Ok(ternary);
        }
        Ok(expr)
    }

    fn parse_binary_level(
        &mut self,
        operators: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, Diagnostic>,
    ) -> Result<Expr, Diagnostic> {
        let mut lhs = next(self)?;
        loop {
            let mut matched = None;
            for (text, op) in operators {
                if self.check(text) {
                    matched = Some(*op);
                    break;
                }
            }
            let Some(op) = matched else {
                return Ok(lhs);
            };
            let loc = self.loc();
            self.advance();
            let rhs = next(self)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                loc,
            };
        }
    }

    fn parse_logical_or(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(&[("||", BinaryOp::LogicalOr)], Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(&[("&&", BinaryOp::LogicalAnd)], Self::parse_bit_or)
    }

    fn parse_bit_or(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(&[("|", BinaryOp::BitOr)], Self::parse_bit_xor)
    }

    fn parse_bit_xor(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(&[("^", BinaryOp::BitXor)], Self::parse_bit_and)
    }

    fn parse_bit_and(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(&[("&", BinaryOp::BitAnd)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        // `=` is equality in the dialect; assignment is `<-`
        self.parse_binary_level(
            &[("=", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(
            &[("<<", BinaryOp::Shl), (">>", BinaryOp::Shr)],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let loc = self.loc();
        let op = match self.peek_text() {
            "!" => Some(UnaryOp::Not),
            "-" => Some(UnaryOp::Neg),
            "~" => Some(UnaryOp::BitNot),
            "&" => Some(UnaryOp::AddrOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                loc,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(".") {
                let loc = self.loc();
                self.advance();
                let name = self.expect_ident("member name")?.text;
                expr = Expr::Member {
                    base: Box::new(expr),
                    name,
                    loc,
                };
                continue;
            }
            if self.check("[") {
                let loc = self.loc();
                self.advance();
                let first = self.parse_expression()?;
                if self.consume(",") {
                    // Bit-range view: base[start, width]
                    let width = self.parse_expression()?;
                    self.expect("]")?;
                    expr = Expr::BitRange {
                        base: Box::new(expr),
                        start: Box::new(first),
                        width: Box::new(width),
                        loc,
                    };
                } else {
                    self.expect("]")?;
                    expr = Expr::Index {
                        base: Box::new(expr),
                        index: Box::new(first),
                        loc,
                    };
                }
                continue;
            }
            if self.check("(") {
                let loc = self.loc();
                self.advance();
                let mut args = Vec::new();
                while !self.check(")") {
                    if self.is_at_end() {
                        return Err(
                            self.error_here("Unexpected end of file in argument list".to_string())
                        );
                    }
                    args.push(self.parse_expression()?);
                    if !self.consume(",") {
                        break;
                    }
                }
                self.expect(")")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    loc,
                };
                continue;
            }
            return Ok(expr);
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.current().clone();
        let loc = token.loc();
        match token.kind {
            TokenKind::Int => {
                self.advance();
                let value = parse_int_value(&token.text).ok_or_else(|| {
                    self.error_at(&loc, format!("Invalid integer literal '{}'", token.text))
                })?;
                Ok(Expr::IntLit {
                    value,
                    text: token.text,
                    loc,
                })
            }
            TokenKind::Float => {
                self.advance();
                Ok(Expr::FloatLit {
                    text: token.text,
                    loc,
                })
            }
            TokenKind::Str => {
                self.advance();
                let value = token
                    .text
                    .trim_start_matches('"')
                    .trim_end_matches('"')
                    .to_string();
                Ok(Expr::StringLit { value, loc })
            }
            TokenKind::Char => {
                self.advance();
                Ok(Expr::CharLit {
                    text: token.text,
                    loc,
                })
            }
            TokenKind::Ident => {
                self.advance();
                match token.text.as_str() {
                    "true" => Ok(Expr::BoolLit { value: true, loc }),
                    "false" => Ok(Expr::BoolLit { value: false, loc }),
                    _ => Ok(Expr::Ident {
                        name: token.text,
                        loc,
                    }),
                }
            }
            TokenKind::Punct if token.text == "(" => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(")")?;
                Ok(Expr::Paren {
                    inner: Box::new(inner),
                    loc,
                })
            }
            _ => Err(self.error_at(
                &loc,
                format!("Expected expression, found '{}'", self.display_current()),
            )),
        }
    }
}

/// Parse an integer literal's numeric value, ignoring any width suffix
pub fn parse_int_value(text: &str) -> Option<i128> {
    let stripped = strip_int_suffix(text).replace('_', "");
    if let Some(hex) = stripped.strip_prefix("0x").or_else(|| stripped.strip_prefix("0X")) {
        return i128::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = stripped.strip_prefix("0b").or_else(|| stripped.strip_prefix("0B")) {
        return i128::from_str_radix(bin, 2).ok();
    }
    stripped.parse().ok()
}

/// Strip a dialect width suffix (u8..u64, i8..i64) from an integer literal
pub fn strip_int_suffix(text: &str) -> &str {
    for suffix in ["u8", "u16", "u32", "u64", "i8", "i16", "i32", "i64"] {
        if let Some(stripped) = text.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return stripped;
            }
        }
    }
    text
}

/// The dialect suffix of an integer literal, when present
pub fn int_suffix(text: &str) -> Option<&str> {
    ["u8", "u16", "u32", "u64", "i8", "i16", "i32", "i64"]
        .into_iter()
        .find(|suffix| text.ends_with(suffix) && text.len() > suffix.len())
}

/// Merge conditional-compilation directives into the declaration stream so
/// they re-emit at the right position, ordered by line.
fn merge_conditional_directives(program: &mut Program) {
    let passthrough: Vec<DirectiveToken> = program
        .directives
        .iter()
        .filter(|d| {
            matches!(
                d.directive,
                Directive::Ifdef { .. }
                    | Directive::Ifndef { .. }
                    | Directive::Else
                    | Directive::Endif
                    | Directive::DefineFlag { .. }
            )
        })
        .cloned()
        .collect();

    for directive in passthrough {
        let line = directive.loc.line;
        let index = program
            .declarations
            .iter()
            .position(|d| d.loc().line > line)
            .unwrap_or(program.declarations.len());
        program
            .declarations
            .insert(index, Declaration::Preprocessor(directive));
    }
}

/// Attach each run of comments directly above a declaration to it
fn attach_comments(program: &mut Program) {
    let mut attached: Vec<(usize, Vec<Comment>)> = Vec::new();
    for (index, decl) in program.declarations.iter().enumerate() {
        let decl_line = decl.loc().line;
        if decl_line == 0 {
            continue;
        }
        let mut run: Vec<Comment> = Vec::new();
        let mut expect_line = decl_line;
        // Walk upward collecting adjacent comment lines
        loop {
            let above = program
                .comments
                .iter()
                .rev()
                .find(|c| c.loc.line + 1 == expect_line);
            match above {
                Some(comment) => {
                    run.push(comment.clone());
                    expect_line = comment.loc.line;
                }
                None => break,
            }
        }
        if !run.is_empty() {
            run.reverse();
            attached.push((index, run));
        }
    }
    program.attached_comments = attached;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        Parser::parse_program(source, Path::new("test.cnx")).expect("parse should succeed")
    }

    fn parse_err(source: &str) -> Vec<Diagnostic> {
        Parser::parse_program(source, Path::new("test.cnx")).expect_err("parse should fail")
    }

    #[test]
    fn test_parse_variable_declaration() {
        let program = parse("u32 counter <- 0;");
        assert_eq!(program.declarations.len(), 1);
        let Declaration::Variable(var) = &program.declarations[0] else {
            panic!("expected variable");
        };
        assert_eq!(var.name, "counter");
        assert_eq!(var.ty, Type::Primitive(PrimitiveKind::U32));
        assert!(var.initializer.is_some());
    }

    #[test]
    fn test_parse_modifiers() {
        let program = parse("atomic volatile u32 flags <- 0;");
        let Declaration::Variable(var) = &program.declarations[0] else {
            panic!("expected variable");
        };
        assert!(var.is_atomic);
        assert!(var.is_volatile);
        assert!(!var.is_const);
    }

    #[test]
    fn test_parse_overflow_modifier() {
        let program = parse("wrap u8 rollover <- 255;");
        let Declaration::Variable(var) = &program.declarations[0] else {
            panic!("expected variable");
        };
        assert_eq!(var.overflow, Some(Overflow::Wrap));
    }

    #[test]
    fn test_parse_scope_with_visibility() {
        let program = parse(
            "scope Motor {\n    public u32 speed <- 0;\n    u32 internal <- 1;\n    public void stop() { speed <- 0; }\n}",
        );
        let Declaration::Scope(scope) = &program.declarations[0] else {
            panic!("expected scope");
        };
        assert_eq!(scope.name, "Motor");
        assert_eq!(scope.members.len(), 3);
        assert_eq!(scope.members[0].visibility, Visibility::Public);
        // Omitted visibility defaults to private
        assert_eq!(scope.members[1].visibility, Visibility::Private);
        assert_eq!(scope.members[2].visibility, Visibility::Public);
    }

    #[test]
    fn test_parse_function_params() {
        let program = parse("u32 add(u32 a, const u32 b) { return a + b; }");
        let Declaration::Function(func) = &program.declarations[0] else {
            panic!("expected function");
        };
        assert_eq!(func.params.len(), 2);
        assert!(!func.params[0].is_const);
        assert!(func.params[1].is_const);
    }

    #[test]
    fn test_parse_array_parameter() {
        let program = parse("u16 getSpn(const u8 data[8]) { return 100; }");
        let Declaration::Function(func) = &program.declarations[0] else {
            panic!("expected function");
        };
        assert_eq!(func.params[0].dimensions.len(), 1);
    }

    #[test]
    fn test_parse_register() {
        let program = parse(
            "register GPIO7 @ 0x42004000 {\n    DR: u32 rw @ 0x00,\n    PSR: u32 ro @ 0x08,\n}",
        );
        let Declaration::Register(reg) = &program.declarations[0] else {
            panic!("expected register");
        };
        assert_eq!(reg.name, "GPIO7");
        assert_eq!(reg.members.len(), 2);
        assert_eq!(reg.members[0].access, AccessMode::Rw);
        assert_eq!(reg.members[1].access, AccessMode::Ro);
    }

    #[test]
    fn test_parse_bitmap() {
        let program = parse("bitmap8 Status {\n    ready,\n    error,\n    mode[2],\n}");
        let Declaration::Bitmap(bitmap) = &program.declarations[0] else {
            panic!("expected bitmap");
        };
        assert_eq!(bitmap.bit_width, 8);
        assert_eq!(bitmap.fields.len(), 3);
        assert_eq!(bitmap.fields[0].width, 1);
        assert_eq!(bitmap.fields[2].width, 2);
    }

    #[test]
    fn test_bitmap_overflow_rejected() {
        let errors = parse_err("bitmap8 Big {\n    a[4],\n    b[5],\n}");
        assert!(errors[0].message.contains("9 bits"));
    }

    #[test]
    fn test_parse_enum_with_values() {
        let program = parse("enum Color {\n    RED,\n    GREEN <- 5,\n    BLUE,\n}");
        let Declaration::Enum(e) = &program.declarations[0] else {
            panic!("expected enum");
        };
        assert_eq!(e.members.len(), 3);
        assert!(e.members[0].value.is_none());
        assert!(e.members[1].value.is_some());
    }

    #[test]
    fn test_parse_string_type() {
        let program = parse("string<32> name <- \"hello\";");
        let Declaration::Variable(var) = &program.declarations[0] else {
            panic!("expected variable");
        };
        assert!(matches!(var.ty, Type::CnxString { capacity: Some(_) }));
    }

    #[test]
    fn test_equality_is_double_equals_in_c() {
        let program = parse("void f(u8 x) { if (x = 3) { return; } }");
        let Declaration::Function(func) = &program.declarations[0] else {
            panic!("expected function");
        };
        let body = func.body.as_ref().unwrap();
        let Statement::If { cond, .. } = &body.statements[0] else {
            panic!("expected if");
        };
        let Expr::Binary { op, .. } = cond else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Eq);
    }

    #[test]
    fn test_ternary_requires_parenthesized_condition() {
        let errors = parse_err("u8 pick(u8 a) { u8 x <- a > 1 ? 1 : 2; return x; }");
        assert!(errors
            .iter()
            .any(|e| e.message.contains("parenthesized")));
    }

    #[test]
    fn test_nested_ternary_rejected() {
        let errors =
            parse_err("u8 pick(u8 a) { u8 x <- (a > 1) ? ((a > 2) ? 1 : 2) : 3; return x; }");
        assert!(errors.iter().any(|e| e.code.as_deref() == Some("E0803")));
    }

    #[test]
    fn test_valid_ternary() {
        let program = parse("u8 pick(u8 a) { u8 x <- (a > 1) ? 1 : 2; return x; }");
        assert_eq!(program.declarations.len(), 1);
    }

    #[test]
    fn test_bit_range_expression() {
        let program = parse("void f() { u8 x <- STATUS[3, 2]; }");
        let Declaration::Function(func) = &program.declarations[0] else {
            panic!("expected function");
        };
        let Statement::VarDecl(var) = &func.body.as_ref().unwrap().statements[0] else {
            panic!("expected var decl");
        };
        assert!(matches!(
            var.initializer.as_ref().unwrap(),
            Expr::BitRange { .. }
        ));
    }

    #[test]
    fn test_compound_assignment() {
        let program = parse("void f() { counter +<- 5; }");
        let Declaration::Function(func) = &program.declarations[0] else {
            panic!("expected function");
        };
        let Statement::Assign { op, .. } = &func.body.as_ref().unwrap().statements[0] else {
            panic!("expected assignment");
        };
        assert_eq!(*op, AssignOp::Add);
    }

    #[test]
    fn test_critical_block() {
        let program = parse("void f() { critical { counter <- 0; } }");
        let Declaration::Function(func) = &program.declarations[0] else {
            panic!("expected function");
        };
        assert!(matches!(
            func.body.as_ref().unwrap().statements[0],
            Statement::Critical { .. }
        ));
    }

    #[test]
    fn test_for_loop() {
        let program = parse("void f() { for (u8 i <- 0; i < 10; i +<- 1) { process(i); } }");
        let Declaration::Function(func) = &program.declarations[0] else {
            panic!("expected function");
        };
        let Statement::For { init, cond, step, .. } =
            &func.body.as_ref().unwrap().statements[0]
        else {
            panic!("expected for");
        };
        assert!(init.is_some());
        assert!(cond.is_some());
        assert_eq!(step.as_ref().unwrap().op, AssignOp::Add);
    }

    #[test]
    fn test_constructor_style_initialization() {
        let program = parse("Display lcd(WIDTH, HEIGHT);");
        let Declaration::Variable(var) = &program.declarations[0] else {
            panic!("expected variable");
        };
        assert_eq!(var.ctor_args.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_callback_declaration() {
        let program = parse("callback void ButtonHandler(u8 pin);");
        let Declaration::Callback(cb) = &program.declarations[0] else {
            panic!("expected callback");
        };
        assert_eq!(cb.name, "ButtonHandler");
        assert_eq!(cb.params.len(), 1);
    }

    #[test]
    fn test_global_member_chain() {
        let program = parse("void f() { u16 spn <- global.decode.getSpn(data); }");
        assert_eq!(program.declarations.len(), 1);
    }

    #[test]
    fn test_multiple_errors_collected() {
        let errors = parse_err("u32 a <- ;\nu32 b <- ;\n");
        assert!(errors.len() >= 2);
    }

    #[test]
    fn test_int_value_parsing() {
        assert_eq!(parse_int_value("42"), Some(42));
        assert_eq!(parse_int_value("0x2A"), Some(42));
        assert_eq!(parse_int_value("0b101"), Some(5));
        assert_eq!(parse_int_value("42u8"), Some(42));
        assert_eq!(parse_int_value("0xFFu32"), Some(255));
        assert_eq!(int_suffix("42u8"), Some("u8"));
        assert_eq!(int_suffix("42"), None);
    }

    #[test]
    fn test_doc_comment_attachment() {
        let program = parse("/// Speed in RPM\nu32 speed <- 0;");
        let attached = program.comments_for(0);
        assert_eq!(attached.len(), 1);
        assert!(attached[0].text.contains("Speed in RPM"));
    }

    #[test]
    fn test_scoped_type_reference() {
        let program = parse("void f(Motor.Config cfg) { apply(cfg); }");
        let Declaration::Function(func) = &program.declarations[0] else {
            panic!("expected function");
        };
        assert!(matches!(func.params[0].ty, Type::Scoped { .. }));
    }
}
