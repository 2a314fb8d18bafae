//! Parse tree for the C-Next dialect
//!
//! One tree per translation unit. The tree owns its text; later passes
//! (symbol collection, code generation) only borrow it.

use crate::types::Type;
use std::path::PathBuf;

/// Source location for error reporting and tooling
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceLocation {
    /// 1-indexed line
    pub line: usize,
    /// 1-indexed column
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        SourceLocation { line, column }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A full source location including the file, used in cross-file conflicts
#[derive(Debug, Clone, PartialEq)]
pub struct FileLocation {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for FileLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// Classification of a `#...` line produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// `#include "x"` or `#include <x>`
    Include { path: String, system: bool },
    /// `#define NAME` with no value: the only legal define form
    DefineFlag { name: String },
    /// `#define NAME value`: forbidden, reported by later stages
    DefineValue { name: String },
    /// `#define NAME(args)`: forbidden, reported by later stages
    DefineFunction { name: String },
    Ifdef { name: String },
    Ifndef { name: String },
    Else,
    Endif,
    /// `#pragma target <name>`
    PragmaTarget { name: String },
    /// Any other pragma, passed through verbatim
    PragmaOther { text: String },
}

/// A directive with its position and original text
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveToken {
    pub directive: Directive,
    pub text: String,
    pub loc: SourceLocation,
}

/// Comment style on the hidden channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    Line,
    Block,
    Doc,
}

/// A comment captured on the hidden channel
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub style: CommentStyle,
    /// Full text including delimiters
    pub text: String,
    pub loc: SourceLocation,
}

/// Member visibility inside a scope. Omitted in source means private.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// Register member access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Rw,
    Ro,
    Wo,
    W1c,
    W1s,
}

impl AccessMode {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "rw" => Some(AccessMode::Rw),
            "ro" => Some(AccessMode::Ro),
            "wo" => Some(AccessMode::Wo),
            "w1c" => Some(AccessMode::W1c),
            "w1s" => Some(AccessMode::W1s),
            _ => None,
        }
    }

    /// Read-only members get a const-qualified pointee in the emitted macro
    pub fn is_read_only(self) -> bool {
        matches!(self, AccessMode::Ro)
    }
}

/// Overflow behavior modifier on variables and parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    Clamp,
    Wrap,
}

/// Assignment operators; `<-` and its compound forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl AssignOp {
    /// The matching C compound operator text (the plain form lowers to `=`)
    pub fn c_operator(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Mod => "%=",
            AssignOp::And => "&=",
            AssignOp::Or => "|=",
            AssignOp::Xor => "^=",
            AssignOp::Shl => "<<=",
            AssignOp::Shr => ">>=",
        }
    }

    /// The underlying binary operator for read-modify-write expansion
    pub fn binary_operator(self) -> Option<&'static str> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some("+"),
            AssignOp::Sub => Some("-"),
            AssignOp::Mul => Some("*"),
            AssignOp::Div => Some("/"),
            AssignOp::Mod => Some("%"),
            AssignOp::And => Some("&"),
            AssignOp::Or => Some("|"),
            AssignOp::Xor => Some("^"),
            AssignOp::Shl => Some("<<"),
            AssignOp::Shr => Some(">>"),
        }
    }

    /// Arithmetic forms that participate in clamp lowering
    pub fn is_clampable(self) -> bool {
        matches!(self, AssignOp::Add | AssignOp::Sub | AssignOp::Mul)
    }

    /// Helper-name fragment: cnx_clamp_<op>_<type>
    pub fn clamp_name(self) -> Option<&'static str> {
        match self {
            AssignOp::Add => Some("add"),
            AssignOp::Sub => Some("sub"),
            AssignOp::Mul => Some("mul"),
            _ => None,
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    BitNot,
    /// `&x`: only meaningful for the mutation analysis; raw pointers are
    /// not expressible in the dialect itself
    AddrOf,
}

impl UnaryOp {
    pub fn c_operator(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::BitNot => "~",
            UnaryOp::AddrOf => "&",
        }
    }
}

/// Binary operators. Equality is `=` in source and lowers to `==`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    LogicalAnd,
    LogicalOr,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn c_operator(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    /// Operators whose result is boolean, for the do-while condition check
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Le
                | BinaryOp::Ge
                | BinaryOp::LogicalAnd
                | BinaryOp::LogicalOr
        )
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal with optional width suffix, original text preserved
    IntLit {
        value: i128,
        text: String,
        loc: SourceLocation,
    },
    FloatLit {
        text: String,
        loc: SourceLocation,
    },
    BoolLit {
        value: bool,
        loc: SourceLocation,
    },
    StringLit {
        /// Text without the surrounding quotes
        value: String,
        loc: SourceLocation,
    },
    CharLit {
        text: String,
        loc: SourceLocation,
    },
    Ident {
        name: String,
        loc: SourceLocation,
    },
    /// `base.name`: scope access, struct field, enum member, bitmap field
    Member {
        base: Box<Expr>,
        name: String,
        loc: SourceLocation,
    },
    /// `base[index]`
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        loc: SourceLocation,
    },
    /// `base[start, width]`: bit-range view of a register or integer
    BitRange {
        base: Box<Expr>,
        start: Box<Expr>,
        width: Box<Expr>,
        loc: SourceLocation,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        loc: SourceLocation,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        loc: SourceLocation,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        loc: SourceLocation,
    },
    /// `(cond) ? a : b`: the only ternary form, never nested
    Ternary {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
        loc: SourceLocation,
    },
    Paren {
        inner: Box<Expr>,
        loc: SourceLocation,
    },
}

impl Expr {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Expr::IntLit { loc, .. }
            | Expr::FloatLit { loc, .. }
            | Expr::BoolLit { loc, .. }
            | Expr::StringLit { loc, .. }
            | Expr::CharLit { loc, .. }
            | Expr::Ident { loc, .. }
            | Expr::Member { loc, .. }
            | Expr::Index { loc, .. }
            | Expr::BitRange { loc, .. }
            | Expr::Call { loc, .. }
            | Expr::Unary { loc, .. }
            | Expr::Binary { loc, .. }
            | Expr::Ternary { loc, .. }
            | Expr::Paren { loc, .. } => loc,
        }
    }

    /// True when any node in the expression is a function call
    pub fn contains_call(&self) -> bool {
        match self {
            Expr::Call { .. } => true,
            Expr::Member { base, .. } => base.contains_call(),
            Expr::Index { base, index, .. } => base.contains_call() || index.contains_call(),
            Expr::BitRange {
                base, start, width, ..
            } => base.contains_call() || start.contains_call() || width.contains_call(),
            Expr::Unary { operand, .. } => operand.contains_call(),
            Expr::Binary { lhs, rhs, .. } => lhs.contains_call() || rhs.contains_call(),
            Expr::Ternary {
                cond,
                then_value,
                else_value,
                ..
            } => cond.contains_call() || then_value.contains_call() || else_value.contains_call(),
            Expr::Paren { inner, .. } => inner.contains_call(),
            _ => false,
        }
    }

    /// True when any node is a ternary (used for the nesting check)
    pub fn contains_ternary(&self) -> bool {
        match self {
            Expr::Ternary { .. } => true,
            Expr::Member { base, .. } => base.contains_ternary(),
            Expr::Index { base, index, .. } => base.contains_ternary() || index.contains_ternary(),
            Expr::BitRange {
                base, start, width, ..
            } => base.contains_ternary() || start.contains_ternary() || width.contains_ternary(),
            Expr::Call { callee, args, .. } => {
                callee.contains_ternary() || args.iter().any(Expr::contains_ternary)
            }
            Expr::Unary { operand, .. } => operand.contains_ternary(),
            Expr::Binary { lhs, rhs, .. } => lhs.contains_ternary() || rhs.contains_ternary(),
            Expr::Paren { inner, .. } => inner.contains_ternary(),
            _ => false,
        }
    }

    /// The root identifier of an lvalue chain (`a.b[i]` -> `a`), if any
    pub fn root_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident { name, .. } => Some(name),
            Expr::Member { base, .. } => base.root_ident(),
            Expr::Index { base, .. } => base.root_ident(),
            Expr::BitRange { base, .. } => base.root_ident(),
            Expr::Paren { inner, .. } => inner.root_ident(),
            _ => None,
        }
    }
}

/// Array dimension carried on declarations: a constant expression or a
/// symbolic name resolved by the C preprocessor at build time
pub type ArrayDim = Expr;

/// `type name` pair with modifiers, used by variables and struct fields
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
    pub ty: Type,
    pub dimensions: Vec<ArrayDim>,
    pub is_const: bool,
    pub is_volatile: bool,
    pub is_atomic: bool,
    pub overflow: Option<Overflow>,
    pub initializer: Option<Expr>,
    /// Constructor-style arguments: `Type name(arg, ...)`: each must be const
    pub ctor_args: Option<Vec<Expr>>,
    pub loc: SourceLocation,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub is_const: bool,
    pub dimensions: Vec<ArrayDim>,
    pub overflow: Option<Overflow>,
    pub loc: SourceLocation,
}

/// Function declaration; body is None for prototypes
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: Option<Block>,
    pub loc: SourceLocation,
}

/// Struct field
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
    pub dimensions: Vec<ArrayDim>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<StructField>,
    pub loc: SourceLocation,
}

/// Enum member with an optional explicit value expression
#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    pub value: Option<Expr>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<EnumMember>,
    pub loc: SourceLocation,
}

/// Bitmap field; width defaults to 1 bit
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapField {
    pub name: String,
    pub width: u32,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitmapDecl {
    pub name: String,
    /// Backing width: 8, 16, 24, or 32
    pub bit_width: u32,
    pub fields: Vec<BitmapField>,
    pub loc: SourceLocation,
}

/// Register member: `name: type access @ offset`
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterMember {
    pub name: String,
    pub ty: Type,
    pub access: AccessMode,
    pub offset: Expr,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterDecl {
    pub name: String,
    pub base: Expr,
    pub members: Vec<RegisterMember>,
    pub loc: SourceLocation,
}

/// Callback signature declaration: `callback ret Name(params);`
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub loc: SourceLocation,
}

/// A declaration inside a scope with its visibility
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeMember {
    pub visibility: Visibility,
    pub decl: Declaration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeDecl {
    pub name: String,
    pub members: Vec<ScopeMember>,
    pub loc: SourceLocation,
}

/// Top-level declarations of a translation unit
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Scope(ScopeDecl),
    Register(RegisterDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Bitmap(BitmapDecl),
    Callback(CallbackDecl),
    Function(FunctionDecl),
    Variable(VariableDecl),
    /// Conditional-compilation directives re-emitted in place
    Preprocessor(DirectiveToken),
}

impl Declaration {
    pub fn loc(&self) -> SourceLocation {
        match self {
            Declaration::Scope(d) => d.loc.clone(),
            Declaration::Register(d) => d.loc.clone(),
            Declaration::Struct(d) => d.loc.clone(),
            Declaration::Enum(d) => d.loc.clone(),
            Declaration::Bitmap(d) => d.loc.clone(),
            Declaration::Callback(d) => d.loc.clone(),
            Declaration::Function(d) => d.loc.clone(),
            Declaration::Variable(d) => d.loc.clone(),
            Declaration::Preprocessor(d) => d.loc.clone(),
        }
    }

    /// The declared name, when there is exactly one
    pub fn name(&self) -> Option<&str> {
        match self {
            Declaration::Scope(d) => Some(&d.name),
            Declaration::Register(d) => Some(&d.name),
            Declaration::Struct(d) => Some(&d.name),
            Declaration::Enum(d) => Some(&d.name),
            Declaration::Bitmap(d) => Some(&d.name),
            Declaration::Callback(d) => Some(&d.name),
            Declaration::Function(d) => Some(&d.name),
            Declaration::Variable(d) => Some(&d.name),
            Declaration::Preprocessor(_) => None,
        }
    }
}

/// Statement block
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

/// The else arm of an `if`: either another `if` (else-if chain) or a block
#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    If(Box<Statement>),
    Block(Block),
}

/// `for` loop step clause, an assignment without the trailing semicolon
#[derive(Debug, Clone, PartialEq)]
pub struct ForStep {
    pub target: Expr,
    pub op: AssignOp,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    VarDecl(VariableDecl),
    Assign {
        target: Expr,
        op: AssignOp,
        value: Expr,
        loc: SourceLocation,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_branch: Option<ElseBranch>,
        loc: SourceLocation,
    },
    While {
        cond: Expr,
        body: Block,
        loc: SourceLocation,
    },
    DoWhile {
        body: Block,
        cond: Expr,
        loc: SourceLocation,
    },
    For {
        init: Option<Box<Statement>>,
        cond: Option<Expr>,
        step: Option<ForStep>,
        body: Block,
        loc: SourceLocation,
    },
    Return {
        value: Option<Expr>,
        loc: SourceLocation,
    },
    Break {
        loc: SourceLocation,
    },
    Continue {
        loc: SourceLocation,
    },
    /// `critical { ... }`: interrupt-masked region
    Critical {
        body: Block,
        loc: SourceLocation,
    },
    /// Bare expression statement (function calls)
    Expr {
        expr: Expr,
        loc: SourceLocation,
    },
}

/// A parsed translation unit
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Include directives in source order
    pub includes: Vec<DirectiveToken>,
    /// Non-include directives seen before any declaration
    pub directives: Vec<DirectiveToken>,
    pub declarations: Vec<Declaration>,
    /// Hidden-channel comments for MISRA checks and output preservation
    pub comments: Vec<Comment>,
    /// Target named by `#pragma target`, if any
    pub pragma_target: Option<String>,
    /// Leading comments attached to each declaration index
    pub attached_comments: Vec<(usize, Vec<Comment>)>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    /// Comments attached to the declaration at `index`
    pub fn comments_for(&self, index: usize) -> &[Comment] {
        self.attached_comments
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, c)| c.as_slice())
            .unwrap_or(&[])
    }
}
