//! Abstract Syntax Tree types for sheaf templates

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::data::TemplateData;
use crate::renderer::SerializeError;

/// Location of a node in its template source
///
/// `range` is a byte range; `line` and `column` are 1-based, with the column
/// counted in characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub file: Arc<str>,
    pub line: usize,
    pub column: usize,
    pub range: Range<usize>,
}

impl SourceSpan {
    pub fn new(file: impl Into<Arc<str>>, line: usize, column: usize, range: Range<usize>) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            range,
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: SourceSpan,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: SourceSpan) -> Self {
        Self { node, span }
    }
}

/// A node of a template body
pub type SyntaxNode = Spanned<NodeKind>;

/// Every kind of node a template can contain
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Literal output text
    Raw(String),
    /// `#name(params)` with an optional `: ... #endname` body
    Tag(Tag),
    /// `#embed(path)`
    Embed { path: Box<SyntaxNode> },
    /// `#import("name")`, replaced by the matching export during resolution
    Import { identifier: String },
    /// `#extend("path")`, replaced by the resolved content of `path`
    Extend(Extend),
    /// `#if` / `#elseif` / `#else` chain
    Conditional(Conditional),
    /// Dotted variable reference such as `user.name`
    Identifier { path: Vec<String> },
    Constant(Constant),
    /// `#for(key in data)`
    Iterator(Iteration),
    Expression(Expression),
    /// Host-provided node, passed through resolution untouched
    Custom(Custom),
}

impl NodeKind {
    /// Short human-readable name of the variant, used in diagnostics
    pub fn describe(&self) -> &'static str {
        match self {
            NodeKind::Raw(_) => "raw text",
            NodeKind::Tag(_) => "tag",
            NodeKind::Embed { .. } => "embed",
            NodeKind::Import { .. } => "import",
            NodeKind::Extend(_) => "extend",
            NodeKind::Conditional(_) => "conditional",
            NodeKind::Identifier { .. } => "identifier",
            NodeKind::Constant(_) => "constant",
            NodeKind::Iterator(_) => "loop",
            NodeKind::Expression(_) => "expression",
            NodeKind::Custom(_) => "custom node",
        }
    }

    /// Whether this node is an `Import` or `Extend`
    pub fn is_composition(&self) -> bool {
        matches!(self, NodeKind::Import { .. } | NodeKind::Extend(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub parameters: Vec<SyntaxNode>,
    pub body: Option<Vec<SyntaxNode>>,
}

/// Composition site: the extended template's path and the fragments it exports
#[derive(Debug, Clone, PartialEq)]
pub struct Extend {
    /// Literal path, normalized against the renderer's root at resolution time
    pub path: String,
    pub exports: BTreeMap<String, Vec<SyntaxNode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: Box<SyntaxNode>,
    pub body: Vec<SyntaxNode>,
    /// `#elseif` / `#else` continuation. An `#else` has a constant `true` condition.
    pub next: Option<Box<Conditional>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Iteration {
    pub key: Box<SyntaxNode>,
    pub data: Box<SyntaxNode>,
    pub body: Vec<SyntaxNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Double(f64),
    String(String),
    Bool(bool),
    /// Several nodes standing in a single-node position, rendered back to back
    Interpolated(Vec<SyntaxNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Infix {
        op: Operator,
        left: Box<SyntaxNode>,
        right: Box<SyntaxNode>,
    },
    Prefix {
        op: Operator,
        right: Box<SyntaxNode>,
    },
    Postfix {
        op: Operator,
        left: Box<SyntaxNode>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Not,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Not => "!",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Extension point for nodes the built-in syntax does not know about
pub trait CustomNode: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, context: &TemplateData) -> Result<String, SerializeError>;
}

/// Shared handle to a [`CustomNode`]; two handles are equal when they point
/// at the same node.
#[derive(Debug, Clone)]
pub struct Custom(pub Arc<dyn CustomNode>);

impl Custom {
    pub fn new(node: impl CustomNode + 'static) -> Self {
        Self(Arc::new(node))
    }
}

impl PartialEq for Custom {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
