//! Serializer: walks a resolved AST against a context and produces text

use std::any::Any;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::data::TemplateData;
use crate::parser::ast::*;

use super::tags::{TagContext, TagError, TagRegistry};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SerializeError {
    #[error("{span}: no tag named '{name}' is registered")]
    UnknownTag { name: String, span: SourceSpan },

    /// An `Import` or `Extend` reached the serializer
    #[error("{span}: {kind} node was not resolved before rendering")]
    Unresolved { kind: &'static str, span: SourceSpan },

    #[error("{span}: {kind} is not supported by this serializer")]
    Unsupported { kind: &'static str, span: SourceSpan },

    #[error("{span}: {message}")]
    TypeMismatch { message: String, span: SourceSpan },

    #[error("{span}: {source}")]
    Tag {
        #[source]
        source: TagError,
        span: SourceSpan,
    },

    #[error("custom node '{node}': {message}")]
    Custom { node: String, message: String },
}

impl SerializeError {
    pub fn span(&self) -> Option<&SourceSpan> {
        match self {
            SerializeError::UnknownTag { span, .. }
            | SerializeError::Unresolved { span, .. }
            | SerializeError::Unsupported { span, .. }
            | SerializeError::TypeMismatch { span, .. }
            | SerializeError::Tag { span, .. } => Some(span),
            SerializeError::Custom { .. } => None,
        }
    }

    /// The error without its location
    pub fn message(&self) -> String {
        match self {
            SerializeError::UnknownTag { name, .. } => {
                format!("no tag named '{}' is registered", name)
            }
            SerializeError::Unresolved { kind, .. } => {
                format!("{} node was not resolved before rendering", kind)
            }
            SerializeError::Unsupported { kind, .. } => {
                format!("{} is not supported by this serializer", kind)
            }
            SerializeError::TypeMismatch { message, .. } => message.clone(),
            SerializeError::Tag { source, .. } => source.to_string(),
            SerializeError::Custom { .. } => self.to_string(),
        }
    }

    fn mismatch(message: impl Into<String>, span: &SourceSpan) -> Self {
        SerializeError::TypeMismatch {
            message: message.into(),
            span: span.clone(),
        }
    }
}

/// Caller-supplied values handed through to tag handlers untouched
#[derive(Clone, Default)]
pub struct Storage {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Arc::new(value));
    }

    /// The value under `key`, if present and of type `T`
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key)?.downcast_ref()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
pub trait Serializer: Send + Sync {
    async fn serialize(
        &self,
        ast: &[SyntaxNode],
        context: &TemplateData,
        storage: &Storage,
    ) -> Result<String, SerializeError>;
}

/// Default serializer for the built-in syntax
#[derive(Debug, Clone)]
pub struct TemplateSerializer {
    tags: Arc<TagRegistry>,
}

impl Default for TemplateSerializer {
    fn default() -> Self {
        Self::new(TagRegistry::with_builtins())
    }
}

impl TemplateSerializer {
    pub fn new(tags: TagRegistry) -> Self {
        Self {
            tags: Arc::new(tags),
        }
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    /// Render synchronously; the async [`Serializer`] impl delegates here
    pub fn render(
        &self,
        ast: &[SyntaxNode],
        context: &TemplateData,
        storage: &Storage,
    ) -> Result<String, SerializeError> {
        let mut evaluator = Evaluator {
            tags: &self.tags,
            context,
            storage,
            scopes: Vec::new(),
        };
        let mut out = String::new();
        evaluator.render_sequence(ast, &mut out)?;
        Ok(out)
    }
}

#[async_trait]
impl Serializer for TemplateSerializer {
    async fn serialize(
        &self,
        ast: &[SyntaxNode],
        context: &TemplateData,
        storage: &Storage,
    ) -> Result<String, SerializeError> {
        self.render(ast, context, storage)
    }
}

type Scope = BTreeMap<String, TemplateData>;

struct Evaluator<'a> {
    tags: &'a TagRegistry,
    context: &'a TemplateData,
    storage: &'a Storage,
    /// Loop variables, innermost last
    scopes: Vec<Scope>,
}

impl Evaluator<'_> {
    fn render_sequence(&mut self, nodes: &[SyntaxNode], out: &mut String) -> Result<(), SerializeError> {
        for node in nodes {
            self.render_node(node, out)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &SyntaxNode, out: &mut String) -> Result<(), SerializeError> {
        match &node.node {
            NodeKind::Raw(text) => out.push_str(text),
            NodeKind::Constant(Constant::Interpolated(parts)) => self.render_sequence(parts, out)?,
            NodeKind::Conditional(conditional) => {
                let mut branch = Some(conditional);
                while let Some(current) = branch {
                    if self.evaluate(&current.condition)?.is_truthy() {
                        return self.render_sequence(&current.body, out);
                    }
                    branch = current.next.as_deref();
                }
            }
            NodeKind::Iterator(iteration) => self.render_loop(iteration, &node.span, out)?,
            _ => {
                let value = self.evaluate(node)?;
                self.write_value(&value, out)?;
            }
        }
        Ok(())
    }

    fn write_value(&mut self, value: &TemplateData, out: &mut String) -> Result<(), SerializeError> {
        match value {
            TemplateData::Interpolated(nodes) => self.render_sequence(nodes, out),
            other => {
                out.push_str(&other.to_string());
                Ok(())
            }
        }
    }

    fn evaluate(&mut self, node: &SyntaxNode) -> Result<TemplateData, SerializeError> {
        let span = &node.span;
        Ok(match &node.node {
            NodeKind::Raw(text) => TemplateData::String(text.clone()),
            NodeKind::Constant(Constant::Int(n)) => TemplateData::Int(*n),
            NodeKind::Constant(Constant::Double(n)) => TemplateData::Double(*n),
            NodeKind::Constant(Constant::String(s)) => TemplateData::String(s.clone()),
            NodeKind::Constant(Constant::Bool(b)) => TemplateData::Bool(*b),
            NodeKind::Identifier { path } => self.lookup(path),
            NodeKind::Expression(expression) => self.evaluate_expression(expression, span)?,
            NodeKind::Tag(tag) => self.evaluate_tag(tag, span)?,
            NodeKind::Custom(custom) => TemplateData::String(custom.0.render(self.context)?),
            NodeKind::Constant(Constant::Interpolated(_))
            | NodeKind::Conditional(_)
            | NodeKind::Iterator(_) => {
                let mut text = String::new();
                self.render_node(node, &mut text)?;
                TemplateData::String(text)
            }
            NodeKind::Embed { .. } => {
                return Err(SerializeError::Unsupported {
                    kind: node.node.describe(),
                    span: span.clone(),
                })
            }
            NodeKind::Import { .. } | NodeKind::Extend(_) => {
                return Err(SerializeError::Unresolved {
                    kind: node.node.describe(),
                    span: span.clone(),
                })
            }
        })
    }

    /// Loop scopes first, innermost out, then the root context; missing is Null
    fn lookup(&self, path: &[String]) -> TemplateData {
        let Some((head, rest)) = path.split_first() else {
            return TemplateData::Null;
        };
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(head) {
                return value.lookup(rest).cloned().unwrap_or_default();
            }
        }
        self.context.lookup(path).cloned().unwrap_or_default()
    }

    fn evaluate_tag(&mut self, tag: &Tag, span: &SourceSpan) -> Result<TemplateData, SerializeError> {
        if tag.name.is_empty() {
            return match tag.parameters.as_slice() {
                [value] => self.evaluate(value),
                other => Err(SerializeError::Tag {
                    source: TagError::Arity {
                        name: String::new(),
                        expected: 1,
                        found: other.len(),
                    },
                    span: span.clone(),
                }),
            };
        }

        let tags = self.tags;
        let handler = tags.get(&tag.name).ok_or_else(|| SerializeError::UnknownTag {
            name: tag.name.clone(),
            span: span.clone(),
        })?;

        let mut parameters = Vec::with_capacity(tag.parameters.len());
        for parameter in &tag.parameters {
            parameters.push(self.evaluate(parameter)?);
        }
        let body = match &tag.body {
            Some(body) if handler.evaluates_body() => {
                let mut text = String::new();
                self.render_sequence(body, &mut text)?;
                Some(text)
            }
            _ => None,
        };

        handler
            .render(&TagContext {
                name: &tag.name,
                parameters,
                body,
                data: self.context,
                storage: self.storage,
            })
            .map_err(|source| SerializeError::Tag {
                source,
                span: span.clone(),
            })
    }

    /// Binds the loop variable plus `index`, `isFirst` and `isLast`.
    /// Dictionaries iterate their values in key order and also bind `key`.
    fn render_loop(
        &mut self,
        iteration: &Iteration,
        span: &SourceSpan,
        out: &mut String,
    ) -> Result<(), SerializeError> {
        let name = match &iteration.key.node {
            NodeKind::Identifier { path } if path.len() == 1 => path[0].clone(),
            other => {
                return Err(SerializeError::mismatch(
                    format!("loop variable must be a plain name, found {}", other.describe()),
                    &iteration.key.span,
                ))
            }
        };

        let items: Vec<(Option<String>, TemplateData)> = match self.evaluate(&iteration.data)? {
            TemplateData::Array(items) => items.into_iter().map(|item| (None, item)).collect(),
            TemplateData::Dictionary(entries) => entries
                .into_iter()
                .map(|(key, value)| (Some(key), value))
                .collect(),
            TemplateData::Null => Vec::new(),
            other => {
                return Err(SerializeError::mismatch(
                    format!("cannot iterate over {}", other.kind()),
                    span,
                ))
            }
        };

        let count = items.len();
        for (index, (key, item)) in items.into_iter().enumerate() {
            let mut scope = Scope::new();
            if let Some(key) = key {
                scope.insert("key".to_string(), TemplateData::String(key));
            }
            scope.insert("index".to_string(), TemplateData::Int(index as i64));
            scope.insert("isFirst".to_string(), TemplateData::Bool(index == 0));
            scope.insert("isLast".to_string(), TemplateData::Bool(index + 1 == count));
            scope.insert(name.clone(), item);

            self.scopes.push(scope);
            let result = self.render_sequence(&iteration.body, out);
            self.scopes.pop();
            result?;
        }
        Ok(())
    }

    fn evaluate_expression(
        &mut self,
        expression: &Expression,
        span: &SourceSpan,
    ) -> Result<TemplateData, SerializeError> {
        match expression {
            Expression::Prefix { op, right } => {
                let value = self.evaluate(right)?;
                match (op, &value) {
                    (Operator::Not, _) => Ok(TemplateData::Bool(!value.is_truthy())),
                    (Operator::Minus, TemplateData::Int(n)) => n
                        .checked_neg()
                        .map(TemplateData::Int)
                        .ok_or_else(|| SerializeError::mismatch("integer overflow", span)),
                    (Operator::Minus, TemplateData::Double(n)) => Ok(TemplateData::Double(-n)),
                    _ => Err(SerializeError::mismatch(
                        format!("cannot apply prefix '{}' to {}", op, value.kind()),
                        span,
                    )),
                }
            }
            Expression::Postfix { op, .. } => Err(SerializeError::mismatch(
                format!("postfix '{}' is not supported", op),
                span,
            )),
            Expression::Infix {
                op: Operator::And,
                left,
                right,
            } => {
                if !self.evaluate(left)?.is_truthy() {
                    return Ok(TemplateData::Bool(false));
                }
                Ok(TemplateData::Bool(self.evaluate(right)?.is_truthy()))
            }
            Expression::Infix {
                op: Operator::Or,
                left,
                right,
            } => {
                if self.evaluate(left)?.is_truthy() {
                    return Ok(TemplateData::Bool(true));
                }
                Ok(TemplateData::Bool(self.evaluate(right)?.is_truthy()))
            }
            Expression::Infix { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(*op, &left, &right, span)
            }
        }
    }
}

enum Numbers {
    Ints(i64, i64),
    Doubles(f64, f64),
}

fn numbers(left: &TemplateData, right: &TemplateData) -> Option<Numbers> {
    use TemplateData::{Double, Int};
    match (left, right) {
        (Int(a), Int(b)) => Some(Numbers::Ints(*a, *b)),
        (Int(a), Double(b)) => Some(Numbers::Doubles(*a as f64, *b)),
        (Double(a), Int(b)) => Some(Numbers::Doubles(*a, *b as f64)),
        (Double(a), Double(b)) => Some(Numbers::Doubles(*a, *b)),
        _ => None,
    }
}

fn binary(
    op: Operator,
    left: &TemplateData,
    right: &TemplateData,
    span: &SourceSpan,
) -> Result<TemplateData, SerializeError> {
    let mismatch = || {
        SerializeError::mismatch(
            format!("cannot apply '{}' to {} and {}", op, left.kind(), right.kind()),
            span,
        )
    };
    let overflow = || SerializeError::mismatch("integer overflow", span);

    match op {
        Operator::Equal => Ok(TemplateData::Bool(equals(left, right))),
        Operator::NotEqual => Ok(TemplateData::Bool(!equals(left, right))),
        Operator::Less | Operator::LessOrEqual | Operator::Greater | Operator::GreaterOrEqual => {
            let ordering = compare(left, right).ok_or_else(mismatch)?;
            Ok(TemplateData::Bool(match op {
                Operator::Less => ordering == Ordering::Less,
                Operator::LessOrEqual => ordering != Ordering::Greater,
                Operator::Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        Operator::Plus => match (left, right, numbers(left, right)) {
            (_, _, Some(Numbers::Ints(a, b))) => a.checked_add(b).map(TemplateData::Int).ok_or_else(overflow),
            (_, _, Some(Numbers::Doubles(a, b))) => Ok(TemplateData::Double(a + b)),
            (TemplateData::String(_), _, _) | (_, TemplateData::String(_), _) => {
                Ok(TemplateData::String(format!("{}{}", left, right)))
            }
            _ => Err(mismatch()),
        },
        Operator::Minus => match numbers(left, right).ok_or_else(mismatch)? {
            Numbers::Ints(a, b) => a.checked_sub(b).map(TemplateData::Int).ok_or_else(overflow),
            Numbers::Doubles(a, b) => Ok(TemplateData::Double(a - b)),
        },
        Operator::Multiply => match numbers(left, right).ok_or_else(mismatch)? {
            Numbers::Ints(a, b) => a.checked_mul(b).map(TemplateData::Int).ok_or_else(overflow),
            Numbers::Doubles(a, b) => Ok(TemplateData::Double(a * b)),
        },
        Operator::Divide | Operator::Modulo => match numbers(left, right).ok_or_else(mismatch)? {
            Numbers::Ints(_, 0) => Err(SerializeError::mismatch("division by zero", span)),
            Numbers::Ints(a, b) if op == Operator::Divide => {
                a.checked_div(b).map(TemplateData::Int).ok_or_else(overflow)
            }
            Numbers::Ints(a, b) => a.checked_rem(b).map(TemplateData::Int).ok_or_else(overflow),
            Numbers::Doubles(a, b) if op == Operator::Divide => Ok(TemplateData::Double(a / b)),
            Numbers::Doubles(a, b) => Ok(TemplateData::Double(a % b)),
        },
        Operator::Not | Operator::And | Operator::Or => Err(mismatch()),
    }
}

fn equals(left: &TemplateData, right: &TemplateData) -> bool {
    match numbers(left, right) {
        Some(Numbers::Ints(a, b)) => a == b,
        Some(Numbers::Doubles(a, b)) => a == b,
        None => left == right,
    }
}

fn compare(left: &TemplateData, right: &TemplateData) -> Option<Ordering> {
    match numbers(left, right) {
        Some(Numbers::Ints(a, b)) => Some(a.cmp(&b)),
        Some(Numbers::Doubles(a, b)) => a.partial_cmp(&b),
        None => match (left, right) {
            (TemplateData::String(a), TemplateData::String(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}
