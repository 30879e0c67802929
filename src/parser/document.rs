//! Template scanner: splits raw text from `#tag` heads and assembles blocks

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use crate::error::ParseError;
use crate::parser::ast::*;
use crate::parser::grammar::{parse_loop_header, parse_parameters, ParameterTokens};
use crate::parser::lexer::{lex, Token};

/// Closing and continuation keywords that are tags even without `(` or `:`
const BARE_KEYWORDS: &[&str] = &["endif", "endfor", "endextend", "endexport", "else"];

/// Maps byte offsets of one source to [`SourceSpan`]s
pub(crate) struct Locator<'s> {
    file: Arc<str>,
    source: &'s str,
    line_starts: Vec<usize>,
}

impl<'s> Locator<'s> {
    pub(crate) fn new(file: &str, source: &'s str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            file: Arc::from(file),
            source,
            line_starts,
        }
    }

    pub(crate) fn source(&self) -> &'s str {
        self.source
    }

    pub(crate) fn span(&self, range: Range<usize>) -> SourceSpan {
        let line = self.line_starts.partition_point(|&start| start <= range.start);
        let line_start = self.line_starts[line.saturating_sub(1)];
        let column = self
            .source
            .get(line_start..range.start)
            .map_or(0, |prefix| prefix.chars().count())
            + 1;
        SourceSpan {
            file: self.file.clone(),
            line: line.max(1),
            column,
            range,
        }
    }

    pub(crate) fn node(&self, kind: NodeKind, range: Range<usize>) -> SyntaxNode {
        Spanned::new(kind, self.span(range))
    }
}

/// Parse a whole template source into its top-level node sequence
pub(crate) fn parse_document(source: &str, label: &str) -> Result<Vec<SyntaxNode>, ParseError> {
    let loc = Locator::new(label, source);
    let mut scanner = Scanner {
        loc: &loc,
        pos: 0,
        pending: None,
    };
    let (nodes, _) = scanner.block(None, &[])?;
    Ok(nodes)
}

/// `#name(params):` as found in the source, before interpretation
#[derive(Debug)]
struct TagHead {
    name: String,
    params: Option<ParameterTokens>,
    body: bool,
    range: Range<usize>,
}

enum Item {
    Raw(String, Range<usize>),
    Tag(TagHead),
    Eof,
}

/// An open block: its tag name and the span of its head
struct Open<'a> {
    tag: &'a str,
    span: &'a SourceSpan,
}

struct Scanner<'s> {
    loc: &'s Locator<'s>,
    pos: usize,
    /// Tag head found while collecting raw text, returned by the next call
    pending: Option<(TagHead, usize)>,
}

impl<'s> Scanner<'s> {
    /// Collect nodes until the block's closer, one of `stops`, or end of input
    fn block(
        &mut self,
        open: Option<Open<'_>>,
        stops: &[&str],
    ) -> Result<(Vec<SyntaxNode>, Option<TagHead>), ParseError> {
        let closer = open.as_ref().map(|o| format!("end{}", o.tag));
        let mut nodes = Vec::new();

        loop {
            match self.next_item(closer.as_deref())? {
                Item::Raw(text, range) => nodes.push(self.loc.node(NodeKind::Raw(text), range)),
                Item::Eof => {
                    return match open {
                        Some(o) => Err(ParseError::UnclosedBlock {
                            tag: o.tag.to_string(),
                            span: o.span.clone(),
                        }),
                        None => Ok((nodes, None)),
                    };
                }
                Item::Tag(head) => {
                    if closer.as_deref() == Some(head.name.as_str())
                        || stops.contains(&head.name.as_str())
                    {
                        return Ok((nodes, Some(head)));
                    }
                    nodes.push(self.tag_node(head)?);
                }
            }
        }
    }

    fn tag_node(&mut self, head: TagHead) -> Result<SyntaxNode, ParseError> {
        let span = self.loc.span(head.range.clone());
        match head.name.as_str() {
            "if" => {
                let condition = self.single_parameter(&head)?;
                self.require_body(&head)?;
                let conditional = self.conditional(condition, &span)?;
                Ok(Spanned::new(NodeKind::Conditional(conditional), span))
            }
            "for" => {
                let params = self.expect_parameters(&head)?;
                let (key, data) = parse_loop_header(params, self.loc)?;
                self.require_body(&head)?;
                let (body, _) = self.block(Some(Open { tag: "for", span: &span }), &[])?;
                Ok(Spanned::new(
                    NodeKind::Iterator(Iteration {
                        key: Box::new(key),
                        data: Box::new(data),
                        body,
                    }),
                    span,
                ))
            }
            "extend" => {
                let path = self.string_parameter(&head)?;
                let exports = if head.body {
                    self.extend_body(&span)?
                } else {
                    BTreeMap::new()
                };
                Ok(Spanned::new(NodeKind::Extend(Extend { path, exports }), span))
            }
            "import" => {
                let identifier = self.string_parameter(&head)?;
                self.forbid_body(&head)?;
                Ok(Spanned::new(NodeKind::Import { identifier }, span))
            }
            "embed" => {
                let path = self.single_parameter(&head)?;
                self.forbid_body(&head)?;
                Ok(Spanned::new(
                    NodeKind::Embed {
                        path: Box::new(path),
                    },
                    span,
                ))
            }
            "export" => Err(ParseError::syntax(
                span,
                "#export is only allowed directly inside an #extend body",
                Vec::new(),
            )),
            name if name.starts_with("end") || name == "else" || name == "elseif" => {
                Err(ParseError::syntax(
                    span,
                    format!("Unexpected #{}", name),
                    Vec::new(),
                ))
            }
            _ => {
                let parameters = match &head.params {
                    Some(params) => parse_parameters(params, self.loc)?,
                    None => Vec::new(),
                };
                let body = if head.body {
                    let (body, _) = self.block(
                        Some(Open {
                            tag: &head.name,
                            span: &span,
                        }),
                        &[],
                    )?;
                    Some(body)
                } else {
                    None
                };
                Ok(Spanned::new(
                    NodeKind::Tag(Tag {
                        name: head.name,
                        parameters,
                        body,
                    }),
                    span,
                ))
            }
        }
    }

    fn conditional(
        &mut self,
        condition: SyntaxNode,
        open: &SourceSpan,
    ) -> Result<Conditional, ParseError> {
        let (body, end) = self.block(Some(Open { tag: "if", span: open }), &["else", "elseif"])?;
        let next = match end {
            Some(head) if head.name == "elseif" => {
                let condition = self.single_parameter(&head)?;
                let span = self.loc.span(head.range.clone());
                Some(Box::new(self.conditional(condition, &span)?))
            }
            Some(head) if head.name == "else" => {
                let span = self.loc.span(head.range.clone());
                let (body, _) = self.block(Some(Open { tag: "if", span: &span }), &[])?;
                Some(Box::new(Conditional {
                    condition: Box::new(Spanned::new(
                        NodeKind::Constant(Constant::Bool(true)),
                        span,
                    )),
                    body,
                    next: None,
                }))
            }
            _ => None,
        };
        Ok(Conditional {
            condition: Box::new(condition),
            body,
            next,
        })
    }

    /// Body of `#extend(...):`, holding only `#export` declarations
    fn extend_body(
        &mut self,
        open: &SourceSpan,
    ) -> Result<BTreeMap<String, Vec<SyntaxNode>>, ParseError> {
        let mut exports = BTreeMap::new();
        loop {
            match self.next_item(Some("endextend"))? {
                Item::Raw(text, _) if text.trim().is_empty() => {}
                Item::Raw(_, range) => {
                    return Err(ParseError::syntax(
                        self.loc.span(range),
                        "Only #export declarations are allowed inside #extend",
                        vec!["#export".to_string(), "#endextend".to_string()],
                    ));
                }
                Item::Eof => {
                    return Err(ParseError::UnclosedBlock {
                        tag: "extend".to_string(),
                        span: open.clone(),
                    });
                }
                Item::Tag(head) if head.name == "endextend" => return Ok(exports),
                Item::Tag(head) if head.name == "export" => {
                    let span = self.loc.span(head.range.clone());
                    let (name, value) = self.export(head, &span)?;
                    if exports.contains_key(&name) {
                        return Err(ParseError::syntax(
                            span,
                            format!("Duplicate export '{}'", name),
                            Vec::new(),
                        ));
                    }
                    exports.insert(name, value);
                }
                Item::Tag(head) => {
                    return Err(ParseError::syntax(
                        self.loc.span(head.range),
                        format!("Unexpected #{} inside #extend", head.name),
                        vec!["#export".to_string(), "#endextend".to_string()],
                    ));
                }
            }
        }
    }

    /// `#export("name", value)` or `#export("name"): ... #endexport`
    fn export(
        &mut self,
        head: TagHead,
        span: &SourceSpan,
    ) -> Result<(String, Vec<SyntaxNode>), ParseError> {
        let mut params = parse_parameters(self.expect_parameters(&head)?, self.loc)?.into_iter();
        let name = match params.next() {
            Some(SyntaxNode {
                node: NodeKind::Constant(Constant::String(name)),
                ..
            }) => name,
            _ => {
                return Err(ParseError::syntax(
                    span.clone(),
                    "#export expects a string literal name",
                    Vec::new(),
                ))
            }
        };
        match (params.next(), params.next(), head.body) {
            (Some(value), None, false) => Ok((name, vec![value])),
            (None, None, true) => {
                let (body, _) = self.block(Some(Open { tag: "export", span }), &[])?;
                Ok((name, body))
            }
            _ => Err(ParseError::syntax(
                span.clone(),
                "#export takes either a value parameter or a body",
                Vec::new(),
            )),
        }
    }

    fn expect_parameters<'h>(&self, head: &'h TagHead) -> Result<&'h ParameterTokens, ParseError> {
        head.params.as_ref().ok_or_else(|| {
            ParseError::syntax(
                self.loc.span(head.range.clone()),
                format!("#{} requires parameters", head.name),
                vec!["'('".to_string()],
            )
        })
    }

    fn single_parameter(&self, head: &TagHead) -> Result<SyntaxNode, ParseError> {
        let mut params = parse_parameters(self.expect_parameters(head)?, self.loc)?;
        if params.len() != 1 {
            return Err(ParseError::syntax(
                self.loc.span(head.range.clone()),
                format!(
                    "#{} expects exactly one parameter, found {}",
                    head.name,
                    params.len()
                ),
                Vec::new(),
            ));
        }
        Ok(params.remove(0))
    }

    fn string_parameter(&self, head: &TagHead) -> Result<String, ParseError> {
        match self.single_parameter(head)? {
            SyntaxNode {
                node: NodeKind::Constant(Constant::String(s)),
                ..
            } => Ok(s),
            other => Err(ParseError::syntax(
                other.span,
                format!(
                    "#{} expects a string literal, found {}",
                    head.name,
                    other.node.describe()
                ),
                Vec::new(),
            )),
        }
    }

    fn require_body(&self, head: &TagHead) -> Result<(), ParseError> {
        if head.body {
            return Ok(());
        }
        Err(ParseError::syntax(
            self.loc.span(head.range.clone()),
            format!("#{} requires a body", head.name),
            vec!["':'".to_string()],
        ))
    }

    fn forbid_body(&self, head: &TagHead) -> Result<(), ParseError> {
        if !head.body {
            return Ok(());
        }
        Err(ParseError::syntax(
            self.loc.span(head.range.clone()),
            format!("#{} does not take a body", head.name),
            Vec::new(),
        ))
    }

    /// Next raw text run or tag head; `closer` is the innermost block's closing keyword
    fn next_item(&mut self, closer: Option<&str>) -> Result<Item, ParseError> {
        if let Some((head, next)) = self.pending.take() {
            self.pos = next;
            return Ok(Item::Tag(head));
        }

        let source = self.loc.source();
        let start = self.pos;
        let mut text = String::new();

        while let Some(c) = source[self.pos..].chars().next() {
            if c == '\\' && source[self.pos + 1..].starts_with('#') {
                text.push('#');
                self.pos += 2;
                continue;
            }
            if c == '#' {
                if let Some((head, next)) = self.tag_head(self.pos, closer)? {
                    if text.is_empty() {
                        self.pos = next;
                        return Ok(Item::Tag(head));
                    }
                    let end = self.pos;
                    self.pending = Some((head, next));
                    return Ok(Item::Raw(text, start..end));
                }
            }
            text.push(c);
            self.pos += c.len_utf8();
        }

        if text.is_empty() {
            Ok(Item::Eof)
        } else {
            Ok(Item::Raw(text, start..self.pos))
        }
    }

    /// Recognize a tag head at `at` (which holds `#`), returning it and the offset after it
    fn tag_head(
        &self,
        at: usize,
        closer: Option<&str>,
    ) -> Result<Option<(TagHead, usize)>, ParseError> {
        let source = self.loc.source();
        let name_start = at + 1;
        let name_len = source[name_start..]
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        let mut name = &source[name_start..name_start + name_len];

        // `#endifText` closes at `#endif`
        if let Some(closer) = closer {
            if name.len() > closer.len() && name.starts_with(closer) {
                name = closer;
            }
        }

        let mut cursor = name_start + name.len();
        let params = if source[cursor..].starts_with('(') {
            let params = self.lex_parameters(cursor)?;
            cursor = params.end + 1;
            Some(params)
        } else if name.is_empty()
            || !(source[cursor..].starts_with(':')
                || BARE_KEYWORDS.contains(&name)
                || closer == Some(name))
        {
            return Ok(None);
        } else {
            None
        };

        let body = !name.is_empty() && source[cursor..].starts_with(':');
        if body {
            cursor += 1;
        }

        Ok(Some((
            TagHead {
                name: name.to_string(),
                params,
                body,
                range: at..cursor,
            },
            cursor,
        )))
    }

    /// Tokens between the parenthesis at `open` and its matching close
    fn lex_parameters(&self, open: usize) -> Result<ParameterTokens, ParseError> {
        let source = self.loc.source();
        let mut depth = 0usize;
        let mut tokens = Vec::new();

        for item in lex(&source[open..]) {
            let (token, span) = item.map_err(|span| {
                let range = open + span.start..open + span.end;
                let found = source[range.clone()].chars().next().unwrap_or(' ');
                ParseError::syntax(
                    self.loc.span(range),
                    format!("Unexpected character '{}' in tag parameters", found),
                    Vec::new(),
                )
            })?;
            let span = open + span.start..open + span.end;
            match token {
                Token::ParenOpen => {
                    depth += 1;
                    if depth == 1 {
                        continue;
                    }
                }
                Token::ParenClose => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(ParameterTokens {
                            tokens,
                            end: span.start,
                        });
                    }
                }
                _ => {}
            }
            tokens.push((token, span));
        }

        Err(ParseError::syntax(
            self.loc.span(open..open + 1),
            "Unclosed '(' in tag parameters",
            vec!["')'".to_string()],
        ))
    }
}
