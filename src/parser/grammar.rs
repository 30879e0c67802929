//! Expression grammar for tag parameters, using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::ParseError;
use crate::parser::ast::*;
use crate::parser::document::Locator;
use crate::parser::lexer::{Span, Token};

type Extra<'a> = extra::Err<Rich<'a, Token>>;

/// Tokens of one parameter list, without the enclosing parentheses
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParameterTokens {
    pub tokens: Vec<(Token, Span)>,
    /// Byte offset of the closing parenthesis
    pub end: usize,
}

/// Parse a comma-separated parameter list
pub(crate) fn parse_parameters(
    params: &ParameterTokens,
    loc: &Locator<'_>,
) -> Result<Vec<SyntaxNode>, ParseError> {
    let end = params.end;
    let token_iter = params
        .tokens
        .iter()
        .cloned()
        .map(|(tok, span)| (tok, SimpleSpan::from(span)));

    // Split (Token, SimpleSpan) into token and span parts
    let token_stream =
        Stream::from_iter(token_iter).map((end..end).into(), |(t, s): (_, _)| (t, s));

    parameter_list(loc)
        .parse(token_stream)
        .into_result()
        .map_err(|errs| first_error(errs, params.end, loc))
}

/// Parse a `name in expression` loop header
pub(crate) fn parse_loop_header(
    params: &ParameterTokens,
    loc: &Locator<'_>,
) -> Result<(SyntaxNode, SyntaxNode), ParseError> {
    let end = params.end;
    let token_iter = params
        .tokens
        .iter()
        .cloned()
        .map(|(tok, span)| (tok, SimpleSpan::from(span)));

    let token_stream =
        Stream::from_iter(token_iter).map((end..end).into(), |(t, s): (_, _)| (t, s));

    loop_header(loc)
        .parse(token_stream)
        .into_result()
        .map_err(|errs| first_error(errs, params.end, loc))
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn parameter_list<'a, I>(
    loc: &'a Locator<'a>,
) -> impl Parser<'a, I, Vec<SyntaxNode>, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    expression(loc)
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .then_ignore(end())
}

fn loop_header<'a, I>(
    loc: &'a Locator<'a>,
) -> impl Parser<'a, I, (SyntaxNode, SyntaxNode), Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let key = select! {
        Token::Ident(s) => s,
    }
    .map_with(move |name, e| loc.node(NodeKind::Identifier { path: vec![name] }, span_range(&e.span())))
    .labelled("loop variable");

    key.then_ignore(just(Token::In))
        .then(expression(loc))
        .then_ignore(end())
}

fn expression<'a, I>(loc: &'a Locator<'a>) -> impl Parser<'a, I, SyntaxNode, Extra<'a>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(move |expr| {
        let literal = select! {
            Token::Int(n) => Constant::Int(n),
            Token::Double(n) => Constant::Double(n),
            Token::String(s) => Constant::String(s),
            Token::True => Constant::Bool(true),
            Token::False => Constant::Bool(false),
        }
        .map_with(move |c, e| loc.node(NodeKind::Constant(c), span_range(&e.span())));

        let name = select! {
            Token::Ident(s) => s,
        };

        let arguments = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        // `name(args)` inside parameters: `import("x")` or a body-less tag.
        // Once `name(` matched, a bad import argument is reported here
        // instead of letting `path` retry the input.
        let call = name
            .clone()
            .then(arguments)
            .validate(move |(name, arguments), e, emitter| {
                let range = span_range(&e.span());
                call_node(loc, name, arguments, range.clone()).unwrap_or_else(|err| {
                    emitter.emit(err);
                    loc.node(NodeKind::Constant(Constant::String(String::new())), range)
                })
            });

        let path = name
            .separated_by(just(Token::Dot))
            .at_least(1)
            .collect::<Vec<_>>()
            .map_with(move |path, e| loc.node(NodeKind::Identifier { path }, span_range(&e.span())));

        let atom = choice((
            literal,
            call,
            path,
            expr.delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ))
        .boxed();

        let prefix_op = choice((
            just(Token::Bang).to(Operator::Not),
            just(Token::Minus).to(Operator::Minus),
        ))
        .map_with(|op, e| (op, span_range(&e.span())));

        let unary = prefix_op
            .repeated()
            .foldr(atom, move |(op, range), right: SyntaxNode| {
                let span = range.start..right.span.range.end;
                loc.node(
                    NodeKind::Expression(Expression::Prefix {
                        op,
                        right: Box::new(right),
                    }),
                    span,
                )
            })
            .boxed();

        let product = unary
            .clone()
            .foldl(
                choice((
                    just(Token::Star).to(Operator::Multiply),
                    just(Token::Slash).to(Operator::Divide),
                    just(Token::Percent).to(Operator::Modulo),
                ))
                .then(unary)
                .repeated(),
                move |left, (op, right)| infix(loc, op, left, right),
            )
            .boxed();

        let sum = product
            .clone()
            .foldl(
                choice((
                    just(Token::Plus).to(Operator::Plus),
                    just(Token::Minus).to(Operator::Minus),
                ))
                .then(product)
                .repeated(),
                move |left, (op, right)| infix(loc, op, left, right),
            )
            .boxed();

        let comparison = sum
            .clone()
            .foldl(
                choice((
                    just(Token::LessOrEqual).to(Operator::LessOrEqual),
                    just(Token::GreaterOrEqual).to(Operator::GreaterOrEqual),
                    just(Token::Less).to(Operator::Less),
                    just(Token::Greater).to(Operator::Greater),
                ))
                .then(sum)
                .repeated(),
                move |left, (op, right)| infix(loc, op, left, right),
            )
            .boxed();

        let equality = comparison
            .clone()
            .foldl(
                choice((
                    just(Token::EqualEqual).to(Operator::Equal),
                    just(Token::NotEqual).to(Operator::NotEqual),
                ))
                .then(comparison)
                .repeated(),
                move |left, (op, right)| infix(loc, op, left, right),
            )
            .boxed();

        let conjunction = equality
            .clone()
            .foldl(
                just(Token::And).to(Operator::And).then(equality).repeated(),
                move |left, (op, right)| infix(loc, op, left, right),
            )
            .boxed();

        conjunction
            .clone()
            .foldl(
                just(Token::Or).to(Operator::Or).then(conjunction).repeated(),
                move |left, (op, right)| infix(loc, op, left, right),
            )
            .boxed()
    })
}

fn infix(loc: &Locator<'_>, op: Operator, left: SyntaxNode, right: SyntaxNode) -> SyntaxNode {
    let span = left.span.range.start..right.span.range.end;
    loc.node(
        NodeKind::Expression(Expression::Infix {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }),
        span,
    )
}

fn call_node<'a>(
    loc: &Locator<'_>,
    name: String,
    mut arguments: Vec<SyntaxNode>,
    range: std::ops::Range<usize>,
) -> Result<SyntaxNode, Rich<'a, Token>> {
    if name == "import" {
        return match (arguments.pop(), arguments.is_empty()) {
            (
                Some(SyntaxNode {
                    node: NodeKind::Constant(Constant::String(identifier)),
                    ..
                }),
                true,
            ) => Ok(loc.node(NodeKind::Import { identifier }, range)),
            _ => Err(Rich::custom(
                range.into(),
                "import expects a single string literal",
            )),
        };
    }
    Ok(loc.node(
        NodeKind::Tag(Tag {
            name,
            parameters: arguments,
            body: None,
        }),
        range,
    ))
}

fn first_error(errs: Vec<Rich<'_, Token>>, end: usize, loc: &Locator<'_>) -> ParseError {
    match errs.into_iter().next() {
        Some(err) => convert_error(err, loc),
        None => ParseError::syntax(loc.span(end..end), "invalid parameter list", Vec::new()),
    }
}

fn convert_error(err: Rich<'_, Token>, loc: &Locator<'_>) -> ParseError {
    use chumsky::error::RichReason;

    let message = match err.reason() {
        RichReason::ExpectedFound { found, .. } => match found {
            Some(tok) => format!("Unexpected {}", &**tok),
            None => "Unexpected end of parameters".to_string(),
        },
        RichReason::Custom(msg) => msg.to_string(),
    };

    let expected: Vec<String> = err
        .expected()
        .filter_map(|e| match e {
            chumsky::error::RichPattern::Token(tok) => Some((**tok).to_string()),
            chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
            chumsky::error::RichPattern::EndOfInput => Some("')'".to_string()),
            chumsky::error::RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
            chumsky::error::RichPattern::Any => Some("any token".to_string()),
            chumsky::error::RichPattern::SomethingElse => None,
        })
        .collect();

    ParseError::syntax(loc.span(err.span().into_range()), message, expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::lex;

    fn params(source: &str) -> ParameterTokens {
        ParameterTokens {
            tokens: lex(source).map(|t| t.expect("valid token")).collect(),
            end: source.len(),
        }
    }

    fn parse_one(source: &str) -> SyntaxNode {
        let loc = Locator::new("test", source);
        let mut nodes = parse_parameters(&params(source), &loc).expect("Should parse");
        assert_eq!(nodes.len(), 1);
        nodes.remove(0)
    }

    #[test]
    fn test_literals() {
        assert!(matches!(parse_one("42").node, NodeKind::Constant(Constant::Int(42))));
        assert!(matches!(parse_one("true").node, NodeKind::Constant(Constant::Bool(true))));
        match parse_one(r#""hello""#).node {
            NodeKind::Constant(Constant::String(s)) => assert_eq!(s, "hello"),
            other => panic!("Expected String, got {:?}", other),
        }
    }

    #[test]
    fn test_dotted_identifier() {
        match parse_one("alert.message").node {
            NodeKind::Identifier { path } => assert_eq!(path, vec!["alert", "message"]),
            other => panic!("Expected Identifier, got {:?}", other),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter_than_addition() {
        match parse_one("1 + 2 * 3").node {
            NodeKind::Expression(Expression::Infix { op, left, right }) => {
                assert_eq!(op, Operator::Plus);
                assert!(matches!(left.node, NodeKind::Constant(Constant::Int(1))));
                assert!(matches!(
                    right.node,
                    NodeKind::Expression(Expression::Infix {
                        op: Operator::Multiply,
                        ..
                    })
                ));
            }
            other => panic!("Expected Infix, got {:?}", other),
        }
    }

    #[test]
    fn test_infix_is_left_associative() {
        match parse_one("10 - 4 - 3").node {
            NodeKind::Expression(Expression::Infix { op, left, .. }) => {
                assert_eq!(op, Operator::Minus);
                assert!(matches!(
                    left.node,
                    NodeKind::Expression(Expression::Infix {
                        op: Operator::Minus,
                        ..
                    })
                ));
            }
            other => panic!("Expected Infix, got {:?}", other),
        }
    }

    #[test]
    fn test_logical_precedence() {
        match parse_one("a || b && c == 1").node {
            NodeKind::Expression(Expression::Infix { op, right, .. }) => {
                assert_eq!(op, Operator::Or);
                assert!(matches!(
                    right.node,
                    NodeKind::Expression(Expression::Infix {
                        op: Operator::And,
                        ..
                    })
                ));
            }
            other => panic!("Expected Infix, got {:?}", other),
        }
    }

    #[test]
    fn test_prefix_operators() {
        match parse_one("!done").node {
            NodeKind::Expression(Expression::Prefix { op, right }) => {
                assert_eq!(op, Operator::Not);
                assert!(matches!(right.node, NodeKind::Identifier { .. }));
            }
            other => panic!("Expected Prefix, got {:?}", other),
        }
    }

    #[test]
    fn test_parentheses_override_precedence() {
        match parse_one("(1 + 2) * 3").node {
            NodeKind::Expression(Expression::Infix { op, left, .. }) => {
                assert_eq!(op, Operator::Multiply);
                assert!(matches!(
                    left.node,
                    NodeKind::Expression(Expression::Infix {
                        op: Operator::Plus,
                        ..
                    })
                ));
            }
            other => panic!("Expected Infix, got {:?}", other),
        }
    }

    #[test]
    fn test_import_call() {
        match parse_one(r#"1 < import("export3")"#).node {
            NodeKind::Expression(Expression::Infix { op, right, .. }) => {
                assert_eq!(op, Operator::Less);
                assert_eq!(
                    right.node,
                    NodeKind::Import {
                        identifier: "export3".to_string()
                    }
                );
            }
            other => panic!("Expected Infix, got {:?}", other),
        }
    }

    #[test]
    fn test_import_requires_string() {
        let source = "import(name)";
        let loc = Locator::new("test", source);
        let err = parse_parameters(&params(source), &loc).unwrap_err();
        assert!(err.to_string().contains("import expects a single string literal"));
        assert_eq!(err.span().range, 0..12);
    }

    #[test]
    fn test_import_with_extra_arguments_is_reported_at_call() {
        let source = r#"1 + import("a", "b")"#;
        let loc = Locator::new("test", source);
        let err = parse_parameters(&params(source), &loc).unwrap_err();
        assert!(err.to_string().contains("import expects a single string literal"));
        assert_eq!(err.span().column, 5);
    }

    #[test]
    fn test_nested_call_becomes_tag() {
        match parse_one("lowercased(name)").node {
            NodeKind::Tag(tag) => {
                assert_eq!(tag.name, "lowercased");
                assert_eq!(tag.parameters.len(), 1);
                assert!(tag.body.is_none());
            }
            other => panic!("Expected Tag, got {:?}", other),
        }
    }

    #[test]
    fn test_multiple_parameters() {
        let source = r#""title", "Welcome""#;
        let loc = Locator::new("test", source);
        let nodes = parse_parameters(&params(source), &loc).expect("Should parse");
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_empty_parameter_list() {
        let loc = Locator::new("test", "");
        let nodes = parse_parameters(&params(""), &loc).expect("Should parse");
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_loop_header() {
        let source = "item in items";
        let loc = Locator::new("test", source);
        let (key, data) = parse_loop_header(&params(source), &loc).expect("Should parse");
        assert_eq!(
            key.node,
            NodeKind::Identifier {
                path: vec!["item".to_string()]
            }
        );
        assert_eq!(
            data.node,
            NodeKind::Identifier {
                path: vec!["items".to_string()]
            }
        );
    }

    #[test]
    fn test_dangling_operator_is_error() {
        let source = "1 +";
        let loc = Locator::new("test", source);
        assert!(parse_parameters(&params(source), &loc).is_err());
    }

    #[test]
    fn test_spans_cover_expression() {
        let node = parse_one("a + bb");
        assert_eq!(node.span.range, 0..6);
        assert_eq!(node.span.line, 1);
        assert_eq!(node.span.column, 1);
    }
}
