//! Extension resolution: rewrites a node sequence until no `Import` or
//! `Extend` remains
//!
//! Resolution is a depth-first rebuild. `Import` and `Extend` expand in place
//! to any number of sibling nodes. Positions that need exactly one node
//! (tag parameters, conditions, loop key/data, embed paths, operands) collapse
//! multi-node results into a single `Constant::Interpolated`.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, trace};

use crate::error::RenderError;
use crate::parser::ast::*;
use crate::parser::TemplateParser;

use super::loader::{TemplateLoader, TemplatePaths};

/// Export fragments visible at some point of the tree, already resolved
pub type Exports = BTreeMap<String, Vec<SyntaxNode>>;

type ResolveResult<T> = Result<T, RenderError>;

/// Resolves composition nodes, loading extended templates through its collaborators
pub struct Resolver<'a> {
    parser: &'a dyn TemplateParser,
    loader: &'a dyn TemplateLoader,
    paths: &'a TemplatePaths,
}

impl<'a> Resolver<'a> {
    pub fn new(
        parser: &'a dyn TemplateParser,
        loader: &'a dyn TemplateLoader,
        paths: &'a TemplatePaths,
    ) -> Self {
        Self {
            parser,
            loader,
            paths,
        }
    }

    /// Resolve a free-standing node sequence with no exports in scope
    pub async fn resolve(&self, nodes: &[SyntaxNode]) -> ResolveResult<Vec<SyntaxNode>> {
        self.resolve_template(nodes, None).await
    }

    /// Resolve the nodes of the template at `origin`, so an extend back to
    /// `origin` is reported as circular
    pub async fn resolve_template(
        &self,
        nodes: &[SyntaxNode],
        origin: Option<&Path>,
    ) -> ResolveResult<Vec<SyntaxNode>> {
        let chain: Vec<String> = origin
            .map(|path| path.display().to_string())
            .into_iter()
            .collect();
        self.resolve_sequence(nodes, &Exports::new(), &chain).await
    }

    fn resolve_sequence<'s>(
        &'s self,
        nodes: &'s [SyntaxNode],
        exports: &'s Exports,
        chain: &'s [String],
    ) -> BoxFuture<'s, ResolveResult<Vec<SyntaxNode>>> {
        async move {
            let mut resolved = Vec::with_capacity(nodes.len());
            for node in nodes {
                resolved.extend(self.resolve_node(node, exports, chain).await?);
            }
            Ok(resolved)
        }
        .boxed()
    }

    /// Resolve one node into the nodes that replace it in its parent sequence
    fn resolve_node<'s>(
        &'s self,
        node: &'s SyntaxNode,
        exports: &'s Exports,
        chain: &'s [String],
    ) -> BoxFuture<'s, ResolveResult<Vec<SyntaxNode>>> {
        async move {
            let span = &node.span;
            let kind = match &node.node {
                NodeKind::Import { identifier } => {
                    trace!(%identifier, at = %span, "substituting import");
                    return exports
                        .get(identifier)
                        .cloned()
                        .ok_or_else(|| RenderError::no_such_export(identifier, span.clone()));
                }
                NodeKind::Extend(extend) => {
                    return self.resolve_extend(extend, span, exports, chain).await;
                }
                NodeKind::Tag(tag) => {
                    let mut parameters = Vec::with_capacity(tag.parameters.len());
                    for parameter in &tag.parameters {
                        parameters.push(self.resolve_single(parameter, exports, chain).await?);
                    }
                    let body = match &tag.body {
                        Some(body) => Some(self.resolve_sequence(body, exports, chain).await?),
                        None => None,
                    };
                    NodeKind::Tag(Tag {
                        name: tag.name.clone(),
                        parameters,
                        body,
                    })
                }
                NodeKind::Embed { path } => NodeKind::Embed {
                    path: Box::new(self.resolve_single(path, exports, chain).await?),
                },
                NodeKind::Conditional(conditional) => NodeKind::Conditional(
                    self.resolve_conditional(conditional, exports, chain).await?,
                ),
                NodeKind::Iterator(iteration) => NodeKind::Iterator(Iteration {
                    key: Box::new(self.resolve_single(&iteration.key, exports, chain).await?),
                    data: Box::new(self.resolve_single(&iteration.data, exports, chain).await?),
                    body: self.resolve_sequence(&iteration.body, exports, chain).await?,
                }),
                NodeKind::Expression(expression) => {
                    NodeKind::Expression(match expression {
                        Expression::Infix { op, left, right } => Expression::Infix {
                            op: *op,
                            left: Box::new(self.resolve_single(left, exports, chain).await?),
                            right: Box::new(self.resolve_single(right, exports, chain).await?),
                        },
                        Expression::Prefix { op, right } => Expression::Prefix {
                            op: *op,
                            right: Box::new(self.resolve_single(right, exports, chain).await?),
                        },
                        Expression::Postfix { op, left } => Expression::Postfix {
                            op: *op,
                            left: Box::new(self.resolve_single(left, exports, chain).await?),
                        },
                    })
                }
                NodeKind::Constant(Constant::Interpolated(parts)) => NodeKind::Constant(
                    Constant::Interpolated(self.resolve_sequence(parts, exports, chain).await?),
                ),
                NodeKind::Raw(_)
                | NodeKind::Identifier { .. }
                | NodeKind::Constant(_)
                | NodeKind::Custom(_) => return Ok(vec![node.clone()]),
            };
            Ok(vec![Spanned::new(kind, span.clone())])
        }
        .boxed()
    }

    /// Resolve a node that must stay exactly one node
    fn resolve_single<'s>(
        &'s self,
        node: &'s SyntaxNode,
        exports: &'s Exports,
        chain: &'s [String],
    ) -> BoxFuture<'s, ResolveResult<SyntaxNode>> {
        async move {
            let mut resolved = self.resolve_node(node, exports, chain).await?;
            match resolved.len() {
                0 => Err(RenderError::EmptyResolutionResult {
                    span: node.span.clone(),
                }),
                1 => Ok(resolved.remove(0)),
                _ => Ok(Spanned::new(
                    NodeKind::Constant(Constant::Interpolated(resolved)),
                    node.span.clone(),
                )),
            }
        }
        .boxed()
    }

    fn resolve_conditional<'s>(
        &'s self,
        conditional: &'s Conditional,
        exports: &'s Exports,
        chain: &'s [String],
    ) -> BoxFuture<'s, ResolveResult<Conditional>> {
        async move {
            let condition = self
                .resolve_single(&conditional.condition, exports, chain)
                .await?;
            let body = self
                .resolve_sequence(&conditional.body, exports, chain)
                .await?;
            let next = match &conditional.next {
                Some(next) => Some(Box::new(
                    self.resolve_conditional(next, exports, chain).await?,
                )),
                None => None,
            };
            Ok(Conditional {
                condition: Box::new(condition),
                body,
                next,
            })
        }
        .boxed()
    }

    fn resolve_extend<'s>(
        &'s self,
        extend: &'s Extend,
        span: &'s SourceSpan,
        outer: &'s Exports,
        chain: &'s [String],
    ) -> BoxFuture<'s, ResolveResult<Vec<SyntaxNode>>> {
        async move {
            // Export values see the enclosing scope only, never their siblings
            let mut declared = Exports::new();
            for (name, value) in &extend.exports {
                let resolved = self.resolve_sequence(value, outer, chain).await?;
                declared.insert(name.clone(), resolved);
            }
            let mut merged = outer.clone();
            merged.extend(declared);

            let path = self.paths.normalize(&extend.path);
            let key = path.display().to_string();
            if chain.contains(&key) {
                let mut cycle = chain.to_vec();
                cycle.push(key);
                return Err(RenderError::CircularExtend {
                    chain: cycle,
                    span: span.clone(),
                });
            }

            debug!(path = %key, exports = merged.len(), depth = chain.len(), "loading extended template");
            let source = self.loader.load(&path).await.map_err(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    RenderError::file_not_found(path.clone(), Some(span.clone()))
                } else {
                    RenderError::Io {
                        path: path.clone(),
                        source: err,
                    }
                }
            })?;
            let nodes = self.parser.parse(&source, &key)?;

            let mut nested = chain.to_vec();
            nested.push(key);
            self.resolve_sequence(&nodes, &merged, &nested).await
        }
        .boxed()
    }
}

/// Whether a node sequence is free of `Import` and `Extend` nodes at every depth
pub fn is_resolved(nodes: &[SyntaxNode]) -> bool {
    nodes.iter().all(node_is_resolved)
}

fn node_is_resolved(node: &SyntaxNode) -> bool {
    match &node.node {
        NodeKind::Import { .. } | NodeKind::Extend(_) => false,
        NodeKind::Tag(tag) => {
            is_resolved(&tag.parameters) && tag.body.as_deref().map_or(true, is_resolved)
        }
        NodeKind::Embed { path } => node_is_resolved(path),
        NodeKind::Conditional(conditional) => conditional_is_resolved(conditional),
        NodeKind::Iterator(iteration) => {
            node_is_resolved(&iteration.key)
                && node_is_resolved(&iteration.data)
                && is_resolved(&iteration.body)
        }
        NodeKind::Expression(Expression::Infix { left, right, .. }) => {
            node_is_resolved(left) && node_is_resolved(right)
        }
        NodeKind::Expression(Expression::Prefix { right: operand, .. })
        | NodeKind::Expression(Expression::Postfix { left: operand, .. }) => {
            node_is_resolved(operand)
        }
        NodeKind::Constant(Constant::Interpolated(parts)) => is_resolved(parts),
        NodeKind::Raw(_) | NodeKind::Identifier { .. } | NodeKind::Constant(_) | NodeKind::Custom(_) => {
            true
        }
    }
}

fn conditional_is_resolved(conditional: &Conditional) -> bool {
    node_is_resolved(&conditional.condition)
        && is_resolved(&conditional.body)
        && conditional
            .next
            .as_deref()
            .map_or(true, conditional_is_resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::parser::SyntaxParser;
    use crate::template::MemoryLoader;
    use pretty_assertions::assert_eq;

    fn span(file: &str, start: usize) -> SourceSpan {
        SourceSpan::new(file, 1, start + 1, start..start + 1)
    }

    fn at(kind: NodeKind, start: usize) -> SyntaxNode {
        Spanned::new(kind, span("test", start))
    }

    fn raw(text: &str) -> NodeKind {
        NodeKind::Raw(text.to_string())
    }

    fn import(identifier: &str) -> NodeKind {
        NodeKind::Import {
            identifier: identifier.to_string(),
        }
    }

    fn extend(path: &str, exports: Vec<(&str, Vec<SyntaxNode>)>) -> NodeKind {
        NodeKind::Extend(Extend {
            path: path.to_string(),
            exports: exports
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        })
    }

    fn kinds(nodes: &[SyntaxNode]) -> Vec<NodeKind> {
        nodes.iter().map(|n| n.node.clone()).collect()
    }

    fn paths() -> TemplatePaths {
        TemplatePaths::new("/views", ".sheaf")
    }

    async fn resolve_with(
        loader: &MemoryLoader,
        nodes: &[SyntaxNode],
    ) -> ResolveResult<Vec<SyntaxNode>> {
        let paths = paths();
        Resolver::new(&SyntaxParser, loader, &paths).resolve(nodes).await
    }

    #[tokio::test]
    async fn test_identity_without_composition() {
        let nodes = vec![
            at(raw("a"), 0),
            at(
                NodeKind::Tag(Tag {
                    name: "upper".into(),
                    parameters: vec![at(NodeKind::Identifier { path: vec!["x".into()] }, 1)],
                    body: Some(vec![at(raw("b"), 2)]),
                }),
                1,
            ),
            at(NodeKind::Constant(Constant::Int(3)), 3),
        ];
        let resolved = resolve_with(&MemoryLoader::new(), &nodes).await.unwrap();
        assert_eq!(resolved, nodes);
    }

    #[tokio::test]
    async fn test_extend_splices_in_place() {
        let loader = MemoryLoader::new().with_template("/views/extended.sheaf", "Extension");
        let nodes = vec![
            at(raw("Before"), 0),
            at(extend("extended", vec![]), 6),
            at(raw("After"), 20),
        ];
        let resolved = resolve_with(&loader, &nodes).await.unwrap();
        assert_eq!(
            kinds(&resolved),
            vec![raw("Before"), raw("Extension"), raw("After")]
        );
        assert!(is_resolved(&resolved));
    }

    #[tokio::test]
    async fn test_spliced_nodes_keep_their_own_spans() {
        let loader = MemoryLoader::new().with_template("/views/extended.sheaf", "Extension");
        let nodes = vec![at(extend("extended", vec![]), 6)];
        let resolved = resolve_with(&loader, &nodes).await.unwrap();
        assert_eq!(&*resolved[0].span.file, "/views/extended.sheaf");
        assert_eq!(resolved[0].span.range, 0..9);
    }

    #[tokio::test]
    async fn test_sibling_exports_do_not_see_each_other() {
        let loader = MemoryLoader::new().with_template("/views/base.sheaf", "#import(\"b\")");
        let nodes = vec![at(
            extend(
                "base",
                vec![("a", vec![at(raw("X"), 1)]), ("b", vec![at(import("a"), 2)])],
            ),
            0,
        )];
        let err = resolve_with(&loader, &nodes).await.unwrap_err();
        match err {
            RenderError::NoSuchExport { identifier, span } => {
                assert_eq!(identifier, "a");
                assert_eq!(span.range, 2..3);
            }
            other => panic!("Expected NoSuchExport, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_export_values_see_outer_scope() {
        let loader = MemoryLoader::new()
            .with_template(
                "/views/middle.sheaf",
                "#extend(\"inner\"):#export(\"b\"):[#import(\"a\")]#endexport#endextend",
            )
            .with_template("/views/inner.sheaf", "#import(\"b\")#import(\"a\")");
        let nodes = vec![at(extend("middle", vec![("a", vec![at(raw("X"), 1)])]), 0)];
        let resolved = resolve_with(&loader, &nodes).await.unwrap();
        assert_eq!(
            kinds(&resolved),
            vec![raw("["), raw("X"), raw("]"), raw("X")]
        );
    }

    #[tokio::test]
    async fn test_inner_export_wins_on_collision() {
        let loader = MemoryLoader::new()
            .with_template(
                "/views/middle.sheaf",
                "#extend(\"inner\"):#export(\"a\", \"inner\")#endextend",
            )
            .with_template("/views/inner.sheaf", "#import(\"a\")");
        let nodes = vec![at(
            extend("middle", vec![("a", vec![at(raw("outer"), 1)])]),
            0,
        )];
        let resolved = resolve_with(&loader, &nodes).await.unwrap();
        assert_eq!(
            kinds(&resolved),
            vec![NodeKind::Constant(Constant::String("inner".into()))]
        );
    }

    #[tokio::test]
    async fn test_undeclared_import() {
        let nodes = vec![at(import("missing"), 4)];
        let err = resolve_with(&MemoryLoader::new(), &nodes).await.unwrap_err();
        assert_eq!(err.identifier(), "no_such_export");
        assert!(err.reason().contains("'missing'"));
        assert_eq!(err.span().map(|s| s.range.clone()), Some(4..5));
    }

    #[tokio::test]
    async fn test_collapse_many_into_interpolated() {
        let loader = MemoryLoader::new().with_template(
            "/views/base.sheaf",
            "#if(import(\"cond\")):yes#endif",
        );
        let nodes = vec![at(
            extend(
                "base",
                vec![("cond", vec![at(raw("a"), 1), at(raw("b"), 2)])],
            ),
            0,
        )];
        let resolved = resolve_with(&loader, &nodes).await.unwrap();
        match &resolved[0].node {
            NodeKind::Conditional(conditional) => {
                assert_eq!(
                    conditional.condition.node,
                    NodeKind::Constant(Constant::Interpolated(vec![
                        at(raw("a"), 1),
                        at(raw("b"), 2)
                    ]))
                );
                // span of the import it replaced
                assert_eq!(&*conditional.condition.span.file, "/views/base.sheaf");
                assert_eq!(conditional.condition.span.range, 4..18);
            }
            other => panic!("Expected Conditional, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_collapse_empty_fails() {
        let nodes = vec![at(
            NodeKind::Tag(Tag {
                name: "".into(),
                parameters: vec![at(import("nothing"), 3)],
                body: None,
            }),
            0,
        )];
        let outer = vec![at(extend("base", vec![("nothing", vec![])]), 0)];
        let loader = MemoryLoader::new().with_template("/views/base.sheaf", "#(import(\"nothing\"))");

        let err = resolve_with(&loader, &outer).await.unwrap_err();
        match err {
            RenderError::EmptyResolutionResult { span } => {
                assert_eq!(&*span.file, "/views/base.sheaf");
                assert_eq!(span.range, 2..19);
            }
            other => panic!("Expected EmptyResolutionResult, got {:?}", other),
        }

        let err = resolve_with(&MemoryLoader::new(), &nodes).await.unwrap_err();
        assert!(matches!(err, RenderError::NoSuchExport { .. }));
    }

    #[tokio::test]
    async fn test_single_import_in_single_position_is_unwrapped() {
        let loader = MemoryLoader::new().with_template("/views/base.sheaf", "#(import(\"v\"))");
        let nodes = vec![at(
            extend("base", vec![("v", vec![at(NodeKind::Constant(Constant::Int(5)), 1)])]),
            0,
        )];
        let resolved = resolve_with(&loader, &nodes).await.unwrap();
        match &resolved[0].node {
            NodeKind::Tag(tag) => assert_eq!(
                tag.parameters,
                vec![at(NodeKind::Constant(Constant::Int(5)), 1)]
            ),
            other => panic!("Expected Tag, got {:?}", other),
        }
    }

    fn placeholder() -> SyntaxNode {
        at(NodeKind::Identifier { path: vec!["p".into()] }, 9)
    }

    fn embed_of(operand: SyntaxNode) -> NodeKind {
        NodeKind::Embed {
            path: Box::new(operand),
        }
    }

    fn loop_key_of(operand: SyntaxNode) -> NodeKind {
        NodeKind::Iterator(Iteration {
            key: Box::new(operand),
            data: Box::new(placeholder()),
            body: vec![],
        })
    }

    fn loop_data_of(operand: SyntaxNode) -> NodeKind {
        NodeKind::Iterator(Iteration {
            key: Box::new(placeholder()),
            data: Box::new(operand),
            body: vec![],
        })
    }

    fn prefix_of(operand: SyntaxNode) -> NodeKind {
        NodeKind::Expression(Expression::Prefix {
            op: Operator::Minus,
            right: Box::new(operand),
        })
    }

    fn postfix_of(operand: SyntaxNode) -> NodeKind {
        NodeKind::Expression(Expression::Postfix {
            op: Operator::Not,
            left: Box::new(operand),
        })
    }

    fn left_of(operand: SyntaxNode) -> NodeKind {
        NodeKind::Expression(Expression::Infix {
            op: Operator::Plus,
            left: Box::new(operand),
            right: Box::new(placeholder()),
        })
    }

    fn right_of(operand: SyntaxNode) -> NodeKind {
        NodeKind::Expression(Expression::Infix {
            op: Operator::Plus,
            left: Box::new(placeholder()),
            right: Box::new(operand),
        })
    }

    /// The node sitting in the slot each `*_of` builder fills
    fn slot(kind: &NodeKind) -> &SyntaxNode {
        match kind {
            NodeKind::Embed { path } => path,
            NodeKind::Iterator(iteration) if *iteration.data == placeholder() => {
                &iteration.key
            }
            NodeKind::Iterator(iteration) => &iteration.data,
            NodeKind::Expression(Expression::Prefix { right, .. }) => right,
            NodeKind::Expression(Expression::Postfix { left, .. }) => left,
            NodeKind::Expression(Expression::Infix { left, right, .. }) => {
                if **right == placeholder() {
                    left
                } else {
                    right
                }
            }
            other => panic!("no single-node slot in {:?}", other),
        }
    }

    const SLOTS: [(&str, fn(SyntaxNode) -> NodeKind); 7] = [
        ("embed path", embed_of),
        ("loop key", loop_key_of),
        ("loop data", loop_data_of),
        ("prefix operand", prefix_of),
        ("postfix operand", postfix_of),
        ("infix left", left_of),
        ("infix right", right_of),
    ];

    fn slot_exports() -> Exports {
        [
            ("many".to_string(), vec![at(raw("a"), 1), at(raw("b"), 2)]),
            ("none".to_string(), vec![]),
        ]
        .into_iter()
        .collect()
    }

    async fn resolve_in_scope(
        nodes: &[SyntaxNode],
        exports: &Exports,
    ) -> ResolveResult<Vec<SyntaxNode>> {
        let paths = paths();
        let loader = MemoryLoader::new();
        Resolver::new(&SyntaxParser, &loader, &paths)
            .resolve_sequence(nodes, exports, &[])
            .await
    }

    #[tokio::test]
    async fn test_every_single_slot_collapses_to_interpolated() {
        let exports = slot_exports();
        for (name, build) in SLOTS {
            let nodes = vec![at(build(at(import("many"), 5)), 0)];
            let resolved = resolve_in_scope(&nodes, &exports).await.unwrap();

            assert_eq!(resolved.len(), 1, "{}", name);
            assert_eq!(resolved[0].span, span("test", 0), "{}", name);
            assert_eq!(
                *slot(&resolved[0].node),
                at(
                    NodeKind::Constant(Constant::Interpolated(vec![
                        at(raw("a"), 1),
                        at(raw("b"), 2)
                    ])),
                    5
                ),
                "{}",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_every_single_slot_rejects_empty_result() {
        let exports = slot_exports();
        for (name, build) in SLOTS {
            let nodes = vec![at(build(at(import("none"), 5)), 0)];
            match resolve_in_scope(&nodes, &exports).await {
                Err(RenderError::EmptyResolutionResult { span }) => {
                    assert_eq!(span.range, 5..6, "{}", name)
                }
                other => panic!("{}: expected EmptyResolutionResult, got {:?}", name, other),
            }
        }
    }

    #[tokio::test]
    async fn test_collapse_in_parsed_slots() {
        let loader = MemoryLoader::new().with_template(
            "/views/base.sheaf",
            "#for(x in import(\"d\")):#endfor#embed(import(\"d\"))#(-import(\"e\"))",
        );
        let nodes = vec![at(
            extend(
                "base",
                vec![
                    ("d", vec![at(raw("a"), 1), at(raw("b"), 2)]),
                    ("e", vec![]),
                ],
            ),
            0,
        )];
        let err = resolve_with(&loader, &nodes).await.unwrap_err();
        match err {
            RenderError::EmptyResolutionResult { span } => {
                assert_eq!(&*span.file, "/views/base.sheaf");
                assert_eq!(span.range, 52..63);
            }
            other => panic!("Expected EmptyResolutionResult, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_extended_template() {
        let nodes = vec![at(extend("nowhere", vec![]), 7)];
        let err = resolve_with(&MemoryLoader::new(), &nodes).await.unwrap_err();
        match err {
            RenderError::FileNotFound { path, span } => {
                assert_eq!(path, Path::new("/views/nowhere.sheaf"));
                assert_eq!(span.map(|s| s.range), Some(7..8));
            }
            other => panic!("Expected FileNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_parse_error_in_extended_template_propagates() {
        let loader = MemoryLoader::new().with_template("/views/broken.sheaf", "#if(x):open");
        let nodes = vec![at(extend("broken", vec![]), 0)];
        let err = resolve_with(&loader, &nodes).await.unwrap_err();
        match err {
            RenderError::Parse(ParseError::UnclosedBlock { tag, span }) => {
                assert_eq!(tag, "if");
                assert_eq!(&*span.file, "/views/broken.sheaf");
            }
            other => panic!("Expected UnclosedBlock, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_circular_extend() {
        let loader = MemoryLoader::new()
            .with_template("/views/a.sheaf", "#extend(\"b\")")
            .with_template("/views/b.sheaf", "#extend(\"a\")");
        let paths = paths();
        let resolver = Resolver::new(&SyntaxParser, &loader, &paths);
        let nodes = vec![at(extend("a", vec![]), 0)];

        let err = resolver.resolve(&nodes).await.unwrap_err();
        match err {
            RenderError::CircularExtend { chain, .. } => assert_eq!(
                chain,
                vec!["/views/a.sheaf", "/views/b.sheaf", "/views/a.sheaf"]
            ),
            other => panic!("Expected CircularExtend, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extend_back_to_origin_is_circular() {
        let loader = MemoryLoader::new().with_template("/views/self.sheaf", "x");
        let paths = paths();
        let resolver = Resolver::new(&SyntaxParser, &loader, &paths);
        let nodes = vec![at(extend("self", vec![]), 0)];

        let err = resolver
            .resolve_template(&nodes, Some(Path::new("/views/self.sheaf")))
            .await
            .unwrap_err();
        assert_eq!(err.identifier(), "circular_extend");
    }

    #[tokio::test]
    async fn test_same_template_extended_twice_is_not_circular() {
        let loader = MemoryLoader::new().with_template("/views/item.sheaf", "-");
        let nodes = vec![at(extend("item", vec![]), 0), at(extend("item", vec![]), 1)];
        let resolved = resolve_with(&loader, &nodes).await.unwrap();
        assert_eq!(kinds(&resolved), vec![raw("-"), raw("-")]);
    }

    #[test]
    fn test_is_resolved_finds_nested_imports() {
        let nested = vec![at(
            NodeKind::Conditional(Conditional {
                condition: Box::new(at(NodeKind::Constant(Constant::Bool(true)), 0)),
                body: vec![],
                next: Some(Box::new(Conditional {
                    condition: Box::new(at(NodeKind::Constant(Constant::Bool(true)), 0)),
                    body: vec![at(import("x"), 1)],
                    next: None,
                })),
            }),
            0,
        )];
        assert!(!is_resolved(&nested));
        assert!(is_resolved(&[at(raw("plain"), 0)]));
    }
}
