//! sheaf - a template engine with statically resolved composition
//!
//! Templates are parsed into an AST, `#extend` / `#import` composition is
//! resolved ahead of rendering, resolved trees are cached per path, and a
//! serializer renders the result against a [`TemplateData`] context.
//!
//! # Example
//!
//! ```rust
//! use sheaf::{Renderer, RendererConfig, Storage, TemplateData, MemoryLoader};
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let loader = MemoryLoader::new()
//!     .with_template("views/base.sheaf", "<h1>#import(\"title\")</h1>")
//!     .with_template(
//!         "views/home.sheaf",
//!         "#extend(\"base\"):#export(\"title\"):Hi #(name)#endexport#endextend",
//!     );
//! let renderer = Renderer::new(RendererConfig::new().with_root("views")).with_loader(loader);
//!
//! let context: TemplateData = [("name", "there")].into_iter().collect();
//! let html = renderer.render("home", &context, &Storage::new()).await.unwrap();
//! assert_eq!(html, "<h1>Hi there</h1>");
//! # });
//! ```

pub mod data;
pub mod error;
pub mod parser;
pub mod renderer;
pub mod template;

pub use data::{encode, EncodeError, TemplateData};
pub use error::{ParseError, RenderError};
pub use parser::{parse, SourceSpan, SyntaxNode, SyntaxParser, TemplateParser};
pub use renderer::{
    ConfigError, Renderer, RendererConfig, SerializeError, Serializer, Storage, TagContext,
    TagError, TagHandler, TagRegistry, TemplateSerializer, INLINE_LABEL,
};
pub use template::{
    is_resolved, AstCache, FileSystemLoader, MemoryLoader, Resolver, TemplateLoader,
    TemplatePaths,
};

/// Render inline template source with the default renderer
///
/// Any `#extend` is resolved against the default `templates/` root on disk.
///
/// ```rust
/// # let rt = tokio::runtime::Runtime::new().unwrap();
/// # rt.block_on(async {
/// let context = [("n", 2)].into_iter().collect();
/// let out = sheaf::render_str("#(n * 21)", &context).await.unwrap();
/// assert_eq!(out, "42");
/// # });
/// ```
pub async fn render_str(source: &str, context: &TemplateData) -> Result<String, RenderError> {
    Renderer::default()
        .render_inline(source.as_bytes(), context, None, &Storage::new())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_render_str() {
        let context = [("who", "world")].into_iter().collect();
        let out = render_str("Hello, #(who)!", &context).await.unwrap();
        assert_eq!(out, "Hello, world!");
    }

    #[tokio::test]
    async fn test_render_str_reports_parse_errors() {
        let err = render_str("#if(true):never closed", &TemplateData::Null)
            .await
            .unwrap_err();
        assert_eq!(err.identifier(), "parse_error");
        assert_eq!(err.span().map(|s| s.line), Some(1));
    }
}
