//! Render orchestration: path normalization, caching, parse, resolve, serialize
//!
//! A [`Renderer`] owns its collaborators (parser, loader, serializer) and an
//! optional [`AstCache`]. Every entry point is async; file loads and the
//! serializer are the only suspension points.

pub mod config;
mod serializer;
pub mod tags;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::data::{self, TemplateData};
use crate::error::RenderError;
use crate::parser::{SyntaxNode, SyntaxParser, TemplateParser};
use crate::template::{AstCache, FileSystemLoader, Resolver, TemplateLoader, TemplatePaths};

pub use config::{ConfigError, RendererConfig};
pub use serializer::{SerializeError, Serializer, Storage, TemplateSerializer};
pub use tags::{TagContext, TagError, TagHandler, TagRegistry};

/// Label used in spans of inline templates rendered without one
pub const INLINE_LABEL: &str = "inline-template";

pub struct Renderer {
    config: RendererConfig,
    paths: TemplatePaths,
    parser: Arc<dyn TemplateParser>,
    loader: Arc<dyn TemplateLoader>,
    serializer: Arc<dyn Serializer>,
    cache: Option<AstCache>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(RendererConfig::default())
    }
}

impl Renderer {
    /// A renderer reading templates from disk with the built-in syntax and tags
    pub fn new(config: RendererConfig) -> Self {
        Self {
            paths: config.paths(),
            cache: config.cache.then(AstCache::new),
            config,
            parser: Arc::new(SyntaxParser),
            loader: Arc::new(FileSystemLoader),
            serializer: Arc::new(TemplateSerializer::default()),
        }
    }

    pub fn with_parser(mut self, parser: impl TemplateParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn with_loader(mut self, loader: impl TemplateLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    pub fn with_serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Use the default serializer with a custom tag registry
    pub fn with_tags(self, tags: TagRegistry) -> Self {
        self.with_serializer(TemplateSerializer::new(tags))
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn paths(&self) -> &TemplatePaths {
        &self.paths
    }

    /// The cache, or `None` while caching is disabled
    pub fn cache(&self) -> Option<&AstCache> {
        self.cache.as_ref()
    }

    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }

    /// Enabling installs a fresh, empty cache; disabling drops it
    pub fn set_caching(&mut self, enabled: bool) {
        self.config.cache = enabled;
        self.cache = enabled.then(AstCache::new);
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self.parser.as_ref(), self.loader.as_ref(), &self.paths)
    }

    /// Normalize `name`, then fetch its resolved AST from the cache or build it
    pub async fn resolve_path(&self, name: &str) -> Result<Arc<[SyntaxNode]>, RenderError> {
        let path = self.paths.normalize(name);

        if let Some(cache) = &self.cache {
            if let Some(ast) = cache.get(&path) {
                trace!(path = %path.display(), "template cache hit");
                return Ok(ast);
            }
            debug!(path = %path.display(), "template cache miss");
        }

        let ast: Arc<[SyntaxNode]> = self.build(&path).await?.into();

        if let Some(cache) = &self.cache {
            cache.insert(path.clone(), Arc::clone(&ast));
            debug!(path = %path.display(), nodes = ast.len(), "cached resolved template");
        }
        Ok(ast)
    }

    async fn build(&self, path: &Path) -> Result<Vec<SyntaxNode>, RenderError> {
        let source = self.loader.load(path).await.map_err(|err| load_error(path, err))?;
        let label = path.display().to_string();
        let nodes = self.parser.parse(&source, &label)?;
        self.resolver().resolve_template(&nodes, Some(path)).await
    }

    /// Parse and resolve inline source; no cache interaction
    pub async fn resolve_inline(
        &self,
        source: &[u8],
        label: Option<&str>,
    ) -> Result<Vec<SyntaxNode>, RenderError> {
        let label = label.unwrap_or(INLINE_LABEL);
        let nodes = self.parser.parse(source, label)?;
        self.resolver().resolve(&nodes).await
    }

    /// Render the template `name` against `context`
    pub async fn render(
        &self,
        name: &str,
        context: &TemplateData,
        storage: &Storage,
    ) -> Result<String, RenderError> {
        debug!(template = name, "rendering template");
        let ast = self.resolve_path(name).await?;
        Ok(self.serializer.serialize(&ast, context, storage).await?)
    }

    /// Encode `value` into a context, then [`Self::render`]
    pub async fn render_encodable<T: Serialize + ?Sized + Sync>(
        &self,
        name: &str,
        value: &T,
        storage: &Storage,
    ) -> Result<String, RenderError> {
        let context = data::encode(value)?;
        self.render(name, &context, storage).await
    }

    /// Render template source held in memory; `label` names it in diagnostics
    pub async fn render_inline(
        &self,
        source: &[u8],
        context: &TemplateData,
        label: Option<&str>,
        storage: &Storage,
    ) -> Result<String, RenderError> {
        debug!(label = label.unwrap_or(INLINE_LABEL), bytes = source.len(), "rendering inline template");
        let ast = self.resolve_inline(source, label).await?;
        Ok(self.serializer.serialize(&ast, context, storage).await?)
    }

    /// Encode `value` into a context, then [`Self::render_inline`]
    pub async fn render_inline_encodable<T: Serialize + ?Sized + Sync>(
        &self,
        source: &[u8],
        value: &T,
        label: Option<&str>,
        storage: &Storage,
    ) -> Result<String, RenderError> {
        let context = data::encode(value)?;
        self.render_inline(source, &context, label, storage).await
    }
}

fn load_error(path: &Path, err: io::Error) -> RenderError {
    if err.kind() == io::ErrorKind::NotFound {
        RenderError::file_not_found(PathBuf::from(path), None)
    } else {
        RenderError::Io {
            path: path.to_path_buf(),
            source: err,
        }
    }
}
