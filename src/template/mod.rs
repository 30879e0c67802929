//! Template composition: loading, extension resolution and the resolved-AST cache
//!
//! A template can splice in another with `#extend("path")`, handing it named
//! fragments through `#export`. The extended template pulls them in with
//! `#import`.
//!
//! ```text
//! base.sheaf:   <title>#import("title")</title>#import("body")
//! page.sheaf:   #extend("base"):
//!                 #export("title", "Home")
//!                 #export("body"):<p>Welcome</p>#endexport
//!               #endextend
//! ```

mod cache;
mod loader;
mod resolver;

pub use cache::AstCache;
pub use loader::{FileSystemLoader, MemoryLoader, TemplateLoader, TemplatePaths};
pub use resolver::{is_resolved, Exports, Resolver};
