//! Named tag handlers dispatched by the serializer

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::data::TemplateData;

use super::serializer::Storage;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TagError {
    #[error("tag '{name}' is already registered")]
    Duplicate { name: String },

    #[error("#{name} expects {expected} parameter(s), found {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("#{name}: {message}")]
    Invalid { name: String, message: String },
}

/// Everything a tag handler sees at its call site
pub struct TagContext<'a> {
    pub name: &'a str,
    pub parameters: Vec<TemplateData>,
    /// Rendered body, when the tag has one and the handler evaluates it
    pub body: Option<String>,
    pub data: &'a TemplateData,
    pub storage: &'a Storage,
}

impl TagContext<'_> {
    /// The parameters as a fixed-size array, or an arity error
    pub fn arguments<const N: usize>(&self) -> Result<&[TemplateData; N], TagError> {
        self.parameters
            .as_slice()
            .try_into()
            .map_err(|_| TagError::Arity {
                name: self.name.to_string(),
                expected: N,
                found: self.parameters.len(),
            })
    }

    pub fn invalid(&self, message: impl Into<String>) -> TagError {
        TagError::Invalid {
            name: self.name.to_string(),
            message: message.into(),
        }
    }
}

pub trait TagHandler: Send + Sync {
    fn render(&self, ctx: &TagContext<'_>) -> Result<TemplateData, TagError>;

    /// Whether the body is rendered and passed in before `render` runs
    fn evaluates_body(&self) -> bool {
        true
    }
}

impl<F> TagHandler for F
where
    F: Fn(&TagContext<'_>) -> Result<TemplateData, TagError> + Send + Sync,
{
    fn render(&self, ctx: &TagContext<'_>) -> Result<TemplateData, TagError> {
        self(ctx)
    }
}

/// Tag name to handler lookup
#[derive(Clone, Default)]
pub struct TagRegistry {
    tags: HashMap<String, Arc<dyn TagHandler>>,
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("TagRegistry").field("tags", &names).finish()
    }
}

impl TagRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in tags
    pub fn with_builtins() -> Self {
        let mut tags: HashMap<String, Arc<dyn TagHandler>> = HashMap::new();
        tags.insert("lowercased".into(), Arc::new(Lowercased));
        tags.insert("uppercased".into(), Arc::new(Uppercased));
        tags.insert("capitalized".into(), Arc::new(Capitalized));
        tags.insert("contains".into(), Arc::new(Contains));
        tags.insert("count".into(), Arc::new(Count));
        tags.insert("comment".into(), Arc::new(Comment));
        Self { tags }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl TagHandler + 'static,
    ) -> Result<(), TagError> {
        let name = name.into();
        if self.tags.contains_key(&name) {
            return Err(TagError::Duplicate { name });
        }
        self.tags.insert(name, Arc::new(handler));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TagHandler>> {
        self.tags.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(|s| s.as_str())
    }
}

struct Lowercased;

impl TagHandler for Lowercased {
    fn render(&self, ctx: &TagContext<'_>) -> Result<TemplateData, TagError> {
        let [value] = ctx.arguments::<1>()?;
        Ok(TemplateData::String(value.to_string().to_lowercase()))
    }
}

struct Uppercased;

impl TagHandler for Uppercased {
    fn render(&self, ctx: &TagContext<'_>) -> Result<TemplateData, TagError> {
        let [value] = ctx.arguments::<1>()?;
        Ok(TemplateData::String(value.to_string().to_uppercase()))
    }
}

/// Uppercases the first letter of every word and lowercases the rest
struct Capitalized;

impl TagHandler for Capitalized {
    fn render(&self, ctx: &TagContext<'_>) -> Result<TemplateData, TagError> {
        let [value] = ctx.arguments::<1>()?;
        let mut out = String::new();
        let mut word_start = true;
        for c in value.to_string().chars() {
            if c.is_alphanumeric() {
                if word_start {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                word_start = false;
            } else {
                out.push(c);
                word_start = true;
            }
        }
        Ok(TemplateData::String(out))
    }
}

/// `contains(collection, item)`: array element, dictionary key, or substring
struct Contains;

impl TagHandler for Contains {
    fn render(&self, ctx: &TagContext<'_>) -> Result<TemplateData, TagError> {
        let [collection, item] = ctx.arguments::<2>()?;
        let found = match collection {
            TemplateData::Array(items) => items.contains(item),
            TemplateData::Dictionary(entries) => entries.contains_key(&item.to_string()),
            TemplateData::String(s) => s.contains(&item.to_string()),
            TemplateData::Null => false,
            other => {
                return Err(ctx.invalid(format!("cannot search in {}", other.kind())));
            }
        };
        Ok(TemplateData::Bool(found))
    }
}

struct Count;

impl TagHandler for Count {
    fn render(&self, ctx: &TagContext<'_>) -> Result<TemplateData, TagError> {
        let [value] = ctx.arguments::<1>()?;
        let count = match value {
            TemplateData::Array(items) => items.len(),
            TemplateData::Dictionary(entries) => entries.len(),
            TemplateData::String(s) => s.chars().count(),
            TemplateData::Bytes(b) => b.len(),
            other => return Err(ctx.invalid(format!("cannot count {}", other.kind()))),
        };
        Ok(TemplateData::Int(count as i64))
    }
}

/// Swallows its body
struct Comment;

impl TagHandler for Comment {
    fn render(&self, _ctx: &TagContext<'_>) -> Result<TemplateData, TagError> {
        Ok(TemplateData::Null)
    }

    fn evaluates_body(&self) -> bool {
        false
    }
}
