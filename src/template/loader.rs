//! Template file access and path normalization

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use async_trait::async_trait;

/// Reads template bytes from some backing store
#[async_trait]
pub trait TemplateLoader: Send + Sync {
    /// Missing templates must fail with [`io::ErrorKind::NotFound`]
    async fn load(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Loads templates from disk with `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemLoader;

#[async_trait]
impl TemplateLoader for FileSystemLoader {
    async fn load(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

/// In-memory template store keyed by normalized path
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, path: impl Into<PathBuf>, source: impl Into<Vec<u8>>) -> Self {
        self.insert(path, source);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, source: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), source.into());
    }
}

#[async_trait]
impl TemplateLoader for MemoryLoader {
    async fn load(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no template at {}", path.display()),
            )
        })
    }
}

/// Turns template names into absolute template paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatePaths {
    pub root: PathBuf,
    /// Suffix appended when a name lacks it, including the dot
    pub file_ending: String,
}

impl TemplatePaths {
    pub fn new(root: impl Into<PathBuf>, file_ending: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            file_ending: file_ending.into(),
        }
    }

    /// Append the file ending if missing; names starting with the path
    /// separator are absolute, everything else is joined to `root`
    pub fn normalize(&self, name: &str) -> PathBuf {
        let name = if name.ends_with(&self.file_ending) {
            name.to_string()
        } else {
            format!("{}{}", name, self.file_ending)
        };

        if name.starts_with(MAIN_SEPARATOR) {
            PathBuf::from(name)
        } else {
            self.root.join(name)
        }
    }
}
