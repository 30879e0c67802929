//! Resolved-AST cache shared by concurrent renders

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::parser::ast::SyntaxNode;

/// Maps a normalized template path to its fully resolved node sequence
///
/// Entries are replaced whole, so readers see either the old tree or the new
/// one. Two renders racing on the same path may both compute and store it;
/// the last write wins.
#[derive(Debug, Default)]
pub struct AstCache {
    entries: RwLock<HashMap<PathBuf, Arc<[SyntaxNode]>>>,
}

impl AstCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<Arc<[SyntaxNode]>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, ast: Arc<[SyntaxNode]>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), ast);
    }

    pub fn remove(&self, path: &Path) -> Option<Arc<[SyntaxNode]>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::{NodeKind, SourceSpan, Spanned};

    fn tree(text: &str) -> Arc<[SyntaxNode]> {
        Arc::from(vec![Spanned::new(
            NodeKind::Raw(text.to_string()),
            SourceSpan::new("t", 1, 1, 0..text.len()),
        )])
    }

    #[test]
    fn test_insert_get_remove() {
        let cache = AstCache::new();
        assert!(cache.is_empty());

        cache.insert("a.sheaf", tree("A"));
        assert!(cache.contains(Path::new("a.sheaf")));
        assert_eq!(cache.get(Path::new("a.sheaf")), Some(tree("A")));
        assert_eq!(cache.len(), 1);

        assert!(cache.remove(Path::new("a.sheaf")).is_some());
        assert!(cache.get(Path::new("a.sheaf")).is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let cache = AstCache::new();
        cache.insert("a.sheaf", tree("first"));
        cache.insert("a.sheaf", tree("second"));
        assert_eq!(cache.get(Path::new("a.sheaf")), Some(tree("second")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = AstCache::new();
        cache.insert("a.sheaf", tree("A"));
        cache.insert("b.sheaf", tree("B"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_writers() {
        let cache = Arc::new(AstCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.insert(format!("{}.sheaf", i % 2), tree("x")))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 2);
    }
}
