use std::collections::{BTreeMap, HashMap};

use note_fs::{is_descendant_of, is_root, Namespace, SEPARATOR};
use thiserror::Error;

use crate::document::Document;
use crate::id::DocId;

#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("Duplicate id: {0}")]
    DuplicateId(DocId),

    #[error("Duplicate {namespace} path: {fname}")]
    DuplicatePath { namespace: Namespace, fname: String },

    #[error("Unknown id: {0}")]
    UnknownId(DocId),
}

/// Owns every document and resolves them by id or by hierarchical path.
///
/// Paths are keyed per namespace, so `foo` may exist once as a note and once
/// as a schema. Path keys are kept ordered so that everything below a prefix
/// is a contiguous range. Names are compared byte for byte: `Foo` and `foo`
/// are different documents.
#[derive(Debug, Default)]
pub struct PathIndex {
    /// Map from id to document (sole owner of document storage)
    docs: HashMap<DocId, Document>,
    /// Map from namespace to ordered `fname -> id`
    paths: HashMap<Namespace, BTreeMap<String, DocId>>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document.
    ///
    /// Fails if its id or its `(namespace, fname)` is taken. The parent path
    /// need not exist.
    pub fn insert(&mut self, doc: Document) -> Result<(), IndexError> {
        if self.docs.contains_key(&doc.id) {
            return Err(IndexError::DuplicateId(doc.id));
        }
        let paths = self.paths.entry(doc.namespace).or_default();
        if paths.contains_key(&doc.fname) {
            return Err(IndexError::DuplicatePath {
                namespace: doc.namespace,
                fname: doc.fname,
            });
        }

        paths.insert(doc.fname.clone(), doc.id.clone());
        self.docs.insert(doc.id.clone(), doc);
        Ok(())
    }

    /// Remove a document entirely, returning it.
    pub fn remove(&mut self, id: &DocId) -> Option<Document> {
        let doc = self.docs.remove(id)?;
        if let Some(paths) = self.paths.get_mut(&doc.namespace) {
            paths.remove(&doc.fname);
        }
        Some(doc)
    }

    /// Move a document to a new path within its namespace.
    pub fn rename(&mut self, id: &DocId, new_fname: &str) -> Result<(), IndexError> {
        let doc = self
            .docs
            .get_mut(id)
            .ok_or_else(|| IndexError::UnknownId(id.clone()))?;
        let paths = self.paths.entry(doc.namespace).or_default();

        if doc.fname == new_fname {
            return Ok(());
        }
        if paths.contains_key(new_fname) {
            return Err(IndexError::DuplicatePath {
                namespace: doc.namespace,
                fname: new_fname.to_string(),
            });
        }

        paths.remove(&doc.fname);
        paths.insert(new_fname.to_string(), id.clone());
        doc.fname = new_fname.to_string();
        Ok(())
    }

    pub fn get(&self, id: &DocId) -> Option<&Document> {
        self.docs.get(id)
    }

    /// Mutable access for link maintenance and in-place updates.
    ///
    /// Callers must not change `fname` or `namespace` through this; use
    /// [`PathIndex::rename`].
    pub(crate) fn get_mut(&mut self, id: &DocId) -> Option<&mut Document> {
        self.docs.get_mut(id)
    }

    pub fn contains_id(&self, id: &DocId) -> bool {
        self.docs.contains_key(id)
    }

    pub fn id_for_path(&self, namespace: Namespace, fname: &str) -> Option<&DocId> {
        self.paths.get(&namespace).and_then(|paths| paths.get(fname))
    }

    /// Exact lookup by path.
    pub fn get_by_path(&self, namespace: Namespace, fname: &str) -> Option<&Document> {
        self.id_for_path(namespace, fname)
            .and_then(|id| self.docs.get(id))
    }

    /// Documents strictly below `fname`, in path order.
    ///
    /// Matches on segment boundaries only: `foo.one` is below `foo`,
    /// `foobar` is not.
    pub fn descendants(&self, namespace: Namespace, fname: &str) -> Vec<&Document> {
        let Some(paths) = self.paths.get(&namespace) else {
            return Vec::new();
        };

        if is_root(fname) {
            return paths
                .iter()
                .filter(|(path, _)| is_descendant_of(path, fname))
                .filter_map(|(_, id)| self.docs.get(id))
                .collect();
        }

        paths
            .range(format!("{}{}", fname, SEPARATOR)..)
            .take_while(|(path, _)| is_descendant_of(path, fname))
            .filter_map(|(_, id)| self.docs.get(id))
            .collect()
    }

    pub fn has_descendants(&self, namespace: Namespace, fname: &str) -> bool {
        let Some(paths) = self.paths.get(&namespace) else {
            return false;
        };
        if is_root(fname) {
            return paths.keys().any(|path| is_descendant_of(path, fname));
        }
        paths
            .range(format!("{}{}", fname, SEPARATOR)..)
            .next()
            .is_some_and(|(path, _)| is_descendant_of(path, fname))
    }

    /// The document at `prefix` (if any) followed by everything below it.
    pub fn with_prefix(&self, namespace: Namespace, prefix: &str) -> Vec<&Document> {
        let mut found: Vec<&Document> = self.get_by_path(namespace, prefix).into_iter().collect();
        found.extend(self.descendants(namespace, prefix));
        found
    }

    /// All documents of a namespace, in path order.
    pub fn iter(&self, namespace: Namespace) -> impl Iterator<Item = &Document> {
        self.paths
            .get(&namespace)
            .into_iter()
            .flat_map(|paths| paths.values())
            .filter_map(|id| self.docs.get(id))
    }

    /// Names of all documents of a namespace, in path order.
    pub fn fnames(&self, namespace: Namespace) -> Vec<String> {
        self.paths
            .get(&namespace)
            .map(|paths| paths.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of documents in a namespace.
    pub fn len(&self, namespace: Namespace) -> usize {
        self.paths.get(&namespace).map_or(0, |paths| paths.len())
    }

    /// Number of documents across all namespaces.
    pub fn total_len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Read-only view of one namespace, keyed by id.
///
/// This is what outside layers get; all mutation goes through the engine.
#[derive(Clone, Copy)]
pub struct NamespaceView<'a> {
    index: &'a PathIndex,
    namespace: Namespace,
}

impl<'a> NamespaceView<'a> {
    pub(crate) fn new(index: &'a PathIndex, namespace: Namespace) -> Self {
        Self { index, namespace }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn get(&self, id: &DocId) -> Option<&'a Document> {
        self.index
            .get(id)
            .filter(|doc| doc.namespace == self.namespace)
    }

    pub fn contains(&self, id: &DocId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.index.len(self.namespace)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Documents in path order.
    pub fn values(&self) -> impl Iterator<Item = &'a Document> + 'a {
        self.index.iter(self.namespace)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a DocId, &'a Document)> + 'a {
        self.index.iter(self.namespace).map(|doc| (&doc.id, doc))
    }
}

impl std::ops::Index<&DocId> for NamespaceView<'_> {
    type Output = Document;

    fn index(&self, id: &DocId) -> &Document {
        match self.get(id) {
            Some(doc) => doc,
            None => panic!("no {} with id {}", self.namespace, id),
        }
    }
}
