//! NoteEngine: loads a store directory and keeps the hierarchy consistent
//! across writes and deletes.

use note_fs::{
    last_segment, normalize_query, parent_fname, validate_fname, Namespace, ROOT_FNAME,
};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::document::{now_millis, Document, DocumentError, RawDocument, RawFormat};
use crate::fs::{FileSystem, FsError};
use crate::id::{DocId, IdAllocator};
use crate::index::{IndexError, NamespaceView, PathIndex};
use crate::reconcile::{self, ReconcileReport};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("A {namespace} named '{fname}' already exists")]
    AlreadyExists { namespace: Namespace, fname: String },

    #[error("Invalid name '{fname}': {reason}")]
    InvalidPath { fname: String, reason: String },

    #[error("Engine not initialized")]
    NotInitialized,

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Options for [`NoteEngine::write`]
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Create the document instead of updating the one with its id
    pub new_node: bool,
    /// Replace the document body before writing
    pub body: Option<String>,
}

impl WriteOptions {
    pub fn new_node() -> Self {
        Self {
            new_node: true,
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// What a delete did to the tree
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The document left the index. `collapsed` lists ancestor stubs that
    /// were removed with it, nearest first.
    Removed { collapsed: Vec<String> },
    /// The document still holds children and became a stub
    Demoted,
    /// Nothing to delete: a stub that still holds the tree together
    Unchanged,
}

/// Result of a path query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<'a> {
    /// Exact match first, then everything below it in path order
    Found(Vec<&'a Document>),
    None,
}

impl<'a> QueryResult<'a> {
    pub fn is_found(&self) -> bool {
        matches!(self, QueryResult::Found(_))
    }

    pub fn len(&self) -> usize {
        match self {
            QueryResult::Found(docs) => docs.len(),
            QueryResult::None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The exact match, if any
    pub fn first(&self) -> Option<&'a Document> {
        match self {
            QueryResult::Found(docs) => docs.first().copied(),
            QueryResult::None => None,
        }
    }

    pub fn into_vec(self) -> Vec<&'a Document> {
        match self {
            QueryResult::Found(docs) => docs,
            QueryResult::None => Vec::new(),
        }
    }
}

/// Summary of an [`NoteEngine::init`] run
#[derive(Debug, Default)]
pub struct InitReport {
    /// File names that were indexed
    pub loaded: Vec<String>,
    /// File names rewritten to add a missing id or timestamp
    pub persisted: Vec<String>,
    /// File names loaded read-only because their metadata or encoding was unreadable
    pub recovered: Vec<String>,
    /// File names that were not indexed
    pub skipped: Vec<String>,
    /// Root files created because the store had none
    pub created_roots: Vec<String>,
    pub reconcile: ReconcileReport,
}

/// A document as read from one file, with identity settled
struct LoadedDocument {
    doc: Document,
    /// Id or timestamps were filled in and should be written back
    dirty: bool,
    /// The file must stay as it is on disk
    keep_file: bool,
    recovered: bool,
}

/// Hierarchical store over one root directory.
///
/// Mutations take `&mut self`; share an engine through
/// [`crate::registry::EngineRegistry`].
pub struct NoteEngine<F: FileSystem> {
    fs: F,
    config: EngineConfig,
    index: PathIndex,
    ids: IdAllocator,
    initialized: bool,
}

impl<F: FileSystem> NoteEngine<F> {
    pub fn new(fs: F) -> Self {
        Self::with_config(fs, EngineConfig::default())
    }

    pub fn with_config(fs: F, config: EngineConfig) -> Self {
        Self {
            fs,
            config,
            index: PathIndex::new(),
            ids: IdAllocator::new(),
            initialized: false,
        }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Load every document from the store root and build the tree.
    ///
    /// Unreadable or malformed files are logged and skipped; only a failure
    /// to list the root aborts. Calling this again is a no-op.
    pub async fn init(&mut self) -> Result<InitReport> {
        let mut report = InitReport::default();
        if self.initialized {
            tracing::debug!("Engine already initialized, skipping load");
            return Ok(report);
        }

        let entries = match self.fs.list("").await {
            Ok(entries) => entries,
            Err(FsError::NotFound(_)) => {
                tracing::info!("Store root does not exist yet, starting empty");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut files: Vec<(Namespace, String, String)> = entries
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .filter_map(|entry| {
                let (namespace, stem) = Namespace::classify(&entry.name)?;
                Some((namespace, stem.to_string(), entry.name.clone()))
            })
            .collect();
        files.sort_by(|a, b| a.2.cmp(&b.2));

        let now = now_millis();
        for (namespace, stem, file_name) in files {
            match validate_fname(&stem) {
                Ok(clean) if clean == stem => {}
                Ok(_) => {
                    tracing::warn!("Skipping {}: name has surrounding whitespace", file_name);
                    report.skipped.push(file_name);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", file_name, e);
                    report.skipped.push(file_name);
                    continue;
                }
            }

            let (text, lossy) = match self.fs.read(&file_name).await {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => (text, false),
                    Err(e) => {
                        tracing::warn!(
                            "{} is not valid UTF-8, loading it read-only",
                            file_name
                        );
                        (String::from_utf8_lossy(e.as_bytes()).into_owned(), true)
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", file_name, e);
                    report.skipped.push(file_name);
                    continue;
                }
            };

            let mut loaded = self.load_document(namespace, &stem, &file_name, &text, now);
            if lossy {
                // Writing the lossy text back would replace the original bytes
                loaded.keep_file = true;
                loaded.recovered = true;
            }
            if loaded.recovered {
                report.recovered.push(file_name.clone());
            }

            if loaded.dirty && !loaded.keep_file {
                match self.persist(&loaded.doc).await {
                    Ok(()) => {
                        tracing::debug!("Wrote generated metadata to {}", file_name);
                        report.persisted.push(file_name.clone());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to persist metadata for {}: {}", file_name, e)
                    }
                }
            }

            match self.index.insert(loaded.doc) {
                Ok(()) => report.loaded.push(file_name),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", file_name, e);
                    report.skipped.push(file_name);
                }
            }
        }

        if self.config.create_root_files {
            report.created_roots = self.create_root_files().await;
        }

        report.reconcile = reconcile::reconcile_all(&mut self.index, &mut self.ids, now);
        self.initialized = true;

        tracing::info!(
            "Loaded {} notes and {} schemas ({} file(s) skipped)",
            self.count_real(Namespace::Note),
            self.count_real(Namespace::Schema),
            report.skipped.len()
        );

        Ok(report)
    }

    /// Settle identity and defaults for one parsed file.
    fn load_document(
        &mut self,
        namespace: Namespace,
        fname: &str,
        file_name: &str,
        text: &str,
        now: i64,
    ) -> LoadedDocument {
        let raw = RawDocument::parse(text);
        let mut dirty = false;
        let mut keep_file = false;
        let recovered = matches!(raw.format, RawFormat::Recovered { .. });

        if let RawFormat::Recovered { reason } = &raw.format {
            tracing::warn!(
                "Malformed metadata in {}, reading it as plain text: {}",
                file_name,
                reason
            );
            // Rewriting would bury the broken block in the body
            keep_file = true;
        }

        let declared = match raw.id.as_deref().map(str::parse::<DocId>) {
            Some(Ok(id)) => Some(id),
            Some(Err(e)) => {
                tracing::warn!("Ignoring malformed id in {}: {}", file_name, e);
                None
            }
            None => None,
        };

        let id = match declared {
            Some(id) if self.ids.has_seen(&id) => {
                match self.index.get(&id) {
                    Some(other) if other.namespace != namespace => tracing::info!(
                        "{} shares id {} with {} '{}'; ids are unique across namespaces, \
                         so it gets a fresh id in memory",
                        file_name,
                        id,
                        other.namespace,
                        other.fname
                    ),
                    _ => tracing::warn!(
                        "Id {} in {} is already taken, indexing it under a fresh id",
                        id,
                        file_name
                    ),
                }
                keep_file = true;
                self.ids.allocate()
            }
            Some(id) => {
                self.ids.claim(&id);
                id
            }
            None => {
                dirty = true;
                self.ids.allocate()
            }
        };

        let created = raw.created.unwrap_or_else(|| {
            dirty = true;
            now
        });
        let updated = raw.updated.unwrap_or_else(|| {
            dirty = true;
            now
        });

        let mut doc = Document::new_stub(namespace, fname, id, now);
        doc.stub = false;
        doc.title = raw.title.unwrap_or_else(|| last_segment(fname).to_string());
        doc.created = created;
        doc.updated = updated;
        doc.body = raw.body;
        doc.custom = raw.custom;

        LoadedDocument {
            doc,
            dirty,
            keep_file,
            recovered,
        }
    }

    async fn create_root_files(&mut self) -> Vec<String> {
        let mut created = Vec::new();
        for namespace in Namespace::ALL {
            if self.index.get_by_path(namespace, ROOT_FNAME).is_some() {
                continue;
            }
            let mut root = Document::new(namespace, ROOT_FNAME);
            root.id = self.ids.allocate();
            let file_name = root.file_name();

            if let Err(e) = self.persist(&root).await {
                tracing::warn!("Failed to create {}: {}", file_name, e);
                continue;
            }
            match self.index.insert(root) {
                Ok(()) => {
                    tracing::info!("Created {}", file_name);
                    created.push(file_name);
                }
                Err(e) => tracing::warn!("Failed to index {}: {}", file_name, e),
            }
        }
        created
    }

    /// Look up a path and everything below it.
    ///
    /// Accepts plain names, `[[wiki links]]` and file names. The root (or an
    /// empty query) returns the whole namespace.
    pub fn query(&self, path: &str, namespace: Namespace) -> QueryResult<'_> {
        let fname = normalize_query(path);
        let found = self.index.with_prefix(namespace, &fname);
        if found.is_empty() {
            QueryResult::None
        } else {
            QueryResult::Found(found)
        }
    }

    /// Exact lookup by path.
    pub fn query_one(&self, path: &str, namespace: Namespace) -> Result<&Document> {
        let fname = normalize_query(path);
        self.index
            .get_by_path(namespace, &fname)
            .ok_or_else(|| EngineError::NotFound(format!("{} '{}'", namespace, fname)))
    }

    pub fn get(&self, id: &DocId) -> Option<&Document> {
        self.index.get(id)
    }

    /// Direct children of a document, in path order.
    pub fn children(&self, id: &DocId) -> Vec<&Document> {
        let Some(doc) = self.index.get(id) else {
            return Vec::new();
        };
        let mut children: Vec<&Document> = doc
            .children
            .iter()
            .filter_map(|child| self.index.get(child))
            .collect();
        children.sort_by(|a, b| a.fname.cmp(&b.fname));
        children
    }

    pub fn notes(&self) -> NamespaceView<'_> {
        self.documents(Namespace::Note)
    }

    pub fn schemas(&self) -> NamespaceView<'_> {
        self.documents(Namespace::Schema)
    }

    pub fn documents(&self, namespace: Namespace) -> NamespaceView<'_> {
        NamespaceView::new(&self.index, namespace)
    }

    /// Problems in the tree of every namespace; empty when consistent.
    pub fn verify(&self) -> Vec<String> {
        Namespace::ALL
            .into_iter()
            .flat_map(|namespace| reconcile::verify(&self.index, namespace))
            .collect()
    }

    /// Create or update a document and persist it.
    ///
    /// The file is written before the index changes, so a failed write
    /// leaves the engine as it was. Returns the id the document ended up
    /// with, which differs from the given one when that id was taken.
    pub async fn write(&mut self, mut doc: Document, options: WriteOptions) -> Result<DocId> {
        self.ensure_initialized()?;

        doc.fname = validate_fname(&doc.fname).map_err(|e| EngineError::InvalidPath {
            fname: doc.fname.clone(),
            reason: e.to_string(),
        })?;
        if let Some(body) = options.body {
            doc.body = body;
        }

        if options.new_node {
            self.create(doc).await
        } else {
            self.update(doc).await
        }
    }

    async fn create(&mut self, mut doc: Document) -> Result<DocId> {
        let namespace = doc.namespace;
        let now = now_millis();

        let stub_id = match self.index.get_by_path(namespace, &doc.fname) {
            Some(existing) if !existing.stub => {
                return Err(EngineError::AlreadyExists {
                    namespace,
                    fname: doc.fname,
                });
            }
            Some(existing) => Some(existing.id.clone()),
            None => None,
        };

        // A file the index does not hold (unreadable on init, or added since)
        if self.fs.exists(&doc.file_name()).await? {
            return Err(EngineError::AlreadyExists {
                namespace,
                fname: doc.fname,
            });
        }

        match &stub_id {
            Some(id) => doc.id = id.clone(),
            None if self.index.contains_id(&doc.id) => doc.id = self.ids.allocate(),
            None => self.ids.claim(&doc.id),
        }
        if doc.title.is_empty() {
            doc.title = last_segment(&doc.fname).to_string();
        }
        if doc.created == 0 {
            doc.created = now;
        }
        if doc.updated == 0 {
            doc.updated = now;
        }
        doc.stub = false;
        doc.parent = None;
        doc.children.clear();

        self.persist(&doc).await?;

        let id = doc.id.clone();
        let fname = doc.fname.clone();
        if let Some(stub_id) = &stub_id {
            self.index.remove(stub_id);
        }
        self.index.insert(doc)?;
        let created =
            reconcile::ensure_ancestors(&mut self.index, namespace, &fname, &mut self.ids, now);

        if stub_id.is_some() {
            tracing::info!("Promoted stub {} {}", namespace, fname);
        } else {
            tracing::info!("Created {} {}", namespace, fname);
        }
        if !created.is_empty() {
            tracing::debug!("Synthesized stubs for {}: {:?}", fname, created);
        }

        Ok(id)
    }

    async fn update(&mut self, mut doc: Document) -> Result<DocId> {
        let current = self
            .index
            .get(&doc.id)
            .ok_or_else(|| EngineError::NotFound(doc.id.to_string()))?;

        if current.namespace != doc.namespace {
            return Err(EngineError::InvalidPath {
                fname: doc.fname,
                reason: format!(
                    "cannot move a document from {} to {}",
                    current.namespace, doc.namespace
                ),
            });
        }

        let namespace = current.namespace;
        let old_fname = current.fname.clone();
        let was_stub = current.stub;
        let renamed = old_fname != doc.fname;

        let target_taken = renamed
            && (self.index.get_by_path(namespace, &doc.fname).is_some()
                || self.fs.exists(&doc.file_name()).await?);
        if target_taken {
            return Err(EngineError::AlreadyExists {
                namespace,
                fname: doc.fname,
            });
        }

        let now = now_millis();
        if doc.title.is_empty() {
            doc.title = last_segment(&doc.fname).to_string();
        }
        if doc.created == 0 {
            doc.created = current.created;
        }
        doc.updated = now;
        doc.stub = false;
        doc.parent = current.parent.clone();
        doc.children = current.children.clone();

        self.persist(&doc).await?;

        if renamed && !was_stub {
            let old_file = namespace.file_name(&old_fname);
            match self.fs.delete(&old_file).await {
                Ok(()) => {}
                Err(FsError::NotFound(_)) => {
                    tracing::warn!("{} was already gone when renaming", old_file)
                }
                Err(e) => {
                    let new_file = doc.file_name();
                    if let Err(cleanup) = self.fs.delete(&new_file).await {
                        tracing::warn!(
                            "Failed to remove {} after failed rename: {}",
                            new_file,
                            cleanup
                        );
                    }
                    return Err(e.into());
                }
            }
        }

        let id = doc.id.clone();
        let fname = doc.fname.clone();
        if renamed {
            self.index.rename(&id, &fname)?;
        }
        if let Some(slot) = self.index.get_mut(&id) {
            *slot = doc;
        }

        if renamed {
            reconcile::reconcile(&mut self.index, namespace, &mut self.ids, now);
            tracing::info!("Renamed {} {} -> {}", namespace, old_fname, fname);
        } else {
            tracing::info!("Updated {} {}", namespace, fname);
        }

        Ok(id)
    }

    /// Remove a document.
    ///
    /// A leaf leaves the index and takes any stub ancestors that held only
    /// it. A node with children (or the root) keeps its place as a stub.
    pub async fn delete(&mut self, id: &DocId) -> Result<DeleteOutcome> {
        self.ensure_initialized()?;

        let doc = self
            .index
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let namespace = doc.namespace;
        let fname = doc.fname.clone();
        let file_name = doc.file_name();
        let keeps_place = !doc.children.is_empty() || doc.is_root();

        if doc.stub {
            if keeps_place {
                tracing::debug!("Not deleting stub {} {}: still in use", namespace, fname);
                return Ok(DeleteOutcome::Unchanged);
            }
            let removed = reconcile::collapse(&mut self.index, namespace, &fname);
            let collapsed = removed.into_iter().skip(1).map(|d| d.fname).collect();
            return Ok(DeleteOutcome::Removed { collapsed });
        }

        match self.fs.delete(&file_name).await {
            Ok(()) => {}
            Err(FsError::NotFound(_)) => {
                tracing::warn!("{} was already gone, removing it from the index", file_name)
            }
            Err(e) => return Err(e.into()),
        }

        if keeps_place {
            if let Some(doc) = self.index.get_mut(id) {
                doc.demote();
            }
            tracing::info!("Deleted {} {}, kept as stub", namespace, fname);
            return Ok(DeleteOutcome::Demoted);
        }

        reconcile::unlink(&mut self.index, id);
        self.index.remove(id);
        let collapsed: Vec<String> = match parent_fname(&fname) {
            Some(parent) => reconcile::collapse(&mut self.index, namespace, parent)
                .into_iter()
                .map(|d| d.fname)
                .collect(),
            None => Vec::new(),
        };

        tracing::info!("Deleted {} {}", namespace, fname);
        Ok(DeleteOutcome::Removed { collapsed })
    }

    async fn persist(&self, doc: &Document) -> Result<()> {
        let content = doc.serialize()?;
        self.fs.write(&doc.file_name(), content.as_bytes()).await?;
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(EngineError::NotInitialized)
        }
    }

    fn count_real(&self, namespace: Namespace) -> usize {
        self.index.iter(namespace).filter(|doc| !doc.stub).count()
    }
}
