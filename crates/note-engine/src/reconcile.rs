//! Tree reconciliation: derive a consistent hierarchy from a flat set of documents.
//!
//! The index holds documents keyed by path; this module makes sure the
//! implied tree is whole:
//! - every ancestor path of a document exists, as a stub if nothing backs it
//! - stubs that no longer hold anything together are pruned bottom-up
//! - `parent` / `children` links match the paths exactly

use note_fs::{ancestors, is_root, parent_fname, Namespace, ROOT_FNAME};

use crate::document::Document;
use crate::id::{DocId, IdAllocator};
use crate::index::PathIndex;

/// Report from a reconciliation pass
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileReport {
    /// Paths that received a synthesized stub
    pub stubs_created: Vec<String>,
    /// Stub paths removed because nothing was left below them
    pub stubs_pruned: Vec<String>,
}

impl ReconcileReport {
    pub fn has_changes(&self) -> bool {
        !self.stubs_created.is_empty() || !self.stubs_pruned.is_empty()
    }

    fn merge(&mut self, other: ReconcileReport) {
        self.stubs_created.extend(other.stubs_created);
        self.stubs_pruned.extend(other.stubs_pruned);
    }
}

/// Full pass over one namespace.
///
/// Running it again on its own output changes nothing.
pub fn reconcile(
    index: &mut PathIndex,
    namespace: Namespace,
    ids: &mut IdAllocator,
    now: i64,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    if index.get_by_path(namespace, ROOT_FNAME).is_none() {
        insert_stub(index, namespace, ROOT_FNAME, ids, now);
        report.stubs_created.push(ROOT_FNAME.to_string());
    }

    for fname in index.fnames(namespace) {
        for ancestor in ancestors(&fname) {
            if index.get_by_path(namespace, ancestor).is_some() {
                continue;
            }
            insert_stub(index, namespace, ancestor, ids, now);
            report.stubs_created.push(ancestor.to_string());
        }
    }

    report.stubs_pruned = prune_stubs(index, namespace);
    relink(index, namespace);

    if report.has_changes() {
        tracing::debug!(
            "Reconciled {}: {} stub(s) created, {} pruned",
            namespace,
            report.stubs_created.len(),
            report.stubs_pruned.len()
        );
    }

    report
}

/// Make sure every ancestor of `fname` exists and link the chain.
///
/// Returns the paths that received a new stub, nearest first.
pub fn ensure_ancestors(
    index: &mut PathIndex,
    namespace: Namespace,
    fname: &str,
    ids: &mut IdAllocator,
    now: i64,
) -> Vec<String> {
    let mut created = Vec::new();

    for ancestor in ancestors(fname) {
        if index.get_by_path(namespace, ancestor).is_some() {
            continue;
        }
        insert_stub(index, namespace, ancestor, ids, now);
        created.push(ancestor.to_string());
    }

    link(index, namespace, fname);
    for ancestor in &created {
        link(index, namespace, ancestor);
    }

    created
}

/// Remove childless stubs starting at `fname` and walking up.
///
/// Stops at the root, at a real document, or at a node that still has
/// children. Returns the removed documents, deepest first.
pub fn collapse(index: &mut PathIndex, namespace: Namespace, fname: &str) -> Vec<Document> {
    let mut removed = Vec::new();
    let mut current = Some(fname.to_string());

    while let Some(path) = current {
        if is_root(&path) {
            break;
        }
        let Some(doc) = index.get_by_path(namespace, &path) else {
            break;
        };
        if !doc.stub || !doc.children.is_empty() {
            break;
        }

        let id = doc.id.clone();
        current = parent_fname(&path).map(str::to_string);
        unlink(index, &id);
        if let Some(doc) = index.remove(&id) {
            removed.push(doc);
        }
    }

    removed
}

/// Recompute `parent` and `children` for the document at `fname` and hook it
/// into its parent's children.
pub fn link(index: &mut PathIndex, namespace: Namespace, fname: &str) {
    let Some(id) = index.id_for_path(namespace, fname).cloned() else {
        return;
    };
    let parent_id = parent_fname(fname).and_then(|p| index.id_for_path(namespace, p).cloned());
    let children = direct_children(index, namespace, fname);

    if let Some(doc) = index.get_mut(&id) {
        doc.parent = parent_id.clone();
        doc.children = children.into_iter().collect();
    }
    if let Some(parent) = parent_id.and_then(|p| index.get_mut(&p)) {
        parent.children.insert(id);
    }
}

/// Detach a document from its parent's children.
pub fn unlink(index: &mut PathIndex, id: &DocId) {
    let Some(parent_id) = index.get(id).and_then(|doc| doc.parent.clone()) else {
        return;
    };
    if let Some(parent) = index.get_mut(&parent_id) {
        parent.children.remove(id);
    }
}

/// Recompute every link of a namespace from the paths alone.
pub fn relink(index: &mut PathIndex, namespace: Namespace) {
    let links: Vec<(DocId, Option<DocId>, Vec<DocId>)> = index
        .iter(namespace)
        .map(|doc| {
            let parent = parent_fname(&doc.fname)
                .and_then(|p| index.id_for_path(namespace, p).cloned());
            let children = direct_children(index, namespace, &doc.fname);
            (doc.id.clone(), parent, children)
        })
        .collect();

    for (id, parent, children) in links {
        if let Some(doc) = index.get_mut(&id) {
            doc.parent = parent;
            doc.children = children.into_iter().collect();
        }
    }
}

/// Check that the tree of one namespace is whole and correctly linked.
///
/// Returns a description of every problem found; empty means consistent.
pub fn verify(index: &PathIndex, namespace: Namespace) -> Vec<String> {
    let mut problems = Vec::new();

    if index.get_by_path(namespace, ROOT_FNAME).is_none() {
        problems.push(format!("{}: root is missing", namespace));
    }

    for doc in index.iter(namespace) {
        if let Err(e) = doc.check_invariants() {
            problems.push(format!("{}: {}", namespace, e));
        }

        let expected_parent =
            parent_fname(&doc.fname).and_then(|p| index.id_for_path(namespace, p));
        if let Some(parent) = parent_fname(&doc.fname) {
            if expected_parent.is_none() {
                problems.push(format!(
                    "{}: '{}' has no ancestor '{}'",
                    namespace, doc.fname, parent
                ));
            }
        }
        if doc.parent.as_ref() != expected_parent {
            problems.push(format!("{}: '{}' links to the wrong parent", namespace, doc.fname));
        }

        let expected_children: Vec<DocId> = direct_children(index, namespace, &doc.fname);
        if doc.children.iter().cloned().collect::<Vec<_>>() != sorted(expected_children) {
            problems.push(format!("{}: '{}' has stale children", namespace, doc.fname));
        }

        if doc.stub && !doc.is_root() && doc.children.is_empty() {
            problems.push(format!("{}: stub '{}' holds nothing", namespace, doc.fname));
        }
    }

    problems
}

fn insert_stub(
    index: &mut PathIndex,
    namespace: Namespace,
    fname: &str,
    ids: &mut IdAllocator,
    now: i64,
) {
    let stub = Document::new_stub(namespace, fname, ids.allocate(), now);
    // The path was checked to be free and the id is fresh
    if let Err(e) = index.insert(stub) {
        tracing::error!("Failed to insert stub for {}: {}", fname, e);
    }
}

/// Remove stubs (other than the root) with nothing below them, deepest first.
fn prune_stubs(index: &mut PathIndex, namespace: Namespace) -> Vec<String> {
    let mut stubs: Vec<(usize, String, DocId)> = index
        .iter(namespace)
        .filter(|doc| doc.stub && !doc.is_root())
        .map(|doc| (note_fs::depth(&doc.fname), doc.fname.clone(), doc.id.clone()))
        .collect();
    stubs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut pruned = Vec::new();
    for (_, fname, id) in stubs {
        if !index.has_descendants(namespace, &fname) {
            unlink(index, &id);
            index.remove(&id);
            pruned.push(fname);
        }
    }
    pruned
}

fn direct_children(index: &PathIndex, namespace: Namespace, fname: &str) -> Vec<DocId> {
    index
        .descendants(namespace, fname)
        .into_iter()
        .filter(|child| parent_fname(&child.fname) == Some(fname))
        .map(|child| child.id.clone())
        .collect()
}

fn sorted(mut ids: Vec<DocId>) -> Vec<DocId> {
    ids.sort();
    ids
}

/// Run [`reconcile`] over every namespace.
pub fn reconcile_all(index: &mut PathIndex, ids: &mut IdAllocator, now: i64) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    for namespace in Namespace::ALL {
        report.merge(reconcile(index, namespace, ids, now));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(names: &[&str]) -> PathIndex {
        let mut index = PathIndex::new();
        for name in names {
            index.insert(Document::new(Namespace::Note, name)).unwrap();
        }
        index
    }

    fn stub_names(index: &PathIndex) -> Vec<String> {
        index
            .iter(Namespace::Note)
            .filter(|d| d.stub)
            .map(|d| d.fname.clone())
            .collect()
    }

    #[test]
    fn test_synthesizes_root_and_missing_ancestors() {
        let mut index = index_with(&["bar.two", "foo"]);
        let mut ids = IdAllocator::new();

        let report = reconcile(&mut index, Namespace::Note, &mut ids, 0);

        assert_eq!(report.stubs_created, vec!["root".to_string(), "bar".to_string()]);
        assert_eq!(stub_names(&index), vec!["bar", "root"]);
        assert!(verify(&index, Namespace::Note).is_empty());
    }

    #[test]
    fn test_deep_chain_gets_every_ancestor() {
        let mut index = index_with(&["a.b.c.d"]);
        let mut ids = IdAllocator::new();

        reconcile(&mut index, Namespace::Note, &mut ids, 0);

        assert_eq!(stub_names(&index), vec!["a", "a.b", "a.b.c", "root"]);
        let a = index.get_by_path(Namespace::Note, "a").unwrap();
        let ab = index.get_by_path(Namespace::Note, "a.b").unwrap();
        assert_eq!(a.children.iter().collect::<Vec<_>>(), vec![&ab.id]);
        assert_eq!(ab.parent.as_ref(), Some(&a.id));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut index = index_with(&["root", "foo", "foo.one", "bar.two.three"]);
        let mut ids = IdAllocator::new();

        reconcile(&mut index, Namespace::Note, &mut ids, 0);
        let before: Vec<Document> = index.iter(Namespace::Note).cloned().collect();

        let report = reconcile(&mut index, Namespace::Note, &mut ids, 0);
        let after: Vec<Document> = index.iter(Namespace::Note).cloned().collect();

        assert!(!report.has_changes());
        assert_eq!(before, after);
    }

    #[test]
    fn test_children_are_exactly_one_segment_deeper() {
        let mut index = index_with(&[
            "root",
            "foo",
            "foo.one",
            "foo.one.deep",
            "foo.two",
            "foobar",
        ]);
        let mut ids = IdAllocator::new();
        reconcile(&mut index, Namespace::Note, &mut ids, 0);

        let foo = index.get_by_path(Namespace::Note, "foo").unwrap();
        let mut child_names: Vec<_> = foo
            .children
            .iter()
            .map(|id| index.get(id).unwrap().fname.clone())
            .collect();
        child_names.sort();
        assert_eq!(child_names, vec!["foo.one", "foo.two"]);

        let root = index.get_by_path(Namespace::Note, "root").unwrap();
        assert_eq!(root.children.len(), 2);
        assert!(root.parent.is_none());
    }

    #[test]
    fn test_prunes_stubs_with_nothing_below() {
        let mut index = index_with(&["root"]);
        let mut ids = IdAllocator::new();
        for name in ["a", "a.b"] {
            index
                .insert(Document::new_stub(Namespace::Note, name, ids.allocate(), 0))
                .unwrap();
        }

        let report = reconcile(&mut index, Namespace::Note, &mut ids, 0);

        assert_eq!(report.stubs_pruned, vec!["a.b".to_string(), "a".to_string()]);
        assert_eq!(index.len(Namespace::Note), 1);
    }

    #[test]
    fn test_ensure_ancestors_links_new_chain() {
        let mut index = index_with(&["root"]);
        let mut ids = IdAllocator::new();
        reconcile(&mut index, Namespace::Note, &mut ids, 0);

        index.insert(Document::new(Namespace::Note, "bar.two")).unwrap();
        let created = ensure_ancestors(&mut index, Namespace::Note, "bar.two", &mut ids, 0);

        assert_eq!(created, vec!["bar".to_string()]);
        assert!(index.get_by_path(Namespace::Note, "bar").unwrap().stub);
        assert!(verify(&index, Namespace::Note).is_empty());
    }

    #[test]
    fn test_collapse_walks_up_stub_chain() {
        let mut index = index_with(&["root", "a.b.c"]);
        let mut ids = IdAllocator::new();
        reconcile(&mut index, Namespace::Note, &mut ids, 0);

        let leaf = index.id_for_path(Namespace::Note, "a.b.c").unwrap().clone();
        unlink(&mut index, &leaf);
        index.remove(&leaf);

        let removed = collapse(&mut index, Namespace::Note, "a.b");
        let removed: Vec<_> = removed.into_iter().map(|d| d.fname).collect();

        assert_eq!(removed, vec!["a.b", "a"]);
        assert_eq!(index.len(Namespace::Note), 1);
        assert!(index.get_by_path(Namespace::Note, "root").unwrap().children.is_empty());
    }

    #[test]
    fn test_collapse_stops_at_real_document() {
        let mut index = index_with(&["root", "a", "a.b.c"]);
        let mut ids = IdAllocator::new();
        reconcile(&mut index, Namespace::Note, &mut ids, 0);

        let leaf = index.id_for_path(Namespace::Note, "a.b.c").unwrap().clone();
        unlink(&mut index, &leaf);
        index.remove(&leaf);

        let removed = collapse(&mut index, Namespace::Note, "a.b");

        assert_eq!(removed.len(), 1);
        assert!(index.get_by_path(Namespace::Note, "a").is_some());
        assert!(verify(&index, Namespace::Note).is_empty());
    }

    #[test]
    fn test_collapse_stops_at_stub_with_other_children() {
        let mut index = index_with(&["root", "a.x", "a.b.c"]);
        let mut ids = IdAllocator::new();
        reconcile(&mut index, Namespace::Note, &mut ids, 0);

        let leaf = index.id_for_path(Namespace::Note, "a.b.c").unwrap().clone();
        unlink(&mut index, &leaf);
        index.remove(&leaf);

        let removed: Vec<_> = collapse(&mut index, Namespace::Note, "a.b")
            .into_iter()
            .map(|d| d.fname)
            .collect();

        assert_eq!(removed, vec!["a.b"]);
        assert!(index.get_by_path(Namespace::Note, "a").unwrap().stub);
    }

    #[test]
    fn test_namespaces_reconcile_independently() {
        let mut index = index_with(&["foo.one"]);
        index.insert(Document::new(Namespace::Schema, "root")).unwrap();
        let mut ids = IdAllocator::new();

        let report = reconcile_all(&mut index, &mut ids, 0);

        assert_eq!(report.stubs_created, vec!["root".to_string(), "foo".to_string()]);
        assert_eq!(index.len(Namespace::Schema), 1);
        assert!(!index.get_by_path(Namespace::Schema, "root").unwrap().stub);
    }
}
