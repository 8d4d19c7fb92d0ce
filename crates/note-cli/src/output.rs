//! Rendering of engine results for stdout.

use note_engine::{DeleteOutcome, Document, FileSystem, InitReport, Namespace, NoteEngine};
use serde_json::{json, Value};

/// JSON form of a document, with links resolved to paths.
pub fn document_json<F: FileSystem>(engine: &NoteEngine<F>, doc: &Document) -> Value {
    let parent = doc
        .parent
        .as_ref()
        .and_then(|id| engine.get(id))
        .map(|parent| parent.fname.clone());
    let children: Vec<&str> = engine
        .children(&doc.id)
        .into_iter()
        .map(|child| child.fname.as_str())
        .collect();

    json!({
        "id": doc.id,
        "fname": doc.fname,
        "namespace": doc.namespace,
        "title": doc.title,
        "created": doc.created,
        "updated": doc.updated,
        "stub": doc.stub,
        "body": doc.body,
        "custom": doc.custom,
        "parent": parent,
        "children": children,
    })
}

pub fn init_json(report: &InitReport) -> Value {
    json!({
        "loaded": report.loaded,
        "persisted": report.persisted,
        "recovered": report.recovered,
        "skipped": report.skipped,
        "created_roots": report.created_roots,
        "stubs_created": report.reconcile.stubs_created,
        "stubs_pruned": report.reconcile.stubs_pruned,
    })
}

pub fn delete_json(fname: &str, outcome: &DeleteOutcome) -> Value {
    match outcome {
        DeleteOutcome::Removed { collapsed } => {
            json!({ "fname": fname, "outcome": "removed", "collapsed": collapsed })
        }
        DeleteOutcome::Demoted => json!({ "fname": fname, "outcome": "demoted" }),
        DeleteOutcome::Unchanged => json!({ "fname": fname, "outcome": "unchanged" }),
    }
}

/// Indented outline of one namespace, stubs marked with `~`.
pub fn render_tree<F: FileSystem>(engine: &NoteEngine<F>, namespace: Namespace) -> String {
    let mut out = String::new();
    let view = engine.documents(namespace);
    let Some(root) = view.values().find(|doc| doc.is_root()) else {
        return out;
    };

    let mut stack = vec![(root, 0usize)];
    while let Some((doc, depth)) = stack.pop() {
        let marker = if doc.stub { "~ " } else { "" };
        out.push_str(&format!("{}{}{}\n", "  ".repeat(depth), marker, doc.fname));

        for child in engine.children(&doc.id).into_iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    out
}
