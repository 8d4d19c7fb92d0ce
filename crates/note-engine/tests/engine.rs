//! End-to-end tests for the note engine against real directories.
//!
//! Each test lays out a small store on disk, loads it with a fresh engine
//! and checks both the in-memory tree and the files left behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use note_engine::{
    DeleteOutcome, DocId, Document, EngineConfig, EngineRegistry, Namespace, NativeFs,
    NoteEngine, QueryResult, WriteOptions,
};
use tempfile::TempDir;

const ROOT: &str = "---\nid: root\ntitle: root\ncreated: 1\nupdated: 1\n---\n";
const FOO: &str = "---\nid: foo\ntitle: foo\ncreated: 123\nupdated: 456\n---\nfoo body";
const FOO_ONE: &str = "---\nid: foo-one\ntitle: one\ncreated: 123\nupdated: 456\n---\nfoo.one body";
const FOO_TWO: &str = "---\nid: foo-two\ntitle: two\ncreated: 123\nupdated: 456\n---\nfoo.two body";
const FOO_SCHEMA: &str =
    "---\nid: foo-schema\ntitle: foo\ncreated: 123\nupdated: 456\n---\nschemas:\n  - id: foo\n";
const ROOT_SCHEMA: &str =
    "---\nid: root-schema\ntitle: root\ncreated: 1\nupdated: 1\n---\nschemas:\n  - id: root\n";

/// Write the standard fixture store into a fresh directory.
fn fixture_store() -> TempDir {
    let temp = TempDir::new().unwrap();
    for (name, content) in [
        ("root.md", ROOT),
        ("foo.md", FOO),
        ("foo.one.md", FOO_ONE),
        ("foo.two.md", FOO_TWO),
        ("foo.schema.yml", FOO_SCHEMA),
        ("root.schema.yml", ROOT_SCHEMA),
    ] {
        fs::write(temp.path().join(name), content).unwrap();
    }
    temp
}

async fn open(root: &Path) -> NoteEngine<NativeFs> {
    let mut engine = NoteEngine::new(NativeFs::new(root.to_path_buf()));
    engine.init().await.unwrap();
    engine
}

/// Every file in the directory with its content
fn read_dir(root: &Path) -> BTreeMap<String, String> {
    fs::read_dir(root)
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            let name = entry.file_name().to_string_lossy().to_string();
            let content = fs::read_to_string(entry.path()).unwrap();
            (name, content)
        })
        .collect()
}

fn id(s: &str) -> DocId {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_init_loads_fixture_store() {
    let temp = fixture_store();
    let engine = open(temp.path()).await;

    assert_eq!(engine.notes().len(), 4);
    assert_eq!(engine.schemas().len(), 2);

    let foo = engine.query_one("foo", Namespace::Note).unwrap();
    assert_eq!(foo.id, id("foo"));
    assert_eq!(foo.created, 123);
    assert_eq!(foo.updated, 456);
    assert_eq!(foo.body, "foo body");
    assert_eq!(foo.children.len(), 2);
    assert_eq!(foo.parent, Some(id("root")));
    assert!(engine.verify().is_empty());
}

#[tokio::test]
async fn test_reinit_reproduces_identical_files() {
    let temp = fixture_store();
    fs::write(temp.path().join("bare.md"), "no metadata here").unwrap();

    let first = open(temp.path()).await;
    let after_first = read_dir(temp.path());
    let first_docs: Vec<Document> = first.notes().values().cloned().collect();
    drop(first);

    let second = open(temp.path()).await;
    let second_docs: Vec<Document> = second.notes().values().cloned().collect();

    assert_eq!(read_dir(temp.path()), after_first);
    assert_eq!(first_docs, second_docs);
}

#[tokio::test]
async fn test_generated_id_is_stable_across_reloads() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("bare.md"), "no metadata here").unwrap();

    let first = open(temp.path()).await;
    let bare = first.query_one("bare", Namespace::Note).unwrap().clone();
    assert_eq!(bare.body, "no metadata here");

    let second = open(temp.path()).await;
    let reloaded = second.query_one("bare", Namespace::Note).unwrap();

    assert_eq!(reloaded.id, bare.id);
    assert_eq!(reloaded.created, bare.created);
    assert_eq!(reloaded.body, "no metadata here");
    let on_disk = fs::read_to_string(temp.path().join("bare.md")).unwrap();
    assert!(on_disk.ends_with("---\nno metadata here"));
}

#[tokio::test]
async fn test_create_node() {
    let temp = fixture_store();
    let mut engine = open(temp.path()).await;

    let new_id = engine
        .write(
            Document::new(Namespace::Note, "bar"),
            WriteOptions::new_node().with_body("bar body"),
        )
        .await
        .unwrap();

    assert_eq!(engine.notes().len(), 5);
    assert!(temp.path().join("bar.md").exists());
    let root = engine.query_one("root", Namespace::Note).unwrap();
    assert!(root.children.contains(&new_id));

    let reloaded = open(temp.path()).await;
    assert_eq!(reloaded.query_one("bar", Namespace::Note).unwrap().id, new_id);
}

#[tokio::test]
async fn test_fetch_node() {
    let temp = fixture_store();
    let engine = open(temp.path()).await;

    let result = engine.query("foo", Namespace::Note);
    assert!(result.is_found());
    assert_eq!(result.first().unwrap().id, id("foo"));
    assert_eq!(result.len(), 3);

    let schema = engine.query_one("foo", Namespace::Schema).unwrap();
    assert_eq!(schema.id, id("foo-schema"));
    assert_eq!(engine.query("foo.three", Namespace::Note), QueryResult::None);
}

#[tokio::test]
async fn test_write_under_missing_ancestor_opens_stub() {
    let temp = TempDir::new().unwrap();
    let mut engine = open(temp.path()).await;

    engine
        .write(
            Document::new(Namespace::Note, "bar.two"),
            WriteOptions::new_node().with_body("x"),
        )
        .await
        .unwrap();

    let bar = engine.query_one("bar", Namespace::Note).unwrap();
    assert!(bar.stub);
    assert_eq!(engine.query_one("bar.two", Namespace::Note).unwrap().body, "x");
    assert!(!temp.path().join("bar.md").exists());
    assert!(engine.verify().is_empty());
}

#[tokio::test]
async fn test_delete_leaf() {
    let temp = fixture_store();
    let mut engine = open(temp.path()).await;

    let outcome = engine.delete(&id("foo-one")).await.unwrap();

    assert_eq!(outcome, DeleteOutcome::Removed { collapsed: vec![] });
    assert!(!temp.path().join("foo.one.md").exists());
    assert_eq!(engine.query("foo", Namespace::Note).len(), 2);
    assert_eq!(engine.query("foo.one", Namespace::Note), QueryResult::None);
    assert_eq!(engine.notes().len(), 3);
}

#[tokio::test]
async fn test_delete_node_with_children() {
    let temp = fixture_store();
    let mut engine = open(temp.path()).await;

    let outcome = engine.delete(&id("foo")).await.unwrap();

    assert_eq!(outcome, DeleteOutcome::Demoted);
    assert!(!temp.path().join("foo.md").exists());
    let notes = engine.notes();
    assert!(notes[&id("foo")].stub);
    assert_eq!(notes[&id("foo")].fname, "foo");
    assert_eq!(notes.len(), 4);

    let reloaded = open(temp.path()).await;
    assert!(reloaded.query_one("foo", Namespace::Note).unwrap().stub);
}

#[tokio::test]
async fn test_delete_schema_leaves_note() {
    let temp = fixture_store();
    let mut engine = open(temp.path()).await;

    engine.delete(&id("foo-schema")).await.unwrap();

    assert!(!temp.path().join("foo.schema.yml").exists());
    assert_eq!(engine.query("foo", Namespace::Schema), QueryResult::None);
    assert_eq!(engine.schemas().len(), 1);
    let foo = engine.query_one("foo", Namespace::Note).unwrap();
    assert!(!foo.stub);
    assert_eq!(foo.body, "foo body");
}

#[tokio::test]
async fn test_rename_keeps_id_and_moves_file() {
    let temp = fixture_store();
    let mut engine = open(temp.path()).await;

    let mut two = engine.query_one("foo.two", Namespace::Note).unwrap().clone();
    two.fname = "bar.two".to_string();
    engine.write(two, WriteOptions::default()).await.unwrap();

    assert!(!temp.path().join("foo.two.md").exists());
    assert!(temp.path().join("bar.two.md").exists());
    assert_eq!(
        engine.query_one("bar.two", Namespace::Note).unwrap().id,
        id("foo-two")
    );
    assert!(engine.query_one("bar", Namespace::Note).unwrap().stub);
    assert_eq!(engine.query("foo", Namespace::Note).len(), 2);
    assert!(engine.verify().is_empty());
}

#[tokio::test]
async fn test_delete_collapses_stub_chain() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.b.c.md"), "deep").unwrap();
    let mut engine = open(temp.path()).await;
    assert_eq!(engine.notes().len(), 4);

    let leaf = engine.query_one("a.b.c", Namespace::Note).unwrap().id.clone();
    engine.delete(&leaf).await.unwrap();

    assert_eq!(engine.notes().len(), 1);
    assert!(engine.query_one("root", Namespace::Note).unwrap().stub);
    assert!(read_dir(temp.path()).is_empty());
}

#[tokio::test]
async fn test_malformed_metadata_is_recovered() {
    let temp = TempDir::new().unwrap();
    let raw = "---\ntitle: [broken\n---\nstill readable";
    fs::write(temp.path().join("broken.md"), raw).unwrap();

    let mut engine = NoteEngine::new(NativeFs::new(temp.path().to_path_buf()));
    let report = engine.init().await.unwrap();

    assert_eq!(report.recovered, vec!["broken.md".to_string()]);
    assert_eq!(engine.query_one("broken", Namespace::Note).unwrap().body, raw);
    assert_eq!(fs::read_to_string(temp.path().join("broken.md")).unwrap(), raw);
}

#[tokio::test]
async fn test_non_utf8_file_is_never_overwritten() {
    let temp = TempDir::new().unwrap();
    let bytes = [0xff, 0xfe, b'h', b'i'];
    fs::write(temp.path().join("bin.md"), bytes).unwrap();

    let mut engine = NoteEngine::new(NativeFs::new(temp.path().to_path_buf()));
    let report = engine.init().await.unwrap();
    assert_eq!(report.recovered, vec!["bin.md".to_string()]);

    let result = engine
        .write(
            Document::new(Namespace::Note, "bin"),
            WriteOptions::new_node().with_body("new"),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(fs::read(temp.path().join("bin.md")).unwrap(), bytes);
}

#[tokio::test]
async fn test_missing_root_directory_is_empty_store() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("not-yet");
    let mut engine = open(&root).await;

    assert_eq!(engine.notes().len(), 1);

    engine
        .write(Document::new(Namespace::Note, "first"), WriteOptions::new_node())
        .await
        .unwrap();
    assert!(root.join("first.md").exists());
}

#[tokio::test]
async fn test_create_root_files_on_init() {
    let temp = TempDir::new().unwrap();
    let config = EngineConfig {
        create_root_files: true,
    };
    let mut engine = NoteEngine::with_config(NativeFs::new(temp.path().to_path_buf()), config);
    engine.init().await.unwrap();

    assert!(temp.path().join("root.md").exists());
    assert!(temp.path().join("root.schema.yml").exists());
    assert!(!engine.query_one("root", Namespace::Schema).unwrap().stub);
}

#[tokio::test]
async fn test_registry_shares_and_replaces_engines() {
    let temp = fixture_store();
    let mut registry = EngineRegistry::native(EngineConfig::default());

    let engine = registry.get_or_create(temp.path());
    engine.lock().await.init().await.unwrap();
    engine.lock().await.delete(&id("foo-one")).await.unwrap();

    let same = registry.get_or_create(temp.path());
    assert_eq!(same.lock().await.notes().len(), 3);

    let fresh = registry.replace(temp.path());
    let mut fresh = fresh.lock().await;
    assert!(!fresh.is_initialized());
    fresh.init().await.unwrap();
    assert_eq!(fresh.notes().len(), 3);
    assert_eq!(fresh.query("foo.one", Namespace::Note), QueryResult::None);
}
