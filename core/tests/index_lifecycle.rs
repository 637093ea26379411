use lexis_core::persist::{self, IndexPaths};
use lexis_core::query::parse;
use lexis_core::tokenizer::{Analyzer, SpanishAnalyzer};
use lexis_core::{IndexHandle, LexisError, OpenMode, Searcher};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::tempdir;

fn analyzer() -> Arc<dyn Analyzer> { Arc::new(SpanishAnalyzer::new()) }

fn write_docs(dir: &Path, docs: &[(&str, &str)]) -> Vec<PathBuf> {
    docs.iter()
        .map(|(name, text)| {
            let p = dir.join(name);
            fs::write(&p, text).unwrap();
            p
        })
        .collect()
}

fn build(index_dir: &Path, files: &[PathBuf]) -> IndexHandle {
    let handle = IndexHandle::new(index_dir, analyzer());
    let mut writer = handle.create().unwrap();
    let report = writer.add_files(files);
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    writer.commit().unwrap();
    handle
}

#[test]
fn example_scenario() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let files = write_docs(docs.path(), &[("doc1.txt", "el gato corre"), ("doc2.txt", "el perro corre rapido")]);
    let handle = build(idx.path(), &files);

    let results = handle.search("corre", 150).unwrap();
    assert_eq!(results.total_hits, 2);
    let ids: Vec<u32> = results.hits.iter().map(|h| h.doc_id).collect();
    assert_eq!(ids, vec![0, 1]);
    assert!(results.hits[0].path.ends_with("doc1.txt"));
    assert_eq!(results.hits[0].frequency, Some(1));
    assert_eq!(handle.exact_term_frequency("corre", 0), 1);

    let results = handle.search("gato AND corre", 150).unwrap();
    assert_eq!(results.hits.len(), 1);
    assert!(results.hits[0].path.ends_with("doc1.txt"));

    assert!(matches!(handle.search("", 150), Err(LexisError::EmptyQuery)));
    let results = handle.search("ballena", 150).unwrap();
    assert_eq!(results.total_hits, 0);
    assert!(results.hits.is_empty());
}

#[test]
fn stop_words_do_not_veto_matches() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let files = write_docs(docs.path(), &[("doc1.txt", "el gato corre"), ("doc2.txt", "el perro corre rapido")]);
    let handle = build(idx.path(), &files);
    let paths = |q: &str| -> Vec<String> {
        handle.search(q, 150).unwrap().hits.into_iter().map(|h| h.path).collect()
    };

    let hits = paths("el gato corre");
    assert_eq!(hits.len(), 1);
    assert!(hits[0].ends_with("doc1.txt"));

    let hits = paths("gato AND el");
    assert_eq!(hits.len(), 1);
    assert!(hits[0].ends_with("doc1.txt"));

    let hits = paths("el perro OR la ballena");
    assert_eq!(hits.len(), 1);
    assert!(hits[0].ends_with("doc2.txt"));

    assert_eq!(handle.search("el", 150).unwrap().total_hits, 0);
    assert_eq!(handle.search("el OR la", 150).unwrap().total_hits, 0);
}

#[test]
fn phrases_require_adjacent_stems() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let files = write_docs(docs.path(), &[("doc1.txt", "el gato corre"), ("doc2.txt", "el perro corre rapido")]);
    let handle = build(idx.path(), &files);

    let results = handle.search("\"gato corre\"", 150).unwrap();
    assert_eq!(results.total_hits, 1);
    assert!(results.hits[0].path.ends_with("doc1.txt"));
    assert_eq!(handle.search("\"el gato\"", 150).unwrap().total_hits, 1);
    // a dropped word still occupies its slot
    assert_eq!(handle.search("\"gato el corre\"", 150).unwrap().total_hits, 0);
    assert_eq!(handle.search("\"corre gato\"", 150).unwrap().total_hits, 0);
    assert_eq!(handle.search("\"gato perro\"", 150).unwrap().total_hits, 0);
}

#[test]
fn exact_frequency_matches_occurrences() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let files = write_docs(docs.path(), &[("a.txt", "luna luna sol luna"), ("b.txt", "sol")]);
    let handle = build(idx.path(), &files);
    assert_eq!(handle.exact_term_frequency("luna", 0), 3);
    assert_eq!(handle.exact_term_frequency("luna", 1), 0);
    assert_eq!(handle.exact_term_frequency("sol", 1), 1);
}

#[test]
fn persisted_index_round_trips() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let files = write_docs(docs.path(), &[("a.txt", "uno dos tres dos"), ("b.txt", "cuatro cinco dos")]);
    let handle = build(idx.path(), &files);
    let in_memory = handle.snapshot();

    let (loaded, meta) = persist::load_index(&IndexPaths::new(idx.path())).unwrap();
    assert_eq!(meta.num_docs, 2);
    assert_eq!(loaded.postings, in_memory.postings);
    assert_eq!(loaded.docs, in_memory.docs);
    for term in in_memory.postings.keys() {
        assert_eq!(loaded.lookup(term), in_memory.lookup(term));
    }
}

#[test]
fn create_is_idempotent() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let files = write_docs(docs.path(), &[("a.txt", "rio mar"), ("b.txt", "mar montaña")]);
    let first = build(idx.path(), &files).snapshot();
    let second = build(idx.path(), &files).snapshot();
    assert_eq!(first.postings, second.postings);
    assert_eq!(second.document_count(), 2);
}

#[test]
fn append_extends_without_touching_existing_matches() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let a = write_docs(docs.path(), &[("a1.txt", "manzana pera"), ("a2.txt", "pera uva")]);
    let b = write_docs(docs.path(), &[("b1.txt", "kiwi uva")]);
    build(idx.path(), &a);

    let handle = IndexHandle::open(idx.path(), analyzer()).unwrap();
    let max_a = handle.snapshot().docs.keys().copied().max().unwrap();
    let mut writer = handle.append().unwrap();
    let report = writer.add_files(&b);
    writer.commit().unwrap();

    assert!(report.indexed.iter().all(|(_, id)| *id > max_a));
    let reopened = IndexHandle::open(idx.path(), analyzer()).unwrap();
    assert_eq!(reopened.document_count(), 3);
    let results = reopened.search("manzana", 10).unwrap();
    assert_eq!(results.hits.len(), 1);
    assert!(results.hits[0].path.ends_with("a1.txt"));
    assert_eq!(reopened.search("uva", 10).unwrap().total_hits, 2);
}

#[test]
fn append_rejects_paths_already_committed() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let a = write_docs(docs.path(), &[("a1.txt", "manzana"), ("a2.txt", "pera")]);
    build(idx.path(), &a);

    let handle = IndexHandle::open(idx.path(), analyzer()).unwrap();
    let mut writer = handle.append().unwrap();
    let name = a[1].to_string_lossy().into_owned();
    let err = writer.add_document(&name, b"pera otra vez").unwrap_err();
    assert!(matches!(err, LexisError::DuplicateDocument(ref p) if *p == name));
    let id = writer.add_document("nuevo.txt", b"kiwi").unwrap();
    assert_eq!(writer.add_document("nuevo.txt", b"kiwi").unwrap_err().kind(), "DuplicateDocument");
    writer.commit().unwrap();

    assert_eq!(id, 2);
    assert_eq!(handle.document_count(), 3);
    assert_eq!(handle.search("pera", 10).unwrap().total_hits, 1);
}

#[test]
fn append_without_index_fails() {
    let idx = tempdir().unwrap();
    let handle = IndexHandle::new(idx.path(), analyzer());
    let err = handle.writer(OpenMode::Append).err().unwrap();
    assert_eq!(err.kind(), "IndexNotFoundError");
    // the failed append must not leave a lock behind
    assert!(handle.create().is_ok());
}

#[test]
fn second_writer_is_locked_out() {
    let idx = tempdir().unwrap();
    let handle = IndexHandle::new(idx.path(), analyzer());
    let writer = handle.create().unwrap();
    let other = IndexHandle::new(idx.path(), analyzer());
    assert_eq!(other.create().err().unwrap().kind(), "IndexLockedError");
    drop(writer);
    assert!(other.create().is_ok());
}

#[test]
fn boolean_operators_are_set_operations() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let files = write_docs(
        docs.path(),
        &[("a.txt", "rojo verde"), ("b.txt", "rojo azul"), ("c.txt", "verde azul"), ("d.txt", "negro")],
    );
    let handle = build(idx.path(), &files);
    let snapshot = handle.snapshot();
    let analyzer = SpanishAnalyzer::new();
    let searcher = Searcher::new(&snapshot, &analyzer);
    let docs_of = |q: &str| searcher.matching_docs(&parse(q).unwrap());

    for (t1, t2) in [("rojo", "verde"), ("rojo", "azul"), ("verde", "negro")] {
        let left = docs_of(t1);
        let right = docs_of(t2);
        let and: BTreeSet<u32> = left.intersection(&right).copied().collect();
        let or: BTreeSet<u32> = left.union(&right).copied().collect();
        assert_eq!(docs_of(&format!("{t1} AND {t2}")), and);
        assert_eq!(docs_of(&format!("{t1} OR {t2}")), or);
    }
}

#[test]
fn ranking_is_deterministic() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let files = write_docs(
        docs.path(),
        &[("a.txt", "tren"), ("b.txt", "tren tren avion"), ("c.txt", "avion"), ("d.txt", "tren")],
    );
    let handle = build(idx.path(), &files);
    let first = handle.search("tren OR avion", 150).unwrap();
    for _ in 0..5 {
        assert_eq!(handle.search("tren OR avion", 150).unwrap(), first);
    }
    assert_eq!(first.hits[0].doc_id, 1);
}

#[test]
fn unreadable_documents_are_skipped() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let mut files = write_docs(docs.path(), &[("ok.txt", "hola mundo")]);
    files.push(docs.path().join("missing.txt"));
    let bad = docs.path().join("bad.txt");
    fs::write(&bad, [b'h', 0xff, 0xfe]).unwrap();
    files.push(bad);
    files.push(docs.path().join("ok.txt"));

    let handle = IndexHandle::new(idx.path(), analyzer());
    let mut writer = handle.create().unwrap();
    let report = writer.add_files(&files);
    let kinds: Vec<&str> = report.failed.iter().map(|(_, e)| e.kind()).collect();
    assert_eq!(kinds, vec!["DocumentReadError", "DecodingError", "DuplicateDocument"]);
    assert_eq!(report.indexed.len(), 1);
    writer.commit().unwrap();

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.document_count(), 1);
    assert!(snapshot.validate().is_ok());
}

#[test]
fn readers_keep_their_snapshot_until_commit() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let a = write_docs(docs.path(), &[("a.txt", "nube")]);
    let b = write_docs(docs.path(), &[("b.txt", "nube lluvia")]);
    let handle = build(idx.path(), &a);
    let before = handle.snapshot();

    let mut writer = handle.append().unwrap();
    writer.add_files(&b);
    assert_eq!(handle.search("lluvia", 10).unwrap().total_hits, 0);
    writer.commit().unwrap();

    assert_eq!(before.document_count(), 1);
    assert_eq!(handle.search("lluvia", 10).unwrap().total_hits, 1);
    assert_eq!(handle.search("nube", 10).unwrap().total_hits, 2);
}

#[test]
fn dropped_writer_commits_nothing() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let a = write_docs(docs.path(), &[("a.txt", "nieve")]);
    let handle = build(idx.path(), &a);
    {
        let mut writer = handle.create().unwrap();
        writer.add_files(write_docs(docs.path(), &[("z.txt", "arena")]));
    }
    let reopened = IndexHandle::open(idx.path(), analyzer()).unwrap();
    assert_eq!(reopened.search("nieve", 10).unwrap().total_hits, 1);
    assert_eq!(reopened.search("arena", 10).unwrap().total_hits, 0);
}

#[test]
fn cancelled_batch_stops_between_documents() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let files = write_docs(docs.path(), &[("a.txt", "uno"), ("b.txt", "dos")]);
    let handle = IndexHandle::new(idx.path(), analyzer());
    let mut writer = handle.create().unwrap();
    writer.set_cancel_flag(Arc::new(AtomicBool::new(true)));
    let report = writer.add_files(&files);
    assert!(report.cancelled);
    assert!(report.indexed.is_empty());
}

#[test]
fn corrupted_storage_fails_to_open() {
    let docs = tempdir().unwrap();
    let idx = tempdir().unwrap();
    let files = write_docs(docs.path(), &[("a.txt", "piedra")]);
    build(idx.path(), &files);
    let paths = IndexPaths::new(idx.path());
    let meta = persist::load_meta(&paths).unwrap();
    fs::write(paths.generation_dir(meta.generation).join("docs.bin"), b"garbage").unwrap();
    let err = IndexHandle::open(idx.path(), analyzer()).err().unwrap();
    assert_eq!(err.kind(), "StorageCorruptionError");
}
