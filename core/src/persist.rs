use crate::error::{LexisError, Result};
use crate::{DocId, DocMeta, InvertedIndex, PostingsList};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

/// Footer layout: [payload][magic 4 bytes][CRC32 BE 4 bytes].
const CRC_MAGIC: &[u8; 4] = b"LXC1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub generation: u64,
    pub num_docs: u32,
    pub num_terms: u64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn meta_tmp(&self) -> PathBuf { self.root.join("meta.json.tmp") }
    pub fn lock(&self) -> PathBuf { self.root.join("write.lock") }
    pub fn generation_dir(&self, generation: u64) -> PathBuf { self.root.join(format!("gen-{generation:06}")) }
    fn docs(&self, generation: u64) -> PathBuf { self.generation_dir(generation).join("docs.bin") }
    fn postings(&self, generation: u64) -> PathBuf { self.generation_dir(generation).join("postings.bin") }
}

fn write_checksummed(path: &Path, payload: &[u8]) -> io::Result<()> {
    let crc = crc32fast::hash(payload);
    let mut f = File::create(path)?;
    f.write_all(payload)?;
    f.write_all(CRC_MAGIC)?;
    f.write_all(&crc.to_be_bytes())?;
    f.sync_all()
}

fn read_checksummed(path: &Path) -> Result<Vec<u8>> {
    let mut raw = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LexisError::corrupt(path, "file is missing"),
        _ => LexisError::Io(e),
    })?;
    if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != CRC_MAGIC {
        return Err(LexisError::corrupt(path, "missing checksum footer"));
    }
    let footer = raw.split_off(raw.len() - 8);
    let stored = u32::from_be_bytes([footer[4], footer[5], footer[6], footer[7]]);
    let computed = crc32fast::hash(&raw);
    if stored != computed {
        return Err(LexisError::corrupt(path, format!("CRC32 mismatch: expected {stored:#010x}, got {computed:#010x}")));
    }
    Ok(raw)
}

pub fn save_docs(paths: &IndexPaths, generation: u64, docs: &HashMap<DocId, DocMeta>) -> Result<()> {
    let bytes = bincode::serialize(docs).map_err(|e| io::Error::other(e.to_string()))?;
    write_checksummed(&paths.docs(generation), &bytes)?;
    Ok(())
}

pub fn load_docs(paths: &IndexPaths, generation: u64) -> Result<HashMap<DocId, DocMeta>> {
    let path = paths.docs(generation);
    let bytes = read_checksummed(&path)?;
    bincode::deserialize(&bytes).map_err(|e| LexisError::corrupt(&path, e.to_string()))
}

pub fn save_postings(paths: &IndexPaths, generation: u64, postings: &HashMap<String, PostingsList>) -> Result<()> {
    let bytes = bincode::serialize(postings).map_err(|e| io::Error::other(e.to_string()))?;
    write_checksummed(&paths.postings(generation), &bytes)?;
    Ok(())
}

pub fn load_postings(paths: &IndexPaths, generation: u64) -> Result<HashMap<String, PostingsList>> {
    let path = paths.postings(generation);
    let bytes = read_checksummed(&path)?;
    bincode::deserialize(&bytes).map_err(|e| LexisError::corrupt(&path, e.to_string()))
}

/// Write meta.json through a temp file and rename. The rename is the commit point.
pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let json = serde_json::to_string_pretty(meta).map_err(|e| io::Error::other(e.to_string()))?;
    let tmp = paths.meta_tmp();
    let mut f = File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    f.sync_all()?;
    fs::rename(&tmp, paths.meta())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let path = paths.meta();
    let buf = match fs::read_to_string(&path) {
        Ok(buf) => buf,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(LexisError::IndexNotFound(paths.root.clone())),
        Err(e) => return Err(LexisError::Io(e)),
    };
    let meta: MetaFile = serde_json::from_str(&buf).map_err(|e| LexisError::corrupt(&path, e.to_string()))?;
    if meta.version != FORMAT_VERSION {
        return Err(LexisError::corrupt(&path, format!("unsupported format version {}", meta.version)));
    }
    Ok(meta)
}

/// Load the committed snapshot: meta, then the generation it points to.
pub fn load_index(paths: &IndexPaths) -> Result<(InvertedIndex, MetaFile)> {
    let meta = load_meta(paths)?;
    let docs = load_docs(paths, meta.generation)?;
    let postings = load_postings(paths, meta.generation)?;
    let index = InvertedIndex { postings, docs, num_docs: meta.num_docs };
    index
        .validate()
        .map_err(|reason| LexisError::corrupt(paths.generation_dir(meta.generation), reason))?;
    if index.num_terms() as u64 != meta.num_terms {
        return Err(LexisError::corrupt(paths.meta(), format!("meta lists {} terms, postings hold {}", meta.num_terms, index.num_terms())));
    }
    tracing::info!(root = %paths.root.display(), generation = meta.generation, num_docs = meta.num_docs, "loaded index");
    Ok((index, meta))
}

fn existing_generations(paths: &IndexPaths) -> io::Result<Vec<u64>> {
    let mut gens = Vec::new();
    if !paths.root.is_dir() {
        return Ok(gens);
    }
    for entry in fs::read_dir(&paths.root)? {
        let name = entry?.file_name();
        if let Some(n) = name.to_str().and_then(|s| s.strip_prefix("gen-")).and_then(|s| s.parse().ok()) {
            gens.push(n);
        }
    }
    gens.sort_unstable();
    Ok(gens)
}

/// Persist `index` as a new generation and publish it. On failure the previous
/// snapshot stays current and the partial generation is removed.
pub fn save_index(paths: &IndexPaths, index: &InvertedIndex) -> Result<MetaFile> {
    fs::create_dir_all(&paths.root)?;
    let existing = existing_generations(paths)?;
    // Unreadable meta means nothing is committed; CREATE may still overwrite it.
    let committed = load_meta(paths).ok().map(|m| m.generation);
    let generation = existing.last().copied().max(committed).map_or(1, |g| g + 1);
    let meta = MetaFile {
        version: FORMAT_VERSION,
        generation,
        num_docs: index.num_docs,
        num_terms: index.num_terms() as u64,
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "".into()),
    };

    let written = fs::create_dir(paths.generation_dir(generation))
        .map_err(LexisError::from)
        .and_then(|_| save_docs(paths, generation, &index.docs))
        .and_then(|_| save_postings(paths, generation, &index.postings))
        .and_then(|_| save_meta(paths, &meta));
    if let Err(e) = written {
        tracing::warn!(generation, error = %e, "commit failed, discarding partial generation");
        let _ = fs::remove_dir_all(paths.generation_dir(generation));
        return Err(e);
    }

    // Keep the generation this commit replaced for readers that loaded the old meta.json;
    // anything else, including directories left by failed commits, is unreachable.
    for old in existing.into_iter().filter(|g| Some(*g) != committed) {
        if let Err(e) = fs::remove_dir_all(paths.generation_dir(old)) {
            tracing::warn!(generation = old, error = %e, "failed to prune old generation");
        }
    }
    tracing::info!(root = %paths.root.display(), generation, num_docs = meta.num_docs, num_terms = meta.num_terms, "index committed");
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> InvertedIndex {
        let mut idx = InvertedIndex::new();
        let meta = DocMeta { path: "a.txt".into(), text_len: 11, term_count: 2 };
        idx.add_document(0, meta, vec![("gato".to_string(), 0), ("corre".to_string(), 1)]);
        idx
    }

    #[test]
    fn missing_index_is_not_found() {
        let dir = tempdir().unwrap();
        let err = load_index(&IndexPaths::new(dir.path())).unwrap_err();
        assert_eq!(err.kind(), "IndexNotFoundError");
    }

    #[test]
    fn flipped_byte_is_corruption() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let meta = save_index(&paths, &sample()).unwrap();
        let file = paths.postings(meta.generation);
        let mut bytes = fs::read(&file).unwrap();
        bytes[0] ^= 0xff;
        fs::write(&file, bytes).unwrap();
        let err = load_index(&paths).unwrap_err();
        assert_eq!(err.kind(), "StorageCorruptionError");
    }

    #[test]
    fn garbage_meta_is_corruption() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        fs::write(paths.meta(), "{ not json").unwrap();
        assert_eq!(load_index(&paths).unwrap_err().kind(), "StorageCorruptionError");
    }

    #[test]
    fn old_generations_are_pruned() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        for _ in 0..3 {
            save_index(&paths, &sample()).unwrap();
        }
        assert_eq!(existing_generations(&paths).unwrap(), vec![2, 3]);
        let (_, meta) = load_index(&paths).unwrap();
        assert_eq!(meta.generation, 3);
    }

    #[test]
    fn stray_generation_dirs_do_not_survive_a_commit() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        save_index(&paths, &sample()).unwrap();
        fs::create_dir(paths.generation_dir(2)).unwrap();

        let meta = save_index(&paths, &sample()).unwrap();
        assert_eq!(meta.generation, 3);
        assert_eq!(existing_generations(&paths).unwrap(), vec![1, 3]);

        let meta = save_index(&paths, &sample()).unwrap();
        assert_eq!(meta.generation, 4);
        assert_eq!(existing_generations(&paths).unwrap(), vec![3, 4]);
        let (index, loaded) = load_index(&paths).unwrap();
        assert_eq!(loaded, meta);
        assert_eq!(index, sample());
    }
}
