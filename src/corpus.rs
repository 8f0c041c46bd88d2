//! Document sources the index is rebuilt from.
//!
//! A rebuild enumerates the whole corpus through the [`Corpus`] trait.
//! [`FsCorpus`] scans a directory of note files; [`StaticCorpus`] holds
//! documents in memory and is what embedders of the library (and the
//! tests) hand to the index manager directly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use blinko_ai_core::models::Document;

use crate::config::CorpusConfig;

#[async_trait]
pub trait Corpus: Send + Sync {
    /// Every document currently in the corpus, ordered by source id.
    async fn documents(&self) -> Result<Vec<Document>>;
}

/// Note files under a root directory, filtered by include/exclude globs.
///
/// The source id of each document is its path relative to the root.
#[derive(Clone)]
pub struct FsCorpus {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl FsCorpus {
    pub fn new(config: &CorpusConfig) -> Result<Self> {
        let mut excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        excludes.extend(config.exclude_globs.iter().cloned());

        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&excludes)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load one note file under the same source id a scan would give it.
    ///
    /// Fails for files outside the root or filtered out by the globs, since
    /// the next rebuild would drop anything indexed under them.
    pub fn document_for(&self, path: &Path) -> Result<Document> {
        let root = self
            .root
            .canonicalize()
            .with_context(|| format!("Corpus root does not exist: {}", self.root.display()))?;
        let file = path
            .canonicalize()
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let relative = file
            .strip_prefix(&root)
            .with_context(|| format!("{} is outside the corpus root {}", path.display(), root.display()))?;
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
            bail!("{} is excluded from the corpus by its globs", path.display());
        }
        file_to_document(&file, &rel_str)
    }

    fn scan(&self) -> Result<Vec<Document>> {
        if !self.root.exists() {
            bail!("Corpus root does not exist: {}", self.root.display());
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(self.follow_symlinks) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }

            match file_to_document(path, &rel_str) {
                Ok(doc) => documents.push(doc),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable note file"),
            }
        }

        documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(documents)
    }
}

#[async_trait]
impl Corpus for FsCorpus {
    async fn documents(&self) -> Result<Vec<Document>> {
        let corpus = self.clone();
        tokio::task::spawn_blocking(move || corpus.scan())
            .await
            .map_err(|e| anyhow!("corpus scan panicked: {}", e))?
    }
}

fn file_to_document(path: &Path, relative_path: &str) -> Result<Document> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(Document {
        source_id: relative_path.to_string(),
        title: path.file_stem().map(|n| n.to_string_lossy().to_string()),
        body,
        updated_at: modified,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// In-memory corpus keyed by source id.
#[derive(Default)]
pub struct StaticCorpus {
    documents: RwLock<BTreeMap<String, Document>>,
}

impl StaticCorpus {
    pub fn new(documents: impl IntoIterator<Item = Document>) -> Self {
        let corpus = Self::default();
        for doc in documents {
            corpus.insert(doc);
        }
        corpus
    }

    pub fn insert(&self, document: Document) {
        if let Ok(mut docs) = self.documents.write() {
            docs.insert(document.source_id.clone(), document);
        }
    }

    pub fn remove(&self, source_id: &str) -> Option<Document> {
        self.documents.write().ok()?.remove(source_id)
    }
}

#[async_trait]
impl Corpus for StaticCorpus {
    async fn documents(&self) -> Result<Vec<Document>> {
        let docs = self
            .documents
            .read()
            .map_err(|_| anyhow!("corpus lock poisoned"))?;
        Ok(docs.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(root: &Path) -> CorpusConfig {
        CorpusConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: vec!["drafts/**".to_string()],
            follow_symlinks: false,
        }
    }

    #[tokio::test]
    async fn test_fs_corpus_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("work")).unwrap();
        std::fs::create_dir_all(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("work/b.md"), "# B").unwrap();
        std::fs::write(dir.path().join("a.md"), "# A").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "plain").unwrap();
        std::fs::write(dir.path().join("drafts/c.md"), "# C").unwrap();

        let corpus = FsCorpus::new(&config(dir.path())).unwrap();
        let docs = corpus.documents().await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a.md", "work/b.md"]);
        assert_eq!(docs[0].title.as_deref(), Some("a"));
        assert_eq!(docs[1].body, "# B");
    }

    #[tokio::test]
    async fn test_document_for_matches_scan_source_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("work")).unwrap();
        std::fs::create_dir_all(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("work/b.md"), "# B").unwrap();
        std::fs::write(dir.path().join("drafts/c.md"), "# C").unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("x.md"), "# X").unwrap();

        let corpus = FsCorpus::new(&config(dir.path())).unwrap();
        let scanned = corpus.documents().await.unwrap();
        let single = corpus
            .document_for(&dir.path().join("work/../work/b.md"))
            .unwrap();
        assert_eq!(single.source_id, scanned[0].source_id);
        assert_eq!(single.body, "# B");

        assert!(corpus.document_for(&dir.path().join("drafts/c.md")).is_err());
        assert!(corpus.document_for(&outside.path().join("x.md")).is_err());
    }

    #[tokio::test]
    async fn test_fs_corpus_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = FsCorpus::new(&config(&dir.path().join("missing"))).unwrap();
        assert!(corpus.documents().await.is_err());
    }

    #[tokio::test]
    async fn test_static_corpus_replaces_by_source_id() {
        let corpus = StaticCorpus::new([Document::new("n1", "first"), Document::new("n2", "second")]);
        corpus.insert(Document::new("n1", "edited"));
        let docs = corpus.documents().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].body, "edited");

        assert!(corpus.remove("n2").is_some());
        assert_eq!(corpus.documents().await.unwrap().len(), 1);
    }
}
