//! Knowledge-base loader.
//!
//! Walks the configured knowledge-base directory and loads every text file
//! matching the include globs. Each file becomes one [`KnowledgeDocument`]
//! tagged with its path relative to the root. Unreadable files are skipped
//! with a warning rather than aborting the batch.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::KnowledgeBaseConfig;
use crate::models::KnowledgeDocument;

pub fn load_documents(config: &KnowledgeBaseConfig) -> Result<Vec<KnowledgeDocument>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Knowledge base directory not found: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if !include_set.is_match(&rel_str) {
            continue;
        }

        match std::fs::read_to_string(path) {
            Ok(body) => documents.push(KnowledgeDocument {
                source: rel_str,
                body,
            }),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unreadable file");
            }
        }
    }

    // Sort for deterministic ordering
    documents.sort_by(|a, b| a.source.cmp(&b.source));

    Ok(documents)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn kb_config(root: &std::path::Path) -> KnowledgeBaseConfig {
        KnowledgeBaseConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.txt".to_string()],
        }
    }

    #[test]
    fn loads_only_matching_files_in_order() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("soil.txt"), "Soil basics.").unwrap();
        fs::write(tmp.path().join("crops.txt"), "Crop rotation.").unwrap();
        fs::write(tmp.path().join("notes.md"), "Ignored markdown.").unwrap();

        let docs = load_documents(&kb_config(tmp.path())).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source, "crops.txt");
        assert_eq!(docs[1].source, "soil.txt");
        assert_eq!(docs[1].body, "Soil basics.");
    }

    #[test]
    fn walks_subdirectories() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("pests")).unwrap();
        fs::write(tmp.path().join("pests").join("aphids.txt"), "Aphid control.").unwrap();

        let docs = load_documents(&kb_config(tmp.path())).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].source.ends_with("aphids.txt"));
    }

    #[test]
    fn unreadable_file_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("good.txt"), "Compost basics.").unwrap();
        // Not valid UTF-8, so reading it as text fails.
        fs::write(tmp.path().join("binary.txt"), [0xffu8, 0xfe, 0x00, 0xba]).unwrap();

        let docs = load_documents(&kb_config(tmp.path())).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "good.txt");
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(load_documents(&kb_config(&missing)).is_err());
    }
}
