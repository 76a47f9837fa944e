//! Conversation asset catalog.
//!
//! A conversation is a named folder under the conversations root holding a
//! `def.json` with one entry per bot plus the media assets those entries
//! point at. Scanning is permissive: hidden folders are ignored and a
//! conversation without a `def.json` simply has no bots to launch.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "no conversation assets found under {root}; check that the \
         conversations folder sits next to the injector"
    )]
    NoAssets { root: PathBuf },

    #[error("malformed {path}: {source}")]
    Definitions {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// One bot entry from a conversation's `def.json`.
///
/// `media` is optional at parse time because stop runs never resolve it;
/// start runs enforce its presence per bot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BotDefinition {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Yaw rotation.
    pub r: f64,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub t1: Option<String>,
    #[serde(default)]
    pub t2: Option<String>,
}

/// List the immediate non-hidden subdirectories of `root`, sorted
/// ascending by name for deterministic selector matching.
pub fn scan_conversations(root: &Path) -> Result<Vec<String>, CatalogError> {
    let mut conversations = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        conversations.push(name);
    }
    conversations.sort();

    if conversations.is_empty() {
        return Err(CatalogError::NoAssets {
            root: root.to_path_buf(),
        });
    }
    Ok(conversations)
}

/// Load the bot definitions for one conversation folder.
///
/// A missing `def.json` means "no bots to launch" and returns an empty
/// list; a present but malformed one is an error.
pub fn load_definitions(conversation_dir: &Path) -> Result<Vec<BotDefinition>, CatalogError> {
    let path = conversation_dir.join("def.json");
    let data = match std::fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&data).map_err(|source| CatalogError::Definitions { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mkdirs(root: &Path, names: &[&str]) {
        for name in names {
            std::fs::create_dir_all(root.join(name)).unwrap();
        }
    }

    #[test]
    fn scan_sorts_and_skips_hidden() {
        let tmp = tempfile::TempDir::new().unwrap();
        mkdirs(tmp.path(), &["01_outro", ".git", "00_intro", "02_extra"]);
        std::fs::write(tmp.path().join("notes.txt"), "not a dir").unwrap();

        let convs = scan_conversations(tmp.path()).unwrap();
        assert_eq!(convs, vec!["00_intro", "01_outro", "02_extra"]);
    }

    #[test]
    fn empty_root_is_no_assets() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = scan_conversations(tmp.path()).unwrap_err();
        assert!(matches!(err, CatalogError::NoAssets { .. }));
    }

    #[test]
    fn only_hidden_dirs_is_no_assets() {
        let tmp = tempfile::TempDir::new().unwrap();
        mkdirs(tmp.path(), &[".hidden"]);
        let err = scan_conversations(tmp.path()).unwrap_err();
        assert!(matches!(err, CatalogError::NoAssets { .. }));
    }

    #[test]
    fn missing_def_json_means_no_bots() {
        let tmp = tempfile::TempDir::new().unwrap();
        let defs = load_definitions(tmp.path()).unwrap();
        assert!(defs.is_empty());
    }

    #[test]
    fn definitions_parse_with_optional_fields() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("def.json"),
            r#"[
              {"name": "alice", "x": 1.0, "y": 0.0, "z": 2.0, "r": 90.0,
               "media": "alice.mp4", "t1": "speaker"},
              {"name": "bob", "x": -1.0, "y": 0.0, "z": 2.0, "r": 270.0,
               "media": "bob.wav"}
            ]"#,
        )
        .unwrap();

        let defs = load_definitions(tmp.path()).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "alice");
        assert_eq!(defs[0].t1.as_deref(), Some("speaker"));
        assert_eq!(defs[0].t2, None);
        assert_eq!(defs[1].media.as_deref(), Some("bob.wav"));
    }

    #[test]
    fn malformed_def_json_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("def.json"), "[{").unwrap();
        let err = load_definitions(tmp.path()).unwrap_err();
        assert!(matches!(err, CatalogError::Definitions { .. }));
    }
}
