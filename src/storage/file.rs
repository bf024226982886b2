//! File-based knowledge store.
//!
//! Each knowledge base is a pretty-printed JSON file named `<name>.json` in
//! `~/.choreo/knowledge/` (or `$CHOREO_HOME/knowledge/`). Writes go through a
//! temp file and a rename.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use tracing::warn;

use crate::config::knowledge_dir;
use crate::error::{ChoreoError, Result};
use crate::program::KnowledgeBase;
use crate::storage::KnowledgeStore;

#[derive(Debug, Clone)]
pub struct FileKnowledgeStore {
    dir: PathBuf,
}

impl FileKnowledgeStore {
    /// A store in the default knowledge directory.
    pub fn new() -> Result<Self> {
        let dir = knowledge_dir().ok_or_else(|| {
            ChoreoError::config("Could not determine knowledge directory (no home directory)")
        })?;
        Self::with_dir(dir)
    }

    /// A store in `dir`, created if missing.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| ChoreoError::storage(&dir, e))?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Names become file names, so they are restricted to a safe alphabet.
    fn kb_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(ChoreoError::storage(
                self.dir.join(name),
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid knowledge base name '{}'", name),
                ),
            ));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", name))
    }

    fn atomic_write(&self, name: &str, kb: &KnowledgeBase) -> Result<()> {
        let final_path = self.kb_path(name)?;
        let temp_path = self.temp_path(name);
        let json = serde_json::to_string_pretty(kb)?;

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| ChoreoError::storage(&temp_path, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| ChoreoError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| ChoreoError::storage(&temp_path, e))?;
        }

        fs::rename(&temp_path, &final_path).map_err(|e| ChoreoError::storage(&final_path, e))?;
        Ok(())
    }
}

impl KnowledgeStore for FileKnowledgeStore {
    fn get(&self, name: &str) -> Result<Option<KnowledgeBase>> {
        let path = self.kb_path(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| ChoreoError::storage(&path, e))?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn put(&self, name: &str, kb: &KnowledgeBase) -> Result<()> {
        self.atomic_write(name, kb)
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|e| ChoreoError::storage(&self.dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ChoreoError::storage(&self.dir, e))?;
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            // Only list files that actually hold a knowledge base.
            match fs::read_to_string(&path)
                .ok()
                .map(|content| serde_json::from_str::<KnowledgeBase>(&content))
            {
                Some(Ok(_)) => names.push(stem.to_string()),
                _ => warn!("skipping unreadable knowledge base {}", path.display()),
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.kb_path(name)?;
        if path.exists() {
            fs::remove_file(&path).map_err(|e| ChoreoError::storage(&path, e))?;
        }
        let temp_path = self.temp_path(name);
        if temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
        }
        Ok(())
    }
}
