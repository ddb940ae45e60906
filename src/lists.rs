//! Script and scene file lists, plus the list-file format.
//!
//! A list file is plain text holding one path per entry. Entries are either double-quoted
//! (and may contain spaces) or bare whitespace-free tokens. Backslashes are normalized to `/`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Script,
    Scene,
}

impl FileKind {
    pub fn label(self) -> &'static str {
        match self {
            FileKind::Script => "script files",
            FileKind::Scene => "scene files",
        }
    }
}

/// What happened to a batch of paths offered to a [`FileList`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub added: usize,
    pub duplicates: Vec<PathBuf>,
    /// Paths whose extension does not belong in this list.
    pub rejected: Vec<PathBuf>,
}

/// Ordered list of files of one kind. Duplicate-free unless built with
/// [`FileList::keep_duplicates`].
#[derive(Debug, Clone)]
pub struct FileList {
    kind: FileKind,
    extensions: Vec<String>,
    entries: Vec<PathBuf>,
    unique: bool,
}

impl FileList {
    pub fn new(kind: FileKind, extensions: &[String]) -> Self {
        Self {
            kind,
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            entries: Vec::new(),
            unique: true,
        }
    }

    /// Accept repeated paths. Positional pairing needs this: the same script may be meant for
    /// several scenes.
    pub fn keep_duplicates(mut self, keep: bool) -> Self {
        self.unique = !keep;
        self
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `path` has one of this list's extensions (case-insensitive).
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    pub fn add<I>(&mut self, paths: I) -> AddOutcome
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut outcome = AddOutcome::default();
        let mut known: Vec<PathBuf> = self.entries.iter().map(|p| normalize(p)).collect();
        for path in paths {
            if !self.accepts(&path) {
                outcome.rejected.push(path);
                continue;
            }
            let key = normalize(&path);
            if self.unique && known.contains(&key) {
                outcome.duplicates.push(path);
                continue;
            }
            known.push(key);
            self.entries.push(path);
            outcome.added += 1;
        }
        outcome
    }

    pub fn remove(&mut self, index: usize) -> Option<PathBuf> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Comparison key: absolute, and case-folded where the filesystem is case-insensitive.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let cleaned: PathBuf = absolute.components().collect();
    if cfg!(windows) {
        PathBuf::from(cleaned.to_string_lossy().to_lowercase())
    } else {
        cleaned
    }
}

/// Split list-file text into paths.
pub fn parse_list(content: &str) -> Vec<PathBuf> {
    let content = content.replace('\\', "/");
    let mut out = Vec::new();
    let mut chars = content.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let quoted: String = chars.by_ref().take_while(|&c| c != '"').collect();
            if !quoted.trim().is_empty() {
                out.push(PathBuf::from(quoted));
            }
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' {
                    break;
                }
                token.push(c);
                chars.next();
            }
            out.push(PathBuf::from(token));
        }
    }
    out
}

/// Entries of a list file routed by extension. Only files that exist are kept.
#[derive(Debug, Default)]
pub struct ListFileEntries {
    pub scripts: Vec<PathBuf>,
    pub scenes: Vec<PathBuf>,
}

pub fn load_list_file(path: &Path, scripts: &FileList, scenes: &FileList) -> Result<ListFileEntries> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read list file {}", path.display()))?;
    let mut entries = ListFileEntries::default();
    for p in parse_list(&content) {
        if !p.exists() {
            tracing::debug!(path = %p.display(), "list entry does not exist, skipping");
            continue;
        }
        if scripts.accepts(&p) {
            entries.scripts.push(p);
        } else if scenes.accepts(&p) {
            entries.scenes.push(p);
        }
    }
    Ok(entries)
}
