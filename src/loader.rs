//! Template source backends.
//!
//! A loader turns a template path into a stable identifier (`resolve`) and the
//! identifier into bytes (`read`). `inherit` re-roots a loader at a template so
//! paths written inside that template resolve relative to it first.

use crate::Result;
use crate::error::Error;
use dashmap::DashMap;
use log::debug;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub trait Loader: Send + Sync + fmt::Debug {
    /// Maps a path as written in a template (or passed by the host) to an id.
    fn resolve(&self, path: &str) -> Result<String>;

    fn read(&self, id: &str) -> Result<Box<dyn Read + Send>>;

    /// A loader whose relative base is the directory of `from`. An empty `from`
    /// yields an equivalent copy.
    fn inherit(&self, from: &str) -> Result<Arc<dyn Loader>>;

    /// Ids of every template matching a glob pattern.
    fn list(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Reads a whole template source through a loader.
pub fn read_source(loader: &dyn Loader, id: &str) -> Result<String> {
    let mut reader = loader.read(id)?;
    let mut source = String::new();
    reader
        .read_to_string(&mut source)
        .map_err(|e| Error::Loader(format!("failed to read template '{}': {}", id, e)))?;
    Ok(source)
}

/// Lexical normalization: drops `.` and folds `..` without touching the disk.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn normalize_name(name: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn parent_name(id: &str) -> &str {
    id.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Templates stored on disk under a root directory. Ids are `/`-separated
/// paths relative to that root.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
    base: PathBuf,
}

impl FileSystemLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = normalize(root.as_ref());
        Self {
            base: root.clone(),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn to_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The file behind `id`, or `None` when the id points outside the root.
    fn to_path(&self, id: &str) -> Option<PathBuf> {
        let path = normalize(&self.root.join(id.trim_start_matches('/')));
        path.starts_with(&self.root).then_some(path)
    }
}

impl Loader for FileSystemLoader {
    fn resolve(&self, path: &str) -> Result<String> {
        let relative = path.trim_start_matches('/');
        let mut candidates = vec![normalize(&self.base.join(relative))];
        if self.base != self.root {
            candidates.push(normalize(&self.root.join(relative)));
        }
        for candidate in candidates {
            if candidate.starts_with(&self.root) && candidate.is_file() {
                let id = self.to_id(&candidate);
                debug!("Resolved template '{}' to '{}'", path, id);
                return Ok(id);
            }
        }
        Err(Error::TemplateNotFound(path.to_string()))
    }

    fn read(&self, id: &str) -> Result<Box<dyn Read + Send>> {
        let Some(path) = self.to_path(id) else {
            return Err(Error::TemplateNotFound(id.to_string()));
        };
        match File::open(path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::TemplateNotFound(id.to_string()))
            }
            Err(e) => Err(Error::Loader(format!("failed to open '{}': {}", id, e))),
        }
    }

    fn inherit(&self, from: &str) -> Result<Arc<dyn Loader>> {
        let base = if from.is_empty() {
            self.base.clone()
        } else {
            match self.to_path(from) {
                Some(path) => path.parent().map_or_else(|| self.root.clone(), normalize),
                None => return Err(Error::TemplateNotFound(from.to_string())),
            }
        };
        Ok(Arc::new(FileSystemLoader {
            root: self.root.clone(),
            base,
        }))
    }

    fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let full = self.root.join(pattern);
        let full = full.to_string_lossy();
        let paths = glob::glob(&full)
            .map_err(|e| Error::Loader(format!("invalid glob pattern '{}': {}", pattern, e)))?;
        let mut ids = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| Error::Loader(format!("cannot read path: {}", e)))?;
            if path.is_file() {
                ids.push(self.to_id(&normalize(&path)));
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Templates held in memory, shared between a loader and everything inherited
/// from it. Ids are normalized `/`-separated names.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: Arc<DashMap<String, Arc<str>>>,
    base: String,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a loader from `(name, source)` pairs, e.g. the output of
    /// `template_assets!`.
    pub fn from_assets(assets: Vec<(&str, &str)>) -> Self {
        let loader = Self::new();
        for (name, source) in assets {
            loader.add(name, source);
        }
        loader
    }

    pub fn add(&self, name: &str, source: impl Into<String>) -> &Self {
        let source: String = source.into();
        self.templates.insert(normalize_name(name), Arc::from(source));
        self
    }

    pub fn remove(&self, name: &str) -> bool {
        self.templates.remove(&normalize_name(name)).is_some()
    }
}

impl Loader for MemoryLoader {
    fn resolve(&self, path: &str) -> Result<String> {
        let mut candidates = Vec::with_capacity(2);
        if !self.base.is_empty() && !path.starts_with('/') {
            candidates.push(normalize_name(&format!("{}/{}", self.base, path)));
        }
        candidates.push(normalize_name(path));
        for candidate in candidates {
            if self.templates.contains_key(&candidate) {
                debug!("Resolved template '{}' to '{}'", path, candidate);
                return Ok(candidate);
            }
        }
        Err(Error::TemplateNotFound(path.to_string()))
    }

    fn read(&self, id: &str) -> Result<Box<dyn Read + Send>> {
        let source = self
            .templates
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::TemplateNotFound(id.to_string()))?;
        Ok(Box::new(io::Cursor::new(source.as_bytes().to_vec())))
    }

    fn inherit(&self, from: &str) -> Result<Arc<dyn Loader>> {
        let base = if from.is_empty() {
            self.base.clone()
        } else {
            parent_name(&normalize_name(from)).to_string()
        };
        Ok(Arc::new(MemoryLoader {
            templates: self.templates.clone(),
            base,
        }))
    }

    fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| Error::Loader(format!("invalid glob pattern: {}", e)))?;
        let mut ids: Vec<String> = self
            .templates
            .iter()
            .filter(|entry| pattern.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> FileSystemLoader {
        FileSystemLoader::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/templates"))
    }

    #[test]
    fn test_memory_relative_resolution_falls_back_to_root() {
        let loader = MemoryLoader::new();
        loader
            .add("layout.html", "root layout")
            .add("pages/layout.html", "page layout")
            .add("pages/index.html", "index")
            .add("shared/nav.html", "nav");

        let pages = loader.inherit("pages/index.html").unwrap();
        assert_eq!(pages.resolve("layout.html").unwrap(), "pages/layout.html");
        assert_eq!(pages.resolve("shared/nav.html").unwrap(), "shared/nav.html");
        assert_eq!(pages.resolve("../layout.html").unwrap(), "layout.html");
        assert_eq!(pages.resolve("/layout.html").unwrap(), "layout.html");
        assert!(pages.resolve("missing.html").unwrap_err().is_not_found());

        let same = loader.inherit("").unwrap();
        assert_eq!(same.resolve("layout.html").unwrap(), "layout.html");
    }

    #[test]
    fn test_memory_read_and_list() {
        let loader = MemoryLoader::from_assets(vec![
            ("./a.html", "A"),
            ("dir/b.html", "B"),
            ("dir/c.txt", "C"),
        ]);
        assert_eq!(read_source(&loader, "a.html").unwrap(), "A");
        assert_eq!(loader.list("**/*.html").unwrap(), vec!["a.html", "dir/b.html"]);
        assert!(matches!(
            loader.read("nope"),
            Err(Error::TemplateNotFound(_))
        ));
    }

    #[test]
    fn test_filesystem_resolution() {
        let loader = fixtures();
        assert_eq!(loader.resolve("base.html").unwrap(), "base.html");

        let pages = loader.inherit("pages/child.html").unwrap();
        assert_eq!(pages.resolve("base.html").unwrap(), "base.html");
        assert_eq!(pages.resolve("child.html").unwrap(), "pages/child.html");
        assert!(matches!(
            pages.resolve("nowhere.html"),
            Err(Error::TemplateNotFound(_))
        ));

        let source = read_source(&loader, "base.html").unwrap();
        assert!(source.contains("block title"));
    }

    #[test]
    fn test_filesystem_stays_under_root() {
        let loader = fixtures();
        assert!(loader.resolve("../render_test.rs").unwrap_err().is_not_found());
        assert!(loader.resolve("/../render_test.rs").unwrap_err().is_not_found());
        assert!(loader.read("../render_test.rs").is_err());
        assert!(loader.inherit("../render_test.rs").is_err());

        let pages = loader.inherit("pages/child.html").unwrap();
        assert!(pages.resolve("../../render_test.rs").unwrap_err().is_not_found());
        assert_eq!(pages.resolve("../base.html").unwrap(), "base.html");
    }

    #[test]
    fn test_filesystem_list() {
        let ids = fixtures().list("**/*.html").unwrap();
        assert!(ids.contains(&"base.html".to_string()));
        assert!(ids.contains(&"pages/child.html".to_string()));
    }
}
