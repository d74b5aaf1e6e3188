use std::collections::HashSet;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};

use crate::identity::clean_path;

/// Shared lookup-or-create namespace for paths under the source and build
/// roots.
///
/// Generation tasks run on parallel threads and all resolve generator-reported
/// paths against this single namespace. The internal lock is held only for
/// the duration of one resolution, never for a whole task, so unrelated I/O
/// stays parallel while duplicate-node races are impossible. Callers never
/// take the lock directly.
#[derive(Debug)]
pub struct PathRegistry {
    source_root: Utf8PathBuf,
    build_root: Utf8PathBuf,
    declared: Mutex<HashSet<Utf8PathBuf>>,
}

impl PathRegistry {
    pub fn new(source_root: impl Into<Utf8PathBuf>, build_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            build_root: build_root.into(),
            declared: Mutex::new(HashSet::new()),
        }
    }

    pub fn source_root(&self) -> &Utf8Path {
        &self.source_root
    }

    pub fn build_root(&self) -> &Utf8Path {
        &self.build_root
    }

    /// Normalize a path to an absolute, forward-slash form. Relative paths
    /// are assumed relative to the source root.
    pub fn absolutize(&self, path: &Utf8Path) -> Utf8PathBuf {
        let path = Utf8PathBuf::from(clean_path(path));
        if path.is_absolute() {
            path
        } else {
            self.source_root.join(path)
        }
    }

    /// Resolve a generator-reported output path to a build-root-relative
    /// node. The file must exist on disk under the build root, or have been
    /// declared earlier; otherwise the generator claimed to produce a file
    /// that does not exist.
    pub fn resolve_output(&self, path: &Utf8Path) -> Option<Utf8PathBuf> {
        let rel = self.relative_to(path, &self.build_root)?;

        let mut declared = self.declared.lock().unwrap();
        if declared.contains(&rel) || self.build_root.join(&rel).is_file() {
            declared.insert(rel.clone());
            return Some(rel);
        }

        None
    }

    /// Resolve a generator-reported dependency path to a source-root-relative
    /// node, if the file exists.
    pub fn resolve_dependency(&self, path: &Utf8Path) -> Option<Utf8PathBuf> {
        let rel = self.relative_to(path, &self.source_root)?;

        let declared = self.declared.lock().unwrap();
        if declared.contains(&rel) || self.source_root.join(&rel).is_file() {
            return Some(rel);
        }

        None
    }

    /// Declare a build-root-relative node that is about to be written, so a
    /// later resolution finds it even before the file hits the disk.
    pub fn declare(&self, rel: impl Into<Utf8PathBuf>) -> Utf8PathBuf {
        let rel = rel.into();
        self.declared.lock().unwrap().insert(rel.clone());
        rel
    }

    fn relative_to(&self, path: &Utf8Path, root: &Utf8Path) -> Option<Utf8PathBuf> {
        let path = Utf8PathBuf::from(clean_path(path));
        if path.is_absolute() {
            path.strip_prefix(root).ok().map(Utf8Path::to_owned)
        } else {
            Some(path)
        }
    }
}
