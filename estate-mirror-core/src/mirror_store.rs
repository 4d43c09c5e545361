//! On-disk layout of the local bare mirrors: `<root>/<workspace>/<project>/<repository>.git`.
//!
//! The tree is the only durable sync state. Nothing is cached; every question
//! is answered from the filesystem at the time it is asked.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::contract::NamespaceTriple;
use crate::error::MirrorStoreError;

const MIRROR_SUFFIX: &str = ".git";

#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/<workspace>/<project>`, without touching the filesystem.
    pub fn namespace_dir(&self, triple: &NamespaceTriple) -> Result<PathBuf, MirrorStoreError> {
        Ok(self
            .root
            .join(component(&triple.workspace)?)
            .join(component(&triple.project)?))
    }

    /// `<root>/<workspace>/<project>/<repository>.git`
    pub fn mirror_path(&self, triple: &NamespaceTriple) -> Result<PathBuf, MirrorStoreError> {
        let repository = component(&triple.repository)?;
        Ok(self
            .namespace_dir(triple)?
            .join(format!("{repository}{MIRROR_SUFFIX}")))
    }

    /// Create the namespace directory if it is missing and return it.
    pub fn ensure_namespace_dir(
        &self,
        triple: &NamespaceTriple,
    ) -> Result<PathBuf, MirrorStoreError> {
        let dir = self.namespace_dir(triple)?;
        fs::create_dir_all(&dir).map_err(|source| MirrorStoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        debug!(path = %dir.display(), "Namespace directory ready");
        Ok(dir)
    }

    /// Whether a bare mirror directory is present for the triple.
    pub fn mirror_exists(&self, triple: &NamespaceTriple) -> bool {
        self.mirror_path(triple)
            .map(|path| path.is_dir())
            .unwrap_or(false)
    }

    /// Every mirror already on disk, as triples, sorted. A missing root is an
    /// empty store.
    pub fn local_triples(&self) -> Result<Vec<NamespaceTriple>, MirrorStoreError> {
        let mut triples = Vec::new();
        if !self.root.is_dir() {
            return Ok(triples);
        }

        for workspace in subdirectories(&self.root)? {
            for project in subdirectories(&self.root.join(&workspace))? {
                let project_dir = self.root.join(&workspace).join(&project);
                for entry in subdirectories(&project_dir)? {
                    if let Some(repository) = entry.strip_suffix(MIRROR_SUFFIX) {
                        if !repository.is_empty() {
                            triples.push(NamespaceTriple::new(
                                workspace.clone(),
                                project.clone(),
                                repository,
                            ));
                        }
                    }
                }
            }
        }

        triples.sort();
        Ok(triples)
    }
}

fn component(raw: &str) -> Result<&str, MirrorStoreError> {
    let invalid = raw.is_empty()
        || raw == "."
        || raw == ".."
        || raw.contains('/')
        || raw.contains('\\')
        || raw.contains('\0');
    if invalid {
        Err(MirrorStoreError::InvalidComponent {
            component: raw.to_string(),
        })
    } else {
        Ok(raw)
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<String>, MirrorStoreError> {
    let read_err = |source: std::io::Error| MirrorStoreError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if entry.file_type().map_err(read_err)?.is_dir() {
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(names)
}
