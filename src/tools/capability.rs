//! Filesystem capability boundary for tool execution
//!
//! Tools declare the paths a call would touch; the executor checks them
//! against a `PathPolicy` before invoking anything.

use super::ToolError;
use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Kind of access a tool needs on a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// One path a tool call intends to touch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRequest {
    pub path: PathBuf,
    pub access: Access,
}

impl PathRequest {
    pub fn read(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            access: Access::Read,
        }
    }

    pub fn write(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            access: Access::Write,
        }
    }
}

/// Allow-list of directory roots plus a write switch
#[derive(Debug, Clone)]
pub struct PathPolicy {
    roots: Vec<PathBuf>,
    unrestricted: bool,
    read_only: bool,
}

impl PathPolicy {
    /// Allow any path the process can reach. Must be opted into explicitly.
    pub fn unrestricted() -> Self {
        Self {
            roots: Vec::new(),
            unrestricted: true,
            read_only: false,
        }
    }

    /// Allow only paths under the given roots (which must exist)
    pub fn confined_to<I, P>(roots: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = roots
            .into_iter()
            .map(|root| {
                let root = root.as_ref();
                root.canonicalize()
                    .with_context(|| format!("allowed path does not exist: {}", root.display()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            roots,
            unrestricted: false,
            read_only: false,
        })
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.unrestricted
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Check a single request, resolving symlinks and `..` first
    pub fn check(&self, request: &PathRequest) -> Result<(), ToolError> {
        if self.read_only && request.access == Access::Write {
            return Err(ToolError::PermissionDenied(format!(
                "write access is disabled ({})",
                request.path.display()
            )));
        }

        if self.unrestricted {
            return Ok(());
        }

        let resolved = normalize(&request.path);
        if self.roots.iter().any(|root| resolved.starts_with(root)) {
            Ok(())
        } else {
            Err(ToolError::PermissionDenied(format!(
                "{} is outside the allowed directories",
                request.path.display()
            )))
        }
    }
}

/// Absolute, symlink-free form of `path`, even when it does not exist yet
///
/// The longest existing ancestor is canonicalized and the remaining
/// components are applied lexically.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    if let Ok(canonical) = absolute.canonicalize() {
        return canonical;
    }

    let components: Vec<Component> = absolute.components().collect();
    for split in (0..components.len()).rev() {
        let ancestor: PathBuf = components[..split].iter().collect();
        let Ok(mut resolved) = ancestor.canonicalize() else {
            continue;
        };
        for component in &components[split..] {
            match component {
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::CurDir => {}
                other => resolved.push(other),
            }
        }
        return resolved;
    }

    absolute
}
