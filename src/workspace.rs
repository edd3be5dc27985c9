//! Ephemeral workspaces for rule tests.
//!
//! A workspace is a uniquely named temporary directory owned by exactly one
//! rule test. Removal is tied to `Drop`, so the directory goes away on every
//! exit path: normal return, error, panic, or a cancelled future.
//!
//! Workflow engines may leave directories without the write bit behind
//! (protected outputs). When a plain recursive removal fails, write
//! permission is restored on every directory in the tree and the removal is
//! retried once.

use crate::executor::RuleTestError;
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the execution root inside the temporary directory.
pub const WORKDIR_NAME: &str = "workdir";

const TEMP_PREFIX: &str = "ruletest-";

/// A temporary directory holding the `workdir` of one rule test.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    workdir: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Creates a fresh workspace, under `parent` if given or under the system
    /// temporary directory otherwise. The `workdir` itself is not created yet.
    pub fn create(parent: Option<&Path>) -> Result<Self, RuleTestError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);
        let root = match parent {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(RuleTestError::Workspace)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(RuleTestError::Workspace)?
        .keep();

        let workdir = root.join(WORKDIR_NAME);
        debug!("Created workspace at {}", root.display());
        Ok(Self {
            root,
            workdir,
            removed: false,
        })
    }

    /// The temporary directory that owns everything in this workspace.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The execution root handed to the workflow runner.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Copies the fixture at `data_path` into the workdir.
    ///
    /// A failed copy leaves whatever was already copied in place; the caller
    /// is expected to abandon the workspace.
    pub fn materialize(&self, data_path: &Path) -> Result<(), RuleTestError> {
        let fixture_error = |source: io::Error| RuleTestError::FixtureCopy {
            path: data_path.to_path_buf(),
            source,
        };

        let metadata = fs::metadata(data_path).map_err(fixture_error)?;
        if !metadata.is_dir() {
            return Err(fixture_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "fixture path is not a directory",
            )));
        }

        copy_tree(data_path, &self.workdir).map_err(fixture_error)?;
        debug!(
            "Copied fixture {} into {}",
            data_path.display(),
            self.workdir.display()
        );
        Ok(())
    }

    /// Removes the workspace now, reporting removal errors instead of
    /// swallowing them the way `Drop` has to.
    pub fn close(mut self) -> io::Result<()> {
        self.removed = true;
        let result = remove_tree(&self.root);
        if let Err(e) = &result {
            warn!("Failed to remove workspace {}: {}", self.root.display(), e);
        }
        result
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = remove_tree(&self.root) {
            warn!("Failed to remove workspace {}: {}", self.root.display(), e);
        }
    }
}

/// Recursively removes `path`. A tree that is already gone counts as removed.
fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => debug!(
            "Removing {} failed ({}), restoring write permission",
            path.display(),
            e
        ),
    }
    restore_write_permission(path)?;
    fs::remove_dir_all(path)
}

/// Grants the owner full access to `dir` and every directory below it.
/// Symlinks are not followed.
fn restore_write_permission(dir: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(dir)?;
    if !metadata.is_dir() {
        return Ok(());
    }
    let mut permissions = metadata.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o700);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    fs::set_permissions(dir, permissions)?;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            restore_write_permission(&entry.path())?;
        }
    }
    Ok(())
}

/// Recursively copies `src` into `dst`, creating `dst` and any missing parents.
/// Symlinks are followed.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if fs::metadata(&src_path)?.is_dir() {
            copy_tree(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}
