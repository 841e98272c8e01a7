//! Private root filesystems for confined children (Linux only).
//!
//! The judge prepares an empty directory tree holding one mount point per
//! exposed host path. Between `fork` and `exec` the child enters fresh
//! user, mount, IPC and network namespaces, bind-mounts the exposed paths
//! read-only onto their mount points and `chroot`s into the tree.
//!
//! ```text
//! host                         child view
//! /usr          ──ro bind──▶   /usr
//! /bin -> usr/bin  ──link──▶   /bin -> usr/bin
//! /opt/agent    ──ro bind──▶   /opt/agent
//! everything else              (absent)
//! network                      unconfigured loopback only
//! ```
//!
//! The child keeps no capabilities across `exec`: its uid is left
//! unmapped in the new user namespace, so the kernel treats it as an
//! ordinary user there and can never hand it privileges on the host.

use crate::error::ExecError;
use nix::mount::{mount, MsFlags};
use nix::sched::{unshare, CloneFlags};
use nix::sys::prctl;
use nix::sys::statvfs::{statvfs, FsFlags};
use nix::unistd::{chdir, chroot};
use std::ffi::CString;
use std::fs::{self, File};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

const NONE: Option<&'static str> = None;

/// Private root of one child.
///
/// The directory is removed on drop, so it must outlive the child.
#[derive(Debug)]
pub struct Jail {
    dir: TempDir,
}

impl Jail {
    /// Builds an empty root under `parent` exposing `paths` read-only.
    ///
    /// Returns the root together with the steps the child runs to enter
    /// it. Paths that do not exist on the host are skipped.
    pub(crate) fn prepare(
        parent: &Path,
        paths: &[PathBuf],
        writable: bool,
    ) -> Result<(Jail, JailEntry), ExecError> {
        let dir = tempfile::Builder::new()
            .prefix("arena-root-")
            .tempdir_in(parent)
            .map_err(|e| {
                ExecError::Spawn(format!("cannot create private root in {}: {}", parent.display(), e))
            })?;

        let mut layout = Layout {
            root: dir.path().to_path_buf(),
            sources: Vec::new(),
            binds: Vec::new(),
        };
        for path in paths {
            layout.expose(path)?;
        }

        let entry = JailEntry {
            root: c_path(dir.path())?,
            root_remount: if writable {
                None
            } else {
                Some(read_only_remount(dir.path()))
            },
            binds: layout.binds,
        };

        debug!(
            "Prepared private root {} with {} read-only binds",
            dir.path().display(),
            entry.binds.len()
        );
        Ok((Jail { dir }, entry))
    }

    /// Returns the root's location on the host.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// One host path bind-mounted into the root.
#[derive(Debug, Clone)]
struct Bind {
    source: CString,
    target: CString,
    remount: MsFlags,
}

/// Everything the child needs to enter its root, prepared by the parent so
/// that the child only issues system calls.
#[derive(Debug, Clone)]
pub(crate) struct JailEntry {
    root: CString,
    root_remount: Option<MsFlags>,
    binds: Vec<Bind>,
}

impl JailEntry {
    /// Enters the namespaces and the private root.
    ///
    /// Runs in the forked child before `exec`; must not allocate.
    pub(crate) fn enter(&self) -> nix::Result<()> {
        unshare(
            CloneFlags::CLONE_NEWUSER
                | CloneFlags::CLONE_NEWNS
                | CloneFlags::CLONE_NEWNET
                | CloneFlags::CLONE_NEWIPC,
        )?;

        // Nothing mounted from here on may propagate back to the host
        mount(NONE, "/", NONE, MsFlags::MS_REC | MsFlags::MS_PRIVATE, NONE)?;

        let root = self.root.as_c_str();
        mount(Some(root), root, NONE, MsFlags::MS_BIND | MsFlags::MS_REC, NONE)?;

        for bind in &self.binds {
            let target = bind.target.as_c_str();
            mount(
                Some(bind.source.as_c_str()),
                target,
                NONE,
                MsFlags::MS_BIND | MsFlags::MS_REC,
                NONE,
            )?;
            mount(NONE, target, NONE, bind.remount, NONE)?;
        }

        if let Some(flags) = self.root_remount {
            mount(NONE, root, NONE, flags, NONE)?;
        }

        chroot(root)?;
        chdir("/")?;
        prctl::set_no_new_privs()
    }
}

/// Mount points created so far inside one root.
struct Layout {
    root: PathBuf,
    sources: Vec<PathBuf>,
    binds: Vec<Bind>,
}

impl Layout {
    fn expose(&mut self, path: &Path) -> Result<(), ExecError> {
        if !path.is_absolute() {
            return Err(ExecError::Spawn(format!(
                "exposed path must be absolute: {}",
                path.display()
            )));
        }

        let Ok(resolved) = fs::canonicalize(path) else {
            debug!("Not exposing missing path {}", path.display());
            return Ok(());
        };

        // `/bin -> usr/bin` and friends are recreated as links so paths
        // written against the host layout keep resolving.
        if resolved != path && self.mirrors_link(path) {
            let inside = self.inside(path);
            if fs::symlink_metadata(&inside).is_err() {
                if let Some(parent) = inside.parent() {
                    fs::create_dir_all(parent).map_err(|e| spawn_io(parent, e))?;
                }
                let link = fs::read_link(path).map_err(|e| spawn_io(path, e))?;
                symlink(&link, &inside).map_err(|e| spawn_io(&inside, e))?;
            }
        }

        if self.sources.iter().any(|source| resolved.starts_with(source)) {
            return Ok(());
        }

        let inside = self.inside(&resolved);
        if let Some(parent) = inside.parent() {
            fs::create_dir_all(parent).map_err(|e| spawn_io(parent, e))?;
        }
        if resolved.is_dir() {
            fs::create_dir_all(&inside).map_err(|e| spawn_io(&inside, e))?;
        } else {
            File::create(&inside).map_err(|e| spawn_io(&inside, e))?;
        }

        self.binds.push(Bind {
            source: c_path(&resolved)?,
            target: c_path(&inside)?,
            remount: read_only_remount(&resolved),
        });
        self.sources.push(resolved);
        Ok(())
    }

    /// True when `path` is itself a link whose parent directory needs no
    /// resolving, so the link can be recreated at the same place.
    fn mirrors_link(&self, path: &Path) -> bool {
        let is_link = fs::symlink_metadata(path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        let parent_is_real = path
            .parent()
            .map(|parent| fs::canonicalize(parent).is_ok_and(|p| p == parent))
            .unwrap_or(false);
        is_link && parent_is_real
    }

    fn inside(&self, path: &Path) -> PathBuf {
        self.root.join(path.strip_prefix("/").unwrap_or(path))
    }
}

/// Flags that turn an existing bind mount read-only.
///
/// `noexec` must be carried over from the source mount: the kernel refuses
/// to drop it inside a user namespace.
fn read_only_remount(path: &Path) -> MsFlags {
    let mut flags = MsFlags::MS_REMOUNT
        | MsFlags::MS_BIND
        | MsFlags::MS_RDONLY
        | MsFlags::MS_NOSUID
        | MsFlags::MS_NODEV;
    if let Ok(stat) = statvfs(path) {
        if stat.flags().contains(FsFlags::ST_NOEXEC) {
            flags |= MsFlags::MS_NOEXEC;
        }
    }
    flags
}

fn c_path(path: &Path) -> Result<CString, ExecError> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| ExecError::Spawn(format!("path contains a NUL byte: {}", path.display())))
}

fn spawn_io(path: &Path, e: std::io::Error) -> ExecError {
    ExecError::Spawn(format!("cannot prepare {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_mirrors_tree() {
        let host = tempfile::tempdir().unwrap();
        let tools = host.path().join("tools");
        fs::create_dir(&tools).unwrap();
        fs::write(tools.join("agent"), b"#!/bin/sh\n").unwrap();
        symlink("tools", host.path().join("bin")).unwrap();
        let host = fs::canonicalize(host.path()).unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let (jail, entry) = Jail::prepare(
            scratch.path(),
            &[
                host.join("bin"),
                host.join("tools/agent"),
                PathBuf::from("/definitely/not/here"),
            ],
            false,
        )
        .unwrap();

        let inside = |p: &Path| jail.path().join(p.strip_prefix("/").unwrap());

        // The link is recreated and its target bound once
        assert!(fs::symlink_metadata(inside(&host.join("bin")))
            .unwrap()
            .file_type()
            .is_symlink());
        assert!(inside(&host.join("tools")).is_dir());
        assert_eq!(entry.binds.len(), 1);
        assert!(entry.root_remount.is_some());
    }

    #[test]
    fn test_relative_path_is_rejected() {
        let scratch = tempfile::tempdir().unwrap();
        let result = Jail::prepare(scratch.path(), &[PathBuf::from("usr")], true);
        assert!(matches!(result, Err(ExecError::Spawn(_))));
    }

    #[test]
    fn test_root_is_removed_on_drop() {
        let scratch = tempfile::tempdir().unwrap();
        let (jail, entry) = Jail::prepare(scratch.path(), &[PathBuf::from("/usr")], true).unwrap();
        let root = jail.path().to_path_buf();

        assert!(root.join("usr").is_dir());
        assert!(entry.root_remount.is_none());

        drop(jail);
        assert!(!root.exists());
    }
}
