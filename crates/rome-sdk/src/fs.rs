//! Filesystem access as an explicit list of operations.
//!
//! Every mutation the merger and orchestrator perform is an [`FsOp`] applied
//! through a [`FileSystem`]. [`Journal`] records the applied operations in
//! order so a run can be inspected afterwards, and [`MemoryFs`] lets tests
//! exercise the whole pipeline without touching disk.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;
use walkdir::WalkDir;

use crate::types::RomeError;

/// One filesystem mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    /// Remove a directory and everything below it.
    RemoveDirAll(PathBuf),
    /// Create a directory and any missing parents.
    CreateDirAll(PathBuf),
    /// Rename `from` to exactly `to`, replacing whatever is at `to`.
    Move { from: PathBuf, to: PathBuf },
    /// Remove a single file.
    RemoveFile(PathBuf),
    /// Copy a file or directory tree to `dir/<file name>`, replacing an
    /// existing entry of that name. `dir` is created if missing.
    CopyInto { from: PathBuf, dir: PathBuf },
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsOp::RemoveDirAll(p) => write!(f, "rm -rf {}", p.display()),
            FsOp::CreateDirAll(p) => write!(f, "mkdir -p {}", p.display()),
            FsOp::Move { from, to } => write!(f, "mv {} {}", from.display(), to.display()),
            FsOp::RemoveFile(p) => write!(f, "rm {}", p.display()),
            FsOp::CopyInto { from, dir } => {
                write!(f, "cp -R {} {}/", from.display(), dir.display())
            }
        }
    }
}

/// Filesystem queries and mutations used by a run.
pub trait FileSystem {
    fn is_file(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    /// Returns every directory below `root` whose name ends in `.{extension}`,
    /// sorted. Matching directories are not searched further.
    fn find_bundles(&self, root: &Path, extension: &str) -> Result<Vec<PathBuf>, RomeError>;

    fn apply(&self, op: &FsOp) -> Result<(), RomeError>;
}

/// Applies operations and remembers them in order.
pub struct Journal<'a> {
    fs: &'a dyn FileSystem,
    ops: Vec<FsOp>,
}

impl<'a> Journal<'a> {
    pub fn new(fs: &'a dyn FileSystem) -> Self {
        Self { fs, ops: Vec::new() }
    }

    pub fn apply(&mut self, op: FsOp) -> Result<(), RomeError> {
        debug!("{}", op);
        self.fs.apply(&op)?;
        self.ops.push(op);
        Ok(())
    }

    /// Operations applied so far.
    pub fn ops(&self) -> &[FsOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<FsOp> {
        self.ops
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|e| e == extension)
}

fn file_name_of(path: &Path) -> Result<&std::ffi::OsStr, RomeError> {
    path.file_name().ok_or_else(|| {
        RomeError::io(
            format!("resolving file name of {}", path.display()),
            io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })
}

/// The host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl LocalFs {
    fn remove_any(path: &Path) -> io::Result<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
        for entry in WalkDir::new(src).follow_links(false) {
            let entry = entry.map_err(io::Error::other)?;
            let rel = entry
                .path()
                .strip_prefix(src)
                .map_err(io::Error::other)?;
            let target = if rel.as_os_str().is_empty() {
                dest.to_path_buf()
            } else {
                dest.join(rel)
            };
            let file_type = entry.file_type();

            if file_type.is_dir() {
                fs::create_dir_all(&target)?;
            } else if file_type.is_symlink() {
                copy_symlink(entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(src, dest).map(|_| ())
}

impl FileSystem for LocalFs {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn find_bundles(&self, root: &Path, extension: &str) -> Result<Vec<PathBuf>, RomeError> {
        let mut found = Vec::new();
        let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|e| {
                RomeError::io(format!("searching {}", root.display()), io::Error::other(e))
            })?;
            if entry.file_type().is_dir() && has_extension(entry.path(), extension) {
                found.push(entry.into_path());
                walker.skip_current_dir();
            }
        }
        Ok(found)
    }

    fn apply(&self, op: &FsOp) -> Result<(), RomeError> {
        let result = match op {
            FsOp::RemoveDirAll(p) => fs::remove_dir_all(p),
            FsOp::CreateDirAll(p) => fs::create_dir_all(p),
            FsOp::RemoveFile(p) => fs::remove_file(p),
            FsOp::Move { from, to } => Self::remove_any(to).and_then(|_| {
                fs::rename(from, to).or_else(|_| {
                    // rename cannot cross devices
                    Self::copy_tree(from, to)?;
                    Self::remove_any(from)
                })
            }),
            FsOp::CopyInto { from, dir } => {
                let target = dir.join(file_name_of(from)?);
                fs::create_dir_all(dir)
                    .and_then(|_| Self::remove_any(&target))
                    .and_then(|_| Self::copy_tree(from, &target))
            }
        };
        result.map_err(|e| RomeError::io(op.to_string(), e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug, Default)]
struct MemoryState {
    nodes: BTreeMap<PathBuf, Node>,
    applied: Vec<FsOp>,
}

impl MemoryState {
    fn subtree(&self, root: &Path) -> Vec<PathBuf> {
        self.nodes
            .keys()
            .filter(|k| k.starts_with(root))
            .cloned()
            .collect()
    }

    fn remove_subtree(&mut self, root: &Path) {
        for key in self.subtree(root) {
            self.nodes.remove(&key);
        }
    }

    fn mkdir_p(&mut self, path: &Path) -> io::Result<()> {
        for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            match self.nodes.get(ancestor) {
                Some(Node::File(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} is a file", ancestor.display()),
                    ));
                }
                Some(Node::Dir) => {}
                None => {
                    self.nodes.insert(ancestor.to_path_buf(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    fn require_parent(&self, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => match self.nodes.get(parent) {
                Some(Node::Dir) => Ok(()),
                _ => Err(not_found(parent)),
            },
            _ => Ok(()),
        }
    }

    fn relocate(&mut self, from: &Path, to: &Path, keep_source: bool) -> io::Result<()> {
        if !self.nodes.contains_key(from) {
            return Err(not_found(from));
        }
        self.require_parent(to)?;
        let moved: Vec<(PathBuf, Node)> = self
            .subtree(from)
            .into_iter()
            .filter_map(|k| {
                let node = self.nodes.get(&k)?.clone();
                let rel = k.strip_prefix(from).ok()?.to_path_buf();
                Some((rel, node))
            })
            .collect();
        if !keep_source {
            self.remove_subtree(from);
        }
        self.remove_subtree(to);
        for (rel, node) in moved {
            let dest = if rel.as_os_str().is_empty() {
                to.to_path_buf()
            } else {
                to.join(rel)
            };
            self.nodes.insert(dest, node);
        }
        Ok(())
    }

    fn apply(&mut self, op: &FsOp) -> io::Result<()> {
        match op {
            FsOp::RemoveDirAll(p) => match self.nodes.get(p) {
                Some(Node::Dir) => {
                    self.remove_subtree(p);
                    Ok(())
                }
                Some(Node::File(_)) => Err(io::Error::other(format!("{} is a file", p.display()))),
                None => Err(not_found(p)),
            },
            FsOp::CreateDirAll(p) => self.mkdir_p(p),
            FsOp::RemoveFile(p) => match self.nodes.get(p) {
                Some(Node::File(_)) => {
                    self.nodes.remove(p);
                    Ok(())
                }
                Some(Node::Dir) => Err(io::Error::other(format!("{} is a directory", p.display()))),
                None => Err(not_found(p)),
            },
            FsOp::Move { from, to } => self.relocate(from, to, false),
            FsOp::CopyInto { from, dir } => {
                let name = from
                    .file_name()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no file name"))?;
                self.mkdir_p(dir)?;
                self.relocate(from, &dir.join(name), true)
            }
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

/// In-memory filesystem for tests.
///
/// Setup helpers ([`MemoryFs::write_file`], [`MemoryFs::create_dir`]) are not
/// recorded; only operations applied through [`FileSystem::apply`] are.
#[derive(Debug, Default)]
pub struct MemoryFs {
    state: Mutex<MemoryState>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a file (and its parent directories) with `contents`.
    pub fn write_file(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut state = self.state();
        if let Some(parent) = path.parent() {
            let _ = state.mkdir_p(parent);
        }
        state
            .nodes
            .insert(path.to_path_buf(), Node::File(contents.into()));
    }

    /// Creates a directory and its parents.
    pub fn create_dir(&self, path: impl AsRef<Path>) {
        let _ = self.state().mkdir_p(path.as_ref());
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.state().nodes.get(path.as_ref()) {
            Some(Node::File(contents)) => Some(contents.clone()),
            _ => None,
        }
    }

    /// Immediate children of `dir`, sorted.
    pub fn list_dir(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let dir = dir.as_ref();
        self.state()
            .nodes
            .keys()
            .filter(|k| k.parent() == Some(dir))
            .cloned()
            .collect()
    }

    /// Every operation applied so far, in order.
    pub fn applied(&self) -> Vec<FsOp> {
        self.state().applied.clone()
    }
}

impl FileSystem for MemoryFs {
    fn is_file(&self, path: &Path) -> bool {
        matches!(self.state().nodes.get(path), Some(Node::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.state().nodes.get(path), Some(Node::Dir))
    }

    fn find_bundles(&self, root: &Path, extension: &str) -> Result<Vec<PathBuf>, RomeError> {
        let state = self.state();
        let mut found: Vec<PathBuf> = Vec::new();
        for (path, node) in state.nodes.range(root.to_path_buf()..) {
            if !path.starts_with(root) {
                break;
            }
            if path == root || *node != Node::Dir || !has_extension(path, extension) {
                continue;
            }
            if found.iter().any(|f| path.starts_with(f)) {
                continue;
            }
            found.push(path.clone());
        }
        Ok(found)
    }

    fn apply(&self, op: &FsOp) -> Result<(), RomeError> {
        let mut state = self.state();
        state
            .apply(op)
            .map_err(|e| RomeError::io(op.to_string(), e))?;
        state.applied.push(op.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_move_replaces_destination() {
        let fs = MemoryFs::new();
        fs.write_file("/b/merged", "fat");
        fs.write_file("/b/Release-iphoneos/Core/Core.framework/Core", "arm64");

        fs.apply(&FsOp::Move {
            from: PathBuf::from("/b/merged"),
            to: PathBuf::from("/b/Release-iphoneos/Core/Core.framework/Core"),
        })
        .unwrap();

        assert!(!fs.exists(Path::new("/b/merged")));
        assert_eq!(
            fs.read_file("/b/Release-iphoneos/Core/Core.framework/Core"),
            Some(b"fat".to_vec())
        );
    }

    #[test]
    fn test_memory_move_directory() {
        let fs = MemoryFs::new();
        fs.write_file("/b/Release-iphoneos/Core/Core.framework/Core", "fat");
        fs.write_file("/b/Release-iphoneos/Core/Core.framework/Info.plist", "plist");

        fs.apply(&FsOp::Move {
            from: PathBuf::from("/b/Release-iphoneos/Core/Core.framework"),
            to: PathBuf::from("/b/Core.framework"),
        })
        .unwrap();

        assert!(fs.is_file(Path::new("/b/Core.framework/Core")));
        assert!(fs.is_file(Path::new("/b/Core.framework/Info.plist")));
        assert!(!fs.exists(Path::new("/b/Release-iphoneos/Core/Core.framework")));
        assert!(fs.is_dir(Path::new("/b/Release-iphoneos/Core")));
    }

    #[test]
    fn test_memory_copy_into_overwrites() {
        let fs = MemoryFs::new();
        fs.write_file("/src/A.framework/A", "new");
        fs.write_file("/out/A.framework/A", "old");
        fs.write_file("/out/A.framework/Stale", "x");

        fs.apply(&FsOp::CopyInto {
            from: PathBuf::from("/src/A.framework"),
            dir: PathBuf::from("/out"),
        })
        .unwrap();

        assert_eq!(fs.read_file("/out/A.framework/A"), Some(b"new".to_vec()));
        assert!(!fs.exists(Path::new("/out/A.framework/Stale")));
        assert!(fs.is_file(Path::new("/src/A.framework/A")));
    }

    #[test]
    fn test_memory_remove_missing_is_error() {
        let fs = MemoryFs::new();
        let err = fs.apply(&FsOp::RemoveFile(PathBuf::from("/nope"))).unwrap_err();
        assert!(matches!(err, RomeError::Io { .. }));
        assert!(fs.applied().is_empty());
    }

    #[test]
    fn test_memory_find_bundles_skips_nested() {
        let fs = MemoryFs::new();
        fs.write_file("/b/Release-iphoneos/A/A.framework/A", "");
        fs.write_file("/b/Release-iphoneos/A/A.framework/Frameworks/Inner.framework/Inner", "");
        fs.write_file("/b/B.framework/B", "");
        fs.write_file("/b/C.bundle/C", "");

        let bundles = fs.find_bundles(Path::new("/b"), "framework").unwrap();
        assert_eq!(
            bundles,
            vec![
                PathBuf::from("/b/B.framework"),
                PathBuf::from("/b/Release-iphoneos/A/A.framework"),
            ]
        );
    }

    #[test]
    fn test_journal_records_in_order() {
        let fs = MemoryFs::new();
        let mut journal = Journal::new(&fs);
        journal.apply(FsOp::CreateDirAll(PathBuf::from("/x/y"))).unwrap();
        journal.apply(FsOp::RemoveDirAll(PathBuf::from("/x"))).unwrap();

        assert_eq!(
            journal.ops(),
            &[
                FsOp::CreateDirAll(PathBuf::from("/x/y")),
                FsOp::RemoveDirAll(PathBuf::from("/x")),
            ]
        );
        assert_eq!(fs.applied(), journal.into_ops());
    }

    #[test]
    fn test_local_find_bundles() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Release-iphoneos/Core/Core.framework/Headers")).unwrap();
        fs::create_dir_all(root.join("Release/Mac/Mac.framework")).unwrap();
        fs::create_dir_all(root.join("Release/Mac/Mac.framework/Versions/A/Frameworks/X.framework"))
            .unwrap();
        fs::write(root.join("notes.framework"), "file, not a bundle").unwrap();

        let bundles = LocalFs.find_bundles(root, "framework").unwrap();
        assert_eq!(
            bundles,
            vec![
                root.join("Release/Mac/Mac.framework"),
                root.join("Release-iphoneos/Core/Core.framework"),
            ]
        );
    }

    #[test]
    fn test_local_copy_into_and_move() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let bundle = root.join("build/Core.framework");
        fs::create_dir_all(bundle.join("Headers")).unwrap();
        fs::write(bundle.join("Core"), "fat").unwrap();
        fs::write(bundle.join("Headers/Core.h"), "// header").unwrap();

        let dest = root.join("Rome");
        fs::create_dir_all(dest.join("Core.framework")).unwrap();
        fs::write(dest.join("Core.framework/Old"), "stale").unwrap();

        LocalFs
            .apply(&FsOp::CopyInto {
                from: bundle.clone(),
                dir: dest.clone(),
            })
            .unwrap();

        assert_eq!(fs::read_to_string(dest.join("Core.framework/Core")).unwrap(), "fat");
        assert!(dest.join("Core.framework/Headers/Core.h").is_file());
        assert!(!dest.join("Core.framework/Old").exists());

        LocalFs
            .apply(&FsOp::Move {
                from: bundle.join("Core"),
                to: root.join("Core.moved"),
            })
            .unwrap();
        assert!(!bundle.join("Core").exists());
        assert!(root.join("Core.moved").is_file());
    }

    #[test]
    fn test_local_copy_into_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("libVendored.a"), "archive").unwrap();

        LocalFs
            .apply(&FsOp::CopyInto {
                from: root.join("libVendored.a"),
                dir: root.join("out"),
            })
            .unwrap();

        assert_eq!(
            fs::read_to_string(root.join("out/libVendored.a")).unwrap(),
            "archive"
        );
    }
}
