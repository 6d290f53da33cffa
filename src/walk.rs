//! Deterministic filesystem walker.
//!
//! Produces a lazy stream of regular files under a root via an explicit
//! depth-first stack. Two runs over an unchanged tree yield identical
//! multisets of entries; callers must not rely on sibling ordering across
//! filesystems. Symlinks are not followed.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// A single walked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Absolute path.
    pub path: PathBuf,
    /// Path relative to the walk root, POSIX separators.
    pub relative_path: String,
    /// File size in bytes at stat time.
    pub len: u64,
}

/// Lazy depth-first iterator over regular files.
///
/// Directory entries are read eagerly per directory, pushed in directory
/// order and popped in reverse. Unreadable directories are skipped silently;
/// entries whose metadata cannot be read are dropped. `.DS_Store` files are
/// never yielded.
pub struct Walker {
    root: PathBuf,
    stack: Vec<PathBuf>,
}

impl Walker {
    /// Walk everything under `root`.
    pub fn new(root: &Path) -> Walker {
        Walker {
            root: root.to_path_buf(),
            stack: vec![root.to_path_buf()],
        }
    }

    /// Walk only under the given prefixes, resolved against `root`.
    ///
    /// Prefixes that escape the root via `..` are dropped. An empty prefix
    /// list walks the whole root.
    pub fn with_prefixes(root: &Path, include_prefixes: &[String]) -> Walker {
        if include_prefixes.is_empty() {
            return Walker::new(root);
        }
        let mut starts: Vec<PathBuf> = Vec::new();
        for prefix in include_prefixes {
            match resolve_within_root(root, prefix) {
                Some(p) => starts.push(p),
                None => continue,
            }
        }
        // Popped in reverse, so reverse here to visit prefixes in given order.
        starts.reverse();
        Walker {
            root: root.to_path_buf(),
            stack: starts,
        }
    }

    fn push_dir_children(&mut self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return,
        };
        let mut children: VecDeque<PathBuf> = VecDeque::new();
        for entry in entries.flatten() {
            children.push_back(entry.path());
        }
        // Directory order on the stack; iteration pops in reverse.
        self.stack.extend(children);
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut out = String::new();
        for component in rel.components() {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&component.as_os_str().to_string_lossy());
        }
        Some(out)
    }
}

impl Iterator for Walker {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        while let Some(path) = self.stack.pop() {
            let meta = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(_) => continue,
            };
            if meta.is_dir() {
                self.push_dir_children(&path);
                continue;
            }
            if !meta.is_file() {
                continue;
            }
            if path.file_name().is_some_and(|n| n == ".DS_Store") {
                continue;
            }
            let relative_path = match self.relative(&path) {
                Some(r) => r,
                None => continue,
            };
            return Some(WalkEntry {
                path,
                relative_path,
                len: meta.len(),
            });
        }
        None
    }
}

/// Resolve `prefix` against `root`, rejecting traversal outside the root.
fn resolve_within_root(root: &Path, prefix: &str) -> Option<PathBuf> {
    use std::path::Component;
    let mut depth: i32 = 0;
    let candidate = Path::new(prefix);
    if candidate.is_absolute() {
        return None;
    }
    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(root.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn make_tree(dirs: &[&str], files: &[&str]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for d in dirs {
            fs::create_dir_all(tmp.path().join(d)).unwrap();
        }
        for f in files {
            let path = tmp.path().join(f);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, b"x").unwrap();
        }
        tmp
    }

    fn collect_relative(walker: Walker) -> Vec<String> {
        walker.map(|e| e.relative_path).collect()
    }

    #[test]
    fn test_walk_yields_all_files() {
        let tmp = make_tree(
            &["a/b", "c"],
            &["a/b/one.txt", "a/two.txt", "c/three.txt", "four.txt"],
        );
        let got: BTreeSet<String> = collect_relative(Walker::new(tmp.path())).into_iter().collect();
        let want: BTreeSet<String> = ["a/b/one.txt", "a/two.txt", "c/three.txt", "four.txt"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_walk_is_deterministic() {
        let tmp = make_tree(&["x/y"], &["x/y/1", "x/y/2", "x/3", "4", "5"]);
        let first = collect_relative(Walker::new(tmp.path()));
        let second = collect_relative(Walker::new(tmp.path()));
        assert_eq!(first, second, "two runs over an unchanged tree must match");
    }

    #[test]
    fn test_walk_skips_ds_store() {
        let tmp = make_tree(&["a"], &["a/.DS_Store", "a/real.txt", ".DS_Store"]);
        let got = collect_relative(Walker::new(tmp.path()));
        assert_eq!(got, vec!["a/real.txt".to_string()]);
    }

    #[test]
    fn test_include_prefixes_limit_walk() {
        let tmp = make_tree(
            &["keep/sub", "drop"],
            &["keep/sub/a.txt", "keep/b.txt", "drop/c.txt"],
        );
        let walker = Walker::with_prefixes(tmp.path(), &["keep".to_string()]);
        let got: BTreeSet<String> = collect_relative(walker).into_iter().collect();
        assert!(got.contains("keep/sub/a.txt"));
        assert!(got.contains("keep/b.txt"));
        assert!(!got.contains("drop/c.txt"));
    }

    #[test]
    fn test_prefix_escaping_root_is_dropped() {
        let tmp = make_tree(&[], &["inside.txt"]);
        let walker = Walker::with_prefixes(tmp.path(), &["../outside".to_string()]);
        assert_eq!(collect_relative(walker), Vec::<String>::new());
    }

    #[test]
    fn test_prefix_with_internal_dotdot_is_allowed() {
        let tmp = make_tree(&["a"], &["a/f.txt"]);
        let walker = Walker::with_prefixes(tmp.path(), &["a/../a".to_string()]);
        let got = collect_relative(walker);
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn test_missing_prefix_yields_nothing() {
        let tmp = make_tree(&[], &["real.txt"]);
        let walker = Walker::with_prefixes(tmp.path(), &["ghost".to_string()]);
        assert_eq!(collect_relative(walker), Vec::<String>::new());
    }
}
