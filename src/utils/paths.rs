//! Path normalization
//!
//! Ledger keys are test file paths relative to the execution root. Two
//! spellings of the same file (`./a/b.js`, `a/../a/b.js`, an absolute path)
//! must produce the same key, so everything goes through lexical
//! normalization before being compared or stored.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drop `.` segments and fold `..` into the
/// preceding segment where there is one.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Make a path absolute against the current directory and normalize it.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize(&cwd.join(path)),
        Err(_) => normalize(path),
    }
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    }
}

/// Stable ledger key for `file`, relative to `root`, using `/` separators.
///
/// Relative `file` paths are interpreted relative to `root`. Files outside
/// the root get leading `..` segments.
pub fn relative_key(root: &Path, file: &Path) -> String {
    let root = absolutize(root);
    let file = resolve(&root, file);

    let root_parts: Vec<Component<'_>> = root.components().collect();
    let file_parts: Vec<Component<'_>> = file.components().collect();

    let common = root_parts
        .iter()
        .zip(file_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = Vec::new();
    segments.extend(root_parts[common..].iter().map(|_| "..".to_string()));
    segments.extend(
        file_parts[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );

    if segments.is_empty() {
        ".".to_string()
    } else {
        segments.join("/")
    }
}

/// Normalize a key read back from a ledger.
///
/// Keys written by other tools may use `\` separators or carry `.` and `..`
/// segments. They are folded the same way as [`relative_key`] folds paths,
/// without touching the filesystem.
pub fn normalize_key(key: &str) -> String {
    let unified = key.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
