//! Vault path helpers
//!
//! Vault paths are relative, `/`-separated, without leading or trailing
//! separators. The root folder is spelled `/`.

use crate::host::ROOT_PATH;

/// Normalize a user supplied path into vault form
pub fn normalize(path: &str) -> String {
    let joined = path
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");

    if joined.is_empty() {
        ROOT_PATH.to_string()
    } else {
        joined
    }
}

pub fn is_root(path: &str) -> bool {
    path == ROOT_PATH || path.is_empty()
}

/// Last path segment; empty for the root
pub fn file_name(path: &str) -> &str {
    if is_root(path) {
        return "";
    }
    path.rsplit('/').next().unwrap_or(path)
}

/// File name without its extension
pub fn basename(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

/// Extension without the dot; empty when there is none
pub fn extension(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[dot + 1..],
        _ => "",
    }
}

/// Parent folder path; `None` for the root
pub fn parent(path: &str) -> Option<String> {
    if is_root(path) {
        return None;
    }
    match path.rfind('/') {
        Some(slash) => Some(path[..slash].to_string()),
        None => Some(ROOT_PATH.to_string()),
    }
}

pub fn join(folder: &str, name: &str) -> String {
    if is_root(folder) {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

/// Whether `path` is `ancestor` or lies below it
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if is_root(ancestor) {
        return true;
    }
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

/// Re-root `path` from below `from` to below `to`
pub fn rebase(path: &str, from: &str, to: &str) -> String {
    if path == from {
        return to.to_string();
    }
    let rest = &path[from.len() + 1..];
    join(to, rest)
}
