//! Path keys.
//!
//! A caller path is normalized and prefixed with its separator count before it
//! is stored, so `a/b/c` is kept as `2:a/b/c` and `/log.txt` as `0:log.txt`.
//! Lookups always go through [`path_key`]; raw paths never reach the store.

/// Normalize a path: unify separators, resolve `.` and `..`, drop the leading `/`.
///
/// `..` at the root is discarded rather than escaping it.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Build the storage key for a caller path.
pub fn path_key(path: &str) -> String {
    let normalized = normalize(path);
    let depth = normalized.matches('/').count();
    format!("{depth}:{normalized}")
}

/// Recover the normalized path from a storage key.
pub fn key_path(key: &str) -> &str {
    match key.split_once(':') {
        Some((depth, rest)) if depth.bytes().all(|b| b.is_ascii_digit()) => rest,
        _ => key,
    }
}

/// Final segment of the path a key was built from.
pub fn key_name(key: &str) -> &str {
    let path = key_path(key);
    path.rsplit('/').next().unwrap_or(path)
}
