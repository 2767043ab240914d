//! Helpers for the byte-string path algebra the routing layer runs on.
//!
//! Logical paths are rooted at `/` and never carry a trailing slash (except
//! the root itself). Physical paths are the plain concatenation of a store
//! root and a logical path, so `/data/hot` + `/a.txt` = `/data/hot/a.txt`.

/// Concatenate a store root and a logical path.
pub fn join(store: &str, path: &str) -> String {
    let mut full = String::with_capacity(store.len() + path.len());
    full.push_str(store);
    full.push_str(path);
    full
}

/// The directory portion of a logical path: everything before the last `/`.
///
/// Top-level entries yield `""`, so that `store + parent` is the store root.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// The type hint of a path: its suffix from the last `.` of the final
/// component, including the dot. `None` when the name has no dot.
pub fn suffix(path: &str) -> Option<&str> {
    let base_start = path.rfind('/').map(|pos| pos + 1).unwrap_or(0);
    let base = &path[base_start..];
    base.rfind('.').map(|pos| &base[pos..])
}

/// Basename of `key` when it is a direct child of `prefix`, `None` otherwise.
///
/// `prefix` comes without a trailing separator except for the root `/`.
/// Descendants deeper than one level never match.
pub fn direct_child<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let sep = key.rfind('/')?;
    let is_root_child = sep + 1 == prefix.len() && &key[..sep + 1] == prefix;
    let is_child = sep == prefix.len() && &key[..sep] == prefix;
    if is_root_child || is_child {
        Some(&key[sep + 1..])
    } else {
        None
    }
}
