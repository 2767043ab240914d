//! Type router: maps a filename suffix to its default backing store.
//!
//! The table is loaded once at init from `<meta_root>/.type.map`, one
//! `hint,store_root` record per line. Hints are canonicalized with CRC-32
//! over their ASCII-lowercased bytes. The router owns its table; lookups
//! hand out borrowed entries that callers copy.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::paths;
use crate::store::StoreSet;

/// The mandatory catch-all hint.
pub const TYPE_DEFAULT: &str = "*";

/// Route table file name under the meta root.
pub const TYPE_MAP_FILE: &str = ".type.map";

/// Hashed-hint route table.
#[derive(Debug, Default)]
pub struct TypeMap {
    routes: HashMap<u32, String>,
}

impl TypeMap {
    /// A table holding only the `*` rule. Every table starts from here, so
    /// the catch-all is always present.
    pub fn with_default(default_root: &str) -> Self {
        let mut map = Self::default();
        map.add_route(TYPE_DEFAULT, default_root);
        map
    }

    /// Load `<meta_root>/.type.map` on top of the default rule.
    ///
    /// Records without a comma, or whose destination is not a registered
    /// store, are skipped with a warning. An explicit `*` record overrides
    /// the default rule.
    pub fn load(meta_root: &Path, default_root: &str, stores: &StoreSet) -> Self {
        let mut map = Self::with_default(default_root);
        let path = meta_root.join(TYPE_MAP_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                info!(path = %path.display(), %err, "no type map, using default route only");
                return map;
            }
        };
        for record in raw.split_whitespace() {
            let Some((hint, dest)) = record.split_once(',') else {
                warn!(record, "type map record has no comma, skipping");
                continue;
            };
            if !stores.is_valid_store(dest) {
                warn!(record, "type map destination is not a registered store, skipping");
                continue;
            }
            debug!(hint, dest, "adding type route");
            map.add_route(hint, dest);
        }
        map
    }

    pub fn add_route(&mut self, hint: &str, dest: &str) {
        self.routes.insert(type_code(hint), dest.to_owned());
    }

    /// Store root for a path's type hint; paths without a suffix and
    /// unmapped suffixes fall back to the `*` rule.
    pub fn route(&self, path: &str) -> &str {
        let code = paths::suffix(path).map(type_code).unwrap_or_else(|| type_code(TYPE_DEFAULT));
        match self.routes.get(&code) {
            Some(dest) => dest,
            // `*` is installed at construction, never absent.
            None => &self.routes[&type_code(TYPE_DEFAULT)],
        }
    }
}

/// CRC-32 over the ASCII-lowercased hint bytes.
fn type_code(hint: &str) -> u32 {
    crc32fast::hash(hint.to_ascii_lowercase().as_bytes())
}
