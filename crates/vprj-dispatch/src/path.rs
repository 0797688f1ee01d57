//! Conversion between the provider's native path form and tree-relative paths.
//!
//! Native paths are relative to the virtualization root and use `\` as the
//! separator. Tree paths use `/`, never carry leading or trailing separators,
//! and the empty path is the root.

use std::fmt;

const NATIVE_SEPARATOR: char = '\\';
const TREE_SEPARATOR: char = '/';

#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath(String);

impl RelativePath {
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse a native provider path. Empty components (`a\\b`, leading `\`) collapse.
    pub fn from_native(native: &str) -> Self {
        Self::from_components(native.split([NATIVE_SEPARATOR, TREE_SEPARATOR]))
    }

    /// Parse a tree path that may use either separator.
    pub fn new(path: &str) -> Self {
        Self::from_native(path)
    }

    fn from_components<'a>(parts: impl Iterator<Item = &'a str>) -> Self {
        let mut out = String::new();
        for part in parts.filter(|p| !p.is_empty() && *p != ".") {
            if !out.is_empty() {
                out.push(TREE_SEPARATOR);
            }
            out.push_str(part);
        }
        Self(out)
    }

    pub fn to_native(&self) -> String {
        self.0.replace(TREE_SEPARATOR, "\\")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parent directory; the parent of a top-level entry is the root.
    pub fn dirname(&self) -> RelativePath {
        match self.0.rfind(TREE_SEPARATOR) {
            Some(idx) => Self(self.0[..idx].to_string()),
            None => Self::root(),
        }
    }

    /// Last component; empty for the root.
    pub fn basename(&self) -> &str {
        match self.0.rfind(TREE_SEPARATOR) {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    pub fn join(&self, name: &str) -> RelativePath {
        Self::from_components(self.components().chain(name.split(TREE_SEPARATOR)))
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split(TREE_SEPARATOR).filter(|p| !p.is_empty())
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
