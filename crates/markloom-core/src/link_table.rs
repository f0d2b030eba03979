use std::collections::HashMap;

use crate::label::normalize_link_id;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LinkTarget {
    pub url: String,
    pub title: String,
}

/// Reference definitions collected while parsing, keyed by case-folded id.
#[derive(Clone, Debug, Default)]
pub struct LinkTable {
    targets: HashMap<String, LinkTarget>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a definition. A later definition of the same id replaces the
    /// earlier one.
    pub fn add(&mut self, id: &str, url: impl Into<String>, title: impl Into<String>) {
        let target = LinkTarget {
            url: url.into(),
            title: title.into(),
        };
        self.targets.insert(normalize_link_id(id), target);
    }

    pub fn find(&self, id: &str) -> Option<&LinkTarget> {
        self.targets.get(&normalize_link_id(id))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::LinkTable;

    #[test]
    fn lookup_ignores_case() {
        let mut table = LinkTable::new();
        table.add("Home", "/", "Start");
        let target = table.find("HOME").expect("target");
        assert_eq!(target.url, "/");
        assert_eq!(target.title, "Start");
        assert!(table.find("away").is_none());
    }

    #[test]
    fn later_definitions_overwrite() {
        let mut table = LinkTable::new();
        table.add("x", "/first", "");
        table.add("X", "/second", "");
        assert_eq!(table.len(), 1);
        assert_eq!(table.find("x").map(|t| t.url.as_str()), Some("/second"));
    }
}
