//! Listing order
//!
//! The default order puts directories first and compares names without
//! regard to case. Other keys keep directories first and fall back to the
//! name order on ties. Reversing flips the whole list, so directories end up
//! last.

use std::cmp::Ordering;

use crate::storage::results::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    Size,
    Modified,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortOrder {
    pub key: SortKey,
    pub reverse: bool,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Size => "size",
            SortKey::Modified => "modified",
            SortKey::Type => "type",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "name" | "text" => Some(SortKey::Name),
            "size" => Some(SortKey::Size),
            "modified" => Some(SortKey::Modified),
            "type" => Some(SortKey::Type),
            _ => None,
        }
    }
}

impl SortOrder {
    /// Parses a `?sort=` value such as `size` or `-modified`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (reverse, key) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        SortKey::parse(key).map(|key| SortOrder { key, reverse })
    }

    /// The `?sort=` value selecting this order.
    pub fn as_query(&self) -> String {
        if self.reverse {
            format!("-{}", self.key.as_str())
        } else {
            self.key.as_str().to_string()
        }
    }

    /// The order a column header link should select: the same key toggles
    /// direction, another key starts ascending.
    pub fn toggled(&self, key: SortKey) -> SortOrder {
        SortOrder {
            key,
            reverse: self.key == key && !self.reverse,
        }
    }
}

pub fn sort_entries(entries: &mut [Entry], order: SortOrder) {
    entries.sort_by(|a, b| compare(a, b, order.key));
    if order.reverse {
        entries.reverse();
    }
}

fn compare(a: &Entry, b: &Entry, key: SortKey) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| match key {
            SortKey::Name => Ordering::Equal,
            SortKey::Size => a.size.cmp(&b.size),
            SortKey::Modified => a.modified.cmp(&b.modified),
            SortKey::Type => a.mime.cmp(&b.mime),
        })
        .then_with(|| compare_names(&a.name, &b.name))
}

/// Case-insensitive, with the exact bytes as tie breaker so the order is total.
fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
