// SPDX-License-Identifier: MIT

//! Usage paths and the index from rendered path to [DataItem].
//!
//! A path is the sequence of collection usages leading to a data item, followed
//! by the item's own usage. It renders as dot-separated components:
//! a name from the [UsageTables](crate::usage::UsageTables) where one exists,
//! the lowercase 8-digit hex code otherwise, and `[n]` for an indexed node.
//!
//! ```
//! # use hidups::path::{Path, PathComponent};
//! let path = Path::from(vec![
//!     PathComponent::Named { code: 0x00840004, name: "UPS" },
//!     PathComponent::Code(0xff860016),
//!     PathComponent::Index(1),
//! ]);
//! assert_eq!(path.to_string(), "UPS.ff860016.[1]");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::{DataItem, ItemKind};

/// One step of a [Path].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathComponent {
    /// A usage with a name in the usage tables
    Named { code: u32, name: &'static str },
    /// A usage without a name
    Code(u32),
    /// An indexed node, from a collection of value 0x80 and above or
    /// from a repeated single-usage field
    Index(u32),
}

impl std::fmt::Display for PathComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathComponent::Named { name, .. } => write!(f, "{name}"),
            PathComponent::Code(code) => write!(f, "{code:08x}"),
            PathComponent::Index(n) => write!(f, "[{n}]"),
        }
    }
}

/// The full usage path of a [DataItem].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<PathComponent>);

impl Path {
    pub fn components(&self) -> &[PathComponent] {
        &self.0
    }

    pub fn push(&mut self, component: PathComponent) {
        self.0.push(component)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The usage code of the last non-index component, if any.
    pub fn usage(&self) -> Option<u32> {
        self.0.iter().rev().find_map(|c| match c {
            PathComponent::Named { code, .. } | PathComponent::Code(code) => Some(*code),
            PathComponent::Index(_) => None,
        })
    }
}

impl From<Vec<PathComponent>> for Path {
    fn from(components: Vec<PathComponent>) -> Path {
        Path(components)
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, c) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ".")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Maps rendered paths to [DataItem]s.
///
/// Lookups accept the rendered form as produced by [Path]'s `Display` and also
/// hex codes in place of names (`UPS.00840024.RemainingCapacity` finds the same
/// item as `UPS.PowerSummary.RemainingCapacity`). Where two items render to the
/// same path and kind, the one declared last wins.
#[derive(Debug, Default)]
pub struct PathIndex {
    by_path: HashMap<(String, ItemKind), Arc<DataItem>>,
    by_location: HashMap<(u8, ItemKind, u32), Arc<DataItem>>,
    names: HashMap<u32, &'static str>,
}

impl PathIndex {
    pub fn build(items: &[Arc<DataItem>]) -> PathIndex {
        let mut index = PathIndex::default();
        for item in items {
            for c in item.path.components() {
                if let PathComponent::Named { code, name } = c {
                    index.names.insert(*code, name);
                }
            }
            index
                .by_path
                .insert((item.path.to_string(), item.kind), Arc::clone(item));
            index
                .by_location
                .insert((item.report_id, item.kind, item.offset), Arc::clone(item));
        }
        index
    }

    /// Find the item at `path`. With a `preference` that kind is tried first,
    /// then Feature, Input and Output in that order.
    pub fn lookup(&self, path: &str, preference: Option<ItemKind>) -> Option<&Arc<DataItem>> {
        let key = self.normalize(path)?;
        preference
            .into_iter()
            .chain([ItemKind::Feature, ItemKind::Input, ItemKind::Output])
            .find_map(|kind| self.by_path.get(&(key.clone(), kind)))
    }

    /// Find the item of `kind` that starts at bit `offset` of report `report_id`.
    pub fn find(&self, report_id: u8, kind: ItemKind, offset: u32) -> Option<&Arc<DataItem>> {
        self.by_location.get(&(report_id, kind, offset))
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Rewrite `path` into the rendered form, or `None` if a component is
    /// syntactically not a usage.
    fn normalize(&self, path: &str) -> Option<String> {
        let mut out = Vec::new();
        for component in path.split('.') {
            let component = component.trim();
            if component.is_empty() {
                return None;
            }
            if let Some(inner) = component
                .strip_prefix('[')
                .and_then(|c| c.strip_suffix(']'))
            {
                let n: u32 = inner.trim().parse().ok()?;
                out.push(format!("[{n}]"));
            } else if component.len() == 8 && component.chars().all(|c| c.is_ascii_hexdigit()) {
                let code = u32::from_str_radix(component, 16).ok()?;
                match self.names.get(&code) {
                    Some(name) => out.push(name.to_string()),
                    None => out.push(format!("{code:08x}")),
                }
            } else {
                out.push(component.to_string());
            }
        }
        Some(out.join("."))
    }
}
