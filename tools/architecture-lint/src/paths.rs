//! Resolution of the paths a source file mentions.

use std::collections::BTreeSet;

use camino::Utf8Path;
use syn::visit::{self, Visit};

/// Library name of the linted crate, as written in absolute paths.
const CRATE_NAME: &str = "busfleet";

/// Top-level modules that only `lib.rs` could name without `crate::`.
const LAYER_ROOTS: &[&str] = &["domain", "inbound", "outbound"];

/// Where a path leads once relative segments are resolved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Target {
    /// Module path below `crate::`.
    Internal(Vec<String>),
    /// First segment of a path into another crate (or a local name).
    External(String),
}

/// Module path of a file relative to `backend/src`.
///
/// `outbound/channels/email.rs` is `outbound::channels::email`;
/// `outbound/channels/mod.rs` is `outbound::channels`.
pub(crate) fn module_of(file: &Utf8Path) -> Vec<String> {
    let mut module: Vec<String> = file
        .parent()
        .map(|dir| dir.components().map(|part| part.as_str().to_owned()).collect())
        .unwrap_or_default();
    match file.file_stem() {
        Some("mod") | None => {}
        Some(stem) => module.push(stem.to_owned()),
    }
    module
}

/// Resolve `segments` as written inside `module`.
///
/// Returns `None` for an empty path or one whose `super::` chain climbs
/// above the crate root.
pub(crate) fn resolve(module: &[String], segments: &[String]) -> Option<Target> {
    let (first, rest) = segments.split_first()?;
    let target = match first.as_str() {
        "crate" | CRATE_NAME => Target::Internal(rest.to_vec()),
        "self" => Target::Internal([module, rest].concat()),
        "super" => {
            let ups = segments.iter().take_while(|segment| *segment == "super").count();
            let base = module.len().checked_sub(ups)?;
            Target::Internal([&module[..base], &segments[ups..]].concat())
        }
        root if LAYER_ROOTS.contains(&root) => Target::Internal(segments.to_vec()),
        _ => Target::External(first.clone()),
    };
    Some(target)
}

/// Every target `parsed` refers to, through `use` items or inline paths.
pub(crate) fn referenced_targets(file: &Utf8Path, parsed: &syn::File) -> BTreeSet<Target> {
    let mut collector = Collector {
        module: module_of(file),
        targets: BTreeSet::new(),
    };
    collector.visit_file(parsed);
    collector.targets
}

struct Collector {
    /// Current module, extended while inside inline `mod name { .. }` blocks.
    module: Vec<String>,
    targets: BTreeSet<Target>,
}

impl Collector {
    fn record(&mut self, segments: &[String]) {
        if let Some(target) = resolve(&self.module, segments) {
            self.targets.insert(target);
        }
    }

    fn record_use_tree(&mut self, tree: &syn::UseTree, prefix: &mut Vec<String>) {
        match tree {
            syn::UseTree::Path(path) => {
                prefix.push(path.ident.to_string());
                self.record_use_tree(&path.tree, prefix);
                prefix.pop();
            }
            syn::UseTree::Name(name) => {
                prefix.push(name.ident.to_string());
                self.record(prefix);
                prefix.pop();
            }
            syn::UseTree::Rename(rename) => {
                prefix.push(rename.ident.to_string());
                self.record(prefix);
                prefix.pop();
            }
            syn::UseTree::Glob(_) => self.record(prefix),
            syn::UseTree::Group(group) => {
                for item in &group.items {
                    self.record_use_tree(item, prefix);
                }
            }
        }
    }
}

impl<'ast> Visit<'ast> for Collector {
    fn visit_path(&mut self, node: &'ast syn::Path) {
        let segments: Vec<String> = node
            .segments
            .iter()
            .map(|segment| segment.ident.to_string())
            .collect();
        self.record(&segments);
        visit::visit_path(self, node);
    }

    fn visit_item_use(&mut self, node: &'ast syn::ItemUse) {
        self.record_use_tree(&node.tree, &mut Vec::new());
    }

    fn visit_item_mod(&mut self, node: &'ast syn::ItemMod) {
        let inline = node.content.is_some();
        if inline {
            self.module.push(node.ident.to_string());
        }
        visit::visit_item_mod(self, node);
        if inline {
            self.module.pop();
        }
    }
}
