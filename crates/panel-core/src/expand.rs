//! Cross-product expansion of base tasks with modifiers.

use std::collections::{HashMap, HashSet};

use crate::CompositeId;

/// Separator between base and modifier in a joined composite id.
pub const COMPOSITE_SEPARATOR: char = '@';

/// Pair every distinct base with every modifier.
///
/// Bases are deduplicated keeping their first occurrence, so repeated base
/// names do not multiply the result. Output order is base-major, then
/// modifier order: `|dedup(bases)| x |modifiers|` items.
pub fn expand<B, M>(bases: &[B], modifiers: &[M]) -> Vec<CompositeId>
where
    B: AsRef<str>,
    M: AsRef<str>,
{
    let mut seen = HashSet::new();
    let deduped: Vec<&str> = bases
        .iter()
        .map(AsRef::as_ref)
        .filter(|base| seen.insert(*base))
        .collect();

    let mut out = Vec::with_capacity(deduped.len() * modifiers.len());
    for base in deduped {
        for modifier in modifiers {
            out.push(CompositeId::new(base, modifier.as_ref()));
        }
    }
    out
}

/// Give repeated ids distinct aliases so the same tool can run more than once.
///
/// The first occurrence keeps its id; the n-th repeat becomes `id__n`.
pub fn alias_duplicates<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    ids.iter()
        .map(|id| {
            let id = id.as_ref();
            let count = counts.entry(id).or_insert(0);
            *count += 1;
            if *count == 1 {
                id.to_string()
            } else {
                format!("{}__{}", id, count)
            }
        })
        .collect()
}

/// Strip an alias suffix added by [`alias_duplicates`].
pub fn unalias(id: &str) -> &str {
    match id.rsplit_once("__") {
        Some((base, n)) if !base.is_empty() && !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => base,
        _ => id,
    }
}
