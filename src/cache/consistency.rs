//! Referential completeness of relationship maps.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::domain::types::EntityKind;

use super::content::ContentCache;
use super::relation::Relation;

/// An identifier referenced through relationships without existing itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub kind: EntityKind,
    pub identifier: String,
    pub relations: BTreeSet<Relation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Relationship pairs removed.
    pub pruned: usize,
    /// One entry per missing identifier, however often it was referenced.
    pub dangling: Vec<DanglingReference>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.pruned == 0
    }
}

/// Removes every relationship pair whose key or value does not exist in the
/// existence set of its kind, and drops published identifiers that do not
/// exist.
pub fn enforce_referential_completeness(cache: &ContentCache) -> ConsistencyReport {
    let existing: BTreeMap<EntityKind, BTreeSet<String>> = cache
        .existence
        .iter()
        .map(|(kind, set)| (kind, set.to_sorted()))
        .collect();
    let exists = |kind: EntityKind, identifier: &str| {
        existing
            .get(&kind)
            .is_some_and(|ids| ids.contains(identifier))
    };

    let mut dangling: BTreeMap<(EntityKind, String), BTreeSet<Relation>> = BTreeMap::new();
    let mut pruned = 0;
    for (relation, map) in cache.relations.iter() {
        let source = relation.source();
        let target = relation.target();
        let dropped = map.retain(|key, value| {
            exists(source, key) && target.is_none_or(|kind| exists(kind, value))
        });
        pruned += dropped.len();
        for (key, value) in dropped {
            if !exists(source, key.as_str()) {
                dangling
                    .entry((source, key))
                    .or_default()
                    .insert(relation);
            }
            if let Some(kind) = target.filter(|kind| !exists(*kind, value.as_str())) {
                dangling.entry((kind, value)).or_default().insert(relation);
            }
        }
    }

    for (kind, published) in cache.published.iter() {
        for identifier in published.to_sorted() {
            if !exists(kind, identifier.as_str()) {
                published.remove(identifier.as_str());
            }
        }
    }

    if pruned > 0 {
        debug!(
            pruned,
            dangling = dangling.len(),
            "Pruned dangling relationship references"
        );
    }

    ConsistencyReport {
        pruned,
        dangling: dangling
            .into_iter()
            .map(|((kind, identifier), relations)| DanglingReference {
                kind,
                identifier,
                relations,
            })
            .collect(),
    }
}
