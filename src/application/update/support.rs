use std::collections::{BTreeMap, BTreeSet};

use crate::cache::{CacheConfig, ContentCache, Relation};
use crate::domain::{
    entities::DatasetRecord,
    i18n::{LocalizedName, resolve_names},
    types::EntityKind,
};

use super::error::{CacheUpdateError, UpdateFailure};

/// Collects all ancestors reachable from `direct` parents.
///
/// Each node is expanded once, so cyclic hierarchies terminate; the entity
/// itself is never part of its own closure.
pub(crate) fn ancestor_closure<E>(
    identifier: &str,
    direct: &[String],
    mut parents_of: impl FnMut(&str) -> Result<Vec<String>, E>,
) -> Result<BTreeSet<String>, E> {
    let mut visited = BTreeSet::new();
    let mut pending: Vec<String> = direct.to_vec();
    while let Some(next) = pending.pop() {
        if next == identifier || visited.contains(&next) {
            continue;
        }
        let parents = parents_of(&next)?;
        visited.insert(next);
        pending.extend(parents);
    }
    Ok(visited)
}

/// Records the closure under `parents` and the entity under every
/// ancestor's `children`, which keeps the inverse closed as well.
pub(crate) fn record_hierarchy(
    cache: &ContentCache,
    parents: Relation,
    children: Relation,
    identifier: &str,
    ancestors: &BTreeSet<String>,
) {
    cache.relate_all(parents, identifier, ancestors.iter().cloned());
    for ancestor in ancestors {
        cache.relate(children, ancestor, identifier);
    }
}

pub(crate) fn record_names(
    cache: &ContentCache,
    config: &CacheConfig,
    kind: EntityKind,
    identifier: &str,
    name: Option<&str>,
    description: Option<&str>,
    translations: &[LocalizedName],
) {
    let resolved = resolve_names(
        identifier,
        name,
        description,
        translations,
        &config.default_locale,
    );
    cache.add_names(kind, identifier, &resolved);
}

pub(crate) fn group_datasets<'a>(
    datasets: &'a [DatasetRecord],
    key: impl Fn(&'a DatasetRecord) -> Option<&'a str>,
) -> BTreeMap<&'a str, Vec<&'a DatasetRecord>> {
    let mut grouped: BTreeMap<&str, Vec<&DatasetRecord>> = BTreeMap::new();
    for dataset in datasets {
        if let Some(key) = key(dataset) {
            grouped.entry(key).or_default().push(dataset);
        }
    }
    grouped
}

/// Rejects datasets whose mandatory references are blank.
pub(crate) fn validate_dataset(
    kind: EntityKind,
    identifier: &str,
    dataset: &DatasetRecord,
) -> Result<(), CacheUpdateError> {
    let blank = [
        ("offering", dataset.offering.as_str()),
        ("procedure", dataset.procedure.as_str()),
        ("observable property", dataset.observable_property.as_str()),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());
    match blank {
        Some((field, _)) => Err(CacheUpdateError::new(
            kind,
            Some(identifier),
            "aggregate_datasets",
            UpdateFailure::InvalidRecord(format!("dataset {} has no {field}", dataset.id)),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use crate::domain::entities::fixtures::dataset;

    use super::*;

    fn closure_over(edges: &[(&str, &str)], start: &str) -> BTreeSet<String> {
        let mut lookup: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (child, parent) in edges {
            lookup.entry(child).or_default().push(parent.to_string());
        }
        let direct = lookup.get(start).cloned().unwrap_or_default();
        ancestor_closure(start, &direct, |id| {
            Ok::<_, Infallible>(lookup.get(id).cloned().unwrap_or_default())
        })
        .unwrap_or_else(|never| match never {})
    }

    #[test]
    fn closure_includes_grandparents() {
        let closure = closure_over(&[("c", "p"), ("p", "g")], "c");
        assert_eq!(closure, BTreeSet::from(["p".to_string(), "g".to_string()]));
    }

    #[test]
    fn closure_terminates_on_cycles() {
        let closure = closure_over(&[("a", "b"), ("b", "c"), ("c", "a"), ("c", "b")], "a");
        assert_eq!(closure, BTreeSet::from(["b".to_string(), "c".to_string()]));
    }

    #[test]
    fn closure_propagates_lookup_errors() {
        let result = ancestor_closure("a", &["b".to_string()], |_| Err("offline"));
        assert_eq!(result, Err("offline"));
    }

    #[test]
    fn hierarchy_records_inverse_children() {
        let cache = ContentCache::new();
        let ancestors = BTreeSet::from(["p".to_string(), "g".to_string()]);
        record_hierarchy(
            &cache,
            Relation::ProcedureParents,
            Relation::ProcedureChildren,
            "c",
            &ancestors,
        );
        let image = cache.image();
        assert_eq!(image.relations[&Relation::ProcedureParents]["c"], ancestors);
        assert!(image.relations[&Relation::ProcedureChildren]["g"].contains("c"));
    }

    #[test]
    fn blank_procedure_is_rejected() {
        let record = dataset(7, "o", " ", "op");
        let error = validate_dataset(EntityKind::Offering, "o", &record).expect_err("invalid");
        assert_eq!(error.cause, UpdateFailure::InvalidRecord("dataset 7 has no procedure".into()));
    }
}
