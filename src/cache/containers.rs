//! Concurrent indexed containers backing the content cache.
//!
//! Every mutator completes one container mutation under the owning shard
//! or field lock, so writers on distinct keys never serialize on a global
//! lock and readers never observe a half-applied mutation.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hash;
use std::sync::RwLock;

use dashmap::{DashMap, DashSet};

use crate::domain::{
    extent::TimeRange,
    geometry::{Envelope, ReferencedEnvelope},
    i18n::MultilingualString,
};

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::containers";

/// Values that only ever grow when combined.
pub trait Extent: Clone {
    fn expand(&mut self, other: &Self);
}

impl Extent for TimeRange {
    fn expand(&mut self, other: &Self) {
        self.expand_to_include(other);
    }
}

impl Extent for ReferencedEnvelope {
    fn expand(&mut self, other: &Self) {
        self.expand_to_include(other);
    }
}

// ============================================================================
// Sets
// ============================================================================

#[derive(Debug)]
pub struct ValueSet<T: Eq + Hash>(DashSet<T>);

pub type IdSet = ValueSet<String>;

impl<T: Eq + Hash> Default for ValueSet<T> {
    fn default() -> Self {
        Self(DashSet::new())
    }
}

impl<T: Eq + Hash + Ord + Clone> ValueSet<T> {
    pub fn insert(&self, value: impl Into<T>) -> bool {
        self.0.insert(value.into())
    }

    pub fn extend<V: Into<T>>(&self, values: impl IntoIterator<Item = V>) {
        for value in values {
            self.0.insert(value.into());
        }
    }

    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.0.contains(value)
    }

    pub fn remove<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.0.remove(value).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_sorted(&self) -> BTreeSet<T> {
        self.0.iter().map(|value| value.key().clone()).collect()
    }

    pub fn merge_from(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        self.extend(other.to_sorted());
    }
}

// ============================================================================
// Relationship maps
// ============================================================================

/// Identifier to related-identifier set. Empty sets are never stored.
#[derive(Debug, Default)]
pub struct RelationMap(DashMap<String, BTreeSet<String>>);

impl RelationMap {
    pub fn add(&self, key: &str, value: impl Into<String>) {
        self.0.entry(key.to_string()).or_default().insert(value.into());
    }

    pub fn add_all<V: Into<String>>(&self, key: &str, values: impl IntoIterator<Item = V>) {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return;
        }
        self.0.entry(key.to_string()).or_default().extend(values);
    }

    pub fn get(&self, key: &str) -> BTreeSet<String> {
        self.0
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.0.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops every `(key, value)` pair rejected by `keep` and returns the
    /// dropped pairs.
    pub fn retain(&self, mut keep: impl FnMut(&str, &str) -> bool) -> Vec<(String, String)> {
        let mut dropped = Vec::new();
        for mut entry in self.0.iter_mut() {
            let (key, values) = entry.pair_mut();
            values.retain(|value| {
                let kept = keep(key, value);
                if !kept {
                    dropped.push((key.clone(), value.clone()));
                }
                kept
            });
        }
        self.0.retain(|_, values| !values.is_empty());
        dropped
    }

    pub fn to_image(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.0
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn from_image(image: BTreeMap<String, BTreeSet<String>>) -> Self {
        let map = Self::default();
        for (key, values) in image {
            map.add_all(&key, values);
        }
        map
    }

    pub fn merge_from(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        for (key, values) in other.to_image() {
            self.add_all(&key, values);
        }
    }
}

// ============================================================================
// Per-identifier extents, names and scalars
// ============================================================================

#[derive(Debug)]
pub struct ExtentMap<T>(DashMap<String, T>);

impl<T> Default for ExtentMap<T> {
    fn default() -> Self {
        Self(DashMap::new())
    }
}

impl<T: Extent> ExtentMap<T> {
    pub fn expand(&self, key: &str, value: T) {
        self.0
            .entry(key.to_string())
            .and_modify(|current| current.expand(&value))
            .or_insert_with(|| value.clone());
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.0.get(key).map(|entry| entry.value().clone())
    }

    pub fn to_image(&self) -> BTreeMap<String, T> {
        self.0
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn from_image(image: BTreeMap<String, T>) -> Self {
        let map = Self::default();
        for (key, value) in image {
            map.expand(&key, value);
        }
        map
    }

    pub fn merge_from(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        for (key, value) in other.to_image() {
            self.expand(&key, value);
        }
    }
}

/// Language-keyed names per identifier; existing locales win.
#[derive(Debug, Default)]
pub struct NameMap(DashMap<String, MultilingualString>);

impl NameMap {
    pub fn add(&self, key: &str, names: &MultilingualString) {
        if names.is_empty() {
            return;
        }
        self.0
            .entry(key.to_string())
            .or_default()
            .merge_missing(names);
    }

    pub fn get(&self, key: &str) -> Option<MultilingualString> {
        self.0.get(key).map(|entry| entry.value().clone())
    }

    pub fn to_image(&self) -> BTreeMap<String, MultilingualString> {
        self.0
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn from_image(image: BTreeMap<String, MultilingualString>) -> Self {
        let map = Self::default();
        for (key, names) in image {
            map.add(&key, &names);
        }
        map
    }

    pub fn merge_from(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        for (key, names) in other.to_image() {
            self.add(&key, &names);
        }
    }
}

/// Single string value per identifier; the first writer wins.
#[derive(Debug, Default)]
pub struct ScalarMap(DashMap<String, String>);

impl ScalarMap {
    pub fn set_if_absent(&self, key: &str, value: impl Into<String>) -> bool {
        match self.0.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.0.remove(key).map(|(_, value)| value)
    }

    pub fn to_image(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn from_image(image: BTreeMap<String, String>) -> Self {
        let map = Self::default();
        for (key, value) in image {
            map.set_if_absent(&key, value);
        }
        map
    }

    pub fn merge_from(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        for (key, value) in other.to_image() {
            self.set_if_absent(&key, value);
        }
    }
}

// ============================================================================
// Cache-wide values
// ============================================================================

/// A cache-wide extent that never shrinks.
#[derive(Debug)]
pub struct GlobalExtent<T>(RwLock<Option<T>>);

impl<T> Default for GlobalExtent<T> {
    fn default() -> Self {
        Self(RwLock::new(None))
    }
}

impl<T: Extent> GlobalExtent<T> {
    pub fn expand(&self, value: &T) {
        let mut guard = rw_write(&self.0, SOURCE, "global_extent.expand");
        match guard.as_mut() {
            Some(current) => current.expand(value),
            None => *guard = Some(value.clone()),
        }
    }

    pub fn get(&self) -> Option<T> {
        rw_read(&self.0, SOURCE, "global_extent.get").clone()
    }

    pub fn merge_from(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        if let Some(value) = other.get() {
            self.expand(&value);
        }
    }
}

/// Cache-wide envelopes, one per spatial reference. Coordinates expressed
/// in different references are never combined.
#[derive(Debug, Default)]
pub struct SridEnvelopes(DashMap<i32, Envelope>);

impl SridEnvelopes {
    pub fn expand(&self, value: &ReferencedEnvelope) {
        self.0
            .entry(value.srid)
            .and_modify(|current| current.expand_to_include(&value.envelope))
            .or_insert(value.envelope);
    }

    pub fn get(&self, srid: i32) -> Option<ReferencedEnvelope> {
        self.0
            .get(&srid)
            .map(|entry| ReferencedEnvelope::new(srid, *entry.value()))
    }

    /// The envelope in `srid` when one exists, else the one with the
    /// smallest SRID.
    pub fn preferred(&self, srid: Option<i32>) -> Option<ReferencedEnvelope> {
        srid.and_then(|srid| self.get(srid)).or_else(|| {
            self.to_image()
                .into_iter()
                .next()
                .map(|(srid, envelope)| ReferencedEnvelope::new(srid, envelope))
        })
    }

    pub fn to_image(&self) -> BTreeMap<i32, Envelope> {
        self.0
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    pub fn merge_from(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        for (srid, envelope) in other.to_image() {
            self.expand(&ReferencedEnvelope::new(srid, envelope));
        }
    }
}

/// A cache-wide scalar; the first writer wins.
#[derive(Debug)]
pub struct FirstValue<T>(RwLock<Option<T>>);

impl<T> Default for FirstValue<T> {
    fn default() -> Self {
        Self(RwLock::new(None))
    }
}

impl<T: Clone> FirstValue<T> {
    pub fn set_if_absent(&self, value: T) -> bool {
        let mut guard = rw_write(&self.0, SOURCE, "first_value.set");
        if guard.is_some() {
            return false;
        }
        *guard = Some(value);
        true
    }

    pub fn get(&self) -> Option<T> {
        rw_read(&self.0, SOURCE, "first_value.get").clone()
    }

    pub fn merge_from(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        if let Some(value) = other.get() {
            self.set_if_absent(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;


    use super::*;

    #[test]
    fn relation_map_skips_empty_sets() {
        let map = RelationMap::default();
        map.add_all("a", Vec::<String>::new());
        assert!(map.is_empty());

        map.add("a", "x");
        map.add_all("a", ["y", "x"]);
        assert_eq!(map.get("a"), BTreeSet::from(["x".to_string(), "y".to_string()]));
        assert!(map.get("missing").is_empty());
    }

    #[test]
    fn relation_map_retain_reports_dropped_pairs() {
        let map = RelationMap::default();
        map.add_all("a", ["x", "y"]);
        map.add("b", "y");
        let dropped = map.retain(|_, value| value != "y");
        assert_eq!(dropped.len(), 2);
        assert_eq!(map.keys(), BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn scalar_map_keeps_first_writer() {
        let map = ScalarMap::default();
        assert!(map.set_if_absent("p", "type-a"));
        assert!(!map.set_if_absent("p", "type-b"));
        assert_eq!(map.get("p").as_deref(), Some("type-a"));
    }

    #[test]
    fn extent_map_only_grows() {
        let map = ExtentMap::default();
        map.expand("o", ReferencedEnvelope::new(4326, Envelope::new(0.0, 0.0, 1.0, 1.0)));
        map.expand("o", ReferencedEnvelope::new(3857, Envelope::new(0.5, -1.0, 0.8, 0.2)));
        map.expand("o", ReferencedEnvelope::new(4326, Envelope::new(-2.0, 0.0, 0.5, 0.5)));
        let merged = map.get("o").expect("envelope");
        assert_eq!(merged.srid, 3857);
        assert_eq!(merged.envelope, Envelope::new(0.5, -1.0, 0.8, 0.2));

        map.expand("o", ReferencedEnvelope::new(3857, Envelope::new(0.0, 0.0, 2.0, 2.0)));
        assert_eq!(map.get("o").expect("envelope").envelope, Envelope::new(0.0, -1.0, 2.0, 2.0));
    }

    #[test]
    fn srid_envelopes_keep_references_apart() {
        let envelopes = SridEnvelopes::default();
        envelopes.expand(&ReferencedEnvelope::new(4326, Envelope::new(0.0, 0.0, 1.0, 1.0)));
        envelopes.expand(&ReferencedEnvelope::new(3857, Envelope::new(2.0, 2.0, 3.0, 3.0)));
        envelopes.expand(&ReferencedEnvelope::new(4326, Envelope::new(-1.0, 0.0, 0.5, 2.0)));

        assert_eq!(
            envelopes.to_image(),
            BTreeMap::from([
                (3857, Envelope::new(2.0, 2.0, 3.0, 3.0)),
                (4326, Envelope::new(-1.0, 0.0, 1.0, 2.0)),
            ])
        );
        assert_eq!(
            envelopes.preferred(Some(4326)),
            Some(ReferencedEnvelope::new(4326, Envelope::new(-1.0, 0.0, 1.0, 2.0)))
        );
        assert_eq!(envelopes.preferred(Some(25832)).map(|e| e.srid), Some(3857));
        assert_eq!(envelopes.preferred(None).map(|e| e.srid), Some(3857));
    }

    #[test]
    fn concurrent_writers_on_distinct_keys() {
        let map = Arc::new(RelationMap::default());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let map = Arc::clone(&map);
                thread::spawn(move || {
                    for value in 0..100 {
                        map.add(&format!("key-{worker}"), format!("value-{value}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(map.len(), 8);
        assert!(map.to_image().values().all(|values| values.len() == 100));
    }

    #[test]
    fn self_merge_is_a_no_op() {
        let set = IdSet::default();
        set.insert("a");
        set.merge_from(&set);
        assert_eq!(set.len(), 1);
    }
}
