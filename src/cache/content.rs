//! The content cache: indexed read model of offerings, procedures,
//! observable properties, features and result templates.

use std::collections::BTreeSet;

use crate::domain::{
    extent::TimeRange,
    geometry::ReferencedEnvelope,
    i18n::{MultilingualString, ResolvedNames},
    types::EntityKind,
};

use super::containers::{
    ExtentMap, FirstValue, GlobalExtent, IdSet, NameMap, ScalarMap, SridEnvelopes, ValueSet,
};
use super::image::{CacheImage, insert_non_empty};
use super::relation::{Relation, Relations};

/// One container per entity kind.
#[derive(Debug, Default)]
pub(crate) struct PerKind<T> {
    offering: T,
    procedure: T,
    observable_property: T,
    feature_of_interest: T,
    result_template: T,
}

impl<T> PerKind<T> {
    pub(crate) fn get(&self, kind: EntityKind) -> &T {
        match kind {
            EntityKind::Offering => &self.offering,
            EntityKind::Procedure => &self.procedure,
            EntityKind::ObservableProperty => &self.observable_property,
            EntityKind::FeatureOfInterest => &self.feature_of_interest,
            EntityKind::ResultTemplate => &self.result_template,
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (EntityKind, &T)> {
        EntityKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

/// Concurrently writable content cache.
///
/// All mutators take `&self`: workers building disjoint identifiers write
/// through shard-locked containers and never contend on a cache-wide lock.
/// Once published the cache is only reachable through
/// [`ReadableCache`](super::readable::ReadableCache).
#[derive(Debug, Default)]
pub struct ContentCache {
    pub(crate) existence: PerKind<IdSet>,
    pub(crate) published: PerKind<IdSet>,
    pub(crate) relations: Relations,
    pub(crate) display_names: PerKind<ScalarMap>,
    pub(crate) names: PerKind<NameMap>,
    pub(crate) descriptions: PerKind<NameMap>,
    pub(crate) offering_envelopes: ExtentMap<ReferencedEnvelope>,
    pub(crate) offering_phenomenon_times: ExtentMap<TimeRange>,
    pub(crate) offering_result_times: ExtentMap<TimeRange>,
    pub(crate) procedure_phenomenon_times: ExtentMap<TimeRange>,
    pub(crate) procedure_types: ScalarMap,
    pub(crate) type_procedures: IdSet,
    pub(crate) aggregate_procedures: IdSet,
    pub(crate) supported_languages: IdSet,
    pub(crate) srids: ValueSet<i32>,
    pub(crate) default_srid: FirstValue<i32>,
    pub(crate) global_envelopes: SridEnvelopes,
    pub(crate) global_phenomenon_time: GlobalExtent<TimeRange>,
    pub(crate) global_result_time: GlobalExtent<TimeRange>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Existence and publication
    // ========================================================================

    pub fn add_entity(&self, kind: EntityKind, identifier: &str) {
        self.existence.get(kind).insert(identifier);
    }

    pub fn add_published(&self, kind: EntityKind, identifier: &str) {
        self.published.get(kind).insert(identifier);
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    pub fn relate(&self, relation: Relation, key: &str, value: impl Into<String>) {
        self.relations.get(relation).add(key, value);
    }

    pub fn relate_all<V: Into<String>>(
        &self,
        relation: Relation,
        key: &str,
        values: impl IntoIterator<Item = V>,
    ) {
        self.relations.get(relation).add_all(key, values);
    }

    // ========================================================================
    // Names
    // ========================================================================

    /// Records the display name, multilingual names and descriptions of an
    /// entity, and adds their locales to the supported languages.
    pub fn add_names(&self, kind: EntityKind, identifier: &str, resolved: &ResolvedNames) {
        self.display_names
            .get(kind)
            .set_if_absent(identifier, resolved.display.clone());
        self.add_multilingual(kind, identifier, &resolved.names, &resolved.descriptions);
    }

    pub fn add_multilingual(
        &self,
        kind: EntityKind,
        identifier: &str,
        names: &MultilingualString,
        descriptions: &MultilingualString,
    ) {
        self.names.get(kind).add(identifier, names);
        self.descriptions.get(kind).add(identifier, descriptions);
        self.supported_languages
            .extend(names.locales().chain(descriptions.locales()));
    }

    // ========================================================================
    // Extents
    // ========================================================================

    pub fn expand_offering_envelope(&self, offering: &str, envelope: ReferencedEnvelope) {
        self.srids.insert(envelope.srid);
        self.global_envelopes.expand(&envelope);
        self.offering_envelopes.expand(offering, envelope);
    }

    pub fn expand_offering_phenomenon_time(&self, offering: &str, range: TimeRange) {
        self.global_phenomenon_time.expand(&range);
        self.offering_phenomenon_times.expand(offering, range);
    }

    pub fn expand_offering_result_time(&self, offering: &str, range: TimeRange) {
        self.global_result_time.expand(&range);
        self.offering_result_times.expand(offering, range);
    }

    pub fn expand_procedure_phenomenon_time(&self, procedure: &str, range: TimeRange) {
        self.global_phenomenon_time.expand(&range);
        self.procedure_phenomenon_times.expand(procedure, range);
    }

    pub fn expand_global_envelope(&self, envelope: &ReferencedEnvelope) {
        self.srids.insert(envelope.srid);
        self.global_envelopes.expand(envelope);
    }

    // ========================================================================
    // Procedure descriptors and scalars
    // ========================================================================

    /// First writer wins.
    pub fn set_procedure_type_of(&self, procedure: &str, type_procedure: &str) {
        self.procedure_types.set_if_absent(procedure, type_procedure);
    }

    pub fn add_type_procedure(&self, procedure: &str) {
        self.type_procedures.insert(procedure);
    }

    pub fn add_aggregate_procedure(&self, procedure: &str) {
        self.aggregate_procedures.insert(procedure);
    }

    pub fn add_srid(&self, srid: i32) {
        self.srids.insert(srid);
    }

    /// First writer wins.
    pub fn set_default_srid(&self, srid: i32) {
        self.default_srid.set_if_absent(srid);
    }

    // ========================================================================
    // Images
    // ========================================================================

    pub fn image(&self) -> CacheImage {
        let mut image = CacheImage::default();
        for (kind, set) in self.existence.iter() {
            insert_non_empty(&mut image.entities, kind, set.to_sorted(), |s| s.is_empty());
        }
        for (kind, set) in self.published.iter() {
            insert_non_empty(&mut image.published, kind, set.to_sorted(), |s| s.is_empty());
        }
        for (relation, map) in self.relations.iter() {
            insert_non_empty(&mut image.relations, relation, map.to_image(), |m| m.is_empty());
        }
        for (kind, map) in self.display_names.iter() {
            insert_non_empty(&mut image.display_names, kind, map.to_image(), |m| m.is_empty());
        }
        for (kind, map) in self.names.iter() {
            insert_non_empty(&mut image.names, kind, map.to_image(), |m| m.is_empty());
        }
        for (kind, map) in self.descriptions.iter() {
            insert_non_empty(&mut image.descriptions, kind, map.to_image(), |m| m.is_empty());
        }
        image.offering_envelopes = self.offering_envelopes.to_image();
        image.offering_phenomenon_times = self.offering_phenomenon_times.to_image();
        image.offering_result_times = self.offering_result_times.to_image();
        image.procedure_phenomenon_times = self.procedure_phenomenon_times.to_image();
        image.procedure_types = self.procedure_types.to_image();
        image.type_procedures = self.type_procedures.to_sorted();
        image.aggregate_procedures = self.aggregate_procedures.to_sorted();
        image.supported_languages = self.supported_languages.to_sorted();
        image.srids = self.srids.to_sorted();
        image.default_srid = self.default_srid.get();
        image.global_envelopes = self.global_envelopes.to_image();
        image.global_phenomenon_time = self.global_phenomenon_time.get();
        image.global_result_time = self.global_result_time.get();
        image
    }

    pub fn from_image(image: CacheImage) -> Self {
        let cache = Self::new();
        for (kind, ids) in image.entities {
            cache.existence.get(kind).extend(ids);
        }
        for (kind, ids) in image.published {
            cache.published.get(kind).extend(ids);
        }
        for (relation, map) in image.relations {
            for (key, values) in map {
                cache.relate_all(relation, &key, values);
            }
        }
        for (kind, map) in image.display_names {
            for (key, value) in map {
                cache.display_names.get(kind).set_if_absent(&key, value);
            }
        }
        for (kind, map) in image.names {
            for (key, value) in map {
                cache.names.get(kind).add(&key, &value);
            }
        }
        for (kind, map) in image.descriptions {
            for (key, value) in map {
                cache.descriptions.get(kind).add(&key, &value);
            }
        }
        for (key, value) in image.offering_envelopes {
            cache.offering_envelopes.expand(&key, value);
        }
        for (key, value) in image.offering_phenomenon_times {
            cache.offering_phenomenon_times.expand(&key, value);
        }
        for (key, value) in image.offering_result_times {
            cache.offering_result_times.expand(&key, value);
        }
        for (key, value) in image.procedure_phenomenon_times {
            cache.procedure_phenomenon_times.expand(&key, value);
        }
        for (key, value) in image.procedure_types {
            cache.procedure_types.set_if_absent(&key, value);
        }
        cache.type_procedures.extend(image.type_procedures);
        cache.aggregate_procedures.extend(image.aggregate_procedures);
        cache.supported_languages.extend(image.supported_languages);
        cache.srids.extend(image.srids);
        if let Some(srid) = image.default_srid {
            cache.default_srid.set_if_absent(srid);
        }
        for (srid, envelope) in image.global_envelopes {
            cache
                .global_envelopes
                .expand(&ReferencedEnvelope::new(srid, envelope));
        }
        if let Some(range) = image.global_phenomenon_time {
            cache.global_phenomenon_time.expand(&range);
        }
        if let Some(range) = image.global_result_time {
            cache.global_result_time.expand(&range);
        }
        cache
    }
}

/// A deep copy: merging into an empty cache reproduces every field.
impl Clone for ContentCache {
    fn clone(&self) -> Self {
        let copy = ContentCache::new();
        copy.merge_from(self);
        copy
    }
}

impl PartialEq for ContentCache {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.image() == other.image()
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::domain::geometry::Envelope;
    use crate::domain::i18n::resolve_names;

    use super::*;

    #[test]
    fn empty_cache_has_empty_image() {
        assert!(ContentCache::new().image().is_empty());
    }

    #[test]
    fn offering_envelope_grows_global_envelope() {
        let cache = ContentCache::new();
        cache.expand_offering_envelope(
            "o1",
            ReferencedEnvelope::new(4326, Envelope::new(0.0, 0.0, 10.0, 10.0)),
        );
        cache.expand_offering_envelope(
            "o2",
            ReferencedEnvelope::new(4326, Envelope::new(5.0, 5.0, 20.0, 20.0)),
        );
        let global = cache.image().global_envelope().expect("global envelope");
        assert_eq!(global.envelope, Envelope::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(cache.image().srids, BTreeSet::from([4326]));
    }

    #[test]
    fn global_envelope_prefers_the_default_srid() {
        let cache = ContentCache::new();
        cache.expand_offering_envelope(
            "o1",
            ReferencedEnvelope::new(25832, Envelope::new(400.0, 5000.0, 500.0, 5100.0)),
        );
        cache.expand_offering_envelope(
            "o2",
            ReferencedEnvelope::new(4326, Envelope::new(5.0, 5.0, 20.0, 20.0)),
        );
        assert_eq!(cache.image().global_envelope().map(|e| e.srid), Some(4326));

        cache.set_default_srid(25832);
        let global = cache.image().global_envelope().expect("global envelope");
        assert_eq!(global.srid, 25832);
        assert_eq!(global.envelope, Envelope::new(400.0, 5000.0, 500.0, 5100.0));
    }

    #[test]
    fn names_feed_supported_languages() {
        let cache = ContentCache::new();
        let translations = [crate::domain::i18n::LocalizedName {
            locale: "ger".into(),
            name: Some("Messstelle".into()),
            description: None,
        }];
        let resolved = resolve_names("urn:site:1", Some("Site"), None, &translations, "eng");
        cache.add_names(EntityKind::FeatureOfInterest, "urn:site:1", &resolved);

        let image = cache.image();
        assert_eq!(
            image.supported_languages,
            BTreeSet::from(["eng".to_string(), "ger".to_string()])
        );
        assert_eq!(
            image.display_names[&EntityKind::FeatureOfInterest]["urn:site:1"],
            "Site"
        );
    }

    #[test]
    fn image_round_trip_preserves_content() {
        let cache = ContentCache::new();
        cache.add_entity(EntityKind::Procedure, "p1");
        cache.add_published(EntityKind::Procedure, "p1");
        cache.relate(Relation::ProcedureOfferings, "p1", "o1");
        cache.set_procedure_type_of("p1", "type-1");
        cache.add_type_procedure("type-1");
        cache.set_default_srid(4326);
        cache.expand_procedure_phenomenon_time(
            "p1",
            TimeRange::new(datetime!(2024-01-01 0:00 UTC), datetime!(2024-06-01 0:00 UTC)),
        );

        let restored = ContentCache::from_image(cache.image());
        assert_eq!(restored, cache);
        assert_eq!(restored.clone(), cache);
    }
}
