//! Field-wise merge rules for content caches.
//!
//! | field | rule |
//! |---|---|
//! | existence, published, relationship sets | union |
//! | temporal extents, envelopes | expand (never shrinks) |
//! | display names, `type_of`, default SRID | first writer wins |
//! | multilingual names | union of locales, target wins per locale |
//!
//! Envelopes are never combined across SRIDs: the global extent keeps one
//! envelope per SRID, and an offering envelope keeps the one with the
//! smallest SRID.

use super::content::ContentCache;

impl ContentCache {
    /// Folds `source` into `self` without touching `source`.
    pub fn merge_from(&self, source: &ContentCache) {
        if std::ptr::eq(self, source) {
            return;
        }
        for (kind, set) in source.existence.iter() {
            self.existence.get(kind).merge_from(set);
        }
        for (kind, set) in source.published.iter() {
            self.published.get(kind).merge_from(set);
        }
        for (relation, map) in source.relations.iter() {
            self.relations.get(relation).merge_from(map);
        }
        for (kind, map) in source.display_names.iter() {
            self.display_names.get(kind).merge_from(map);
        }
        for (kind, map) in source.names.iter() {
            self.names.get(kind).merge_from(map);
        }
        for (kind, map) in source.descriptions.iter() {
            self.descriptions.get(kind).merge_from(map);
        }
        self.offering_envelopes.merge_from(&source.offering_envelopes);
        self.offering_phenomenon_times
            .merge_from(&source.offering_phenomenon_times);
        self.offering_result_times
            .merge_from(&source.offering_result_times);
        self.procedure_phenomenon_times
            .merge_from(&source.procedure_phenomenon_times);
        self.procedure_types.merge_from(&source.procedure_types);
        self.type_procedures.merge_from(&source.type_procedures);
        self.aggregate_procedures
            .merge_from(&source.aggregate_procedures);
        self.supported_languages
            .merge_from(&source.supported_languages);
        self.srids.merge_from(&source.srids);
        self.default_srid.merge_from(&source.default_srid);
        self.global_envelopes.merge_from(&source.global_envelopes);
        self.global_phenomenon_time
            .merge_from(&source.global_phenomenon_time);
        self.global_result_time
            .merge_from(&source.global_result_time);
    }
}

/// Combines content caches using the rules above.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheMerger;

impl CacheMerger {
    /// `merge(target, source) -> target'`, leaving both inputs untouched.
    pub fn merge(&self, target: &ContentCache, source: &ContentCache) -> ContentCache {
        let merged = target.clone();
        merged.merge_from(source);
        merged
    }

    /// Folds every cache, in order, into a new one.
    pub fn merge_all<'a>(&self, caches: impl IntoIterator<Item = &'a ContentCache>) -> ContentCache {
        let merged = ContentCache::new();
        for cache in caches {
            merged.merge_from(cache);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::cache::relation::Relation;
    use crate::domain::{
        extent::TimeRange,
        geometry::{Envelope, ReferencedEnvelope},
        i18n::MultilingualString,
        types::EntityKind,
    };

    use super::*;

    fn with_envelope(envelope: Envelope) -> ContentCache {
        let cache = ContentCache::new();
        cache.expand_global_envelope(&ReferencedEnvelope::new(4326, envelope));
        cache
    }

    #[test]
    fn global_envelopes_expand() {
        let merged = CacheMerger.merge(
            &with_envelope(Envelope::new(0.0, 0.0, 10.0, 10.0)),
            &with_envelope(Envelope::new(5.0, 5.0, 20.0, 20.0)),
        );
        let envelope = merged.image().global_envelope().expect("envelope");
        assert_eq!(envelope.envelope, Envelope::new(0.0, 0.0, 20.0, 20.0));
    }

    #[test]
    fn target_srid_is_kept() {
        let target = ContentCache::new();
        target.expand_offering_envelope(
            "o",
            ReferencedEnvelope::new(4326, Envelope::new(0.0, 0.0, 1.0, 1.0)),
        );
        let source = ContentCache::new();
        source.expand_offering_envelope(
            "o",
            ReferencedEnvelope::new(3857, Envelope::new(2.0, 2.0, 3.0, 3.0)),
        );
        let merged = CacheMerger.merge(&target, &source);
        let envelope = merged.image().offering_envelopes["o"];
        assert_eq!(envelope.srid, 4326);
        assert_eq!(envelope.envelope, Envelope::new(0.0, 0.0, 3.0, 3.0));
    }

    #[test]
    fn absent_values_never_shrink_bounds() {
        let target = ContentCache::new();
        target.expand_offering_result_time(
            "o",
            TimeRange::new(datetime!(2024-01-01 0:00 UTC), datetime!(2024-12-31 0:00 UTC)),
        );
        let merged = CacheMerger.merge(&target, &ContentCache::new());
        assert_eq!(merged, target);
    }

    #[test]
    fn target_wins_on_name_collision() {
        let target = ContentCache::new();
        target.add_multilingual(
            EntityKind::Offering,
            "o",
            &MultilingualString::single("eng", "Target"),
            &MultilingualString::new(),
        );
        let source = ContentCache::new();
        source.add_multilingual(
            EntityKind::Offering,
            "o",
            &[("eng", "Source"), ("ger", "Quelle")].into_iter().collect(),
            &MultilingualString::new(),
        );
        let merged = CacheMerger.merge(&target, &source);
        let image = merged.image();
        let names = &image.names[&EntityKind::Offering]["o"];
        assert_eq!(names.get("eng"), Some("Target"));
        assert_eq!(names.get("ger"), Some("Quelle"));
    }

    #[test]
    fn merge_leaves_inputs_untouched() {
        let target = ContentCache::new();
        target.relate(Relation::OfferingProcedures, "A", "proc1");
        let source = ContentCache::new();
        source.relate(Relation::OfferingProcedures, "A", "proc2");
        let before = target.image();

        let merged = CacheMerger.merge(&target, &source);
        assert_eq!(target.image(), before);
        assert_eq!(
            merged.image().relations[&Relation::OfferingProcedures]["A"].len(),
            2
        );
    }

    #[test]
    fn merge_all_equals_pairwise_merges() {
        let parts: Vec<ContentCache> = (0..4)
            .map(|index| {
                let cache = ContentCache::new();
                cache.add_entity(EntityKind::Procedure, &format!("p{index}"));
                cache
            })
            .collect();
        let folded = CacheMerger.merge_all(&parts);
        let pairwise = parts
            .iter()
            .fold(ContentCache::new(), |acc, part| CacheMerger.merge(&acc, part));
        assert_eq!(folded, pairwise);
        assert_eq!(folded.image().entity_count(EntityKind::Procedure), 4);
    }
}
