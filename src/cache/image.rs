//! Plain, ordered representation of a content cache.
//!
//! Images are what gets persisted and what cache equality is defined on.
//! Empty sets and maps are omitted so that two caches with the same
//! content always produce the same image.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::{
    extent::TimeRange,
    geometry::{Envelope, ReferencedEnvelope},
    i18n::MultilingualString,
    types::EntityKind,
};

use super::relation::Relation;

pub type RelationImage = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheImage {
    pub entities: BTreeMap<EntityKind, BTreeSet<String>>,
    pub published: BTreeMap<EntityKind, BTreeSet<String>>,
    pub relations: BTreeMap<Relation, RelationImage>,
    pub display_names: BTreeMap<EntityKind, BTreeMap<String, String>>,
    pub names: BTreeMap<EntityKind, BTreeMap<String, MultilingualString>>,
    pub descriptions: BTreeMap<EntityKind, BTreeMap<String, MultilingualString>>,
    pub offering_envelopes: BTreeMap<String, ReferencedEnvelope>,
    pub offering_phenomenon_times: BTreeMap<String, TimeRange>,
    pub offering_result_times: BTreeMap<String, TimeRange>,
    pub procedure_phenomenon_times: BTreeMap<String, TimeRange>,
    pub procedure_types: BTreeMap<String, String>,
    pub type_procedures: BTreeSet<String>,
    pub aggregate_procedures: BTreeSet<String>,
    pub supported_languages: BTreeSet<String>,
    pub srids: BTreeSet<i32>,
    pub default_srid: Option<i32>,
    /// One envelope per SRID.
    pub global_envelopes: BTreeMap<i32, Envelope>,
    pub global_phenomenon_time: Option<TimeRange>,
    pub global_result_time: Option<TimeRange>,
}

impl CacheImage {
    pub fn is_empty(&self) -> bool {
        *self == CacheImage::default()
    }

    /// The global envelope in the default SRID, or in the smallest SRID seen
    /// when there is none in the default one.
    pub fn global_envelope(&self) -> Option<ReferencedEnvelope> {
        self.default_srid
            .and_then(|srid| {
                self.global_envelopes
                    .get(&srid)
                    .map(|envelope| ReferencedEnvelope::new(srid, *envelope))
            })
            .or_else(|| {
                self.global_envelopes
                    .iter()
                    .next()
                    .map(|(srid, envelope)| ReferencedEnvelope::new(*srid, *envelope))
            })
    }

    pub fn entity_count(&self, kind: EntityKind) -> usize {
        self.entities.get(&kind).map_or(0, BTreeSet::len)
    }

    /// Condensed view for operators; identifiers are listed on request.
    pub fn summary(&self, with_identifiers: bool) -> CacheSummary {
        let entities = EntityKind::ALL
            .into_iter()
            .map(|kind| {
                let published = if kind.has_publication() {
                    Some(self.published.get(&kind).map_or(0, BTreeSet::len))
                } else {
                    None
                };
                let identifiers = with_identifiers
                    .then(|| self.entities.get(&kind).cloned().unwrap_or_default());
                (
                    kind,
                    KindSummary {
                        total: self.entity_count(kind),
                        published,
                        identifiers,
                    },
                )
            })
            .collect();

        CacheSummary {
            entities,
            supported_languages: self.supported_languages.clone(),
            srids: self.srids.clone(),
            default_srid: self.default_srid,
            global_envelope: self.global_envelope(),
            global_envelopes: self.global_envelopes.clone(),
            global_phenomenon_time: self.global_phenomenon_time,
            global_result_time: self.global_result_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSummary {
    pub entities: BTreeMap<EntityKind, KindSummary>,
    pub supported_languages: BTreeSet<String>,
    pub srids: BTreeSet<i32>,
    pub default_srid: Option<i32>,
    pub global_envelope: Option<ReferencedEnvelope>,
    pub global_envelopes: BTreeMap<i32, Envelope>,
    pub global_phenomenon_time: Option<TimeRange>,
    pub global_result_time: Option<TimeRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindSummary {
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<BTreeSet<String>>,
}

/// Inserts `value` under `key` unless it is empty.
pub(crate) fn insert_non_empty<K: Ord, V>(
    map: &mut BTreeMap<K, V>,
    key: K,
    value: V,
    is_empty: impl FnOnce(&V) -> bool,
) {
    if !is_empty(&value) {
        map.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;


    use super::*;

    #[test]
    fn default_image_is_empty() {
        assert!(CacheImage::default().is_empty());
    }

    #[test]
    fn json_shape_uses_snake_case_keys() {
        let mut image = CacheImage::default();
        image.entities.insert(
            EntityKind::FeatureOfInterest,
            BTreeSet::from(["f1".to_string()]),
        );
        image.relations.insert(
            Relation::OfferingProcedures,
            BTreeMap::from([("o1".to_string(), BTreeSet::from(["p1".to_string()]))]),
        );
        image
            .global_envelopes
            .insert(4326, Envelope::new(0.0, 0.0, 1.0, 1.0));
        image.global_result_time = Some(TimeRange::instant(datetime!(2024-05-01 0:00 UTC)));

        let json = serde_json::to_value(&image).expect("serialize");
        assert_eq!(json["entities"]["feature_of_interest"][0], "f1");
        assert_eq!(json["relations"]["offering_procedures"]["o1"][0], "p1");
        assert_eq!(json["global_envelopes"]["4326"]["max_x"], 1.0);

        let back: CacheImage = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, image);
        assert_eq!(back.entity_count(EntityKind::FeatureOfInterest), 1);
        assert_eq!(back.entity_count(EntityKind::Offering), 0);
    }

    #[test]
    fn summary_counts_every_kind() {
        let mut image = CacheImage::default();
        image.entities.insert(
            EntityKind::Procedure,
            BTreeSet::from(["p1".to_string(), "p2".to_string()]),
        );
        image
            .published
            .insert(EntityKind::Procedure, BTreeSet::from(["p1".to_string()]));
        image
            .entities
            .insert(EntityKind::ResultTemplate, BTreeSet::from(["rt".to_string()]));

        let summary = image.summary(false);
        assert_eq!(summary.entities.len(), EntityKind::ALL.len());
        let procedures = &summary.entities[&EntityKind::Procedure];
        assert_eq!((procedures.total, procedures.published), (2, Some(1)));
        assert_eq!(summary.entities[&EntityKind::Offering].total, 0);
        assert_eq!(summary.entities[&EntityKind::ResultTemplate].published, None);
        assert!(procedures.identifiers.is_none());

        let detailed = image.summary(true);
        assert_eq!(
            detailed.entities[&EntityKind::Procedure].identifiers,
            Some(BTreeSet::from(["p1".to_string(), "p2".to_string()]))
        );
    }
}
