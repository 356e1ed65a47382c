//! Read-only accessors consumed by capability and discovery responses.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{
    extent::TimeRange,
    geometry::{Envelope, ReferencedEnvelope},
    i18n::MultilingualString,
    types::{EntityKind, ObservationType},
};

use super::content::ContentCache;
use super::image::CacheImage;
use super::relation::Relation;

pub trait ReadableCache: Send + Sync {
    fn identifiers(&self, kind: EntityKind) -> BTreeSet<String>;
    fn published_identifiers(&self, kind: EntityKind) -> BTreeSet<String>;
    fn contains(&self, kind: EntityKind, identifier: &str) -> bool;
    fn is_published(&self, kind: EntityKind, identifier: &str) -> bool;
    fn related(&self, relation: Relation, identifier: &str) -> BTreeSet<String>;
    fn display_name(&self, kind: EntityKind, identifier: &str) -> Option<String>;
    fn names(&self, kind: EntityKind, identifier: &str) -> Option<MultilingualString>;
    fn descriptions(&self, kind: EntityKind, identifier: &str) -> Option<MultilingualString>;
    fn offering_envelope(&self, offering: &str) -> Option<ReferencedEnvelope>;
    fn offering_phenomenon_time(&self, offering: &str) -> Option<TimeRange>;
    fn offering_result_time(&self, offering: &str) -> Option<TimeRange>;
    fn procedure_phenomenon_time(&self, procedure: &str) -> Option<TimeRange>;
    fn procedure_type_of(&self, procedure: &str) -> Option<String>;
    fn is_type_procedure(&self, procedure: &str) -> bool;
    fn is_aggregate_procedure(&self, procedure: &str) -> bool;
    fn supported_languages(&self) -> BTreeSet<String>;
    fn srids(&self) -> BTreeSet<i32>;
    fn default_srid(&self) -> Option<i32>;
    /// Envelope in the default SRID, else in the smallest SRID seen.
    fn global_envelope(&self) -> Option<ReferencedEnvelope>;
    fn global_envelopes(&self) -> BTreeMap<i32, Envelope>;
    fn global_phenomenon_time(&self) -> Option<TimeRange>;
    fn global_result_time(&self) -> Option<TimeRange>;
    fn image(&self) -> CacheImage;

    fn offerings(&self) -> BTreeSet<String> {
        self.identifiers(EntityKind::Offering)
    }

    fn procedures(&self) -> BTreeSet<String> {
        self.identifiers(EntityKind::Procedure)
    }

    fn published_features(&self) -> BTreeSet<String> {
        self.published_identifiers(EntityKind::FeatureOfInterest)
    }

    fn procedures_for_offering(&self, offering: &str) -> BTreeSet<String> {
        self.related(Relation::OfferingProcedures, offering)
    }

    fn hidden_child_procedures_for_offering(&self, offering: &str) -> BTreeSet<String> {
        self.related(Relation::OfferingHiddenChildProcedures, offering)
    }

    fn offerings_for_procedure(&self, procedure: &str) -> BTreeSet<String> {
        self.related(Relation::ProcedureOfferings, procedure)
    }

    fn observable_properties_for_offering(&self, offering: &str) -> BTreeSet<String> {
        self.related(Relation::OfferingObservableProperties, offering)
    }

    fn features_for_offering(&self, offering: &str) -> BTreeSet<String> {
        self.related(Relation::OfferingFeatures, offering)
    }

    fn parent_procedures(&self, procedure: &str) -> BTreeSet<String> {
        self.related(Relation::ProcedureParents, procedure)
    }

    fn child_procedures(&self, procedure: &str) -> BTreeSet<String> {
        self.related(Relation::ProcedureChildren, procedure)
    }

    /// Observation types recorded for an offering; unknown URIs are skipped.
    fn observation_types_for_offering(&self, offering: &str) -> BTreeSet<ObservationType> {
        self.related(Relation::OfferingObservationTypes, offering)
            .iter()
            .filter_map(|uri| uri.parse().ok())
            .collect()
    }
}

impl ReadableCache for ContentCache {
    fn identifiers(&self, kind: EntityKind) -> BTreeSet<String> {
        self.existence.get(kind).to_sorted()
    }

    fn published_identifiers(&self, kind: EntityKind) -> BTreeSet<String> {
        self.published.get(kind).to_sorted()
    }

    fn contains(&self, kind: EntityKind, identifier: &str) -> bool {
        self.existence.get(kind).contains(identifier)
    }

    fn is_published(&self, kind: EntityKind, identifier: &str) -> bool {
        self.published.get(kind).contains(identifier)
    }

    fn related(&self, relation: Relation, identifier: &str) -> BTreeSet<String> {
        self.relations.get(relation).get(identifier)
    }

    fn display_name(&self, kind: EntityKind, identifier: &str) -> Option<String> {
        self.display_names.get(kind).get(identifier)
    }

    fn names(&self, kind: EntityKind, identifier: &str) -> Option<MultilingualString> {
        self.names.get(kind).get(identifier)
    }

    fn descriptions(&self, kind: EntityKind, identifier: &str) -> Option<MultilingualString> {
        self.descriptions.get(kind).get(identifier)
    }

    fn offering_envelope(&self, offering: &str) -> Option<ReferencedEnvelope> {
        self.offering_envelopes.get(offering)
    }

    fn offering_phenomenon_time(&self, offering: &str) -> Option<TimeRange> {
        self.offering_phenomenon_times.get(offering)
    }

    fn offering_result_time(&self, offering: &str) -> Option<TimeRange> {
        self.offering_result_times.get(offering)
    }

    fn procedure_phenomenon_time(&self, procedure: &str) -> Option<TimeRange> {
        self.procedure_phenomenon_times.get(procedure)
    }

    fn procedure_type_of(&self, procedure: &str) -> Option<String> {
        self.procedure_types.get(procedure)
    }

    fn is_type_procedure(&self, procedure: &str) -> bool {
        self.type_procedures.contains(procedure)
    }

    fn is_aggregate_procedure(&self, procedure: &str) -> bool {
        self.aggregate_procedures.contains(procedure)
    }

    fn supported_languages(&self) -> BTreeSet<String> {
        self.supported_languages.to_sorted()
    }

    fn srids(&self) -> BTreeSet<i32> {
        self.srids.to_sorted()
    }

    fn default_srid(&self) -> Option<i32> {
        self.default_srid.get()
    }

    fn global_envelope(&self) -> Option<ReferencedEnvelope> {
        self.global_envelopes.preferred(self.default_srid.get())
    }

    fn global_envelopes(&self) -> BTreeMap<i32, Envelope> {
        self.global_envelopes.to_image()
    }

    fn global_phenomenon_time(&self) -> Option<TimeRange> {
        self.global_phenomenon_time.get()
    }

    fn global_result_time(&self) -> Option<TimeRange> {
        self.global_result_time.get()
    }

    fn image(&self) -> CacheImage {
        ContentCache::image(self)
    }
}
