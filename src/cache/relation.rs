//! Directed relationships tracked by the content cache.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::types::EntityKind;

use super::containers::RelationMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    OfferingProcedures,
    OfferingHiddenChildProcedures,
    OfferingObservableProperties,
    OfferingFeatures,
    OfferingObservationTypes,
    OfferingFeatureTypes,
    OfferingParents,
    OfferingChildren,
    OfferingResultTemplates,
    ProcedureOfferings,
    ProcedureObservableProperties,
    ProcedureParents,
    ProcedureChildren,
    ProcedureDescriptionFormats,
    ProcedureInstances,
    ObservablePropertyOfferings,
    ObservablePropertyProcedures,
    CompositeMembers,
    MemberComposites,
    FeatureParents,
    FeatureChildren,
    FeatureProcedures,
    FeatureOfferings,
    ResultTemplateOfferings,
    ResultTemplateProcedures,
    ResultTemplateObservableProperties,
    ResultTemplateFeatures,
}

impl Relation {
    pub const COUNT: usize = 27;

    pub const ALL: [Relation; Self::COUNT] = [
        Relation::OfferingProcedures,
        Relation::OfferingHiddenChildProcedures,
        Relation::OfferingObservableProperties,
        Relation::OfferingFeatures,
        Relation::OfferingObservationTypes,
        Relation::OfferingFeatureTypes,
        Relation::OfferingParents,
        Relation::OfferingChildren,
        Relation::OfferingResultTemplates,
        Relation::ProcedureOfferings,
        Relation::ProcedureObservableProperties,
        Relation::ProcedureParents,
        Relation::ProcedureChildren,
        Relation::ProcedureDescriptionFormats,
        Relation::ProcedureInstances,
        Relation::ObservablePropertyOfferings,
        Relation::ObservablePropertyProcedures,
        Relation::CompositeMembers,
        Relation::MemberComposites,
        Relation::FeatureParents,
        Relation::FeatureChildren,
        Relation::FeatureProcedures,
        Relation::FeatureOfferings,
        Relation::ResultTemplateOfferings,
        Relation::ResultTemplateProcedures,
        Relation::ResultTemplateObservableProperties,
        Relation::ResultTemplateFeatures,
    ];

    /// Kind of the identifiers used as keys.
    pub fn source(self) -> EntityKind {
        use EntityKind::*;
        match self {
            Relation::OfferingProcedures
            | Relation::OfferingHiddenChildProcedures
            | Relation::OfferingObservableProperties
            | Relation::OfferingFeatures
            | Relation::OfferingObservationTypes
            | Relation::OfferingFeatureTypes
            | Relation::OfferingParents
            | Relation::OfferingChildren
            | Relation::OfferingResultTemplates => Offering,
            Relation::ProcedureOfferings
            | Relation::ProcedureObservableProperties
            | Relation::ProcedureParents
            | Relation::ProcedureChildren
            | Relation::ProcedureDescriptionFormats
            | Relation::ProcedureInstances => Procedure,
            Relation::ObservablePropertyOfferings
            | Relation::ObservablePropertyProcedures
            | Relation::CompositeMembers
            | Relation::MemberComposites => ObservableProperty,
            Relation::FeatureParents
            | Relation::FeatureChildren
            | Relation::FeatureProcedures
            | Relation::FeatureOfferings => FeatureOfInterest,
            Relation::ResultTemplateOfferings
            | Relation::ResultTemplateProcedures
            | Relation::ResultTemplateObservableProperties
            | Relation::ResultTemplateFeatures => ResultTemplate,
        }
    }

    /// Kind of the related identifiers; `None` for plain value sets such as
    /// observation types or description formats.
    pub fn target(self) -> Option<EntityKind> {
        use EntityKind::*;
        match self {
            Relation::OfferingObservationTypes
            | Relation::OfferingFeatureTypes
            | Relation::ProcedureDescriptionFormats => None,
            Relation::ProcedureOfferings
            | Relation::ObservablePropertyOfferings
            | Relation::FeatureOfferings
            | Relation::ResultTemplateOfferings
            | Relation::OfferingParents
            | Relation::OfferingChildren => Some(Offering),
            Relation::OfferingProcedures
            | Relation::OfferingHiddenChildProcedures
            | Relation::ProcedureParents
            | Relation::ProcedureChildren
            | Relation::ProcedureInstances
            | Relation::ObservablePropertyProcedures
            | Relation::FeatureProcedures
            | Relation::ResultTemplateProcedures => Some(Procedure),
            Relation::OfferingObservableProperties
            | Relation::ProcedureObservableProperties
            | Relation::CompositeMembers
            | Relation::MemberComposites
            | Relation::ResultTemplateObservableProperties => Some(ObservableProperty),
            Relation::OfferingFeatures
            | Relation::FeatureParents
            | Relation::FeatureChildren
            | Relation::ResultTemplateFeatures => Some(FeatureOfInterest),
            Relation::OfferingResultTemplates => Some(ResultTemplate),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Relation::OfferingProcedures => "offering_procedures",
            Relation::OfferingHiddenChildProcedures => "offering_hidden_child_procedures",
            Relation::OfferingObservableProperties => "offering_observable_properties",
            Relation::OfferingFeatures => "offering_features",
            Relation::OfferingObservationTypes => "offering_observation_types",
            Relation::OfferingFeatureTypes => "offering_feature_types",
            Relation::OfferingParents => "offering_parents",
            Relation::OfferingChildren => "offering_children",
            Relation::OfferingResultTemplates => "offering_result_templates",
            Relation::ProcedureOfferings => "procedure_offerings",
            Relation::ProcedureObservableProperties => "procedure_observable_properties",
            Relation::ProcedureParents => "procedure_parents",
            Relation::ProcedureChildren => "procedure_children",
            Relation::ProcedureDescriptionFormats => "procedure_description_formats",
            Relation::ProcedureInstances => "procedure_instances",
            Relation::ObservablePropertyOfferings => "observable_property_offerings",
            Relation::ObservablePropertyProcedures => "observable_property_procedures",
            Relation::CompositeMembers => "composite_members",
            Relation::MemberComposites => "member_composites",
            Relation::FeatureParents => "feature_parents",
            Relation::FeatureChildren => "feature_children",
            Relation::FeatureProcedures => "feature_procedures",
            Relation::FeatureOfferings => "feature_offerings",
            Relation::ResultTemplateOfferings => "result_template_offerings",
            Relation::ResultTemplateProcedures => "result_template_procedures",
            Relation::ResultTemplateObservableProperties => {
                "result_template_observable_properties"
            }
            Relation::ResultTemplateFeatures => "result_template_features",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One [`RelationMap`] per [`Relation`].
#[derive(Debug)]
pub struct Relations([RelationMap; Relation::COUNT]);

impl Default for Relations {
    fn default() -> Self {
        Self(std::array::from_fn(|_| RelationMap::default()))
    }
}

impl Relations {
    pub fn get(&self, relation: Relation) -> &RelationMap {
        &self.0[relation.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Relation, &RelationMap)> {
        Relation::ALL
            .into_iter()
            .map(move |relation| (relation, self.get(relation)))
    }
}
