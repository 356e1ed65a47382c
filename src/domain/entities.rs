//! Entity records as returned by the content store.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::{
    extent::TimeRange,
    geometry::Geometry,
    i18n::LocalizedName,
    types::{DatasetType, ObservationType, ProcedureFlag},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferingRecord {
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub translations: Vec<LocalizedName>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    /// Explicit sampling-time bounds; derived from datasets when absent.
    #[serde(default)]
    pub phenomenon_time: Option<TimeRange>,
    #[serde(default)]
    pub result_time: Option<TimeRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureRecord {
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub translations: Vec<LocalizedName>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub description_format: Option<String>,
    /// Identifier of the procedure type this procedure is an instance of.
    #[serde(default)]
    pub type_of: Option<String>,
    #[serde(default)]
    pub is_type: bool,
    #[serde(default)]
    pub is_aggregation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservablePropertyRecord {
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub translations: Vec<LocalizedName>,
    /// Member properties when this property is a composite.
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub translations: Vec<LocalizedName>,
    #[serde(default)]
    pub feature_type: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTemplateRecord {
    pub identifier: String,
    pub offering: String,
    pub procedure: String,
    pub observable_property: String,
    #[serde(default)]
    pub features: Vec<String>,
}

/// One observation series: the join of offering, procedure, property and feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: i64,
    pub offering: String,
    pub procedure: String,
    pub observable_property: String,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub feature_type: Option<String>,
    #[serde(default)]
    pub feature_geometry: Option<Geometry>,
    pub dataset_type: DatasetType,
    #[serde(default)]
    pub observation_type: Option<ObservationType>,
    /// Archives that leave this out mean the dataset is visible.
    #[serde(default = "default_true")]
    pub published: bool,
    /// The procedure is only reachable through its parent in this offering.
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub first_value_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_value_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub result_time: Option<TimeRange>,
}

impl DatasetRecord {
    /// Published, or not yet initialized and therefore visible by default.
    pub fn is_visible(&self) -> bool {
        self.published || self.dataset_type == DatasetType::NotInitialized
    }

    pub fn procedure_flag(&self) -> ProcedureFlag {
        if self.hidden {
            ProcedureFlag::HiddenChild
        } else {
            ProcedureFlag::Parent
        }
    }

    pub fn phenomenon_time(&self) -> Option<TimeRange> {
        TimeRange::from_bounds(self.first_value_at, self.last_value_at)
    }
}

fn default_true() -> bool {
    true
}

/// Entities without any dataset are published; otherwise at least one
/// dataset has to be visible.
pub fn is_published<'a>(datasets: impl IntoIterator<Item = &'a DatasetRecord>) -> bool {
    let mut any = false;
    for dataset in datasets {
        if dataset.is_visible() {
            return true;
        }
        any = true;
    }
    !any
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn dataset(id: i64, offering: &str, procedure: &str, property: &str) -> DatasetRecord {
        DatasetRecord {
            id,
            offering: offering.to_string(),
            procedure: procedure.to_string(),
            observable_property: property.to_string(),
            feature: None,
            feature_type: None,
            feature_geometry: None,
            dataset_type: DatasetType::Timeseries,
            observation_type: None,
            published: true,
            hidden: false,
            first_value_at: None,
            last_value_at: None,
            result_time: None,
        }
    }
}
