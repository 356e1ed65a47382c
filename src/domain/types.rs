//! Shared domain enumerations aligned with persisted database enums.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Top-level entity kinds held by the content cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Offering,
    Procedure,
    ObservableProperty,
    FeatureOfInterest,
    ResultTemplate,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Offering,
        EntityKind::Procedure,
        EntityKind::ObservableProperty,
        EntityKind::FeatureOfInterest,
        EntityKind::ResultTemplate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Offering => "offering",
            EntityKind::Procedure => "procedure",
            EntityKind::ObservableProperty => "observable_property",
            EntityKind::FeatureOfInterest => "feature_of_interest",
            EntityKind::ResultTemplate => "result_template",
        }
    }

    /// Whether the kind carries a published subset.
    pub fn has_publication(self) -> bool {
        !matches!(self, EntityKind::ResultTemplate)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dataset kinds as persisted by the observation store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "dataset_type", rename_all = "snake_case")]
pub enum DatasetType {
    Timeseries,
    Individual,
    Profile,
    Trajectory,
    /// Registered but without any observation yet; visible by default.
    NotInitialized,
}

impl DatasetType {
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetType::Timeseries => "timeseries",
            DatasetType::Individual => "individual",
            DatasetType::Profile => "profile",
            DatasetType::Trajectory => "trajectory",
            DatasetType::NotInitialized => "not_initialized",
        }
    }
}

impl TryFrom<&str> for DatasetType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "timeseries" => Ok(DatasetType::Timeseries),
            "individual" => Ok(DatasetType::Individual),
            "profile" => Ok(DatasetType::Profile),
            "trajectory" => Ok(DatasetType::Trajectory),
            "not_initialized" => Ok(DatasetType::NotInitialized),
            _ => Err(()),
        }
    }
}

const OM_TYPE_PREFIX: &str = "http://www.opengis.net/def/observationType/OGC-OM/2.0/";

/// Observation result kinds, one case per O&M 2.0 observation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObservationType {
    Measurement,
    Count,
    Truth,
    Category,
    Text,
    Geometry,
    Complex,
    SweArray,
}

impl ObservationType {
    pub const ALL: [ObservationType; 8] = [
        ObservationType::Measurement,
        ObservationType::Count,
        ObservationType::Truth,
        ObservationType::Category,
        ObservationType::Text,
        ObservationType::Geometry,
        ObservationType::Complex,
        ObservationType::SweArray,
    ];

    fn short_name(self) -> &'static str {
        match self {
            ObservationType::Measurement => "OM_Measurement",
            ObservationType::Count => "OM_CountObservation",
            ObservationType::Truth => "OM_TruthObservation",
            ObservationType::Category => "OM_CategoryObservation",
            ObservationType::Text => "OM_TextObservation",
            ObservationType::Geometry => "OM_GeometryObservation",
            ObservationType::Complex => "OM_ComplexObservation",
            ObservationType::SweArray => "OM_SWEArrayObservation",
        }
    }

    /// The observation type URI advertised in capabilities.
    pub fn uri(self) -> String {
        format!("{OM_TYPE_PREFIX}{}", self.short_name())
    }
}

impl fmt::Display for ObservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{OM_TYPE_PREFIX}{}", self.short_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown observation type `{0}`")]
pub struct UnknownObservationType(pub String);

impl FromStr for ObservationType {
    type Err = UnknownObservationType;

    /// Accepts the full URI or the bare short name.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let short = trimmed.strip_prefix(OM_TYPE_PREFIX).unwrap_or(trimmed);
        ObservationType::ALL
            .into_iter()
            .find(|candidate| candidate.short_name() == short)
            .ok_or_else(|| UnknownObservationType(value.to_string()))
    }
}

impl Serialize for ObservationType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.uri())
    }
}

impl<'de> Deserialize<'de> for ObservationType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// How a dataset's procedure is exposed through its offering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureFlag {
    Parent,
    HiddenChild,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_type_parses_uri_and_short_name() {
        let uri = "http://www.opengis.net/def/observationType/OGC-OM/2.0/OM_Measurement";
        assert_eq!(uri.parse::<ObservationType>(), Ok(ObservationType::Measurement));
        assert_eq!(
            "OM_SWEArrayObservation".parse::<ObservationType>(),
            Ok(ObservationType::SweArray)
        );
        assert!("OM_Unknown".parse::<ObservationType>().is_err());
    }

    #[test]
    fn observation_type_serializes_as_uri() {
        let json = serde_json::to_string(&ObservationType::Count).expect("serialize");
        assert_eq!(
            json,
            "\"http://www.opengis.net/def/observationType/OGC-OM/2.0/OM_CountObservation\""
        );
        let back: ObservationType = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, ObservationType::Count);
    }

    #[test]
    fn dataset_type_string_mapping() {
        for kind in [
            DatasetType::Timeseries,
            DatasetType::Individual,
            DatasetType::Profile,
            DatasetType::Trajectory,
            DatasetType::NotInitialized,
        ] {
            assert_eq!(DatasetType::try_from(kind.as_str()), Ok(kind));
        }
        assert!(DatasetType::try_from("bogus").is_err());
    }
}
