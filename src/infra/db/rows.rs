use sqlx::types::Json;
use time::OffsetDateTime;

use crate::application::repos::RepoError;
use crate::domain::{
    entities::{
        DatasetRecord, FeatureRecord, ObservablePropertyRecord, OfferingRecord, ProcedureRecord,
        ResultTemplateRecord,
    },
    extent::TimeRange,
    geometry::Geometry,
    i18n::LocalizedName,
    types::{DatasetType, ObservationType},
};

#[derive(sqlx::FromRow)]
pub(super) struct OfferingRow {
    identifier: String,
    name: Option<String>,
    description: Option<String>,
    translations: Json<Vec<LocalizedName>>,
    parents: Vec<String>,
    geometry: Option<Json<Geometry>>,
    phenomenon_start: Option<OffsetDateTime>,
    phenomenon_end: Option<OffsetDateTime>,
    result_start: Option<OffsetDateTime>,
    result_end: Option<OffsetDateTime>,
}

impl From<OfferingRow> for OfferingRecord {
    fn from(row: OfferingRow) -> Self {
        Self {
            identifier: row.identifier,
            name: row.name,
            description: row.description,
            translations: row.translations.0,
            parents: row.parents,
            geometry: row.geometry.map(|geometry| geometry.0),
            phenomenon_time: TimeRange::from_bounds(row.phenomenon_start, row.phenomenon_end),
            result_time: TimeRange::from_bounds(row.result_start, row.result_end),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ProcedureRow {
    identifier: String,
    name: Option<String>,
    description: Option<String>,
    translations: Json<Vec<LocalizedName>>,
    parents: Vec<String>,
    description_format: Option<String>,
    type_of: Option<String>,
    is_type: bool,
    is_aggregation: bool,
}

impl From<ProcedureRow> for ProcedureRecord {
    fn from(row: ProcedureRow) -> Self {
        Self {
            identifier: row.identifier,
            name: row.name,
            description: row.description,
            translations: row.translations.0,
            parents: row.parents,
            description_format: row.description_format,
            type_of: row.type_of,
            is_type: row.is_type,
            is_aggregation: row.is_aggregation,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ObservablePropertyRow {
    identifier: String,
    name: Option<String>,
    description: Option<String>,
    translations: Json<Vec<LocalizedName>>,
    children: Vec<String>,
}

impl From<ObservablePropertyRow> for ObservablePropertyRecord {
    fn from(row: ObservablePropertyRow) -> Self {
        Self {
            identifier: row.identifier,
            name: row.name,
            description: row.description,
            translations: row.translations.0,
            children: row.children,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct FeatureRow {
    identifier: String,
    name: Option<String>,
    description: Option<String>,
    translations: Json<Vec<LocalizedName>>,
    feature_type: Option<String>,
    parents: Vec<String>,
    geometry: Option<Json<Geometry>>,
}

impl From<FeatureRow> for FeatureRecord {
    fn from(row: FeatureRow) -> Self {
        Self {
            identifier: row.identifier,
            name: row.name,
            description: row.description,
            translations: row.translations.0,
            feature_type: row.feature_type,
            parents: row.parents,
            geometry: row.geometry.map(|geometry| geometry.0),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ResultTemplateRow {
    identifier: String,
    offering: String,
    procedure: String,
    observable_property: String,
    features: Vec<String>,
}

impl From<ResultTemplateRow> for ResultTemplateRecord {
    fn from(row: ResultTemplateRow) -> Self {
        Self {
            identifier: row.identifier,
            offering: row.offering,
            procedure: row.procedure,
            observable_property: row.observable_property,
            features: row.features,
        }
    }
}

/// A dataset joined with its feature's type and geometry.
#[derive(sqlx::FromRow)]
pub(super) struct DatasetRow {
    id: i64,
    offering: String,
    procedure: String,
    observable_property: String,
    feature: Option<String>,
    feature_type: Option<String>,
    feature_geometry: Option<Json<Geometry>>,
    dataset_type: DatasetType,
    observation_type: Option<String>,
    published: bool,
    hidden: bool,
    first_value_at: Option<OffsetDateTime>,
    last_value_at: Option<OffsetDateTime>,
    result_start: Option<OffsetDateTime>,
    result_end: Option<OffsetDateTime>,
}

impl TryFrom<DatasetRow> for DatasetRecord {
    type Error = RepoError;

    fn try_from(row: DatasetRow) -> Result<Self, Self::Error> {
        let observation_type = row
            .observation_type
            .as_deref()
            .map(str::parse::<ObservationType>)
            .transpose()
            .map_err(|err| RepoError::Integrity {
                message: format!("dataset {}: {err}", row.id),
            })?;
        Ok(Self {
            id: row.id,
            offering: row.offering,
            procedure: row.procedure,
            observable_property: row.observable_property,
            feature: row.feature,
            feature_type: row.feature_type,
            feature_geometry: row.feature_geometry.map(|geometry| geometry.0),
            dataset_type: row.dataset_type,
            observation_type,
            published: row.published,
            hidden: row.hidden,
            first_value_at: row.first_value_at,
            last_value_at: row.last_value_at,
            result_time: TimeRange::from_bounds(row.result_start, row.result_end),
        })
    }
}
