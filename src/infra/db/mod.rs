//! Postgres-backed content store.
//!
//! Cache workers are plain OS threads, so every [`PostgresSession`] owns one
//! pooled connection and drives its queries through a runtime [`Handle`] on
//! the thread that opened it.

mod rows;
mod util;

pub use util::map_sqlx_error;

use sqlx::{
    PgConnection, Postgres, QueryBuilder,
    pool::PoolConnection,
    postgres::{PgPool, PgPoolOptions},
    query,
};
use tokio::runtime::Handle;

use crate::application::repos::{ContentStore, DatasetCriterion, RepoError, StoreSession};
use crate::domain::entities::{
    DatasetRecord, FeatureRecord, ObservablePropertyRecord, OfferingRecord, ProcedureRecord,
    ResultTemplateRecord,
};

use rows::{
    DatasetRow, FeatureRow, ObservablePropertyRow, OfferingRow, ProcedureRow, ResultTemplateRow,
};

const OFFERING_COLUMNS: &str = "identifier, name, description, translations, parents, geometry, \
    phenomenon_start, phenomenon_end, result_start, result_end";

const PROCEDURE_COLUMNS: &str = "identifier, name, description, translations, parents, \
    description_format, type_of, is_type, is_aggregation";

const DATASET_SELECT: &str = "SELECT d.id, d.offering, d.procedure, d.observable_property, \
    d.feature, f.feature_type, f.geometry AS feature_geometry, d.dataset_type, \
    d.observation_type, d.published, d.hidden, d.first_value_at, d.last_value_at, \
    d.result_start, d.result_end \
    FROM datasets d LEFT JOIN features f ON f.identifier = d.feature";

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    handle: Handle,
}

impl PostgresStore {
    pub fn new(pool: PgPool, handle: Handle) -> Self {
        Self { pool, handle }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}

impl ContentStore for PostgresStore {
    /// Must be called outside of an async context, e.g. from a worker
    /// thread or `spawn_blocking`.
    fn open_session(&self) -> Result<Box<dyn StoreSession + '_>, RepoError> {
        let connection = self
            .handle
            .block_on(self.pool.acquire())
            .map_err(map_sqlx_error)?;
        Ok(Box::new(PostgresSession {
            connection,
            handle: self.handle.clone(),
        }))
    }
}

pub struct PostgresSession {
    connection: PoolConnection<Postgres>,
    handle: Handle,
}

impl PostgresSession {
    fn connection(&mut self) -> (&Handle, &mut PgConnection) {
        (&self.handle, &mut *self.connection)
    }

    fn identifiers(&mut self, sql: &'static str) -> Result<Vec<String>, RepoError> {
        let (handle, connection) = self.connection();
        handle
            .block_on(sqlx::query_scalar::<_, String>(sql).fetch_all(connection))
            .map_err(map_sqlx_error)
    }
}

impl StoreSession for PostgresSession {
    fn offering_identifiers(&mut self) -> Result<Vec<String>, RepoError> {
        self.identifiers("SELECT identifier FROM offerings ORDER BY identifier")
    }

    fn procedure_identifiers(&mut self) -> Result<Vec<String>, RepoError> {
        self.identifiers("SELECT identifier FROM procedures ORDER BY identifier")
    }

    fn offering(&mut self, identifier: &str) -> Result<Option<OfferingRecord>, RepoError> {
        let sql = format!("SELECT {OFFERING_COLUMNS} FROM offerings WHERE identifier = $1");
        let (handle, connection) = self.connection();
        let row = handle
            .block_on(
                sqlx::query_as::<_, OfferingRow>(&sql)
                    .bind(identifier)
                    .fetch_optional(connection),
            )
            .map_err(map_sqlx_error)?;
        Ok(row.map(OfferingRecord::from))
    }

    fn procedure(&mut self, identifier: &str) -> Result<Option<ProcedureRecord>, RepoError> {
        let sql = format!("SELECT {PROCEDURE_COLUMNS} FROM procedures WHERE identifier = $1");
        let (handle, connection) = self.connection();
        let row = handle
            .block_on(
                sqlx::query_as::<_, ProcedureRow>(&sql)
                    .bind(identifier)
                    .fetch_optional(connection),
            )
            .map_err(map_sqlx_error)?;
        Ok(row.map(ProcedureRecord::from))
    }

    fn observable_properties(&mut self) -> Result<Vec<ObservablePropertyRecord>, RepoError> {
        let (handle, connection) = self.connection();
        let rows = handle
            .block_on(
                sqlx::query_as::<_, ObservablePropertyRow>(
                    r#"
                    SELECT identifier, name, description, translations, children
                    FROM observable_properties
                    ORDER BY identifier
                    "#,
                )
                .fetch_all(connection),
            )
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ObservablePropertyRecord::from).collect())
    }

    fn features(&mut self) -> Result<Vec<FeatureRecord>, RepoError> {
        let (handle, connection) = self.connection();
        let rows = handle
            .block_on(
                sqlx::query_as::<_, FeatureRow>(
                    r#"
                    SELECT identifier, name, description, translations, feature_type, parents, geometry
                    FROM features
                    ORDER BY identifier
                    "#,
                )
                .fetch_all(connection),
            )
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(FeatureRecord::from).collect())
    }

    fn result_templates(&mut self) -> Result<Vec<ResultTemplateRecord>, RepoError> {
        let (handle, connection) = self.connection();
        let rows = handle
            .block_on(
                sqlx::query_as::<_, ResultTemplateRow>(
                    r#"
                    SELECT identifier, offering, procedure, observable_property, features
                    FROM result_templates
                    ORDER BY identifier
                    "#,
                )
                .fetch_all(connection),
            )
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ResultTemplateRecord::from).collect())
    }

    fn datasets(&mut self, criterion: &DatasetCriterion) -> Result<Vec<DatasetRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(DATASET_SELECT);
        push_criterion(&mut qb, criterion);
        qb.push(" ORDER BY d.id");

        let (handle, connection) = self.connection();
        let rows = handle
            .block_on(qb.build_query_as::<DatasetRow>().fetch_all(connection))
            .map_err(map_sqlx_error)?;
        rows.into_iter().map(DatasetRecord::try_from).collect()
    }
}

fn push_criterion(qb: &mut QueryBuilder<'_, Postgres>, criterion: &DatasetCriterion) {
    let (column, value) = match criterion {
        DatasetCriterion::All => return,
        DatasetCriterion::Offering(id) => ("d.offering", id),
        DatasetCriterion::Procedure(id) => ("d.procedure", id),
        DatasetCriterion::ObservableProperty(id) => ("d.observable_property", id),
        DatasetCriterion::Feature(id) => ("d.feature", id),
    };
    qb.push(" WHERE ");
    qb.push(column);
    qb.push(" = ");
    qb.push_bind(value.clone());
}
