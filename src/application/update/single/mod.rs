//! Single-threaded phases: one pass per cheap entity kind, writing straight
//! into the cache under construction.

mod features;
mod observable_properties;
mod result_templates;

pub use features::FeatureUpdate;
pub use observable_properties::ObservablePropertyUpdate;
pub use result_templates::ResultTemplateUpdate;

use crate::application::repos::RepoError;
use crate::domain::types::EntityKind;

use super::UpdateContext;
use super::error::CacheUpdateError;

/// What one sequential update wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Instances written into the cache.
    pub instances: usize,
    /// False when enumeration itself failed.
    pub enumerated: bool,
}

/// A sequential phase over one entity kind.
///
/// Storage failures are recorded in the context's collector; `execute`
/// always returns so later phases still run.
pub trait SingleEntityUpdate: Send + Sync {
    fn name(&self) -> &'static str;

    fn entity_kind(&self) -> EntityKind;

    fn execute(&self, ctx: &UpdateContext<'_>) -> UpdateSummary;
}

/// Features, then observable properties, then result templates.
pub fn default_sequence() -> Vec<Box<dyn SingleEntityUpdate>> {
    vec![
        Box::new(FeatureUpdate),
        Box::new(ObservablePropertyUpdate),
        Box::new(ResultTemplateUpdate),
    ]
}

/// Records a kind-level storage failure and turns it into `None`.
fn recorded<T>(
    ctx: &UpdateContext<'_>,
    kind: EntityKind,
    operation: &'static str,
    result: Result<T, RepoError>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            ctx.errors
                .record(CacheUpdateError::for_kind(kind, operation, err));
            None
        }
    }
}
