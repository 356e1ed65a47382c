use tracing::debug;

use crate::application::update::UpdateContext;
use crate::application::update::support::record_names;
use crate::cache::Relation;
use crate::domain::types::EntityKind;

use super::{SingleEntityUpdate, UpdateSummary, recorded};

const KIND: EntityKind = EntityKind::ResultTemplate;

/// Result templates and the offering, procedure, property and features
/// each one is registered for. Templates carry no publication state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultTemplateUpdate;

impl SingleEntityUpdate for ResultTemplateUpdate {
    fn name(&self) -> &'static str {
        "result_templates"
    }

    fn entity_kind(&self) -> EntityKind {
        KIND
    }

    fn execute(&self, ctx: &UpdateContext<'_>) -> UpdateSummary {
        let Some(mut session) = recorded(ctx, KIND, "open_session", ctx.store.open_session())
        else {
            return UpdateSummary::default();
        };
        let Some(templates) = recorded(
            ctx,
            KIND,
            "load_result_templates",
            session.result_templates(),
        ) else {
            return UpdateSummary::default();
        };
        drop(session);

        for template in &templates {
            let identifier = template.identifier.as_str();
            ctx.cache.add_entity(KIND, identifier);
            record_names(ctx.cache, ctx.config, KIND, identifier, None, None, &[]);
            ctx.cache
                .relate(Relation::ResultTemplateOfferings, identifier, &template.offering);
            ctx.cache
                .relate(Relation::OfferingResultTemplates, &template.offering, identifier);
            ctx.cache
                .relate(Relation::ResultTemplateProcedures, identifier, &template.procedure);
            ctx.cache.relate(
                Relation::ResultTemplateObservableProperties,
                identifier,
                &template.observable_property,
            );
            ctx.cache
                .relate_all(Relation::ResultTemplateFeatures, identifier, &template.features);
        }

        debug!(templates = templates.len(), "Cached result templates");
        UpdateSummary {
            instances: templates.len(),
            enumerated: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::application::update::ErrorCollector;
    use crate::cache::{CacheConfig, ContentCache, ReadableCache};
    use crate::domain::entities::ResultTemplateRecord;
    use crate::infra::memory::{ContentArchive, MemoryStore};

    use super::*;

    #[test]
    fn template_links_both_directions() {
        let store = MemoryStore::new(ContentArchive {
            result_templates: vec![ResultTemplateRecord {
                identifier: "rt-1".into(),
                offering: "o1".into(),
                procedure: "p1".into(),
                observable_property: "temp".into(),
                features: vec!["f1".into(), "f2".into()],
            }],
            ..ContentArchive::default()
        });
        let cache = ContentCache::new();
        let errors = ErrorCollector::new();
        let config = CacheConfig::default();
        let summary = ResultTemplateUpdate.execute(&UpdateContext {
            store: &store,
            cache: &cache,
            errors: &errors,
            config: &config,
        });

        assert_eq!(summary.instances, 1);
        assert_eq!(
            cache.related(Relation::OfferingResultTemplates, "o1"),
            BTreeSet::from(["rt-1".to_string()])
        );
        assert_eq!(cache.related(Relation::ResultTemplateFeatures, "rt-1").len(), 2);
        assert!(cache.published_identifiers(KIND).is_empty());
        assert!(cache.contains(KIND, "rt-1"));
    }
}
