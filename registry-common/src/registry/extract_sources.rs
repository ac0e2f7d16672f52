use tracing::warn;

use super::{require, MutationOutcome, Registry, RegistryError, RegistryResult, RequestContext};
use crate::call::bounded;
use crate::document::ExtractSourceRecord;
use crate::ids::new_id;
use crate::pipeline::{ExtractSource, ExtractSourceDetail, Scheme, SourceMetric};
use crate::runtime::worker_label_selector;

const KIND: &str = "extract source";
const ENTITY: &str = "extract_source";

/// What happens to the rules and extensions bound to a deleted extract source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Keep them in the pipeline, pointing at a source that no longer exists.
    #[default]
    Orphan,
    /// Remove them in the same write as the source.
    Cascade,
}

fn validate(source: &ExtractSource) -> RegistryResult<()> {
    require("name", &source.name)?;
    require("path", &source.path)?;

    let scheme = source
        .scheme
        .as_ref()
        .ok_or_else(|| RegistryError::missing_field("scheme"))?;

    if *scheme != Scheme::Api {
        require("regex", &source.regex)?;
    }

    if matches!(scheme, Scheme::Api | Scheme::Xlsx) {
        match source.skip_headers {
            None => return Err(RegistryError::missing_field("skipHeaders")),
            Some(n) if n < 0 => {
                return Err(RegistryError::Validation(format!(
                    "skipHeaders must not be negative, got {}",
                    n
                )))
            }
            Some(_) => {}
        }
    }

    require("tablename", &source.tablename)
}

fn path_taken(path: &str) -> RegistryError {
    RegistryError::Validation(format!("path already taken: {}", path))
}

impl Registry {
    pub async fn create_extract_source(
        &self,
        ctx: &RequestContext,
        source: ExtractSource,
    ) -> RegistryResult<MutationOutcome> {
        validate(&source)?;
        let id = new_id();

        self.mutate(ctx, ENTITY, "create", |document| {
            if document.path_taken(&source.path, None) {
                return Err(path_taken(&source.path));
            }

            let mut record = ExtractSourceRecord::from(&source);
            record.id = id.clone();
            document.extract_sources.push(record);

            Ok(())
        })
        .await?;

        let mut outcome = MutationOutcome::committed(id);
        outcome.side_effect_errors.extend(
            self.notifier
                .sources_changed(&ctx.pipeline, &ctx.cancel)
                .await,
        );

        Ok(outcome)
    }

    /// Replace every field of the source but its id.
    pub async fn update_extract_source(
        &self,
        ctx: &RequestContext,
        id: &str,
        source: ExtractSource,
    ) -> RegistryResult<MutationOutcome> {
        validate(&source)?;

        self.mutate(ctx, ENTITY, "update", |document| {
            if document.find_source(id).is_none() {
                return Err(RegistryError::not_found(KIND, id));
            }
            if document.path_taken(&source.path, Some(id)) {
                return Err(path_taken(&source.path));
            }

            let mut record = ExtractSourceRecord::from(&source);
            record.id = id.to_owned();

            for stored in document.extract_sources.iter_mut().filter(|s| s.id == id) {
                *stored = record.clone();
            }

            Ok(())
        })
        .await?;

        let mut outcome = MutationOutcome::committed(id.to_owned());
        outcome.side_effect_errors.extend(
            self.notifier
                .sources_changed(&ctx.pipeline, &ctx.cancel)
                .await,
        );

        Ok(outcome)
    }

    pub async fn delete_extract_source(
        &self,
        ctx: &RequestContext,
        id: &str,
        mode: DeleteMode,
    ) -> RegistryResult<MutationOutcome> {
        let removed = self
            .mutate(ctx, ENTITY, "delete", |document| {
                let position = document
                    .extract_sources
                    .iter()
                    .position(|source| source.id == id)
                    .ok_or_else(|| RegistryError::not_found(KIND, id))?;
                let removed = document.extract_sources.remove(position);

                if mode == DeleteMode::Cascade {
                    document.extract_rules.retain(|rule| rule.extract_source_id != id);
                    document
                        .extensions
                        .retain(|extension| extension.extract_source_id != id);
                }

                Ok(removed)
            })
            .await?;

        let side_effect_errors = self
            .notifier
            .source_removed(&ctx.pipeline, &removed.name, &ctx.cancel)
            .await;

        Ok(MutationOutcome {
            id: removed.id,
            side_effect_errors,
        })
    }

    /// A source with the rules and extensions bound to it, its worker state when it is
    /// an API source, and whatever metrics the metrics collaborator has for it.
    pub async fn get_extract_source(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> RegistryResult<ExtractSourceDetail> {
        let (document, _) = self.load(ctx).await?;

        let source: ExtractSource = document
            .find_source(id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(KIND, id))?
            .into();

        let extract_rules = document
            .extract_rules
            .into_iter()
            .filter(|rule| rule.extract_source_id == id)
            .map(Into::into)
            .collect();
        let extensions = document
            .extensions
            .into_iter()
            .filter(|extension| extension.extract_source_id == id)
            .map(Into::into)
            .collect();

        let worker_active = match source.scheme {
            Some(Scheme::Api) => self.probe_worker(ctx, &source.name).await,
            _ => None,
        };
        let metrics = self.source_metrics(ctx, id).await;

        Ok(ExtractSourceDetail {
            source,
            extract_rules,
            extensions,
            worker_active,
            metrics,
        })
    }

    pub async fn list_extract_sources(&self, ctx: &RequestContext) -> RegistryResult<Vec<ExtractSource>> {
        let (document, _) = self.load(ctx).await?;

        Ok(document
            .extract_sources
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn probe_worker(&self, ctx: &RequestContext, source_name: &str) -> Option<bool> {
        let selector = worker_label_selector(source_name);
        let probed = bounded(
            &ctx.cancel,
            self.config.call_timeout,
            self.runtime.worker_active(&ctx.pipeline, &selector),
        )
        .await;

        match probed {
            Ok(active) => Some(active),
            Err(err) => {
                warn!(pipeline = %ctx.pipeline, source = source_name, "could not probe workers: {}", err);
                None
            }
        }
    }

    async fn source_metrics(&self, ctx: &RequestContext, id: &str) -> Vec<SourceMetric> {
        let client = match &self.metrics {
            Some(client) => client,
            None => return Vec::new(),
        };

        let fetched = bounded(
            &ctx.cancel,
            self.config.call_timeout,
            client.extract_source_metrics(id),
        )
        .await;

        match fetched {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!(pipeline = %ctx.pipeline, source = id, "could not fetch source metrics: {}", err);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::notifier::SideEffect;
    use crate::pipeline::{Extension, ExtractRule};
    use crate::registry::tests::{context, harness, harness_with};
    use crate::registry::RegistryConfig;
    use crate::retry::RetryPolicy;
    use crate::store::RegistryStore;
    use crate::test_utils::{MockMetricsClient, MockRuntimeCall, MockRuntimeClient};

    fn orders() -> ExtractSource {
        ExtractSource {
            name: "orders".to_owned(),
            path: "/data/orders".to_owned(),
            scheme: Some(Scheme::Csv),
            regex: ".*\\.csv".to_owned(),
            tablename: "orders".to_owned(),
            ..Default::default()
        }
    }

    fn feed() -> ExtractSource {
        ExtractSource {
            name: "feed".to_owned(),
            path: "https://example.com/feed".to_owned(),
            scheme: Some(Scheme::Api),
            tablename: "feed".to_owned(),
            skip_headers: Some(0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_rules_survive_source_deletion() {
        let h = harness().await;
        let ctx = context();

        let source = h.registry.create_extract_source(&ctx, orders()).await.unwrap();
        assert!(!source.id.is_empty());
        assert!(source.side_effect_errors.is_empty());

        let rule = h
            .registry
            .create_extract_rule(
                &ctx,
                ExtractRule {
                    extract_source_id: source.id.clone(),
                    column_name: "amount".to_owned(),
                    column_path: "2".to_owned(),
                    column_type: "decimal".to_owned(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        match h.registry.create_extract_source(&ctx, orders()).await {
            Err(RegistryError::Validation(message)) => {
                assert!(message.contains("path already taken"))
            }
            other => panic!("expected Validation, got {:?}", other),
        }

        h.registry
            .delete_extract_source(&ctx, &source.id, DeleteMode::Orphan)
            .await
            .unwrap();

        let orphan = h.registry.get_extract_rule(&ctx, &rule.id).await.unwrap();
        assert_eq!(orphan.extract_source_id, source.id);
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let h = harness().await;
        let ctx = context();

        let created = h.registry.create_extract_source(&ctx, orders()).await.unwrap();
        let detail = h.registry.get_extract_source(&ctx, &created.id).await.unwrap();

        let mut expected = orders();
        expected.id = created.id.clone();
        assert_eq!(detail.source, expected);
        assert!(detail.extract_rules.is_empty());
        assert_eq!(detail.worker_active, None);
        assert!(detail.metrics.is_empty());
    }

    #[tokio::test]
    async fn test_client_supplied_id_is_replaced() {
        let h = harness().await;
        let mut source = orders();
        source.id = "mine".to_owned();

        let created = h.registry.create_extract_source(&context(), source).await.unwrap();

        assert_ne!(created.id, "mine");
    }

    #[tokio::test]
    async fn test_required_fields() {
        let h = harness().await;
        let ctx = context();

        let cases = vec![
            ("name", ExtractSource { name: "".to_owned(), ..orders() }),
            ("path", ExtractSource { path: " ".to_owned(), ..orders() }),
            ("scheme", ExtractSource { scheme: None, ..orders() }),
            ("regex", ExtractSource { regex: "".to_owned(), ..orders() }),
            ("tablename", ExtractSource { tablename: "".to_owned(), ..orders() }),
            ("skipHeaders", ExtractSource { skip_headers: None, ..feed() }),
            (
                "skipHeaders",
                ExtractSource {
                    scheme: Some(Scheme::Xlsx),
                    skip_headers: None,
                    ..orders()
                },
            ),
        ];

        for (field, source) in cases {
            match h.registry.create_extract_source(&ctx, source).await {
                Err(RegistryError::Validation(message)) => {
                    assert!(message.starts_with(field), "{} for {}", message, field)
                }
                other => panic!("expected Validation for {}, got {:?}", field, other),
            }
        }

        let negative = ExtractSource {
            skip_headers: Some(-1),
            ..feed()
        };
        assert!(matches!(
            h.registry.create_extract_source(&ctx, negative).await,
            Err(RegistryError::Validation(_))
        ));

        assert!(h.store.get(&ctx.pipeline).await.unwrap().0.extract_sources.is_empty());
    }

    #[tokio::test]
    async fn test_api_source_needs_no_regex() {
        let h = harness().await;

        h.registry
            .create_extract_source(&context(), feed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_checks_path_against_other_sources() {
        let h = harness().await;
        let ctx = context();

        let first = h.registry.create_extract_source(&ctx, orders()).await.unwrap();
        let second = h
            .registry
            .create_extract_source(
                &ctx,
                ExtractSource {
                    path: "/data/refunds".to_owned(),
                    ..orders()
                },
            )
            .await
            .unwrap();

        // Keeping its own path is fine.
        h.registry
            .update_extract_source(
                &ctx,
                &first.id,
                ExtractSource {
                    tablename: "orders_v2".to_owned(),
                    ..orders()
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            h.registry.update_extract_source(&ctx, &second.id, orders()).await,
            Err(RegistryError::Validation(_))
        ));

        let detail = h.registry.get_extract_source(&ctx, &first.id).await.unwrap();
        assert_eq!(detail.source.tablename, "orders_v2");
        assert_eq!(detail.source.id, first.id);
    }

    #[tokio::test]
    async fn test_update_and_delete_of_unknown_source_are_not_found() {
        let h = harness().await;
        let ctx = context();

        assert!(matches!(
            h.registry.update_extract_source(&ctx, "nope", orders()).await,
            Err(RegistryError::NotFound { kind: KIND, .. })
        ));
        assert!(matches!(
            h.registry
                .delete_extract_source(&ctx, "nope", DeleteMode::Orphan)
                .await,
            Err(RegistryError::NotFound { kind: KIND, .. })
        ));
        assert!(h.runtime.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let h = harness().await;
        let ctx = context();

        let created = h.registry.create_extract_source(&ctx, orders()).await.unwrap();
        h.registry
            .delete_extract_source(&ctx, &created.id, DeleteMode::Orphan)
            .await
            .unwrap();

        assert!(matches!(
            h.registry.get_extract_source(&ctx, &created.id).await,
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cascade_removes_bound_entities() {
        let h = harness().await;
        let ctx = context();

        let doomed = h.registry.create_extract_source(&ctx, orders()).await.unwrap();
        let kept = h.registry.create_extract_source(&ctx, feed()).await.unwrap();

        for source_id in [&doomed.id, &kept.id] {
            h.registry
                .create_extension(
                    &ctx,
                    Extension {
                        extract_source_id: source_id.clone(),
                        name: "notify".to_owned(),
                        path: "/hooks/notify".to_owned(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            h.registry
                .create_extract_rule(
                    &ctx,
                    ExtractRule {
                        extract_source_id: source_id.clone(),
                        column_name: "amount".to_owned(),
                        column_path: "1".to_owned(),
                        column_type: "decimal".to_owned(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }

        h.registry
            .delete_extract_source(&ctx, &doomed.id, DeleteMode::Cascade)
            .await
            .unwrap();

        let rules = h.registry.list_extract_rules(&ctx).await.unwrap();
        let extensions = h.registry.list_extensions(&ctx).await.unwrap();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].extract_source_id, kept.id);
        assert_eq!(extensions.len(), 1);
        assert_eq!(extensions[0].extract_source_id, kept.id);
    }

    #[tokio::test]
    async fn test_source_mutations_notify_runtime() {
        let h = harness().await;
        let ctx = context();

        let created = h.registry.create_extract_source(&ctx, orders()).await.unwrap();
        h.registry
            .update_extract_source(&ctx, &created.id, orders())
            .await
            .unwrap();
        h.registry
            .delete_extract_source(&ctx, &created.id, DeleteMode::Orphan)
            .await
            .unwrap();

        assert_eq!(
            h.runtime.get_calls(),
            vec![
                MockRuntimeCall::RefreshSources(ctx.pipeline.clone()),
                MockRuntimeCall::RefreshSources(ctx.pipeline.clone()),
                MockRuntimeCall::RefreshSources(ctx.pipeline.clone()),
                MockRuntimeCall::TerminateWorkers(
                    ctx.pipeline.clone(),
                    "extractsourcename=orders".to_owned()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_is_reported_next_to_committed_write() {
        let h = harness_with(
            MockRuntimeClient::new().fail_refresh(),
            None,
            RegistryConfig::default(),
        )
        .await;
        let ctx = context();

        let outcome = h.registry.create_extract_source(&ctx, orders()).await.unwrap();

        assert_eq!(outcome.side_effect_errors.len(), 1);
        assert_eq!(outcome.side_effect_errors[0].effect, SideEffect::RefreshSources);

        let sources = h.registry.list_extract_sources(&ctx).await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, outcome.id);
    }

    #[tokio::test]
    async fn test_get_aggregates_bound_entities_and_metrics() {
        let h = harness().await;
        let ctx = context();
        let source = h.registry.create_extract_source(&ctx, orders()).await.unwrap();
        let other = h.registry.create_extract_source(&ctx, feed()).await.unwrap();

        h.registry
            .create_extension(
                &ctx,
                Extension {
                    extract_source_id: other.id.clone(),
                    name: "notify".to_owned(),
                    path: "/hooks/notify".to_owned(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let rule = h
            .registry
            .create_extract_rule(
                &ctx,
                ExtractRule {
                    extract_source_id: source.id.clone(),
                    column_name: "amount".to_owned(),
                    column_path: "2".to_owned(),
                    column_type: "decimal".to_owned(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let metrics = vec![SourceMetric {
            name: "rows_extracted".to_owned(),
            value: 12.0,
        }];
        let registry = Registry::new(
            Arc::new(h.store.clone()),
            Arc::new(h.runtime.clone()),
            Some(Arc::new(
                MockMetricsClient::new().metrics_ret(&source.id, metrics.clone()),
            )),
            RegistryConfig::default(),
        );

        let detail = registry.get_extract_source(&ctx, &source.id).await.unwrap();

        assert_eq!(detail.extract_rules.len(), 1);
        assert_eq!(detail.extract_rules[0].id, rule.id);
        assert!(detail.extensions.is_empty());
        assert_eq!(detail.metrics, metrics);
        assert_eq!(detail.worker_active, None);
    }

    #[tokio::test]
    async fn test_api_source_reports_worker_state() {
        let h = harness_with(
            MockRuntimeClient::new().worker_active_ret(true),
            None,
            RegistryConfig::default(),
        )
        .await;
        let ctx = context();
        let created = h.registry.create_extract_source(&ctx, feed()).await.unwrap();

        let detail = h.registry.get_extract_source(&ctx, &created.id).await.unwrap();

        assert_eq!(detail.worker_active, Some(true));
        assert!(h.runtime.get_calls().contains(&MockRuntimeCall::WorkerActive(
            ctx.pipeline.clone(),
            "extractsourcename=feed".to_owned()
        )));
    }

    #[tokio::test]
    async fn test_collaborator_failures_do_not_fail_get() {
        let h = harness_with(
            MockRuntimeClient::new().fail_worker_active(),
            Some(MockMetricsClient::new().fail()),
            RegistryConfig::default(),
        )
        .await;
        let ctx = context();
        let created = h.registry.create_extract_source(&ctx, feed()).await.unwrap();

        let detail = h.registry.get_extract_source(&ctx, &created.id).await.unwrap();

        assert_eq!(detail.worker_active, None);
        assert!(detail.metrics.is_empty());
    }

    #[tokio::test]
    async fn test_reads_are_idempotent() {
        let h = harness().await;
        let ctx = context();
        let created = h.registry.create_extract_source(&ctx, orders()).await.unwrap();

        assert_eq!(
            h.registry.list_extract_sources(&ctx).await.unwrap(),
            h.registry.list_extract_sources(&ctx).await.unwrap()
        );
        assert_eq!(
            h.registry.get_extract_source(&ctx, &created.id).await.unwrap(),
            h.registry.get_extract_source(&ctx, &created.id).await.unwrap()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_are_all_kept() {
        // Every conflict means another create landed, so eight writers need at most eight attempts.
        let config = RegistryConfig {
            retry_policy: RetryPolicy::build(1, std::time::Duration::from_millis(1))
                .max_attempts(8)
                .provide(),
            ..RegistryConfig::default()
        };
        let h = Arc::new(harness_with(MockRuntimeClient::new(), None, config).await);

        let creates = (0..8).map(|i| {
            let h = h.clone();
            tokio::spawn(async move {
                h.registry
                    .create_extract_source(
                        &context(),
                        ExtractSource {
                            path: format!("/data/orders-{}", i),
                            ..orders()
                        },
                    )
                    .await
            })
        });

        let mut ids = Vec::new();
        for create in futures::future::join_all(creates).await {
            ids.push(create.unwrap().unwrap().id);
        }

        let listed: Vec<String> = h
            .registry
            .list_extract_sources(&context())
            .await
            .unwrap()
            .into_iter()
            .map(|source| source.id)
            .collect();

        assert_eq!(listed.len(), 8);
        for id in ids {
            assert!(listed.contains(&id));
        }
    }
}
