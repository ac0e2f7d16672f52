use super::{require, MutationOutcome, Registry, RegistryError, RegistryResult, RequestContext};
use crate::document::ExtensionRecord;
use crate::ids::new_id;
use crate::pipeline::Extension;

const KIND: &str = "extension";
const ENTITY: &str = "extension";

impl Registry {
    pub async fn create_extension(
        &self,
        ctx: &RequestContext,
        extension: Extension,
    ) -> RegistryResult<MutationOutcome> {
        require("extractSourceId", &extension.extract_source_id)?;
        require("name", &extension.name)?;
        require("path", &extension.path)?;
        let id = new_id();

        self.mutate(ctx, ENTITY, "create", |document| {
            let mut record = ExtensionRecord::from(&extension);
            record.id = id.clone();
            document.extensions.push(record);

            Ok(())
        })
        .await?;

        Ok(MutationOutcome::committed(id))
    }

    /// Replace the name and path of an extension. It stays bound to its source.
    pub async fn update_extension(
        &self,
        ctx: &RequestContext,
        id: &str,
        extension: Extension,
    ) -> RegistryResult<MutationOutcome> {
        require("name", &extension.name)?;
        require("path", &extension.path)?;

        self.mutate(ctx, ENTITY, "update", |document| {
            let stored = document
                .extensions
                .iter_mut()
                .find(|stored| stored.id == id)
                .ok_or_else(|| RegistryError::not_found(KIND, id))?;

            stored.name = extension.name.clone();
            stored.path = extension.path.clone();

            Ok(())
        })
        .await?;

        Ok(MutationOutcome::committed(id.to_owned()))
    }

    pub async fn delete_extension(&self, ctx: &RequestContext, id: &str) -> RegistryResult<MutationOutcome> {
        self.mutate(ctx, ENTITY, "delete", |document| {
            let position = document
                .extensions
                .iter()
                .position(|extension| extension.id == id)
                .ok_or_else(|| RegistryError::not_found(KIND, id))?;
            document.extensions.remove(position);

            Ok(())
        })
        .await?;

        Ok(MutationOutcome::committed(id.to_owned()))
    }

    pub async fn get_extension(&self, ctx: &RequestContext, id: &str) -> RegistryResult<Extension> {
        let (document, _) = self.load(ctx).await?;

        document
            .extensions
            .into_iter()
            .find(|extension| extension.id == id)
            .map(Into::into)
            .ok_or_else(|| RegistryError::not_found(KIND, id))
    }

    pub async fn list_extensions(&self, ctx: &RequestContext) -> RegistryResult<Vec<Extension>> {
        let (document, _) = self.load(ctx).await?;

        Ok(document.extensions.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{context, harness};

    fn notify(source_id: &str) -> Extension {
        Extension {
            extract_source_id: source_id.to_owned(),
            name: "notify".to_owned(),
            path: "/hooks/notify".to_owned(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_path_is_not_validated() {
        let h = harness().await;

        h.registry
            .create_extension(
                &context(),
                Extension {
                    path: "not a path!! [".to_owned(),
                    ..notify("s1")
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_required_fields() {
        let h = harness().await;

        for (field, candidate) in [
            ("extractSourceId", notify("")),
            ("name", Extension { name: "".to_owned(), ..notify("s1") }),
            ("path", Extension { path: "".to_owned(), ..notify("s1") }),
        ] {
            match h.registry.create_extension(&context(), candidate).await {
                Err(RegistryError::Validation(message)) => assert!(message.starts_with(field)),
                other => panic!("expected Validation for {}, got {:?}", field, other),
            }
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let h = harness().await;
        let ctx = context();

        let created = h.registry.create_extension(&ctx, notify("s1")).await.unwrap();
        let mut expected = notify("s1");
        expected.id = created.id.clone();
        assert_eq!(h.registry.get_extension(&ctx, &created.id).await.unwrap(), expected);

        h.registry
            .update_extension(
                &ctx,
                &created.id,
                Extension {
                    name: "archive".to_owned(),
                    path: "/hooks/archive".to_owned(),
                    ..notify("s2")
                },
            )
            .await
            .unwrap();

        let updated = h.registry.get_extension(&ctx, &created.id).await.unwrap();
        assert_eq!(updated.name, "archive");
        assert_eq!(updated.path, "/hooks/archive");
        assert_eq!(updated.extract_source_id, "s1");

        h.registry.delete_extension(&ctx, &created.id).await.unwrap();
        assert!(h.registry.list_extensions(&ctx).await.unwrap().is_empty());
        assert!(matches!(
            h.registry.get_extension(&ctx, &created.id).await,
            Err(RegistryError::NotFound { kind: KIND, .. })
        ));
        assert!(matches!(
            h.registry.update_extension(&ctx, &created.id, notify("s1")).await,
            Err(RegistryError::NotFound { .. })
        ));
    }
}
