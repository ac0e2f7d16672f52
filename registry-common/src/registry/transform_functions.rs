use super::{require, MutationOutcome, Registry, RegistryError, RegistryResult, RequestContext};
use crate::document::TransformFunctionRecord;
use crate::ids::new_id;
use crate::pipeline::TransformFunction;

const KIND: &str = "transform function";
const ENTITY: &str = "transform_function";

fn validate(function: &TransformFunction) -> RegistryResult<()> {
    require("name", &function.name)?;
    require("source", &function.source)
}

impl Registry {
    pub async fn create_transform_function(
        &self,
        ctx: &RequestContext,
        function: TransformFunction,
    ) -> RegistryResult<MutationOutcome> {
        validate(&function)?;
        let id = new_id();

        self.mutate(ctx, ENTITY, "create", |document| {
            let mut record = TransformFunctionRecord::from(&function);
            record.id = id.clone();
            document.transform_functions.push(record);

            Ok(())
        })
        .await?;

        Ok(MutationOutcome::committed(id))
    }

    /// Rules reference functions by name, so a rename leaves them pointing at the old name.
    pub async fn update_transform_function(
        &self,
        ctx: &RequestContext,
        id: &str,
        function: TransformFunction,
    ) -> RegistryResult<MutationOutcome> {
        validate(&function)?;

        self.mutate(ctx, ENTITY, "update", |document| {
            let stored = document
                .transform_functions
                .iter_mut()
                .find(|stored| stored.id == id)
                .ok_or_else(|| RegistryError::not_found(KIND, id))?;

            stored.name = function.name.clone();
            stored.source = function.source.clone();

            Ok(())
        })
        .await?;

        Ok(MutationOutcome::committed(id.to_owned()))
    }

    pub async fn delete_transform_function(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> RegistryResult<MutationOutcome> {
        self.mutate(ctx, ENTITY, "delete", |document| {
            let position = document
                .transform_functions
                .iter()
                .position(|function| function.id == id)
                .ok_or_else(|| RegistryError::not_found(KIND, id))?;
            document.transform_functions.remove(position);

            Ok(())
        })
        .await?;

        Ok(MutationOutcome::committed(id.to_owned()))
    }

    pub async fn get_transform_function(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> RegistryResult<TransformFunction> {
        let (document, _) = self.load(ctx).await?;

        document
            .transform_functions
            .into_iter()
            .find(|function| function.id == id)
            .map(Into::into)
            .ok_or_else(|| RegistryError::not_found(KIND, id))
    }

    pub async fn list_transform_functions(
        &self,
        ctx: &RequestContext,
    ) -> RegistryResult<Vec<TransformFunction>> {
        let (document, _) = self.load(ctx).await?;

        Ok(document
            .transform_functions
            .into_iter()
            .map(Into::into)
            .collect())
    }
}
