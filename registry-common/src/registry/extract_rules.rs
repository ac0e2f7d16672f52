use super::{require, MutationOutcome, Registry, RegistryError, RegistryResult, RequestContext};
use crate::document::{ExtractRuleRecord, PipelineDocument};
use crate::ids::new_id;
use crate::path;
use crate::pipeline::ExtractRule;

const KIND: &str = "extract rule";
const ENTITY: &str = "extract_rule";

impl Registry {
    /// Checks that depend on the rest of the pipeline. The path dialect comes from the
    /// current scheme of the bound source; a source that cannot be found skips it.
    fn check_against(
        &self,
        document: &PipelineDocument,
        extract_source_id: &str,
        rule: &ExtractRule,
    ) -> RegistryResult<()> {
        path::validate(
            document.source_scheme(extract_source_id).as_ref(),
            &rule.column_path,
        )?;

        if self.config.enforce_transform_function_refs
            && !rule.transform_function_name.is_empty()
            && !document.has_transform_function(&rule.transform_function_name)
        {
            return Err(RegistryError::Validation(format!(
                "transform function {} does not exist",
                rule.transform_function_name
            )));
        }

        Ok(())
    }

    pub async fn create_extract_rule(
        &self,
        ctx: &RequestContext,
        rule: ExtractRule,
    ) -> RegistryResult<MutationOutcome> {
        require("extractSourceId", &rule.extract_source_id)?;
        require("columnName", &rule.column_name)?;
        require("columnPath", &rule.column_path)?;
        require("columnType", &rule.column_type)?;
        let id = new_id();

        self.mutate(ctx, ENTITY, "create", |document| {
            self.check_against(document, &rule.extract_source_id, &rule)?;

            let mut record = ExtractRuleRecord::from(&rule);
            record.id = id.clone();
            document.extract_rules.push(record);

            Ok(())
        })
        .await?;

        Ok(MutationOutcome::committed(id))
    }

    /// Replace the column name, column path, match values and transform function of a
    /// rule. The source a rule is bound to and its column type never change.
    pub async fn update_extract_rule(
        &self,
        ctx: &RequestContext,
        id: &str,
        rule: ExtractRule,
    ) -> RegistryResult<MutationOutcome> {
        require("columnName", &rule.column_name)?;
        require("columnPath", &rule.column_path)?;

        self.mutate(ctx, ENTITY, "update", |document| {
            let extract_source_id = document
                .extract_rules
                .iter()
                .find(|stored| stored.id == id)
                .map(|stored| stored.extract_source_id.clone())
                .ok_or_else(|| RegistryError::not_found(KIND, id))?;

            self.check_against(document, &extract_source_id, &rule)?;

            for stored in document.extract_rules.iter_mut().filter(|r| r.id == id) {
                stored.column_name = rule.column_name.clone();
                stored.column_path = rule.column_path.clone();
                stored.match_values = rule.match_values.clone();
                stored.transform_function_name = rule.transform_function_name.clone();
            }

            Ok(())
        })
        .await?;

        Ok(MutationOutcome::committed(id.to_owned()))
    }

    pub async fn delete_extract_rule(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> RegistryResult<MutationOutcome> {
        self.mutate(ctx, ENTITY, "delete", |document| {
            let before = document.extract_rules.len();
            document.extract_rules.retain(|rule| rule.id != id);

            match document.extract_rules.len() == before {
                true => Err(RegistryError::not_found(KIND, id)),
                false => Ok(()),
            }
        })
        .await?;

        Ok(MutationOutcome::committed(id.to_owned()))
    }

    pub async fn get_extract_rule(&self, ctx: &RequestContext, id: &str) -> RegistryResult<ExtractRule> {
        let (document, _) = self.load(ctx).await?;

        document
            .extract_rules
            .into_iter()
            .find(|rule| rule.id == id)
            .map(Into::into)
            .ok_or_else(|| RegistryError::not_found(KIND, id))
    }

    pub async fn list_extract_rules(&self, ctx: &RequestContext) -> RegistryResult<Vec<ExtractRule>> {
        let (document, _) = self.load(ctx).await?;

        Ok(document.extract_rules.into_iter().map(Into::into).collect())
    }
}
