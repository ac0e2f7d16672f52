//! # Document
//!
//! The persisted shape of a pipeline aggregate, and the mapping between it and the
//! wire shapes in [`crate::pipeline`]. The stored field names predate the API and
//! must not change: other readers of the store rely on them.
use serde::{Deserialize, Serialize};

use crate::pipeline::{
    ExtractRule, ExtractSource, Extension, Pipeline, PipelineKey, Scheme, TransformFunction,
};
use crate::store::Version;

/// The aggregate document as stored. It is read and written as a whole.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone)]
pub struct PipelineDocument {
    #[serde(rename = "Extractsources", default)]
    pub extract_sources: Vec<ExtractSourceRecord>,
    #[serde(rename = "Extractrules", default)]
    pub extract_rules: Vec<ExtractRuleRecord>,
    #[serde(rename = "Extensions", default)]
    pub extensions: Vec<ExtensionRecord>,
    #[serde(rename = "Transformfunctions", default)]
    pub transform_functions: Vec<TransformFunctionRecord>,
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone)]
pub struct ExtractSourceRecord {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Path")]
    pub path: String,
    /// Kept as a raw string; unknown or empty values must survive a read-write cycle.
    #[serde(rename = "Scheme", default)]
    pub scheme: String,
    #[serde(rename = "Regex", default)]
    pub regex: String,
    #[serde(rename = "Tablename", default)]
    pub tablename: String,
    #[serde(rename = "Cronexpression", default)]
    pub cron_expression: String,
    #[serde(rename = "Skipheaders", default, skip_serializing_if = "Option::is_none")]
    pub skip_headers: Option<i64>,
    #[serde(rename = "Encoding", default)]
    pub encoding: String,
    #[serde(rename = "Transport", default)]
    pub transport: String,
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone)]
pub struct ExtractRuleRecord {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Extractsourceid")]
    pub extract_source_id: String,
    #[serde(rename = "Columnname", default)]
    pub column_name: String,
    #[serde(rename = "Columnpath", default)]
    pub column_path: String,
    #[serde(rename = "Columntype", default)]
    pub column_type: String,
    #[serde(rename = "Matchvalues", default)]
    pub match_values: String,
    #[serde(rename = "Transformfunctionname", default)]
    pub transform_function_name: String,
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone)]
pub struct ExtensionRecord {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Extractsourceid")]
    pub extract_source_id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Path", default)]
    pub path: String,
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone)]
pub struct TransformFunctionRecord {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Source", default)]
    pub source: String,
}

impl PipelineDocument {
    pub fn find_source(&self, id: &str) -> Option<&ExtractSourceRecord> {
        self.extract_sources.iter().find(|source| source.id == id)
    }

    /// Current scheme of a source, or `None` if the source is unknown or has no scheme.
    pub fn source_scheme(&self, id: &str) -> Option<Scheme> {
        self.find_source(id)
            .and_then(|source| source.scheme.parse().ok())
    }

    pub fn path_taken(&self, path: &str, except_id: Option<&str>) -> bool {
        self.extract_sources
            .iter()
            .any(|source| source.path == path && Some(source.id.as_str()) != except_id)
    }

    pub fn has_transform_function(&self, name: &str) -> bool {
        self.transform_functions
            .iter()
            .any(|function| function.name == name)
    }

    pub fn into_pipeline(self, key: &PipelineKey, version: &Version) -> Pipeline {
        Pipeline {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            version: version.as_str().to_owned(),
            extract_sources: self.extract_sources.into_iter().map(Into::into).collect(),
            extract_rules: self.extract_rules.into_iter().map(Into::into).collect(),
            extensions: self.extensions.into_iter().map(Into::into).collect(),
            transform_functions: self
                .transform_functions
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}

impl From<ExtractSourceRecord> for ExtractSource {
    fn from(record: ExtractSourceRecord) -> Self {
        Self {
            scheme: record.scheme.parse().ok(),
            id: record.id,
            name: record.name,
            path: record.path,
            regex: record.regex,
            tablename: record.tablename,
            cron_expression: record.cron_expression,
            skip_headers: record.skip_headers,
            encoding: record.encoding,
            transport: record.transport,
        }
    }
}

impl From<&ExtractSource> for ExtractSourceRecord {
    fn from(source: &ExtractSource) -> Self {
        Self {
            id: source.id.clone(),
            name: source.name.clone(),
            path: source.path.clone(),
            scheme: source
                .scheme
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            regex: source.regex.clone(),
            tablename: source.tablename.clone(),
            cron_expression: source.cron_expression.clone(),
            skip_headers: source.skip_headers,
            encoding: source.encoding.clone(),
            transport: source.transport.clone(),
        }
    }
}

impl From<ExtractRuleRecord> for ExtractRule {
    fn from(record: ExtractRuleRecord) -> Self {
        Self {
            id: record.id,
            extract_source_id: record.extract_source_id,
            column_name: record.column_name,
            column_path: record.column_path,
            column_type: record.column_type,
            match_values: record.match_values,
            transform_function_name: record.transform_function_name,
        }
    }
}

impl From<&ExtractRule> for ExtractRuleRecord {
    fn from(rule: &ExtractRule) -> Self {
        Self {
            id: rule.id.clone(),
            extract_source_id: rule.extract_source_id.clone(),
            column_name: rule.column_name.clone(),
            column_path: rule.column_path.clone(),
            column_type: rule.column_type.clone(),
            match_values: rule.match_values.clone(),
            transform_function_name: rule.transform_function_name.clone(),
        }
    }
}

impl From<ExtensionRecord> for Extension {
    fn from(record: ExtensionRecord) -> Self {
        Self {
            id: record.id,
            extract_source_id: record.extract_source_id,
            name: record.name,
            path: record.path,
        }
    }
}

impl From<&Extension> for ExtensionRecord {
    fn from(extension: &Extension) -> Self {
        Self {
            id: extension.id.clone(),
            extract_source_id: extension.extract_source_id.clone(),
            name: extension.name.clone(),
            path: extension.path.clone(),
        }
    }
}

impl From<TransformFunctionRecord> for TransformFunction {
    fn from(record: TransformFunctionRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            source: record.source,
        }
    }
}

impl From<&TransformFunction> for TransformFunctionRecord {
    fn from(function: &TransformFunction) -> Self {
        Self {
            id: function.id.clone(),
            name: function.name.clone(),
            source: function.source.clone(),
        }
    }
}
