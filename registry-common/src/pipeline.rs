//! # Pipeline
//!
//! Wire-facing shapes of the configuration entities managed per pipeline.
use std::fmt;
use std::str::FromStr;

use serde::{de::Visitor, Deserialize, Serialize};
use thiserror::Error;

/// Identity of a pipeline aggregate in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub namespace: String,
    pub name: String,
}

impl PipelineKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }
}

impl fmt::Display for PipelineKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("scheme must not be empty")]
pub struct EmptySchemeError;

/// Data format of an extract source. Decides which path dialect its rules use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
    Csv,
    Xml,
    Json,
    Api,
    Xlsx,
    /// Any other format, kept verbatim (upper-cased).
    Other(String),
}

impl FromStr for Scheme {
    type Err = EmptySchemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_ref() {
            "" => Err(EmptySchemeError),
            "CSV" => Ok(Scheme::Csv),
            "XML" => Ok(Scheme::Xml),
            "JSON" => Ok(Scheme::Json),
            "API" => Ok(Scheme::Api),
            "XLSX" => Ok(Scheme::Xlsx),
            other => Ok(Scheme::Other(other.to_owned())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scheme::Csv => write!(f, "CSV"),
            Scheme::Xml => write!(f, "XML"),
            Scheme::Json => write!(f, "JSON"),
            Scheme::Api => write!(f, "API"),
            Scheme::Xlsx => write!(f, "XLSX"),
            Scheme::Other(other) => write!(f, "{}", other),
        }
    }
}

struct SchemeVisitor;

impl<'de> Visitor<'de> for SchemeVisitor {
    type Value = Scheme;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a non-empty scheme name such as CSV, XML, JSON, API or XLSX")
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Scheme::from_str(s)
            .map_err(|_| serde::de::Error::invalid_value(serde::de::Unexpected::Str(s), &self))
    }
}

impl<'de> Deserialize<'de> for Scheme {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(SchemeVisitor)
    }
}

impl Serialize for Scheme {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A watched input of the pipeline.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractSource {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<Scheme>,
    pub regex: String,
    pub tablename: String,
    pub cron_expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_headers: Option<i64>,
    pub encoding: String,
    pub transport: String,
}

/// A field extraction directive bound to one extract source.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractRule {
    pub id: String,
    pub extract_source_id: String,
    pub column_name: String,
    pub column_path: String,
    pub column_type: String,
    pub match_values: String,
    /// Name of a `TransformFunction`. Only checked when reference enforcement is on.
    pub transform_function_name: String,
}

/// A named post-processing hook attached to an extract source.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct Extension {
    pub id: String,
    pub extract_source_id: String,
    pub name: String,
    pub path: String,
}

#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformFunction {
    pub id: String,
    pub name: String,
    pub source: String,
}

/// A single metric reported for an extract source by the metrics collaborator.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct SourceMetric {
    pub name: String,
    pub value: f64,
}

/// An extract source together with everything bound to it.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExtractSourceDetail {
    #[serde(flatten)]
    pub source: ExtractSource,
    pub extract_rules: Vec<ExtractRule>,
    pub extensions: Vec<Extension>,
    /// Only reported for API sources, and only when the runtime answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_active: Option<bool>,
    pub metrics: Vec<SourceMetric>,
}

/// The whole aggregate as seen by API consumers.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub extract_sources: Vec<ExtractSource>,
    pub extract_rules: Vec<ExtractRule>,
    pub extensions: Vec<Extension>,
    pub transform_functions: Vec<TransformFunction>,
}
