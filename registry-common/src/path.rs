//! # Path
//!
//! Validation of extract rule column paths. The dialect of a path is decided by the
//! scheme of the source the rule is bound to:
//! - CSV: a non-negative column ordinal.
//! - XML: an XPath expression.
//! - JSON: a JSONPath expression.
//!
//! Every other scheme, and rules whose source cannot be resolved, are not checked.
use serde_json_path::JsonPath;
use thiserror::Error;

use crate::pipeline::Scheme;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PathError {
    #[error("column path {0:?} is not a non-negative column index")]
    InvalidOrdinal(String),
    #[error("column path {path:?} is not a valid XPath expression: {reason}")]
    InvalidXPath { path: String, reason: String },
    #[error("column path {path:?} is not a valid JSONPath expression: {reason}")]
    InvalidJsonPath { path: String, reason: String },
}

pub fn validate(scheme: Option<&Scheme>, path: &str) -> Result<(), PathError> {
    match scheme {
        Some(Scheme::Csv) => validate_ordinal(path),
        Some(Scheme::Xml) => validate_xpath(path),
        Some(Scheme::Json) => validate_json_path(path),
        _ => Ok(()),
    }
}

/// Plain ASCII digits only; `parse` alone would also let a leading `+` through.
fn validate_ordinal(path: &str) -> Result<(), PathError> {
    if path.is_empty() || !path.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PathError::InvalidOrdinal(path.to_owned()));
    }

    path.parse::<u64>()
        .map(|_| ())
        .map_err(|_| PathError::InvalidOrdinal(path.to_owned()))
}

fn validate_xpath(path: &str) -> Result<(), PathError> {
    match sxd_xpath::Factory::new().build(path) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(PathError::InvalidXPath {
            path: path.to_owned(),
            reason: "expression is empty".to_owned(),
        }),
        Err(err) => Err(PathError::InvalidXPath {
            path: path.to_owned(),
            reason: format!("{:?}", err),
        }),
    }
}

fn validate_json_path(path: &str) -> Result<(), PathError> {
    JsonPath::parse(path)
        .map(|_| ())
        .map_err(|err| PathError::InvalidJsonPath {
            path: path.to_owned(),
            reason: err.to_string(),
        })
}
