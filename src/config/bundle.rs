use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the descriptor inside a bundle directory
pub const BUNDLE_FILE: &str = "plumb.yml";

/// Errors raised while parsing or validating a bundle descriptor
#[derive(Error, Debug, PartialEq)]
pub enum BundleError {
    #[error("YAML parse error: {0}")]
    ParseError(String),

    #[error("Bundle name must not be empty")]
    EmptyName,

    #[error("Bundle name '{0}' must not contain path separators or be '.' or '..'")]
    InvalidName(String),

    #[error("Bundle '{bundle}' declares {direction} field '{field}' more than once")]
    DuplicateField {
        bundle: String,
        direction: &'static str,
        field: String,
    },
}

/// A named field a bundle consumes or produces
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Static record of one pipeline stage
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BundleDescriptor {
    pub name: String,

    #[serde(default)]
    pub inputs: Vec<Field>,

    #[serde(default)]
    pub outputs: Vec<Field>,

    /// Shell commands run while building the stage image
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<String>,

    /// KEY=VALUE pairs baked into the stage environment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

impl BundleDescriptor {
    /// Parse and validate a descriptor from YAML.
    pub fn from_str(content: &str) -> Result<Self, BundleError> {
        let bundle: BundleDescriptor =
            serde_yaml::from_str(content).map_err(|e| BundleError::ParseError(e.to_string()))?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Field names are unique within the input set and within the output set.
    pub fn validate(&self) -> Result<(), BundleError> {
        if self.name.trim().is_empty() {
            return Err(BundleError::EmptyName);
        }
        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(BundleError::InvalidName(self.name.clone()));
        }
        check_unique(&self.name, "input", &self.inputs)?;
        check_unique(&self.name, "output", &self.outputs)?;
        Ok(())
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|f| f.name.as_str())
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|f| f.name.as_str())
    }
}

fn check_unique(bundle: &str, direction: &'static str, fields: &[Field]) -> Result<(), BundleError> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(BundleError::DuplicateField {
                bundle: bundle.to_string(),
                direction,
                field: field.name.clone(),
            });
        }
    }
    Ok(())
}
