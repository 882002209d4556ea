//! Builders for test data.

#![allow(dead_code)]

use std::collections::BTreeMap;

use tensorquick::store::ModelRecord;

/// Builder for `ModelRecord` instances.
pub struct ModelBuilder {
    record: ModelRecord,
}

impl ModelBuilder {
    pub fn new(code_name: &str) -> Self {
        Self {
            record: ModelRecord::new(code_name, &code_name.to_uppercase()),
        }
    }

    pub fn gpu_type(mut self, gpu_type: &str) -> Self {
        self.record.gpu_type = Some(gpu_type.to_string());
        self
    }

    pub fn deployed_url(mut self, url: &str) -> Self {
        self.record.deployed_url = url.to_string();
        self
    }

    pub fn active(mut self) -> Self {
        self.record.active = true;
        self
    }

    pub fn build(self) -> ModelRecord {
        self.record
    }
}

/// Builds an override map from key/value pairs.
pub fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// The deploy tool's success line for `code_name`.
pub fn result_line(code_name: &str) -> String {
    format!(
        "Created web function => https://acme--{}-model-web-inference.modal.run",
        code_name
    )
}

pub fn result_url(code_name: &str) -> String {
    format!("https://acme--{}-model-web-inference.modal.run", code_name)
}
