use super::{endpoint, mismatch, RequestBuilder, RequestSpec};
use crate::error::Error;
use bakeoff_core::{RunConfig, RunKind, RunParams};
use reqwest::Method;
use serde_json::{json, Map, Value};

/// `POST {bulk_path}` adjusting prices by `percent`, optionally limited to `count` products.
pub struct BulkRequest;

impl RequestBuilder for BulkRequest {
    fn kind(&self) -> RunKind {
        RunKind::Bulk
    }

    fn build(&self, config: &RunConfig) -> Result<RequestSpec, Error> {
        let (RunParams::Bulk { percent, count, .. }, Some(path)) =
            (&config.params, config.bulk_path())
        else {
            return Err(mismatch(self.kind(), config));
        };

        let url = endpoint(&config.target, path.split('/').filter(|s| !s.is_empty()))?;

        let mut body = Map::new();
        body.insert("percent".into(), json!(percent));
        if let Some(count) = count {
            body.insert("count".into(), json!(count));
        }

        RequestSpec::new(Method::POST, url, &config.target)?.json(&Value::Object(body))
    }
}
