use super::{endpoint, mismatch, RequestBuilder, RequestSpec};
use crate::error::Error;
use bakeoff_core::{RunConfig, RunKind, RunParams};
use reqwest::Method;
use serde_json::json;

/// `POST /api/{engine}/product/seed` asking the target to create `count` products.
pub struct SeedRequest;

impl RequestBuilder for SeedRequest {
    fn kind(&self) -> RunKind {
        RunKind::Seed
    }

    fn build(&self, config: &RunConfig) -> Result<RequestSpec, Error> {
        let RunParams::Seed { count } = &config.params else {
            return Err(mismatch(self.kind(), config));
        };

        let url = endpoint(
            &config.target,
            ["api", config.engine.as_str(), "product", "seed"],
        )?;
        RequestSpec::new(Method::POST, url, &config.target)?.json(&json!({ "count": count }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_support::*;
    use reqwest::header::CONTENT_TYPE;

    #[test]
    fn posts_count() {
        let config = config(RunKind::Seed, json!({ "count": "250" }));
        let spec = SeedRequest.build(&config).unwrap();
        assert_eq!(spec.method, Method::POST);
        assert_eq!(spec.url.path(), "/api/es/product/seed");
        assert_eq!(spec.headers[CONTENT_TYPE], "application/json");
        let body: serde_json::Value = serde_json::from_slice(spec.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({ "count": 250 }));
        assert_eq!(spec.bytes_sent(), br#"{"count":250}"#.len() as u64);
    }
}
