use super::{endpoint, mismatch, RequestBuilder, RequestSpec};
use crate::error::Error;
use bakeoff_core::{RunConfig, RunKind, RunParams};
use reqwest::Method;

/// `GET /api/{engine}/product` with the search filters as query string.
pub struct QueryRequest;

impl RequestBuilder for QueryRequest {
    fn kind(&self) -> RunKind {
        RunKind::Query
    }

    fn build(&self, config: &RunConfig) -> Result<RequestSpec, Error> {
        let RunParams::Query(filters) = &config.params else {
            return Err(mismatch(self.kind(), config));
        };

        let mut url = endpoint(&config.target, ["api", config.engine.as_str(), "product"])?;
        let pairs = filters.pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        RequestSpec::new(Method::GET, url, &config.target)
    }
}
