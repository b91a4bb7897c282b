use super::{endpoint, mismatch, RequestBuilder, RequestSpec};
use crate::error::Error;
use bakeoff_core::{RunConfig, RunKind, RunParams};
use reqwest::Method;

/// `PATCH /api/{engine}/product/{id}` with the resolved payload.
pub struct UpdateRequest;

impl RequestBuilder for UpdateRequest {
    fn kind(&self) -> RunKind {
        RunKind::Update
    }

    fn build(&self, config: &RunConfig) -> Result<RequestSpec, Error> {
        let RunParams::Update { id, payload } = &config.params else {
            return Err(mismatch(self.kind(), config));
        };

        let url = endpoint(
            &config.target,
            ["api", config.engine.as_str(), "product", id.as_str()],
        )?;
        RequestSpec::new(Method::PATCH, url, &config.target)?.json(&payload.body())
    }
}
