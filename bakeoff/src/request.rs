//! Per-kind request construction.
//!
//! Each run kind has a [`RequestBuilder`] that turns a [`RunConfig`] into the
//! exact call a virtual caller issues on every iteration.
use crate::error::Error;
use bakeoff_core::{RunConfig, RunKind, Target};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, HOST};
use reqwest::Method;
use url::Url;

mod bulk;
mod query;
mod seed;
mod update;

pub use bulk::BulkRequest;
pub use query::QueryRequest;
pub use seed::SeedRequest;
pub use update::UpdateRequest;

/// A fully described HTTP call.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// JSON-encoded body.
    pub body: Option<Vec<u8>>,
}

impl RequestSpec {
    fn new(method: Method, url: Url, target: &Target) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(host) = &target.host {
            let value = HeaderValue::from_str(host)
                .map_err(|_| Error::Target(format!("invalid host header `{host}`")))?;
            headers.insert(HOST, value);
        }

        Ok(Self {
            method,
            url,
            headers,
            body: None,
        })
    }

    fn json(mut self, body: &serde_json::Value) -> Result<Self, Error> {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.body.as_ref().map_or(0, |b| b.len() as u64)
    }
}

pub trait RequestBuilder: Send + Sync {
    fn kind(&self) -> RunKind;

    fn build(&self, config: &RunConfig) -> Result<RequestSpec, Error>;

    /// Whether calls leave the target untouched.
    fn read_only(&self) -> bool {
        self.kind().read_only()
    }
}

pub fn builder_for(kind: RunKind) -> Box<dyn RequestBuilder> {
    match kind {
        RunKind::Query => Box::new(QueryRequest),
        RunKind::Seed => Box::new(SeedRequest),
        RunKind::Update => Box::new(UpdateRequest),
        RunKind::Bulk => Box::new(BulkRequest),
    }
}

/// Appends path segments to the target base, keeping any path prefix the base
/// already carries. Segments are percent-encoded.
fn endpoint<'a>(target: &Target, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, Error> {
    let mut url = target.base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| Error::Target(format!("`{}` cannot be a base URL", target.base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn mismatch(builder: RunKind, config: &RunConfig) -> Error {
    Error::KindMismatch {
        builder,
        kind: config.kind(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use bakeoff_core::{resolve, Params, RunConfig, RunKind, Targets};
    use serde_json::Value;
    use url::Url;

    pub fn config(kind: RunKind, params: Value) -> RunConfig {
        config_with(kind, params, Targets::default())
    }

    pub fn config_with(kind: RunKind, params: Value, targets: Targets) -> RunConfig {
        let params: Params = match params {
            Value::Object(map) => map,
            _ => Params::new(),
        };
        resolve(kind, &params, &targets).unwrap().config
    }

    pub fn targets(base: &str) -> Targets {
        Targets::empty().base("pimcore", Url::parse(base).unwrap())
    }
}
