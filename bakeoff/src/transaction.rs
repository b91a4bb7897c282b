use crate::request::RequestSpec;
use crate::server_timing;
use bakeoff_core::{DebugSample, PhaseTimings, RequestSample};
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Result of a single call: the sample that feeds aggregation and the raw
/// response a debug capture may need.
pub(crate) struct Call {
    pub sample: RequestSample,
    pub url: String,
    headers: HeaderMap,
    /// Response body, or the error text when the call failed in transport.
    body: Bytes,
}

impl Call {
    fn transport_error(
        url: String,
        sample: RequestSample,
        headers: HeaderMap,
        err: reqwest::Error,
    ) -> Self {
        Self {
            sample,
            url,
            headers,
            body: Bytes::from(err.to_string()),
        }
    }

    pub fn debug_sample(&self, max_body: usize) -> DebugSample {
        DebugSample {
            status: self.sample.status,
            url: self.url.clone(),
            headers: flatten_headers(&self.headers),
            snippet: String::from_utf8_lossy(&self.body)
                .chars()
                .take(max_body)
                .collect(),
        }
    }
}

/// Issues the call and records it. Transport errors never escape; they become a
/// sample with status `0`, including a response whose body could not be read.
pub(crate) async fn send(client: &Client, spec: RequestSpec) -> Call {
    let url = spec.url.to_string();
    let bytes_sent = spec.bytes_sent();

    let mut request = client.request(spec.method, spec.url).headers(spec.headers);
    if let Some(body) = spec.body {
        request = request.body(body);
    }

    let start = Instant::now();
    let call = match request.send().await {
        Ok(response) => {
            let waiting = start.elapsed();
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let server_timing = server_timing::from_headers(&headers);

            let receiving_start = Instant::now();
            let read = response.bytes().await;
            let receiving = receiving_start.elapsed();
            let phases = PhaseTimings {
                waiting: Some(millis(waiting)),
                receiving: Some(millis(receiving)),
                ..Default::default()
            };

            match read {
                Ok(body) => {
                    let mut sample = RequestSample::new(status, millis(start.elapsed()));
                    sample.bytes_sent = bytes_sent;
                    sample.bytes_received = body.len() as u64;
                    sample.server_timing = server_timing;
                    sample.phases = phases;

                    Call {
                        sample,
                        url,
                        headers,
                        body,
                    }
                }
                Err(err) => {
                    trace!("Response body from {url} cut short after status {status}: {err}");
                    let mut sample = RequestSample::new(0, millis(start.elapsed()));
                    sample.bytes_sent = bytes_sent;
                    sample.phases = phases;
                    Call::transport_error(url, sample, headers, err)
                }
            }
        }
        Err(err) => {
            trace!("Transport error calling {url}: {err}");
            let mut sample = RequestSample::new(0, millis(start.elapsed()));
            sample.bytes_sent = bytes_sent;
            Call::transport_error(url, sample, HeaderMap::new(), err)
        }
    };

    #[cfg(feature = "metrics")]
    {
        let class = call.sample.class().label();
        metrics::counter!("bakeoff_requests_total", "class" => class).increment(1);
        metrics::histogram!("bakeoff_request_duration_ms").record(call.sample.duration_ms);
    }

    call
}

pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.
}

fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        let flat = flatten_headers(&headers);
        assert_eq!(flat["set-cookie"], "a=1, b=2");
        assert_eq!(flat["content-type"], "application/json");
    }

    #[tokio::test]
    async fn unreachable_target_is_a_failed_sample() {
        let client = Client::new();
        let spec = RequestSpec {
            method: reqwest::Method::GET,
            url: url::Url::parse("http://127.0.0.1:1/api/es/product").unwrap(),
            headers: HeaderMap::new(),
            body: None,
        };
        let call = send(&client, spec).await;
        assert_eq!(call.sample.status, 0);
        assert!(!call.sample.success);

        let debug = call.debug_sample(1000);
        assert!(debug.headers.is_empty());
        assert!(!debug.snippet.is_empty());
    }

    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn truncated_body_is_a_failed_sample() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 1000\r\n\r\npartial")
                .await
                .unwrap();
            socket.shutdown().await.unwrap();
        });

        let spec = RequestSpec {
            method: reqwest::Method::GET,
            url: url::Url::parse(&format!("http://{addr}/api/es/product")).unwrap(),
            headers: HeaderMap::new(),
            body: None,
        };
        let call = send(&Client::new(), spec).await;
        assert_eq!(call.sample.status, 0);
        assert!(!call.sample.success);
        assert_eq!(call.sample.bytes_received, 0);
        assert_eq!(call.sample.class().label(), "5xx");

        let debug = call.debug_sample(1000);
        assert_eq!(debug.status, 0);
        assert_eq!(debug.headers["content-length"], "1000");
    }
}
