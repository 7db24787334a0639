use std::ops::RangeInclusive;
use std::thread;
use std::time::Duration;

use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::domain::PublicationId;
use crate::error::PipelineError;

pub const EPMC_BASE_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";
pub const MAX_RETRIES: usize = 5;
pub const BACKOFF_SECONDS: RangeInclusive<u64> = 1..=15;

pub const EPMC_FIELDS: [&str; 11] = [
    "pmid",
    "pmcid",
    "title",
    "authorList",
    "authorString",
    "journalInfo",
    "grantsList",
    "keywordList",
    "meshHeadingList",
    "citedByCount",
    "hasTMAccessionNumbers",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    Abort,
    AbortGraceful,
    ReturnEmpty,
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

pub trait EpmcTransport: Send + Sync {
    fn get(&self, url: &str) -> Result<RawResponse, PipelineError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("epmc-ap/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::EpmcRequest(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| PipelineError::EpmcRequest(err.to_string()))?;
        Ok(Self { client })
    }
}

impl EpmcTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<RawResponse, PipelineError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| PipelineError::EpmcRequest(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| PipelineError::EpmcRequest(err.to_string()))?;
        Ok(RawResponse { status, body })
    }
}

enum Attempt {
    Data(Value),
    Empty,
    Incomplete(String),
}

pub struct EpmcClient<T: EpmcTransport> {
    transport: T,
    base_url: String,
    max_retries: usize,
    backoff_seconds: RangeInclusive<u64>,
}

impl EpmcClient<ReqwestTransport> {
    pub fn new() -> Result<Self, PipelineError> {
        Ok(Self::with_transport(
            ReqwestTransport::new()?,
            EPMC_BASE_URL.to_string(),
        ))
    }
}

impl<T: EpmcTransport> EpmcClient<T> {
    pub fn with_transport(transport: T, base_url: String) -> Self {
        Self {
            transport,
            base_url,
            max_retries: MAX_RETRIES,
            backoff_seconds: BACKOFF_SECONDS,
        }
    }

    pub fn with_retry_policy(
        mut self,
        max_retries: usize,
        backoff_seconds: RangeInclusive<u64>,
    ) -> Self {
        self.max_retries = max_retries;
        self.backoff_seconds = backoff_seconds;
        self
    }

    pub fn search(
        &self,
        params: &[(&str, &str)],
        on_failure: OnFailure,
    ) -> Result<Value, PipelineError> {
        let url = build_query_url(&format!("{}/search", self.base_url), params);
        self.query(&url, on_failure)
    }

    pub fn article(
        &self,
        id: &PublicationId,
        on_failure: OnFailure,
    ) -> Result<Value, PipelineError> {
        let url = build_query_url(
            &format!("{}/{}", self.base_url, id.article_path()),
            &[("resultType", "core"), ("format", "json")],
        );
        self.query(&url, on_failure)
    }

    pub fn query(&self, url: &str, on_failure: OnFailure) -> Result<Value, PipelineError> {
        let mut attempt = 0;
        loop {
            let reason = match self.attempt(url) {
                Ok(Attempt::Data(data)) => return Ok(data),
                Ok(Attempt::Empty) => {
                    info!("no results for {url}");
                    return Ok(empty_object());
                }
                Ok(Attempt::Incomplete(reason)) => reason,
                Err(PipelineError::EpmcRequest(message)) => message,
                Err(err) => {
                    if on_failure == OnFailure::ReturnEmpty {
                        warn!("{err}; substituting empty result");
                        return Ok(empty_object());
                    }
                    return Err(err);
                }
            };

            if attempt >= self.max_retries {
                warn!("giving up on {url} after {} retries", self.max_retries);
                return match on_failure {
                    OnFailure::ReturnEmpty => Ok(empty_object()),
                    OnFailure::Abort => Err(PipelineError::RetriesExhausted {
                        url: url.to_string(),
                        retries: self.max_retries,
                        graceful: false,
                    }),
                    OnFailure::AbortGraceful => Err(PipelineError::RetriesExhausted {
                        url: url.to_string(),
                        retries: self.max_retries,
                        graceful: true,
                    }),
                };
            }

            attempt += 1;
            let delay = rand::thread_rng().gen_range(self.backoff_seconds.clone());
            warn!("incomplete response from {url} ({reason}), retry {attempt} in {delay}s");
            thread::sleep(Duration::from_secs(delay));
        }
    }

    fn attempt(&self, url: &str) -> Result<Attempt, PipelineError> {
        let response = self.transport.get(url)?;
        if response.status != 200 {
            return Err(PipelineError::EpmcStatus {
                status: response.status,
                message: response.body,
            });
        }

        let data: Value = match serde_json::from_str(&response.body) {
            Ok(value) => value,
            Err(err) => return Ok(Attempt::Incomplete(format!("unparseable body: {err}"))),
        };
        match data.get("hitCount").and_then(Value::as_i64) {
            None => Ok(Attempt::Incomplete("missing hitCount".to_string())),
            Some(0) => Ok(Attempt::Empty),
            Some(_) => Ok(Attempt::Data(data)),
        }
    }
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

pub fn result_rows(data: &Value) -> &[Value] {
    data.get("resultList")
        .and_then(|list| list.get("result"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

pub fn extract_fields(row: &Value) -> Map<String, Value> {
    let mut fields = Map::new();
    for field in EPMC_FIELDS {
        if let Some(value) = row.get(field) {
            if !value.is_null() {
                fields.insert(field.to_string(), value.clone());
            }
        }
    }
    fields
}

fn encode_url_component(value: &str) -> String {
    let mut out = String::new();
    for byte in value.as_bytes() {
        let ch = *byte as char;
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' || ch == '~' {
            out.push(ch);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn build_query_url(base: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    let mut out = String::from(base);
    out.push('?');
    for (idx, (key, value)) in params.iter().enumerate() {
        if idx > 0 {
            out.push('&');
        }
        out.push_str(&encode_url_component(key));
        out.push('=');
        out.push_str(&encode_url_component(value));
    }
    out
}
