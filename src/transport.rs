// src/transport.rs
//! Authenticated HTTP exchange with the EDC host.
//!
//! The engine and discovery only talk to [`Transport`]; [`HttpTransport`] is the
//! reqwest-backed implementation and [`MockTransport`] a scripted one for tests.

use async_trait::async_trait;
use reqwest::{Client, Method};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::config::AccountConfig;
use crate::error::{IngestError, Result};

/// Query parameters for a GET, in deterministic order.
pub type Params = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` with `params` merged into its query string.
    async fn get(&self, url: &str, params: &Params) -> Result<HttpResponse>;
    async fn post(&self, url: &str, body: String) -> Result<HttpResponse>;
    async fn put(&self, url: &str, body: String) -> Result<HttpResponse>;
    async fn delete(&self, url: &str, body: String) -> Result<HttpResponse>;
}

/// Merge `params` into the query of `url`: existing pairs are kept in order unless a
/// param of the same name overrides them; new params are appended.
pub fn merge_query(url: &str, params: &Params) -> Result<Url> {
    let mut parsed = Url::parse(url).map_err(|e| IngestError::transport(format!("bad url '{url}': {e}")))?;
    if params.is_empty() {
        return Ok(parsed);
    }
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !params.contains_key(k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed.set_query(None);
    {
        let mut q = parsed.query_pairs_mut();
        q.extend_pairs(kept.iter());
        q.extend_pairs(params.iter());
    }
    Ok(parsed)
}

/// Value of query parameter `name` in `url`, if the url parses and carries it.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let value = parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned());
    value
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    user_name: String,
    password: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(account: &AccountConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("edc-poller/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::config(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            user_name: account.user_name.clone(),
            password: account.password.clone(),
            timeout: Duration::from_secs(60),
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn send(&self, method: Method, url: Url, body: Option<String>) -> Result<HttpResponse> {
        let mut req = self
            .client
            .request(method, url)
            .timeout(self.timeout)
            .basic_auth(&self.user_name, Some(&self.password));
        if let Some(b) = body {
            req = req.body(b);
        }
        let rsp = req.send().await.map_err(IngestError::transport)?;
        let status = rsp.status().as_u16();
        let body = rsp.text().await.map_err(IngestError::transport)?;
        Ok(HttpResponse { status, body })
    }

    fn parse(url: &str) -> Result<Url> {
        Url::parse(url).map_err(|e| IngestError::transport(format!("bad url '{url}': {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, params: &Params) -> Result<HttpResponse> {
        let target = merge_query(url, params)?;
        self.send(Method::GET, target, None).await
    }

    async fn post(&self, url: &str, body: String) -> Result<HttpResponse> {
        self.send(Method::POST, Self::parse(url)?, Some(body)).await
    }

    async fn put(&self, url: &str, body: String) -> Result<HttpResponse> {
        self.send(Method::PUT, Self::parse(url)?, Some(body)).await
    }

    async fn delete(&self, url: &str, body: String) -> Result<HttpResponse> {
        self.send(Method::DELETE, Self::parse(url)?, Some(body)).await
    }
}

// --- Test helper ---

enum Scripted {
    Respond(HttpResponse),
    Fail(String),
}

/// Scripted transport keyed by request URL (without the merged params).
/// Unknown URLs answer `404 Not Found`. Every call is recorded.
pub struct MockTransport {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<(String, Params)>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<String>) {
        self.routes
            .lock()
            .expect("mock transport mutex poisoned")
            .insert(url.to_string(), Scripted::Respond(HttpResponse::new(status, body)));
    }

    pub fn fail(&self, url: &str, reason: &str) {
        self.routes
            .lock()
            .expect("mock transport mutex poisoned")
            .insert(url.to_string(), Scripted::Fail(reason.to_string()));
    }

    pub fn calls(&self) -> Vec<(String, Params)> {
        self.calls.lock().expect("mock transport mutex poisoned").clone()
    }

    fn answer(&self, url: &str, params: &Params) -> Result<HttpResponse> {
        self.calls
            .lock()
            .expect("mock transport mutex poisoned")
            .push((url.to_string(), params.clone()));
        match self.routes.lock().expect("mock transport mutex poisoned").get(url) {
            Some(Scripted::Respond(r)) => Ok(r.clone()),
            Some(Scripted::Fail(reason)) => Err(IngestError::transport(reason)),
            None => Ok(HttpResponse::new(404, "<html><title>Not Found</title></html>")),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str, params: &Params) -> Result<HttpResponse> {
        self.answer(url, params)
    }

    async fn post(&self, url: &str, _body: String) -> Result<HttpResponse> {
        self.answer(url, &Params::new())
    }

    async fn put(&self, url: &str, _body: String) -> Result<HttpResponse> {
        self.answer(url, &Params::new())
    }

    async fn delete(&self, url: &str, _body: String) -> Result<HttpResponse> {
        self.answer(url, &Params::new())
    }
}
