//! Cookie-authenticated JSON list endpoints
//!
//! The content platform wraps every listing in the same envelope:
//!
//! ```json
//! { "success": true, "msg": "", "data": { "notes": [...], "cursor": "abc", "has_more": true } }
//! ```
//!
//! Where the items, the next cursor and the continuation flag live inside `data` differs
//! between listings (`notes` / `cursor` for a user's posts, `items` / `cursor_score` for
//! the home feed, `users` for user search) and is described by an [`EnvelopeLayout`].
//!
//! - [`JsonListEndpoint`] is cursor-paginated. It sends the cursor as a query parameter
//!   (`GET`) or as a field of a JSON body (`POST`).
//! - [`JsonSearchEndpoint`] is page-numbered. It posts a JSON body with the page number
//!   set at a configurable field, and plugs into the collector through
//!   [`PageNumberAdapter`](crate::pagination::PageNumberAdapter).
//!
//! Producing platform request signatures is not part of this crate: the
//! [`RequestSigner`] collaborator supplies whatever headers a request needs, and
//! [`CookieSigner`] only attaches the session cookie.

use crate::error::{Error, Result};
use crate::http::classify_response;
use crate::pagination::{ListEndpoint, NumberedEndpoint, NumberedPage};
use crate::types::{Cursor, Page};
use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde_json::Value;
use std::sync::Arc;

/// Supplies the headers that authenticate one request
pub trait RequestSigner: Send + Sync {
    /// Headers for a request to `path_with_query` (path plus encoded query string),
    /// carrying `body` when it is a `POST`
    fn sign(&self, path_with_query: &str, body: Option<&Value>) -> Result<HeaderMap>;
}

/// Attaches a raw session cookie string to every request
#[derive(Clone)]
pub struct CookieSigner {
    cookie: String,
}

impl CookieSigner {
    /// Wrap a `name=value; name2=value2` cookie string
    pub fn new(cookie: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
        }
    }
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner")
            .field("cookie", &"<redacted>")
            .finish()
    }
}

impl RequestSigner for CookieSigner {
    fn sign(&self, _path_with_query: &str, _body: Option<&Value>) -> Result<HeaderMap> {
        let value = HeaderValue::from_str(&self.cookie).map_err(|e| Error::Config {
            message: format!("cookie is not a valid header value: {e}"),
            key: Some("cookie".to_string()),
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, value);
        Ok(headers)
    }
}

/// Where a listing keeps its parts inside `data`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeLayout {
    /// Key of the item array
    pub items_key: String,
    /// Key of the next cursor (string or number)
    pub cursor_key: String,
    /// Key of the continuation flag. `None` for listings without one, which continue
    /// for as long as they return the item array.
    pub has_more_key: Option<String>,
}

impl EnvelopeLayout {
    /// Layout with items under `items_key` and default cursor and flag keys
    pub fn new(items_key: impl Into<String>) -> Self {
        Self {
            items_key: items_key.into(),
            ..Self::default()
        }
    }
}

impl Default for EnvelopeLayout {
    fn default() -> Self {
        Self {
            items_key: "notes".to_string(),
            cursor_key: "cursor".to_string(),
            has_more_key: Some("has_more".to_string()),
        }
    }
}

/// HTTP client, host and signer shared by both endpoint kinds
struct SignedClient {
    client: reqwest::Client,
    base_url: String,
    signer: Arc<dyn RequestSigner>,
}

impl SignedClient {
    fn new(client: reqwest::Client, base_url: String, signer: Arc<dyn RequestSigner>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            signer,
        }
    }

    /// `GET` when `body` is `None`, `POST` with a JSON body otherwise
    async fn request(&self, path_with_query: &str, body: Option<&Value>) -> Result<Value> {
        let headers = self.signer.sign(path_with_query, body)?;
        let url = format!("{}{}", self.base_url, path_with_query);
        let request = match body {
            Some(body) => self.client.post(url).json(body),
            None => self.client.get(url),
        };
        let response = request.headers(headers).send().await?;
        Ok(classify_response(response).await?.json().await?)
    }
}

fn encode_query(path: &str, params: &[(String, String)], extra: Option<(&str, &str)>) -> String {
    let pairs: Vec<String> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(extra)
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    if pairs.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, pairs.join("&"))
    }
}

/// Set `value` at a `/`-separated field path, creating intermediate objects
fn set_field(body: &mut Value, field: &str, value: Value) -> Result<()> {
    let field = field.trim_start_matches('/');
    let not_an_object = || Error::Config {
        message: format!("request body cannot hold field '{field}'"),
        key: None,
    };
    if field.is_empty() {
        return Err(not_an_object());
    }

    let mut target = body;
    let mut keys = field.split('/').peekable();
    while let Some(key) = keys.next() {
        let Value::Object(map) = target else {
            return Err(not_an_object());
        };
        if keys.peek().is_none() {
            map.insert(key.to_string(), value);
            return Ok(());
        }
        target = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    Ok(())
}

/// One cursor-paginated listing of the platform, yielding raw JSON items
pub struct JsonListEndpoint {
    http: SignedClient,
    path: String,
    params: Vec<(String, String)>,
    body: Option<Value>,
    cursor_param: String,
    layout: EnvelopeLayout,
}

impl JsonListEndpoint {
    /// `GET` listing at `base_url` + `path`, with the default [`EnvelopeLayout`] and
    /// the cursor sent as `cursor`
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        path: impl Into<String>,
        signer: Arc<dyn RequestSigner>,
    ) -> Self {
        Self {
            http: SignedClient::new(client, base_url.into(), signer),
            path: path.into(),
            params: Vec::new(),
            body: None,
            cursor_param: "cursor".to_string(),
            layout: EnvelopeLayout::default(),
        }
    }

    /// Add a fixed query parameter sent with every page request
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Switch to `POST`, sending `body` with the cursor set at the cursor field
    #[must_use]
    pub fn with_json_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Request field carrying the cursor: a query parameter for `GET`, a `/`-separated
    /// body field for `POST`
    #[must_use]
    pub fn with_cursor_param(mut self, name: impl Into<String>) -> Self {
        self.cursor_param = name.into();
        self
    }

    /// Key of the item array inside `data`
    #[must_use]
    pub fn with_items_key(mut self, key: impl Into<String>) -> Self {
        self.layout.items_key = key.into();
        self
    }

    /// Key of the next cursor inside `data`
    #[must_use]
    pub fn with_cursor_key(mut self, key: impl Into<String>) -> Self {
        self.layout.cursor_key = key.into();
        self
    }

    /// Replace the whole response layout
    #[must_use]
    pub fn with_layout(mut self, layout: EnvelopeLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Path plus encoded query string for the page at `cursor`
    fn path_with_query(&self, cursor: &Cursor) -> String {
        let cursor_pair = self
            .body
            .is_none()
            .then(|| (self.cursor_param.as_str(), cursor.as_str()));
        encode_query(&self.path, &self.params, cursor_pair)
    }

    fn body_for(&self, cursor: &Cursor) -> Result<Option<Value>> {
        let Some(template) = &self.body else {
            return Ok(None);
        };
        let mut body = template.clone();
        set_field(&mut body, &self.cursor_param, Value::String(cursor.0.clone()))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl ListEndpoint for JsonListEndpoint {
    type Item = Value;

    async fn fetch(&self, cursor: &Cursor) -> Result<Page<Value>> {
        let path_with_query = self.path_with_query(cursor);
        let body = self.body_for(cursor)?;
        let envelope = self.http.request(&path_with_query, body.as_ref()).await?;
        decode_envelope(envelope, &self.layout)
    }
}

/// One page-numbered search of the platform, yielding raw JSON items
pub struct JsonSearchEndpoint {
    http: SignedClient,
    path: String,
    body: Value,
    page_field: String,
    layout: EnvelopeLayout,
}

impl JsonSearchEndpoint {
    /// `POST` search at `base_url` + `path`. `body` is sent with the page number set at
    /// `page`; items are read from `data.items`.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        path: impl Into<String>,
        body: Value,
        signer: Arc<dyn RequestSigner>,
    ) -> Self {
        Self {
            http: SignedClient::new(client, base_url.into(), signer),
            path: path.into(),
            body,
            page_field: "page".to_string(),
            layout: EnvelopeLayout::new("items"),
        }
    }

    /// `/`-separated body field carrying the page number
    #[must_use]
    pub fn with_page_field(mut self, field: impl Into<String>) -> Self {
        self.page_field = field.into();
        self
    }

    /// Key of the item array inside `data`
    #[must_use]
    pub fn with_items_key(mut self, key: impl Into<String>) -> Self {
        self.layout.items_key = key.into();
        self
    }
}

#[async_trait]
impl NumberedEndpoint for JsonSearchEndpoint {
    type Item = Value;

    async fn fetch_page(&self, page: u32) -> Result<NumberedPage<Value>> {
        let mut body = self.body.clone();
        set_field(&mut body, &self.page_field, Value::from(page))?;
        let envelope = self.http.request(&self.path, Some(&body)).await?;
        decode_numbered(envelope, &self.layout)
    }
}

/// `data` of a successful envelope, `None` when the envelope has none
pub(crate) fn envelope_data(envelope: &Value) -> Result<Option<&Value>> {
    if !envelope.get("success").and_then(Value::as_bool).unwrap_or(false) {
        let message = envelope
            .get("msg")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("request was not successful")
            .to_string();
        return Err(Error::PermanentRequest {
            status: None,
            message,
        });
    }
    Ok(envelope.get("data"))
}

fn items_at(data: &Value, key: &str) -> Result<Option<Vec<Value>>> {
    match data.get(key) {
        Some(Value::Array(items)) => Ok(Some(items.clone())),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(Error::malformed(format!("'data.{key}' is not an array"))),
    }
}

fn has_more(data: &Value, layout: &EnvelopeLayout, items_present: bool) -> bool {
    match &layout.has_more_key {
        Some(key) => data.get(key).and_then(Value::as_bool).unwrap_or(false),
        None => items_present,
    }
}

/// Decode one cursor-paginated list response
pub fn decode_envelope(envelope: Value, layout: &EnvelopeLayout) -> Result<Page<Value>> {
    let Some(data) = envelope_data(&envelope)? else {
        return Ok(Page::last(Vec::new()));
    };

    let items = items_at(data, &layout.items_key)?;
    let next_cursor = match data.get(&layout.cursor_key) {
        Some(Value::String(s)) if !s.is_empty() => Some(Cursor(s.clone())),
        Some(Value::Number(n)) => Some(Cursor(n.to_string())),
        _ => None,
    };

    Ok(Page {
        has_more: has_more(data, layout, items.is_some()),
        items: items.unwrap_or_default(),
        next_cursor,
    })
}

/// Decode one page-numbered search response
pub fn decode_numbered(envelope: Value, layout: &EnvelopeLayout) -> Result<NumberedPage<Value>> {
    let Some(data) = envelope_data(&envelope)? else {
        return Ok(NumberedPage {
            items: None,
            has_more: false,
        });
    };

    let items = items_at(data, &layout.items_key)?;
    Ok(NumberedPage {
        has_more: has_more(data, layout, items.is_some()),
        items,
    })
}
