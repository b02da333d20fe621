//! Notion file-import endpoint
//!
//! Notion imports an externally hosted file asynchronously: `POST /v1/file_uploads` in
//! `external_url` mode creates the upload, and `GET /v1/file_uploads/{id}` reports its
//! status until it is `uploaded` or `failed`. [`NotionUploadEndpoint`] maps that API
//! onto [`JobEndpoint`] so an [`AsyncJobPoller`](crate::upload::AsyncJobPoller) can
//! drive it.
//!
//! The id of the file upload is also its permanent handle: page blocks reference the
//! upload by id (see [`image_block`]). [`NotionPageEndpoint`] creates database pages
//! whose children are built from those handles, and [`NotionPageEndpoint::export_note`]
//! runs the whole import of one note: images first, then the page.

use crate::error::{Error, Result};
use crate::http::{build_client, classify_response};
use crate::note::Note;
use crate::types::{JobId, JobStatus, PermanentHandle};
use crate::upload::{AsyncJobPoller, BatchReport, JobEndpoint};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use url::Url;

/// Production API host
pub const DEFAULT_BASE_URL: &str = "https://api.notion.com";

/// API version sent with every request
pub const NOTION_VERSION: &str = "2022-06-28";

const DEFAULT_FILENAME: &str = "image.jpeg";

#[derive(Debug, Deserialize)]
struct CreatedUpload {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    file_import_result: Option<ImportResult>,
}

#[derive(Debug, Deserialize)]
struct ImportResult {
    #[serde(default)]
    error: Option<ImportError>,
}

#[derive(Debug, Deserialize)]
struct ImportError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedPageBody {
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Authenticated access to the API host, shared by both endpoints
#[derive(Clone, Debug)]
struct NotionApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl NotionApi {
    fn new(client: reqwest::Client, token: String) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
        }
    }

    fn set_base_url(&mut self, base_url: String) {
        self.base_url = base_url.trim_end_matches('/').to_string();
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }
}

/// Imports external URLs into Notion as file uploads
#[derive(Clone, Debug)]
pub struct NotionUploadEndpoint {
    api: NotionApi,
    filename: String,
}

impl NotionUploadEndpoint {
    /// Create an endpoint authenticated with an integration `token`
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(build_client(timeout, None)?, token))
    }

    /// Create an endpoint that sends requests through an existing client
    pub fn with_client(client: reqwest::Client, token: impl Into<String>) -> Self {
        Self {
            api: NotionApi::new(client, token.into()),
            filename: DEFAULT_FILENAME.to_string(),
        }
    }

    /// Point the endpoint at another host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.set_base_url(base_url.into());
        self
    }

    /// Filename reported to Notion for every import
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    fn uploads_url(&self) -> String {
        self.api.url("/v1/file_uploads")
    }
}

#[async_trait]
impl JobEndpoint for NotionUploadEndpoint {
    async fn start(&self, source_url: &str) -> Result<JobId> {
        let external_url = ensure_https(source_url)?;
        let body = json!({
            "mode": "external_url",
            "filename": self.filename,
            "external_url": external_url,
        });

        let response = self
            .api
            .authorized(self.api.client.post(self.uploads_url()))
            .json(&body)
            .send()
            .await?;
        let created: CreatedUpload = classify_response(response).await?.json().await?;

        let id = created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::malformed("file upload response has no id"))?;
        tracing::debug!(file_upload_id = %id, external_url = %external_url, "Created file upload");
        Ok(JobId(id))
    }

    async fn poll(&self, job_id: &JobId) -> Result<JobStatus> {
        let url = format!("{}/{}", self.uploads_url(), job_id);
        let response = self.api.authorized(self.api.client.get(url)).send().await?;
        let status: UploadStatus = classify_response(response).await?.json().await?;

        Ok(match status.status.as_str() {
            "uploaded" => JobStatus::Uploaded {
                handle: PermanentHandle(job_id.0.clone()),
            },
            "failed" | "expired" => {
                let reason = status
                    .file_import_result
                    .and_then(|r| r.error)
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| format!("file upload {}", status.status));
                JobStatus::Failed { reason }
            }
            other => {
                if other != "pending" {
                    tracing::debug!(file_upload_id = %job_id, status = other, "Unrecognized upload status");
                }
                JobStatus::Pending
            }
        })
    }
}

/// Rewrite `url` to use the https scheme, leaving everything else untouched
///
/// Scheme-relative URLs (`//host/path`) are accepted.
pub fn ensure_https(url: &str) -> Result<String> {
    let invalid = |e: url::ParseError| Error::PermanentRequest {
        status: None,
        message: format!("invalid source URL '{url}': {e}"),
    };

    let mut parsed = if url.starts_with("//") {
        Url::parse(&format!("https:{url}")).map_err(invalid)?
    } else {
        Url::parse(url).map_err(invalid)?
    };

    if parsed.scheme() != "https" && parsed.set_scheme("https").is_err() {
        return Err(Error::PermanentRequest {
            status: None,
            message: format!("cannot serve '{url}' over https"),
        });
    }
    Ok(parsed.to_string())
}

/// Page block that displays a completed upload as an image
pub fn image_block(handle: &PermanentHandle) -> Value {
    json!({
        "object": "block",
        "type": "image",
        "image": {
            "type": "file_upload",
            "file_upload": { "id": handle.0 },
        },
    })
}

/// Image blocks for every handle, in order
pub fn image_blocks<'a>(handles: impl IntoIterator<Item = &'a PermanentHandle>) -> Vec<Value> {
    handles.into_iter().map(image_block).collect()
}

/// Longest text Notion accepts in one rich-text object
const MAX_TEXT_LEN: usize = 2000;

const CALLOUT_EMOJI: &str = "\u{1f4dd}";

/// Database column names a note is written to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyNames {
    /// Title column
    pub title: String,
    /// Description text
    pub description: String,
    /// Link to the note
    pub link: String,
    /// Author nickname
    pub author: String,
    /// Author profile link
    pub author_url: String,
    /// Platform tags (multi-select)
    pub tags: String,
    /// Like count
    pub liked: String,
    /// Bookmark count
    pub collected: String,
    /// Video stream link
    pub video: String,
    /// Publication date
    pub published: String,
    /// Caller-supplied tags (multi-select)
    pub custom_tags: String,
    /// Caller-supplied remarks
    pub remarks: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            title: "笔记标题".into(),
            description: "描述or正文".into(),
            link: "笔记链接".into(),
            author: "作者".into(),
            author_url: "作者主页".into(),
            tags: "笔记标签".into(),
            liked: "点赞数".into(),
            collected: "收藏数".into(),
            video: "视频链接".into(),
            published: "发布时间".into(),
            custom_tags: "自定义标签".into(),
            remarks: "备注".into(),
        }
    }
}

/// How a note is laid out as a database page
#[derive(Clone, Debug, Default)]
pub struct ExportOptions {
    /// Column names of the target database
    pub names: PropertyNames,
    /// Extra tags, written only when non-empty
    pub custom_tags: Vec<String>,
    /// Free-form remarks, written only when present
    pub remarks: Option<String>,
}

/// A database page ready to be created
#[derive(Clone, Debug, PartialEq)]
pub struct PageDraft {
    /// Page properties keyed by column name
    pub properties: Map<String, Value>,
    /// Page body blocks, in display order
    pub children: Vec<Value>,
    /// External cover image
    pub cover_url: Option<String>,
}

impl PageDraft {
    /// Lay out `note` as a page showing the uploads behind `handles`
    ///
    /// Children are the description callout, one image block per handle in order, and an
    /// embed for the video. Optional properties are left out when the note lacks them.
    pub fn for_note<'a>(
        note: &Note,
        options: &ExportOptions,
        handles: impl IntoIterator<Item = &'a PermanentHandle>,
    ) -> Self {
        let names = &options.names;
        let mut properties = Map::new();
        properties.insert(names.title.clone(), json!({ "title": text_objects(&note.title) }));
        properties.insert(
            names.description.clone(),
            json!({ "rich_text": text_objects(&note.description) }),
        );
        properties.insert(names.link.clone(), url_property(&note.link));
        properties.insert(
            names.author.clone(),
            json!({ "rich_text": text_objects(&note.author) }),
        );
        properties.insert(names.tags.clone(), multi_select(&note.tags));
        properties.insert(names.liked.clone(), json!({ "number": note.liked_count }));
        properties.insert(names.collected.clone(), json!({ "number": note.collected_count }));

        if let Some(author_url) = &note.author_url {
            properties.insert(names.author_url.clone(), url_property(author_url));
        }
        if let Some(video_url) = &note.video_url {
            properties.insert(names.video.clone(), url_property(video_url));
        }
        if let Some(published_at) = note.published_at {
            properties.insert(
                names.published.clone(),
                json!({ "date": { "start": published_at.to_rfc3339() } }),
            );
        }
        if !options.custom_tags.is_empty() {
            properties.insert(names.custom_tags.clone(), multi_select(&options.custom_tags));
        }
        if let Some(remarks) = options.remarks.as_deref().filter(|r| !r.is_empty()) {
            properties.insert(names.remarks.clone(), json!({ "rich_text": text_objects(remarks) }));
        }

        let mut children = Vec::new();
        if !note.description.is_empty() {
            children.push(json!({
                "object": "block",
                "type": "callout",
                "callout": {
                    "rich_text": text_objects(&note.description),
                    "icon": { "type": "emoji", "emoji": CALLOUT_EMOJI },
                },
            }));
        }
        children.extend(image_blocks(handles));
        if let Some(video_url) = &note.video_url {
            children.push(json!({
                "object": "block",
                "type": "embed",
                "embed": { "url": video_url },
            }));
        }

        Self {
            properties,
            children,
            cover_url: note
                .cover_url
                .as_deref()
                .and_then(|url| ensure_https(url).ok()),
        }
    }

    fn body(&self, database_id: &str) -> Value {
        let mut body = json!({
            "parent": { "database_id": database_id },
            "properties": self.properties,
            "children": self.children,
        });
        if let Some(cover_url) = &self.cover_url {
            body["cover"] = json!({ "type": "external", "external": { "url": cover_url } });
        }
        body
    }
}

/// A page created in the database
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedPage {
    /// Page id
    pub id: String,
    /// Browser link, when Notion returned one
    pub url: Option<String>,
}

/// Outcome of [`NotionPageEndpoint::export_note`]
#[derive(Debug)]
pub struct NoteExport {
    /// The created page
    pub page: CreatedPage,
    /// Per-image upload outcomes; failed images are missing from the page
    pub uploads: BatchReport,
}

/// Creates pages in one Notion database
#[derive(Clone, Debug)]
pub struct NotionPageEndpoint {
    api: NotionApi,
    database_id: String,
}

impl NotionPageEndpoint {
    /// Create an endpoint writing to `database_id`, authenticated with `token`
    pub fn new(token: impl Into<String>, database_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(build_client(timeout, None)?, token, database_id))
    }

    /// Create an endpoint that sends requests through an existing client
    pub fn with_client(
        client: reqwest::Client,
        token: impl Into<String>,
        database_id: impl Into<String>,
    ) -> Self {
        Self {
            api: NotionApi::new(client, token.into()),
            database_id: database_id.into(),
        }
    }

    /// Point the endpoint at another host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.set_base_url(base_url.into());
        self
    }

    /// Create one page from `draft`
    pub async fn create_page(&self, draft: &PageDraft) -> Result<CreatedPage> {
        let response = self
            .api
            .authorized(self.api.client.post(self.api.url("/v1/pages")))
            .json(&draft.body(&self.database_id))
            .send()
            .await?;
        let created: CreatedPageBody = classify_response(response).await?.json().await?;

        let id = created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::malformed("page response has no id"))?;
        tracing::debug!(page_id = %id, blocks = draft.children.len(), "Created page");
        Ok(CreatedPage {
            id,
            url: created.url,
        })
    }

    /// Import the images of `note` through `poller`, then create its page
    ///
    /// Images that fail to import are left out of the page. Page creation runs under the
    /// poller's retry executor; its failure is the only error returned.
    pub async fn export_note(
        &self,
        poller: &AsyncJobPoller,
        note: &Note,
        options: &ExportOptions,
    ) -> Result<NoteExport> {
        let sources = note.image_sources();
        let uploads = poller.run_batch(&sources).await;
        if uploads.failed() > 0 {
            tracing::warn!(
                link = %note.link,
                failed = uploads.failed(),
                total = sources.len(),
                "Some images were not imported"
            );
        }

        let draft = PageDraft::for_note(note, options, uploads.handles());
        let page = poller.executor().execute(|| self.create_page(&draft)).await?;
        tracing::info!(
            page_id = %page.id,
            link = %note.link,
            images = uploads.succeeded(),
            "Exported note"
        );
        Ok(NoteExport { page, uploads })
    }
}

fn text_objects(content: &str) -> Vec<Value> {
    let chars: Vec<char> = content.chars().collect();
    chars
        .chunks(MAX_TEXT_LEN)
        .map(|chunk| {
            json!({
                "type": "text",
                "text": { "content": chunk.iter().collect::<String>() },
            })
        })
        .collect()
}

fn url_property(url: &str) -> Value {
    if url.is_empty() {
        json!({ "url": null })
    } else {
        json!({ "url": url })
    }
}

fn multi_select(names: &[String]) -> Value {
    let options: Vec<Value> = names.iter().map(|name| json!({ "name": name })).collect();
    json!({ "multi_select": options })
}
