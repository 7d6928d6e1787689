use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use studio_core::{
    Metadata, MetadataField, MetadataPatch, OperationKind, RequestEncoding, ResponseKind,
};
use studio_logging::{studio_debug, studio_warn};
use url::Url;

use crate::{FailureKind, HealthStatus, OperationError, OperationJob, OperationOutput};

/// Response header naming the stable server-side file for a result.
pub const RESULT_FILENAME_HEADER: &str = "x-result-filename";
/// Response header carrying a fetchable URL for a result.
pub const RESULT_URL_HEADER: &str = "x-result-url";

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Base URL every operation endpoint is joined onto.
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_response_bytes: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5001/".to_string(),
            connect_timeout: Duration::from_secs(10),
            // Upscaling large images on CPU can take minutes.
            request_timeout: Duration::from_secs(600),
            max_response_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ServiceSettings {
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, OperationError> {
        let mut base = self.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base)
            .and_then(|base| base.join(endpoint))
            .map_err(|err| OperationError::new(FailureKind::InvalidUrl, err.to_string()))
    }
}

/// Remote side of every operation, plus the fetches the pipeline needs to
/// materialize sources.
#[async_trait::async_trait]
pub trait OperationClient: Send + Sync {
    async fn invoke(&self, job: OperationJob) -> Result<OperationOutput, OperationError>;

    /// Load the bytes behind a processed reference (remote URL or local file).
    async fn fetch_source(&self, reference: &str) -> Result<Bytes, OperationError>;

    /// Best-effort removal of derived outputs.
    async fn discard(&self, references: &[String]) -> Result<(), OperationError>;

    async fn health(&self) -> Result<HealthStatus, OperationError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestOperationClient {
    settings: ServiceSettings,
    work_dir: PathBuf,
    client: reqwest::Client,
}

impl ReqwestOperationClient {
    /// `work_dir` receives results the service returns without a URL.
    pub fn new(settings: ServiceSettings, work_dir: PathBuf) -> Result<Self, OperationError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| OperationError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            work_dir,
            client,
        })
    }

    async fn invoke_multipart(
        &self,
        url: Url,
        job: OperationJob,
    ) -> Result<OperationOutput, OperationError> {
        let spec = job.kind.spec();
        let part = Part::bytes(job.source.bytes.to_vec())
            .file_name(job.source.name.clone())
            .mime_str(&job.source.mime)
            .map_err(|err| OperationError::new(FailureKind::InvalidParams, err.to_string()))?;
        let mut form = Form::new().part("image", part);
        if let Some(action) = spec.action {
            form = form.text("action", action);
        }
        if matches!(job.kind, OperationKind::Upscale | OperationKind::Scale) {
            form = form.text("scale", job.params.effective_scale().to_string());
        }
        if let Some(provider) = &job.params.provider {
            form = form.text("provider", provider.clone());
        }
        if let Some(color) = &job.params.color {
            let payload = serde_json::json!({
                "target": color.target.to_hex(),
                "replacement": color.replacement.to_hex(),
                "tolerance": color.tolerance,
                "polygons": color.polygons,
            });
            form = form.text("color", payload.to_string());
        }

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response, self.settings.max_response_bytes).await?;

        let headers = response.headers().clone();
        let bytes = read_limited(response, self.settings.max_response_bytes).await?;
        if bytes.is_empty() {
            return Err(OperationError::new(
                FailureKind::MalformedResponse,
                "service returned an empty image",
            ));
        }
        let filename = header_value(&headers, RESULT_FILENAME_HEADER);
        let url = match header_value(&headers, RESULT_URL_HEADER) {
            Some(url) => url,
            None => self.materialize(&headers, &bytes).await?,
        };
        studio_debug!(
            "Item {} {} produced {} bytes at {}",
            job.item_id,
            job.kind,
            bytes.len(),
            url
        );
        Ok(OperationOutput::Image {
            url,
            filename,
            bytes: Some(bytes),
        })
    }

    async fn invoke_inline(
        &self,
        url: Url,
        job: OperationJob,
    ) -> Result<OperationOutput, OperationError> {
        let request = GenerationRequest {
            image: general_purpose::STANDARD.encode(&job.source.bytes),
            mime: job.source.mime.clone(),
            prompt: job.params.instruction.clone(),
            field: job.params.field.map(MetadataField::as_str),
            provider: job.params.provider.clone(),
        };
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response, self.settings.max_response_bytes).await?;
        let body = read_limited(response, self.settings.max_response_bytes).await?;
        let parsed: GenerationResponse = serde_json::from_slice(&body)
            .map_err(|err| OperationError::new(FailureKind::MalformedResponse, err.to_string()))?;
        parsed.into_output(job.kind.spec().response)
    }

    /// Write an unreferenced result into the work dir and return its path.
    async fn materialize(&self, headers: &HeaderMap, bytes: &Bytes) -> Result<String, OperationError> {
        let suffix = match header_value(headers, CONTENT_TYPE.as_str()).as_deref() {
            Some(ct) if ct.starts_with("image/jpeg") => ".jpg",
            Some(ct) if ct.starts_with("image/webp") => ".webp",
            _ => ".png",
        };
        let dir = self.work_dir.clone();
        let bytes = bytes.clone();
        let path = tokio::task::spawn_blocking(move || -> std::io::Result<PathBuf> {
            std::fs::create_dir_all(&dir)?;
            let mut file = tempfile::Builder::new()
                .prefix("result-")
                .suffix(suffix)
                .tempfile_in(&dir)?;
            std::io::Write::write_all(&mut file, &bytes)?;
            let (_, path) = file.keep().map_err(|err| err.error)?;
            Ok(path)
        })
        .await
        .map_err(|err| OperationError::new(FailureKind::Io, err.to_string()))?
        .map_err(|err| OperationError::new(FailureKind::Io, err.to_string()))?;
        Ok(path.to_string_lossy().into_owned())
    }
}

#[async_trait::async_trait]
impl OperationClient for ReqwestOperationClient {
    async fn invoke(&self, job: OperationJob) -> Result<OperationOutput, OperationError> {
        job.params
            .validate(job.kind)
            .map_err(|err| OperationError::new(FailureKind::InvalidParams, err.to_string()))?;
        let spec = job.kind.spec();
        let url = self.settings.endpoint_url(spec.endpoint)?;
        match spec.encoding {
            RequestEncoding::Multipart => self.invoke_multipart(url, job).await,
            RequestEncoding::InlineJson => self.invoke_inline(url, job).await,
        }
    }

    async fn fetch_source(&self, reference: &str) -> Result<Bytes, OperationError> {
        match Url::parse(reference) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(map_reqwest_error)?;
                let response = ensure_success(response, self.settings.max_response_bytes).await?;
                read_limited(response, self.settings.max_response_bytes).await
            }
            Ok(url) if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|()| {
                    OperationError::new(FailureKind::InvalidUrl, reference.to_string())
                })?;
                read_local(&path).await
            }
            Ok(url) if url.scheme() == "data" => Err(OperationError::new(
                FailureKind::InvalidUrl,
                "data URLs are not processed outputs",
            )),
            _ => read_local(Path::new(reference)).await,
        }
    }

    async fn discard(&self, references: &[String]) -> Result<(), OperationError> {
        let mut filenames = Vec::new();
        for reference in references {
            match Url::parse(reference) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    if let Some(name) = url
                        .path_segments()
                        .and_then(|mut segments| segments.next_back())
                        .filter(|name| !name.is_empty())
                    {
                        filenames.push(name.to_string());
                    }
                }
                Ok(url) if url.scheme() == "file" => {
                    if let Ok(path) = url.to_file_path() {
                        remove_local(&path).await;
                    }
                }
                Ok(url) if url.scheme() == "data" => {}
                _ => remove_local(Path::new(reference)).await,
            }
        }
        if filenames.is_empty() {
            return Ok(());
        }

        let url = self.settings.endpoint_url("cleanup")?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "filenames": filenames }))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        ensure_success(response, self.settings.max_response_bytes).await?;
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus, OperationError> {
        let url = self.settings.endpoint_url("health")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response, self.settings.max_response_bytes).await?;
        let body = read_limited(response, self.settings.max_response_bytes).await?;
        serde_json::from_slice(&body)
            .map_err(|err| OperationError::new(FailureKind::MalformedResponse, err.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct GenerationRequest {
    image: String,
    mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeneratedMetadata {
    brand: String,
    title: String,
    bullet1: String,
    bullet2: String,
    description: String,
    keywords: String,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    metadata: Option<GeneratedMetadata>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default, rename = "imageUrl")]
    image_url: Option<String>,
}

impl GenerationResponse {
    fn into_output(self, expected: ResponseKind) -> Result<OperationOutput, OperationError> {
        let malformed =
            |message: &str| OperationError::new(FailureKind::MalformedResponse, message.to_string());
        match expected {
            ResponseKind::GeneratedImage => {
                let url = self
                    .image_url
                    .filter(|url| !url.is_empty())
                    .ok_or_else(|| malformed("missing imageUrl"))?;
                let filename = Url::parse(&url).ok().and_then(|parsed| {
                    parsed
                        .path_segments()
                        .and_then(|mut segments| segments.next_back())
                        .map(str::to_owned)
                });
                Ok(OperationOutput::Image {
                    url,
                    filename,
                    bytes: None,
                })
            }
            ResponseKind::GeneratedMetadata => {
                if let Some(generated) = self.metadata {
                    return Ok(OperationOutput::Metadata(MetadataPatch::Full(Metadata {
                        brand: generated.brand,
                        title: generated.title,
                        bullet1: generated.bullet1,
                        bullet2: generated.bullet2,
                        description: generated.description,
                        keywords: generated.keywords,
                    })));
                }
                let field = self
                    .field
                    .as_deref()
                    .and_then(MetadataField::parse)
                    .ok_or_else(|| malformed("missing metadata or field"))?;
                let value = self.value.ok_or_else(|| malformed("missing field value"))?;
                Ok(OperationOutput::Metadata(MetadataPatch::Field { field, value }))
            }
            ResponseKind::ImageBytes => Err(malformed("unexpected JSON response")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Turn a non-2xx response into an error, preferring the JSON `error` field.
async fn ensure_success(
    response: reqwest::Response,
    max_bytes: u64,
) -> Result<reqwest::Response, OperationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match read_limited(response, max_bytes).await {
        Ok(body) => serde_json::from_slice::<ErrorBody>(&body)
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string()),
        Err(_) => status.to_string(),
    };
    Err(OperationError::new(
        FailureKind::HttpStatus(status.as_u16()),
        message,
    ))
}

async fn read_limited(response: reqwest::Response, max_bytes: u64) -> Result<Bytes, OperationError> {
    if let Some(content_len) = response.content_length() {
        if content_len > max_bytes {
            return Err(OperationError::new(
                FailureKind::TooLarge {
                    max_bytes,
                    actual: Some(content_len),
                },
                "response too large",
            ));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest_error)?;
        let next_len = bytes.len() as u64 + chunk.len() as u64;
        if next_len > max_bytes {
            return Err(OperationError::new(
                FailureKind::TooLarge {
                    max_bytes,
                    actual: Some(next_len),
                },
                "response too large",
            ));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(bytes))
}

async fn read_local(path: &Path) -> Result<Bytes, OperationError> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|err| OperationError::new(FailureKind::Io, format!("{}: {err}", path.display())))
}

async fn remove_local(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            studio_warn!("Failed to remove local output {}: {}", path.display(), err);
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn map_reqwest_error(err: reqwest::Error) -> OperationError {
    if err.is_timeout() {
        return OperationError::new(FailureKind::Timeout, err.to_string());
    }
    OperationError::new(FailureKind::Network, err.to_string())
}
