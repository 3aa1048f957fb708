//! HTTP transport: request shapes and the blocking reqwest implementation.

use std::io::Read;

use tracing::debug;

use crate::attachment::Attachment;
use crate::config::ClientConfig;
use crate::errors::PlaylabError;

/// HTTP method used by the Playlab endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// How structured request bodies are encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BodyEncoding {
    /// `application/json`.
    #[default]
    Json,
    /// `application/x-www-form-urlencoded`, nested keys joined with dots.
    Form,
}

/// Request payload.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    /// `multipart/form-data` with text fields and one file part named `file`.
    Multipart {
        fields: Vec<(String, String)>,
        file: Attachment,
    },
}

impl RequestBody {
    /// Encodes a JSON value with the requested encoding.
    pub fn encoded(value: serde_json::Value, encoding: BodyEncoding) -> Self {
        match encoding {
            BodyEncoding::Json => Self::Json(value),
            BodyEncoding::Form => Self::Form(form_fields(&value)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Json(_) => "json",
            Self::Form(_) => "form",
            Self::Multipart { .. } => "multipart",
        }
    }
}

/// A request against the API root, e.g. `projects/{id}/conversations`.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post(path: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body,
        }
    }
}

/// A successful (2xx) response whose body has not been read yet.
pub struct HttpResponse {
    pub status: u16,
    /// Body bytes as they arrive; read errors are transfer failures.
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// Drains the body into a string.
    pub fn text(mut self) -> Result<String, PlaylabError> {
        let mut bytes = Vec::new();
        self.body.read_to_end(&mut bytes).map_err(|e| PlaylabError::Api {
            message: format!("failed to read response body: {e}"),
            status: Some(self.status),
            body: None,
            partial: None,
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Drains the body and decodes it as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, PlaylabError> {
        let status = self.status;
        let text = self.text()?;
        serde_json::from_str(&text).map_err(|e| PlaylabError::Api {
            message: format!("unexpected response shape: {e}"),
            status: Some(status),
            body: Some(text),
            partial: None,
        })
    }
}

/// Issues API requests. Implementations return `Ok` only for 2xx responses and
/// map everything else to a [`PlaylabError`].
pub trait Transport: Send + Sync {
    fn execute(&self, request: &ApiRequest) -> Result<HttpResponse, PlaylabError>;
}

/// Flattens a JSON object into form fields with dotted keys.
///
/// `{"input": {"message": "hi"}}` becomes `input.message=hi`. Strings are
/// sent verbatim, other scalars in their JSON form, and `null` is skipped.
pub fn form_fields(value: &serde_json::Value) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    push_form_fields(&mut fields, None, value);
    fields
}

fn push_form_fields(
    fields: &mut Vec<(String, String)>,
    prefix: Option<&str>,
    value: &serde_json::Value,
) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                let key = match prefix {
                    Some(prefix) => format!("{prefix}.{key}"),
                    None => key.clone(),
                };
                push_form_fields(fields, Some(&key), value);
            }
        }
        serde_json::Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                let key = match prefix {
                    Some(prefix) => format!("{prefix}.{idx}"),
                    None => idx.to_string(),
                };
                push_form_fields(fields, Some(&key), item);
            }
        }
        serde_json::Value::Null => {}
        serde_json::Value::String(s) => {
            if let Some(prefix) = prefix {
                fields.push((prefix.to_string(), s.clone()));
            }
        }
        scalar => {
            if let Some(prefix) = prefix {
                fields.push((prefix.to_string(), scalar.to_string()));
            }
        }
    }
}

/// Default transport over a blocking reqwest client.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl ReqwestTransport {
    /// Builds a client with the config's base URL, key and timeout.
    pub fn new(config: &ClientConfig) -> Result<Self, PlaylabError> {
        config.validate()?;
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("playlab-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlaylabError::api(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.url(""),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &ApiRequest) -> Result<HttpResponse, PlaylabError> {
        let url = self.url(&request.path);
        debug!(
            event = "http.request_started",
            domain = "http",
            method = request.method.as_str(),
            path = %request.path,
            body_kind = request.body.kind()
        );

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .bearer_auth(&self.api_key);

        let builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Multipart { fields, file } => {
                let mut form = reqwest::blocking::multipart::Form::new();
                for (key, value) in fields {
                    form = form.text(key.clone(), value.clone());
                }
                let part = reqwest::blocking::multipart::Part::bytes(file.bytes.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.mime_type)
                    .map_err(|e| {
                        PlaylabError::Validation(format!(
                            "invalid MIME type {} for {}: {e}",
                            file.mime_type, file.file_name
                        ))
                    })?;
                builder.multipart(form.part("file", part))
            }
        };

        let response = builder.send().map_err(|e| {
            debug!(event = "http.request_failed", domain = "http", path = %request.path, error = %e);
            PlaylabError::api(format!("request failed: {e}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            debug!(
                event = "http.request_rejected",
                domain = "http",
                path = %request.path,
                status = status.as_u16(),
                body_len = body.len() as u64
            );
            return Err(PlaylabError::from_status(status.as_u16(), &body));
        }

        debug!(
            event = "http.response_headers",
            domain = "http",
            path = %request.path,
            status = status.as_u16()
        );
        Ok(HttpResponse {
            status: status.as_u16(),
            body: Box::new(response),
        })
    }
}
