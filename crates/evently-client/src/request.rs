//! Replayable request descriptions.
//!
//! A 401 can force a request to be re-sent after the token refresh, so the
//! request must outlive its first attempt. [`RequestDescriptor`] captures
//! method, path, query, and body up front and builds a fresh `reqwest`
//! request for every attempt; bearer injection happens at build time, so a
//! replay automatically picks up the rotated token.

use reqwest::{Client, Method, RequestBuilder, multipart};
use serde::Serialize;
use url::Url;

use crate::error::{Error, Result};

/// Body shapes the API uses.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// A JSON document.
    Json(serde_json::Value),
    /// Multipart form data, rebuilt part by part on every attempt.
    Multipart(Vec<Part>),
}

/// One part of a multipart form.
#[derive(Debug, Clone)]
pub enum Part {
    /// A plain text field.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// A file upload.
    File {
        /// Field name.
        name: String,
        /// File name reported to the server.
        file_name: String,
        /// MIME type of the content.
        mime_type: String,
        /// Raw content.
        bytes: Vec<u8>,
    },
}

impl Part {
    /// A plain text field.
    #[must_use]
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    /// A file upload.
    #[must_use]
    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self::File {
            name: name.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

/// A request captured in a replayable form.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the configured base URL.
    pub path: String,
    /// Query string pairs.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: RequestBody,
}

impl RequestDescriptor {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// A GET request for `path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A POST request for `path`.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// A PATCH request for `path`.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// A DELETE request for `path`.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append one query pair.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Use a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] when `body` cannot be serialized.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Use a multipart body.
    #[must_use]
    pub fn multipart(mut self, parts: Vec<Part>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    /// Build a fresh `reqwest` request for this descriptor.
    ///
    /// Sets the `Authorization: Bearer` header when a token is present;
    /// token attachment itself never fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a multipart part carries an invalid
    /// MIME type.
    pub fn build(&self, http: &Client, url: Url, token: Option<&str>) -> Result<RequestBuilder> {
        let mut builder = http.request(self.method.clone(), url);
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        builder = match &self.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }
}

fn build_form(parts: &[Part]) -> Result<multipart::Form> {
    let mut form = multipart::Form::new();
    for part in parts {
        form = match part {
            Part::Text { name, value } => form.text(name.clone(), value.clone()),
            Part::File {
                name,
                file_name,
                mime_type,
                bytes,
            } => {
                let part = multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime_type)
                    .map_err(|_| Error::Config(format!("invalid MIME type: {mime_type}")))?;
                form.part(name.clone(), part)
            }
        };
    }
    Ok(form)
}
