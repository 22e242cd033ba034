use std::collections::HashMap;

use serde::Serialize;
use upqueue_protocol::RawResponse;

use crate::ResponseError;
use crate::headers::{header, parse_headers};
use crate::markup::{Element, Node, parse_html, parse_xml};

/// How a body is decoded, derived from its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Xml,
    Json,
    /// Anything else, including a missing header: the body is kept as text.
    Raw,
}

impl ContentKind {
    /// Classifies a `Content-Type` value.
    ///
    /// The value is split on `;` and each part compared (trimmed, ignoring
    /// case) against the known media types, so parameters such as
    /// `charset=utf-8` do not interfere.
    pub fn from_content_type(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::Raw;
        };
        let parts: Vec<String> = value
            .split(';')
            .map(|p| p.trim().to_ascii_lowercase())
            .collect();
        let has = |media: &str| parts.iter().any(|p| p == media);

        if has("text/html") {
            Self::Html
        } else if has("text/xml") {
            Self::Xml
        } else if has("application/json")
            || has("text/javascript")
            || has("application/javascript")
        {
            Self::Json
        } else {
            Self::Raw
        }
    }
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Body {
    Raw(String),
    Json(serde_json::Value),
    Html(Vec<Node>),
    Xml(Element),
}

impl Body {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Body::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Body::Raw(s) => Some(s),
            _ => None,
        }
    }
}

/// Structured result of a finished upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResponse {
    pub status: u16,
    pub body: Body,
    pub headers: HashMap<String, String>,
}

impl UploadResponse {
    /// Header value by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }
}

/// Parses a raw transport response.
///
/// The body is trimmed, then decoded as HTML, XML or JSON depending on the
/// declared content type; any other type leaves it as text. Fails only when
/// an XML or JSON body does not parse.
pub fn parse_response(raw: &RawResponse) -> Result<UploadResponse, ResponseError> {
    let text = raw.response.trim();
    let headers = parse_headers(&raw.response_headers);

    let body = match ContentKind::from_content_type(header(&headers, "Content-Type")) {
        ContentKind::Html => Body::Html(parse_html(text)),
        ContentKind::Xml => Body::Xml(parse_xml(text)?),
        ContentKind::Json => Body::Json(serde_json::from_str(text)?),
        ContentKind::Raw => Body::Raw(text.to_string()),
    };

    Ok(UploadResponse {
        status: raw.status,
        body,
        headers,
    })
}
