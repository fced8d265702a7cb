//! The simplified-convention response: a status line, ordered header pairs and a [`Body`].

use crate::body::Body;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};

/// Ordered header name/value pairs, exactly as the handler produced them.
pub type Headers = Vec<(String, String)>;

#[derive(Debug)]
pub struct Response {
    pub status: String,
    pub headers: Headers,
    pub body: Body,
}

impl Response {
    pub fn new<S, B>(status: S, headers: Headers, body: B) -> Self
    where
        S: Into<String>,
        B: Into<Body>,
    {
        Self { status: status.into(), headers, body: body.into() }
    }

    /// A `text/plain` response.
    pub fn text<S, B>(status: S, body: B) -> Self
    where
        S: Into<String>,
        B: Into<Body>,
    {
        Self::new(status, vec![("Content-Type".to_string(), mime::TEXT_PLAIN.to_string())], body)
    }

    /// First value of the header `name`, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    pub fn into_parts(self) -> (String, Headers, Body) {
        (self.status, self.headers, self.body)
    }

    #[must_use]
    pub fn map_body<F>(self, f: F) -> Self
    where
        F: FnOnce(Body) -> Body,
    {
        Self { status: self.status, headers: self.headers, body: f(self.body) }
    }
}

impl From<(String, Headers, Body)> for Response {
    fn from((status, headers, body): (String, Headers, Body)) -> Self {
        Self { status, headers, body }
    }
}

pub fn header_value<'h>(headers: &'h Headers, name: &str) -> Option<&'h str> {
    headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
}

/// Drops every `Content-Length` header, leaving the others in order.
pub fn strip_content_length(headers: Headers) -> Headers {
    headers.into_iter().filter(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str())).collect()
}
