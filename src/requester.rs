use futures_util::stream::BoxStream;
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    /// The server answered with a non-success status.
    /// `message` is the `error` field of the JSON body if there was one.
    #[error("lichess responded with {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

impl RequestError {
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RequestError::Transport(Box::new(error))
    }
}

/// Lazy sequence of NDJSON lines. Each item is the raw bytes of one line
/// without its newline.
pub type LineStream = BoxStream<'static, Result<Vec<u8>, RequestError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    Json,
    NdJson,
    Text,
}

impl Accept {
    pub fn mime(&self) -> &'static str {
        match self {
            Accept::Json => "application/json",
            Accept::NdJson => "application/x-ndjson",
            Accept::Text => "text/plain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    Form(Vec<(String, String)>),
    Text(String),
}

/// A single Lichess API call, independent of the HTTP implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the base url, e.g. `/api/account`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Body,
    pub accept: Accept,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
            accept: Accept::Json,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Adds the parameter only if a value is given.
    pub fn query_opt<T: ToString>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn form_field<T: ToString>(mut self, key: &str, value: Option<T>) -> Self {
        let Some(value) = value else {
            return self;
        };
        let pair = (key.to_string(), value.to_string());
        match &mut self.body {
            Body::Form(fields) => fields.push(pair),
            _ => self.body = Body::Form(vec![pair]),
        }
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Body::Text(body.into());
        self
    }

    pub fn accept(mut self, accept: Accept) -> Self {
        self.accept = accept;
        self
    }

    pub fn ndjson(self) -> Self {
        self.accept(Accept::NdJson)
    }
}

/// Trait for sending and receiving requests.
/// Abstracts away the details of the request implementation,
/// so the client can run on top of reqwest or any other HTTP stack
/// (or a canned sequence of lines in tests).
pub trait Requester: Send + Sync + 'static {
    /// Sends the request and returns the whole response body.
    fn send(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<String, RequestError>> + Send;

    /// Opens a streaming request. The returned stream yields one item per line
    /// and ends when the server closes the connection.
    fn stream(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<LineStream, RequestError>> + Send;
}
