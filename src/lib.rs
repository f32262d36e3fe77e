pub mod bot;
pub mod client;
pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod models;
pub mod ndjson;
pub mod params;
pub mod requester;
pub mod subscription;

#[cfg(feature = "board")]
pub mod board;
#[cfg(feature = "reqwest")]
pub mod request;

pub use bot::Bot;
pub use client::{Client, GameApi, Listener, StreamKey};
pub use config::ClientConfig;
pub use consumer::{StreamOutcome, StreamStats};
pub use dispatcher::{Dispatcher, HandlerId};
pub use error::{DecodeError, LichessError, Result};
pub use event::{Event, EventContext, EventKind, Filter};
pub use requester::{ApiRequest, RequestError, Requester};
pub use subscription::Subscription;

#[cfg(feature = "reqwest")]
pub use request::Request;
