//! Turns a stream of NDJSON lines into dispatched events.

use crate::dispatcher::Dispatcher;
use crate::error::{DecodeError, LichessError};
use crate::event::{Event, EventContext, EventKind};
use crate::requester::RequestError;
use futures_util::{Stream, StreamExt};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Lines received from the transport.
    pub lines: u64,
    /// Lines that became an event and were handed to the dispatcher.
    pub dispatched: u64,
    pub decode_errors: u64,
    /// Valid lines that are not events of this stream's kind (e.g. TV position updates).
    pub skipped: u64,
}

/// How a stream ended.
#[derive(Debug, Clone)]
pub enum StreamOutcome {
    /// The server closed the stream.
    Closed(StreamStats),
    Cancelled(StreamStats),
    Failed {
        stats: StreamStats,
        error: Arc<LichessError>,
    },
}

impl StreamOutcome {
    pub fn stats(&self) -> StreamStats {
        match self {
            StreamOutcome::Closed(stats) | StreamOutcome::Cancelled(stats) => *stats,
            StreamOutcome::Failed { stats, .. } => *stats,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamOutcome::Cancelled(_))
    }
}

/// Decodes one line. Invalid UTF-8 is a decode error like any other malformed JSON.
pub fn decode_line(line: &[u8]) -> Result<Value, DecodeError> {
    serde_json::from_slice(line).map_err(|source| DecodeError {
        line: String::from_utf8_lossy(line).into_owned(),
        source,
    })
}

/// Which decoded lines of a stream count as events.
#[derive(Debug, Clone)]
enum Admission {
    All,
    /// TV feed: only `featured` messages announce a new game, `fen` messages are positions.
    Featured,
    /// Game move stream: the server first replays the game, moves are
    /// delivered once the replay reached the game's `lastMove`.
    AfterLastMove {
        last_move: Option<String>,
        caught_up: bool,
    },
}

impl Admission {
    fn for_kind(kind: EventKind) -> Self {
        match kind {
            EventKind::NewTvGame => Admission::Featured,
            EventKind::GameMove => Admission::AfterLastMove {
                last_move: None,
                caught_up: false,
            },
            _ => Admission::All,
        }
    }

    fn admit(&mut self, payload: &Value) -> bool {
        match self {
            Admission::All => true,
            Admission::Featured => {
                payload.get("t").and_then(Value::as_str) == Some("featured")
                    || payload.get("d").and_then(|d| d.get("id")).is_some()
            }
            Admission::AfterLastMove {
                last_move,
                caught_up,
            } => {
                if payload.get("id").is_some() {
                    // Game description, sent first.
                    *last_move = payload
                        .get("lastMove")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    *caught_up = last_move.is_none();
                    return false;
                }
                let Some(lm) = payload.get("lm").and_then(Value::as_str) else {
                    return false;
                };
                if *caught_up {
                    return true;
                }
                if last_move.as_deref() == Some(lm) {
                    *caught_up = true;
                }
                false
            }
        }
    }
}

/// Reads one stream and forwards its events to a [`Dispatcher`].
pub struct Consumer {
    kind: EventKind,
    context: EventContext,
    dispatcher: Arc<Dispatcher>,
    admission: Admission,
    stats: StreamStats,
}

impl Consumer {
    pub fn new(kind: EventKind, context: EventContext, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            kind,
            context,
            dispatcher,
            admission: Admission::for_kind(kind),
            stats: StreamStats::default(),
        }
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Consumes `lines` until the stream ends, fails or `cancel` turns true.
    ///
    /// Dropping the sender side of `cancel` counts as cancellation.
    pub async fn run<S>(mut self, lines: S, mut cancel: watch::Receiver<bool>) -> StreamOutcome
    where
        S: Stream<Item = Result<Vec<u8>, RequestError>> + Send,
    {
        let mut lines = std::pin::pin!(lines);
        info!("consuming {} stream {:?}", self.kind, self.context);

        let outcome = loop {
            if *cancel.borrow() {
                break StreamOutcome::Cancelled(self.stats);
            }

            let next = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break StreamOutcome::Cancelled(self.stats),
                next = lines.next() => next,
            };

            match next {
                None => break StreamOutcome::Closed(self.stats),
                Some(Err(e)) => {
                    error!("{} stream failed: {}", self.kind, e);
                    let error = LichessError::from(e);
                    self.dispatcher.report(&error);
                    break StreamOutcome::Failed {
                        stats: self.stats,
                        error: Arc::new(error),
                    };
                }
                Some(Ok(line)) => {
                    self.handle_line(&line, &cancel);
                }
            }
        };

        info!("{} stream ended: {:?}", self.kind, outcome);
        outcome
    }

    /// Ends the stream with `error`, e.g. when it could not be opened.
    pub fn fail(self, error: LichessError) -> StreamOutcome {
        self.dispatcher.report(&error);
        StreamOutcome::Failed {
            stats: self.stats,
            error: Arc::new(error),
        }
    }

    /// Decodes and dispatches a single line. Returns the number of handlers invoked.
    pub fn handle_line(&mut self, line: &[u8], cancel: &watch::Receiver<bool>) -> usize {
        self.stats.lines += 1;

        let payload = match decode_line(line) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{}", e);
                self.stats.decode_errors += 1;
                self.dispatcher.report(&LichessError::Decode(e));
                return 0;
            }
        };

        if !self.admission.admit(&payload) {
            self.stats.skipped += 1;
            return 0;
        }

        let event = Event::new(self.kind, self.context.clone(), payload);
        self.stats.dispatched += 1;
        let invoked = self.dispatcher.dispatch_while(&event, || !*cancel.borrow());
        debug!("{} event dispatched to {} handler(s)", self.kind, invoked);
        invoked
    }
}

pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // An error means every sender is gone, which also ends the stream.
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}
