use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Category of server update, implied by the stream it arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// A line of a board or bot game stream (`gameFull`, `gameState`, `chatLine`, ...).
    NewGameState,
    /// A game started or finished among a pool of users.
    GameStatusChange,
    /// An incoming event of the logged in user (challenges, game start/finish).
    NewEvent,
    /// A new game is featured on Lichess TV.
    NewTvGame,
    /// A move was played in a watched game.
    GameMove,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::NewGameState => "new-game-state",
            EventKind::GameStatusChange => "game-status-change",
            EventKind::NewEvent => "new-event",
            EventKind::NewTvGame => "new-tv-game",
            EventKind::GameMove => "game-move",
        };
        f.write_str(name)
    }
}

/// Where an event came from: the parameters of the stream that delivered it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    pub game_id: Option<String>,
    pub users: Option<BTreeSet<String>>,
}

impl EventContext {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn game(game_id: impl Into<String>) -> Self {
        Self {
            game_id: Some(game_id.into()),
            users: None,
        }
    }

    pub fn users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            game_id: None,
            users: Some(normalize_users(users)),
        }
    }
}

/// Lichess user ids are case insensitive.
pub fn normalize_users<I, S>(users: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    users
        .into_iter()
        .map(|user| user.as_ref().trim().to_lowercase())
        .filter(|user| !user.is_empty())
        .collect()
}

/// One decoded stream line.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: EventKind,
    context: EventContext,
    payload: Value,
}

impl Event {
    pub fn new(kind: EventKind, context: EventContext, payload: Value) -> Self {
        Self {
            kind,
            context,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// The `type` field of the payload, e.g. `gameState` or `challenge`.
    pub fn event_type(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }

    /// The game this event belongs to.
    ///
    /// Game streams know their game up front. For other streams the id is
    /// looked up in the payload (`id`, `gameId`, `game.id` or the TV feed's `d.id`).
    pub fn game_id(&self) -> Option<&str> {
        if let Some(id) = &self.context.game_id {
            return Some(id);
        }
        let payload = &self.payload;
        payload
            .get("id")
            .or_else(|| payload.get("gameId"))
            .or_else(|| payload.get("game").and_then(|game| game.get("id")))
            .or_else(|| payload.get("d").and_then(|d| d.get("id")))
            .and_then(Value::as_str)
    }

    /// The user pool of the stream, for game status streams.
    pub fn users(&self) -> Option<&BTreeSet<String>> {
        self.context.users.as_ref()
    }

    /// Typed view of the payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Decides whether a handler is interested in an event.
#[derive(Clone, Default)]
pub enum Filter {
    #[default]
    Any,
    GameId(String),
    /// Matches events of streams over exactly this set of users.
    Users(BTreeSet<String>),
    Predicate(Arc<dyn Fn(&Event) -> bool + Send + Sync>),
}

impl Filter {
    pub fn game(game_id: impl Into<String>) -> Self {
        Filter::GameId(game_id.into())
    }

    pub fn users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Filter::Users(normalize_users(users))
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        Filter::Predicate(Arc::new(predicate))
    }

    pub fn accepts(&self, event: &Event) -> bool {
        match self {
            Filter::Any => true,
            Filter::GameId(id) => event.game_id() == Some(id.as_str()),
            Filter::Users(users) => event.users() == Some(users),
            Filter::Predicate(predicate) => predicate(event),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Any => write!(f, "Any"),
            Filter::GameId(id) => f.debug_tuple("GameId").field(id).finish(),
            Filter::Users(users) => f.debug_tuple("Users").field(users).finish(),
            Filter::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}
