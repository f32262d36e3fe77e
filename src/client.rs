use crate::consumer::{decode_line, Consumer};
use crate::dispatcher::{Dispatcher, HandlerId};
use crate::error::{LichessError, Result};
use crate::event::{normalize_users, Event, EventContext, EventKind, Filter};
use crate::models::{ChatLine, OkResponse, Player, UserStatus};
use crate::params::{check_range, ChallengeOptions, ChatRoom, DeclineReason, SeekOptions};
use crate::requester::{Accept, ApiRequest, Requester};
use crate::subscription::Subscription;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Which family of game endpoints a client plays through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameApi {
    /// `/api/board/...`, for user accounts.
    Board,
    /// `/api/bot/...`, for BOT accounts.
    Bot,
}

impl GameApi {
    fn prefix(&self) -> &'static str {
        match self {
            GameApi::Board => "/api/board",
            GameApi::Bot => "/api/bot",
        }
    }
}

/// Identity of one server stream. At most one stream is open per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKey {
    GameState(String),
    GameMoves(String),
    /// Keyed by the user pool only, `withCurrentGames` applies when the stream is opened.
    GamesByUsers(BTreeSet<String>),
    IncomingEvents,
    TvFeed,
}

impl StreamKey {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamKey::GameState(_) => EventKind::NewGameState,
            StreamKey::GameMoves(_) => EventKind::GameMove,
            StreamKey::GamesByUsers(_) => EventKind::GameStatusChange,
            StreamKey::IncomingEvents => EventKind::NewEvent,
            StreamKey::TvFeed => EventKind::NewTvGame,
        }
    }

    pub fn context(&self) -> EventContext {
        match self {
            StreamKey::GameState(id) | StreamKey::GameMoves(id) => EventContext::game(id.clone()),
            StreamKey::GamesByUsers(users) => EventContext {
                game_id: None,
                users: Some(users.clone()),
            },
            StreamKey::IncomingEvents | StreamKey::TvFeed => EventContext::global(),
        }
    }
}

/// A registered handler and the stream feeding it.
///
/// If `stream` ends, the handler stays registered and is fed by the next
/// stream opened for the same key.
#[derive(Debug, Clone)]
pub struct Listener {
    pub handler: HandlerId,
    pub stream: Subscription,
}

struct ActiveStream {
    subscription: Subscription,
    handlers: Vec<HandlerId>,
}

/// Lichess API client.
///
/// The `on_*` methods register a handler and open the matching event stream
/// on the current tokio runtime. A second handler for the same stream shares
/// the open connection; it only sees lines that arrive after it was registered.
pub struct Client<R: Requester> {
    requester: Arc<R>,
    dispatcher: Arc<Dispatcher>,
    streams: Mutex<HashMap<StreamKey, ActiveStream>>,
    game_api: GameApi,
}

impl<R: Requester> Client<R> {
    pub fn new(requester: R) -> Self {
        Self::with_game_api(requester, GameApi::Board)
    }

    pub fn with_game_api(requester: R, game_api: GameApi) -> Self {
        Self {
            requester: Arc::new(requester),
            dispatcher: Arc::new(Dispatcher::new()),
            streams: Mutex::new(HashMap::new()),
            game_api,
        }
    }

    /// Creates the client and checks the account behind the token.
    /// BOT accounts should use [`crate::Bot`] instead, this only warns about it.
    pub async fn connect(requester: R) -> Result<Self> {
        let client = Self::new(requester);
        match client.get_profile().await {
            Ok(profile) if profile.is_bot() => warn!(
                "{} is a BOT account, it is advisable to use Bot instead of Client",
                profile.username
            ),
            Ok(profile) => info!("connected as {}", profile.username),
            Err(e) => debug!("no profile available, only public endpoints can be used: {}", e),
        }
        Ok(client)
    }

    pub fn game_api(&self) -> GameApi {
        self.game_api
    }

    pub fn requester(&self) -> &R {
        &self.requester
    }

    /// The registration table, for handlers with custom filters.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    fn streams(&self) -> std::sync::MutexGuard<'_, HashMap<StreamKey, ActiveStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn game_path(&self, game_id: &str, action: &str) -> String {
        format!("{}/game/{}/{}", self.game_api.prefix(), game_id, action)
    }

    // Event streams with handlers.

    fn listen<F>(&self, key: StreamKey, filter: Filter, request: ApiRequest, callback: F) -> Result<Listener>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        tokio::runtime::Handle::try_current().map_err(|_| LichessError::NoRuntime)?;

        let mut streams = self.streams();
        let handler = self.dispatcher.register(key.kind(), filter, callback);

        if let Some(active) = streams.get_mut(&key) {
            if !active.subscription.is_finished() && !active.subscription.is_cancelled() {
                debug!("{} joins the open stream {:?}", handler, key);
                active.handlers.push(handler);
                return Ok(Listener {
                    handler,
                    stream: active.subscription.clone(),
                });
            }
        }

        let consumer = Consumer::new(key.kind(), key.context(), self.dispatcher.clone());
        let subscription = match Subscription::spawn(self.requester.clone(), request.ndjson(), consumer) {
            Ok(subscription) => subscription,
            Err(e) => {
                self.dispatcher.unregister(handler);
                return Err(e);
            }
        };

        // Handlers of a finished stream stay registered and move to the new one.
        let mut handlers: Vec<HandlerId> = streams
            .remove(&key)
            .map(|previous| previous.handlers)
            .unwrap_or_default()
            .into_iter()
            .filter(|id| self.dispatcher.contains(*id))
            .collect();
        handlers.push(handler);
        streams.insert(
            key,
            ActiveStream {
                subscription: subscription.clone(),
                handlers,
            },
        );

        Ok(Listener {
            handler,
            stream: subscription,
        })
    }

    /// Called for every new state of a game being played. The first state is always `gameFull`.
    pub fn on_new_game_state<F>(&self, game_id: &str, callback: F) -> Result<Listener>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listen(
            StreamKey::GameState(game_id.to_string()),
            Filter::game(game_id),
            ApiRequest::get(format!("{}/game/stream/{}", self.game_api.prefix(), game_id)),
            callback,
        )
    }

    /// Called when a game starts or finishes among the pool of users.
    pub fn on_game_status_change<I, S, F>(
        &self,
        user_ids: I,
        with_current_games: Option<bool>,
        callback: F,
    ) -> Result<Listener>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let users = normalize_users(user_ids);
        if users.is_empty() {
            return Err(LichessError::InvalidArgument(
                "at least one user id is required".to_string(),
            ));
        }
        let request = games_by_users(&users, with_current_games);
        self.listen(
            StreamKey::GamesByUsers(users.clone()),
            Filter::Users(users),
            request,
            callback,
        )
    }

    /// Called for every incoming event of the logged in user.
    /// When the stream opens, all current challenges and games are sent.
    pub fn on_new_event<F>(&self, callback: F) -> Result<Listener>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listen(
            StreamKey::IncomingEvents,
            Filter::Any,
            ApiRequest::get("/api/stream/event"),
            callback,
        )
    }

    /// Called when a new game is featured on Lichess TV.
    pub fn on_new_tv_game<F>(&self, callback: F) -> Result<Listener>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listen(StreamKey::TvFeed, Filter::Any, ApiRequest::get("/api/tv/feed"), callback)
    }

    /// Called for every move played in a game from now on.
    pub fn on_game_move<F>(&self, game_id: &str, callback: F) -> Result<Listener>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listen(
            StreamKey::GameMoves(game_id.to_string()),
            Filter::game(game_id),
            ApiRequest::get(format!("/api/stream/game/{}", game_id)),
            callback,
        )
    }

    /// Called for undecodable lines and failed streams.
    pub fn on_stream_error<F>(&self, callback: F)
    where
        F: Fn(&LichessError) + Send + Sync + 'static,
    {
        self.dispatcher.on_error(callback);
    }

    /// Removes a handler. The stream is closed when its last handler is removed.
    pub fn remove_handler(&self, handler: HandlerId) -> bool {
        let removed = self.dispatcher.unregister(handler);

        let mut streams = self.streams();
        let emptied = streams.iter_mut().find_map(|(key, active)| {
            let pos = active.handlers.iter().position(|h| *h == handler)?;
            active.handlers.remove(pos);
            active.handlers.is_empty().then(|| key.clone())
        });
        if let Some(key) = emptied {
            if let Some(active) = streams.remove(&key) {
                info!("closing {:?}, no handlers left", key);
                active.subscription.cancel();
            }
        }
        removed
    }

    /// Streams that are still running.
    pub fn active_streams(&self) -> Vec<StreamKey> {
        self.streams()
            .iter()
            .filter(|(_, active)| !active.subscription.is_finished())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Cancels every stream and removes their handlers.
    pub fn close(&self) {
        let streams: Vec<_> = self.streams().drain().collect();
        for (key, active) in streams {
            debug!("cancelling {:?}", key);
            active.subscription.cancel();
            for handler in active.handlers {
                self.dispatcher.unregister(handler);
            }
        }
    }

    // Raw streams.

    /// Opens any NDJSON endpoint. Undecodable lines are yielded as
    /// [`LichessError::Decode`] items and the stream goes on.
    pub async fn stream_json(&self, request: ApiRequest) -> Result<BoxStream<'static, Result<Value>>> {
        let lines = self.requester.stream(request.ndjson()).await?;
        Ok(lines
            .map(|line| -> Result<Value> {
                let line = line?;
                Ok(decode_line(&line)?)
            })
            .boxed())
    }

    pub async fn stream_incoming_events(&self) -> Result<BoxStream<'static, Result<Value>>> {
        self.stream_json(ApiRequest::get("/api/stream/event")).await
    }

    pub async fn stream_board_state(&self, game_id: &str) -> Result<BoxStream<'static, Result<Value>>> {
        self.stream_json(ApiRequest::get(format!(
            "{}/game/stream/{}",
            self.game_api.prefix(),
            game_id
        )))
        .await
    }

    pub async fn stream_games_among_users<I, S>(
        &self,
        user_ids: I,
        with_current_games: Option<bool>,
    ) -> Result<BoxStream<'static, Result<Value>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let users = normalize_users(user_ids);
        self.stream_json(games_by_users(&users, with_current_games)).await
    }

    /// Outputs the given games, then one line each time one of them starts or finishes.
    /// `stream_id` can later be used with [`Client::add_games_to_stream`].
    pub async fn stream_games(
        &self,
        stream_id: &str,
        game_ids: &[&str],
    ) -> Result<BoxStream<'static, Result<Value>>> {
        self.stream_json(ApiRequest::post(format!("/api/stream/games/{}", stream_id)).text(game_ids.join(",")))
            .await
    }

    pub async fn stream_tv_game(&self) -> Result<BoxStream<'static, Result<Value>>> {
        self.stream_json(ApiRequest::get("/api/tv/feed")).await
    }

    pub async fn stream_game_moves(&self, game_id: &str) -> Result<BoxStream<'static, Result<Value>>> {
        self.stream_json(ApiRequest::get(format!("/api/stream/game/{}", game_id)))
            .await
    }

    pub async fn get_online_bots(&self, limit: Option<u32>) -> Result<BoxStream<'static, Result<Player>>> {
        let lines = self
            .stream_json(ApiRequest::get("/api/bot/online").query_opt("nb", limit))
            .await?;
        Ok(lines
            .map(|value| -> Result<Player> { Ok(serde_json::from_value(value?)?) })
            .boxed())
    }

    // One-shot requests.

    async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let body = self.requester.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_ok(&self, request: ApiRequest) -> Result<bool> {
        let response: OkResponse = self.send_json(request).await?;
        Ok(response.ok)
    }

    async fn field<T: DeserializeOwned>(&self, request: ApiRequest, name: &str) -> Result<T> {
        let mut value: Value = self.send_json(request).await?;
        let field = value
            .get_mut(name)
            .map(Value::take)
            .ok_or_else(|| LichessError::UnexpectedResponse(format!("missing field {:?}", name)))?;
        Ok(serde_json::from_value(field)?)
    }

    /// Public information about the logged in user.
    pub async fn get_profile(&self) -> Result<Player> {
        self.send_json(ApiRequest::get("/api/account")).await
    }

    pub async fn get_email_address(&self) -> Result<String> {
        self.field(ApiRequest::get("/api/account/email"), "email").await
    }

    pub async fn get_kid_mode_status(&self) -> Result<bool> {
        self.field(ApiRequest::get("/api/account/kid"), "kid").await
    }

    pub async fn set_kid_mode_status(&self, value: bool) -> Result<bool> {
        self.send_ok(ApiRequest::post("/api/account/kid").query("v", value))
            .await
    }

    pub async fn get_preferences(&self) -> Result<Value> {
        self.send_json(ApiRequest::get("/api/account/preferences")).await
    }

    /// Ongoing games of the logged in user, most urgent first. `limit` must be in 1..=50.
    pub async fn get_ongoing_games(&self, limit: Option<u32>) -> Result<Vec<Value>> {
        check_range("limit", limit, 1..=50)?;
        self.field(
            ApiRequest::get("/api/account/playing").query_opt("nb", limit),
            "nowPlaying",
        )
        .await
    }

    pub async fn get_user(&self, username: &str, with_trophies: Option<bool>) -> Result<Player> {
        self.send_json(ApiRequest::get(format!("/api/user/{}", username)).query_opt("trophies", with_trophies))
            .await
    }

    pub async fn get_users(&self, user_ids: &[&str]) -> Result<Vec<Player>> {
        if user_ids.len() > 300 {
            return Err(LichessError::InvalidArgument(
                "at most 300 users can be fetched at once".to_string(),
            ));
        }
        let ids: Vec<String> = user_ids.iter().map(|id| id.to_lowercase()).collect();
        self.send_json(ApiRequest::post("/api/users").text(ids.join(",")))
            .await
    }

    pub async fn get_user_statuses(&self, user_ids: &[&str], with_game_ids: Option<bool>) -> Result<Vec<UserStatus>> {
        let ids: Vec<String> = user_ids.iter().map(|id| id.to_lowercase()).collect();
        self.send_json(
            ApiRequest::get("/api/users/status")
                .query("ids", ids.join(","))
                .query_opt("withGameIds", with_game_ids),
        )
        .await
    }

    pub async fn export_game(&self, game_id: &str) -> Result<Value> {
        self.send_json(ApiRequest::get(format!("/game/export/{}", game_id)))
            .await
    }

    pub async fn import_game(&self, pgn: &str) -> Result<Value> {
        self.send_json(ApiRequest::post("/api/import").form_field("pgn", Some(pgn)))
            .await
    }

    pub async fn add_games_to_stream(&self, stream_id: &str, game_ids: &[&str]) -> Result<()> {
        self.requester
            .send(ApiRequest::post(format!("/api/stream/games/{}/add", stream_id)).text(game_ids.join(",")))
            .await?;
        Ok(())
    }

    pub async fn get_tv_games(&self) -> Result<Value> {
        self.send_json(ApiRequest::get("/api/tv/channels")).await
    }

    /// Plays a move (UCI) in a game being played.
    pub async fn make_board_move(&self, game_id: &str, uci: &str, offering_draw: Option<bool>) -> Result<bool> {
        self.send_ok(
            ApiRequest::post(self.game_path(game_id, &format!("move/{}", uci)))
                .query_opt("offeringDraw", offering_draw),
        )
        .await
    }

    pub async fn post_chat_message(&self, game_id: &str, room: ChatRoom, text: &str) -> Result<bool> {
        self.send_ok(
            ApiRequest::post(self.game_path(game_id, "chat"))
                .form_field("room", Some(room.as_str()))
                .form_field("text", Some(text)),
        )
        .await
    }

    pub async fn get_game_chat(&self, game_id: &str) -> Result<Vec<ChatLine>> {
        self.send_json(ApiRequest::get(self.game_path(game_id, "chat")))
            .await
    }

    pub async fn abort_game(&self, game_id: &str) -> Result<bool> {
        self.send_ok(ApiRequest::post(self.game_path(game_id, "abort")))
            .await
    }

    pub async fn resign_game(&self, game_id: &str) -> Result<bool> {
        self.send_ok(ApiRequest::post(self.game_path(game_id, "resign")))
            .await
    }

    /// Accepts or declines the opponent's draw offer, or offers one.
    pub async fn handle_draw_offer(&self, game_id: &str, accept: bool) -> Result<bool> {
        let answer = if accept { "yes" } else { "no" };
        self.send_ok(ApiRequest::post(format!("/api/board/game/{}/draw/{}", game_id, answer)))
            .await
    }

    /// Accepts or declines the opponent's takeback offer, or proposes one.
    pub async fn handle_takeback_offer(&self, game_id: &str, accept: bool) -> Result<bool> {
        let answer = if accept { "yes" } else { "no" };
        self.send_ok(ApiRequest::post(format!("/api/board/game/{}/takeback/{}", game_id, answer)))
            .await
    }

    /// Claims victory when the opponent has left the game.
    pub async fn claim_victory(&self, game_id: &str) -> Result<bool> {
        self.send_ok(ApiRequest::post(format!("/api/board/game/{}/claim-victory", game_id)))
            .await
    }

    /// Halves the clock time in an arena game for an extra point on a win.
    pub async fn berserk_game(&self, game_id: &str) -> Result<bool> {
        self.send_ok(ApiRequest::post(format!("/api/board/game/{}/berserk", game_id)))
            .await
    }

    /// Creates a public seek. The request stays open until a game starts,
    /// which is announced on the incoming event stream.
    pub async fn create_seek(&self, options: SeekOptions) -> Result<()> {
        let request = options
            .into_form()?
            .into_iter()
            .fold(ApiRequest::post("/api/board/seek"), |request, (key, value)| {
                request.form_field(key, value)
            })
            .accept(Accept::Text);
        self.requester.send(request).await?;
        Ok(())
    }

    pub async fn get_challenges(&self) -> Result<Value> {
        self.send_json(ApiRequest::get("/api/challenge")).await
    }

    pub async fn create_challenge(&self, username: &str, options: ChallengeOptions) -> Result<Value> {
        let request = options
            .into_form()?
            .into_iter()
            .fold(ApiRequest::post(format!("/api/challenge/{}", username)), |request, (key, value)| {
                request.form_field(key, value)
            });
        self.send_json(request).await
    }

    pub async fn accept_challenge(&self, challenge_id: &str) -> Result<bool> {
        self.send_ok(ApiRequest::post(format!("/api/challenge/{}/accept", challenge_id)))
            .await
    }

    pub async fn decline_challenge(&self, challenge_id: &str, reason: Option<DeclineReason>) -> Result<bool> {
        self.send_ok(
            ApiRequest::post(format!("/api/challenge/{}/decline", challenge_id)).form_field("reason", reason),
        )
        .await
    }

    pub async fn cancel_challenge(&self, challenge_id: &str, opponent_token: Option<&str>) -> Result<bool> {
        self.send_ok(
            ApiRequest::post(format!("/api/challenge/{}/cancel", challenge_id))
                .query_opt("opponentToken", opponent_token),
        )
        .await
    }

    /// Upgrades the logged in account to a BOT account. This cannot be undone.
    pub async fn upgrade_to_bot_account(&self) -> Result<bool> {
        self.send_ok(ApiRequest::post("/api/bot/account/upgrade")).await
    }
}

fn games_by_users(users: &BTreeSet<String>, with_current_games: Option<bool>) -> ApiRequest {
    let ids: Vec<&str> = users.iter().map(String::as_str).collect();
    ApiRequest::post("/api/stream/games-by-users")
        .text(ids.join(","))
        .query_opt("withCurrentGames", with_current_games)
}

#[cfg(feature = "reqwest")]
impl Client<crate::request::Request> {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self::new(crate::request::Request::new(token.into()))
    }

    /// Client configured from `LICHESS_API_KEY` and `LICHESS_BASE_URL`.
    pub fn from_env() -> Self {
        Self::new(crate::request::Request::from_env())
    }
}

impl<R: Requester> Drop for Client<R> {
    fn drop(&mut self) {
        for active in self.streams().values() {
            active.subscription.cancel();
        }
    }
}

impl<R: Requester> fmt::Debug for Client<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("game_api", &self.game_api)
            .field("dispatcher", &self.dispatcher)
            .field("streams", &self.streams().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::requester::{LineStream, Method, RequestError};
    use futures_util::stream;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;

    /// Records requests, answers one-shot requests with canned bodies and
    /// feeds streams from channels the test controls.
    #[derive(Default)]
    pub(crate) struct FakeRequester {
        pub requests: StdMutex<Vec<ApiRequest>>,
        pub responses: StdMutex<HashMap<String, String>>,
        pub streams: StdMutex<HashMap<String, mpsc::UnboundedReceiver<String>>>,
    }

    impl FakeRequester {
        pub fn respond(&self, path: &str, body: &str) {
            self.responses.lock().unwrap().insert(path.to_string(), body.to_string());
        }

        pub fn feed(&self, path: &str) -> mpsc::UnboundedSender<String> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.streams.lock().unwrap().insert(path.to_string(), rx);
            tx
        }

        pub fn requests(&self) -> Vec<ApiRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Requester for FakeRequester {
        async fn send(&self, request: ApiRequest) -> Result<String, RequestError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .get(&request.path)
                .cloned()
                .ok_or(RequestError::Status {
                    status: 404,
                    message: "Not found".to_string(),
                })
        }

        async fn stream(&self, request: ApiRequest) -> Result<LineStream, RequestError> {
            self.requests.lock().unwrap().push(request.clone());
            let rx = self.streams.lock().unwrap().remove(&request.path);
            match rx {
                Some(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|line: String| (Ok(line.into_bytes()), rx))
                })
                .boxed()),
                None => Err(RequestError::Status {
                    status: 404,
                    message: "Not found".to_string(),
                }),
            }
        }
    }

    pub(crate) async fn until(condition: impl Fn() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    fn recorder() -> (Arc<StdMutex<Vec<Value>>>, impl Fn(&Event) + Send + Sync + 'static) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |event: &Event| sink.lock().unwrap().push(event.payload().clone()))
    }

    #[test]
    fn test_registration_needs_a_runtime() {
        let client = Client::new(FakeRequester::default());
        let result = client.on_new_event(|_| {});
        assert!(matches!(result, Err(LichessError::NoRuntime)));
        assert_eq!(client.dispatcher().handler_count(EventKind::NewEvent), 0);
    }

    #[tokio::test]
    async fn test_handlers_share_one_stream_per_game() {
        let requester = FakeRequester::default();
        let feed = requester.feed("/api/board/game/stream/g1");
        let client = Client::new(requester);

        let (first, first_handler) = recorder();
        let (second, second_handler) = recorder();
        let a = client.on_new_game_state("g1", first_handler).unwrap();
        let b = client.on_new_game_state("g1", second_handler).unwrap();
        assert!(a.stream.same_stream(&b.stream));

        feed.send(r#"{"type":"gameState","moves":"e2e4","status":"started"}"#.to_string())
            .unwrap();
        until(|| second.lock().unwrap().len() == 1).await;
        assert_eq!(first.lock().unwrap().len(), 1);

        let streams: Vec<_> = client
            .requester()
            .requests()
            .into_iter()
            .filter(|r| r.path == "/api/board/game/stream/g1")
            .collect();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].accept, Accept::NdJson);
    }

    #[tokio::test]
    async fn test_game_filters_keep_games_apart() {
        let requester = FakeRequester::default();
        let g1 = requester.feed("/api/board/game/stream/g1");
        let g2 = requester.feed("/api/board/game/stream/g2");
        let client = Client::new(requester);

        let (seen_g1, handler_g1) = recorder();
        let (seen_g2, handler_g2) = recorder();
        client.on_new_game_state("g1", handler_g1).unwrap();
        client.on_new_game_state("g2", handler_g2).unwrap();

        g2.send(r#"{"type":"gameState","moves":"d2d4","status":"started"}"#.to_string())
            .unwrap();
        g1.send(r#"{"type":"gameState","moves":"e2e4","status":"started"}"#.to_string())
            .unwrap();
        until(|| seen_g1.lock().unwrap().len() == 1 && seen_g2.lock().unwrap().len() == 1).await;

        assert_eq!(seen_g1.lock().unwrap()[0]["moves"], "e2e4");
        assert_eq!(seen_g2.lock().unwrap()[0]["moves"], "d2d4");
    }

    #[tokio::test]
    async fn test_game_status_change_posts_user_pool() {
        let requester = FakeRequester::default();
        let feed = requester.feed("/api/stream/games-by-users");
        let client = Client::new(requester);

        let (seen, handler) = recorder();
        client
            .on_game_status_change(["Bob", "alice"], Some(true), handler)
            .unwrap();
        feed.send(r#"{"id":"g1","status":20}"#.to_string()).unwrap();
        until(|| seen.lock().unwrap().len() == 1).await;

        let request = client.requester().requests().pop().unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body, crate::requester::Body::Text("alice,bob".to_string()));
        assert_eq!(
            request.query,
            vec![("withCurrentGames".to_string(), "true".to_string())]
        );

        let empty: [&str; 0] = [];
        assert!(matches!(
            client.on_game_status_change(empty, None, |_| {}),
            Err(LichessError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_removing_last_handler_closes_the_stream() {
        let requester = FakeRequester::default();
        let _feed = requester.feed("/api/stream/event");
        let client = Client::new(requester);

        let a = client.on_new_event(|_| {}).unwrap();
        let b = client.on_new_event(|_| {}).unwrap();
        assert_eq!(client.active_streams(), vec![StreamKey::IncomingEvents]);

        assert!(client.remove_handler(a.handler));
        assert!(!a.stream.is_cancelled());
        assert!(client.remove_handler(b.handler));
        assert!(b.stream.wait().await.is_cancelled());
        assert!(client.active_streams().is_empty());
    }

    #[tokio::test]
    async fn test_close_cancels_everything() {
        let requester = FakeRequester::default();
        let feed = requester.feed("/api/tv/feed");
        let client = Client::new(requester);

        let (seen, handler) = recorder();
        let listener = client.on_new_tv_game(handler).unwrap();
        client.close();
        let _ = feed.send(r#"{"t":"featured","d":{"id":"tv1","orientation":"white"}}"#.to_string());

        assert!(listener.stream.wait().await.is_cancelled());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(client.dispatcher().handler_count(EventKind::NewTvGame), 0);
    }

    #[tokio::test]
    async fn test_stream_open_failure_is_reported() {
        let client = Client::new(FakeRequester::default());
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let sink = errors.clone();
        client.on_stream_error(move |e| sink.lock().unwrap().push(e.to_string()));

        let listener = client.on_game_move("missing", |_| {}).unwrap();
        let outcome = listener.stream.wait().await;
        assert!(matches!(outcome, crate::StreamOutcome::Failed { .. }));
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_raw_stream_yields_decode_errors_and_continues() {
        let requester = FakeRequester::default();
        let feed = requester.feed("/api/stream/event");
        let client = Client::new(requester);

        feed.send(r#"{"type":"challenge"}"#.to_string()).unwrap();
        feed.send("{broken".to_string()).unwrap();
        feed.send(r#"{"type":"gameStart"}"#.to_string()).unwrap();
        drop(feed);

        let items: Vec<_> = client.stream_incoming_events().await.unwrap().collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(items[1].as_ref().unwrap_err().is_decode());
        assert_eq!(items[2].as_ref().unwrap()["type"], "gameStart");
    }

    #[tokio::test]
    async fn test_reopened_stream_keeps_earlier_handlers() {
        let requester = FakeRequester::default();
        let first_feed = requester.feed("/api/stream/event");
        let client = Client::new(requester);

        let (early, early_handler) = recorder();
        let first = client.on_new_event(early_handler).unwrap();
        drop(first_feed);
        assert!(matches!(first.stream.wait().await, crate::StreamOutcome::Closed(_)));

        let second_feed = client.requester().feed("/api/stream/event");
        let (late, late_handler) = recorder();
        let second = client.on_new_event(late_handler).unwrap();
        assert!(!second.stream.same_stream(&first.stream));

        second_feed.send(r#"{"type":"gameStart"}"#.to_string()).unwrap();
        until(|| late.lock().unwrap().len() == 1).await;
        assert_eq!(early.lock().unwrap().len(), 1);

        // Both handlers belong to the new stream.
        assert!(client.remove_handler(first.handler));
        assert!(!second.stream.is_cancelled());
        assert!(client.remove_handler(second.handler));
        assert!(second.stream.wait().await.is_cancelled());
    }

    #[tokio::test]
    async fn test_user_ids_are_lowercased() {
        let requester = FakeRequester::default();
        requester.respond("/api/users", r#"[{"id":"alice","username":"Alice"}]"#);
        let client = Client::new(requester);

        let users = client.get_users(&["Alice", "BOB"]).await.unwrap();
        assert_eq!(users[0].username, "Alice");
        assert_eq!(
            client.requester().requests()[0].body,
            crate::requester::Body::Text("alice,bob".to_string())
        );
    }

    #[tokio::test]
    async fn test_request_methods() {
        let requester = FakeRequester::default();
        requester.respond("/api/account/email", r#"{"email":"abc@example.com"}"#);
        requester.respond("/api/board/game/g1/move/e2e4", r#"{"ok":true}"#);
        requester.respond("/api/challenge/c1/decline", r#"{"ok":true}"#);
        let client = Client::new(requester);

        assert_eq!(client.get_email_address().await.unwrap(), "abc@example.com");
        assert!(client.make_board_move("g1", "e2e4", Some(false)).await.unwrap());
        assert!(client
            .decline_challenge("c1", Some(DeclineReason::TooFast))
            .await
            .unwrap());
        assert!(matches!(
            client.get_ongoing_games(Some(51)).await,
            Err(LichessError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.get_kid_mode_status().await,
            Err(LichessError::Request(RequestError::Status { status: 404, .. }))
        ));

        let requests = client.requester().requests();
        assert_eq!(
            requests[1].query,
            vec![("offeringDraw".to_string(), "false".to_string())]
        );
        assert_eq!(
            requests[2].body,
            crate::requester::Body::Form(vec![("reason".to_string(), "tooFast".to_string())])
        );
    }
}
