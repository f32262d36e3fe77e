use crate::client::{Client, GameApi};
use crate::error::{LichessError, Result};
use crate::requester::Requester;
use log::{info, warn};
use std::ops::Deref;

/// Client for BOT accounts.
///
/// Games are streamed and played through `/api/bot` instead of `/api/board`.
/// Everything else is the same as [`Client`], which a `Bot` derefs to.
#[derive(Debug)]
pub struct Bot<R: Requester> {
    client: Client<R>,
}

impl<R: Requester> Bot<R> {
    pub fn new(requester: R) -> Self {
        Self {
            client: Client::with_game_api(requester, GameApi::Bot),
        }
    }

    /// Creates the bot and checks the token. Fails with [`LichessError::InvalidToken`]
    /// if the account cannot be fetched.
    pub async fn connect(requester: R) -> Result<Self> {
        let bot = Self::new(requester);
        let profile = bot
            .client
            .get_profile()
            .await
            .map_err(|e| LichessError::InvalidToken(Box::new(e)))?;
        if profile.is_bot() {
            info!("connected as BOT {}", profile.username);
        } else {
            warn!(
                "{} is not a BOT account, bot endpoints will be refused",
                profile.username
            );
        }
        Ok(bot)
    }

    pub fn client(&self) -> &Client<R> {
        &self.client
    }

    pub fn into_client(self) -> Client<R> {
        self.client
    }
}

impl<R: Requester> Deref for Bot<R> {
    type Target = Client<R>;

    fn deref(&self) -> &Client<R> {
        &self.client
    }
}

#[cfg(feature = "reqwest")]
impl Bot<crate::request::Request> {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self::new(crate::request::Request::new(token.into()))
    }

    pub fn from_env() -> Self {
        Self::new(crate::request::Request::from_env())
    }
}
