//! Parameters of the request methods that take more than a couple of arguments.

use crate::error::LichessError;
use std::fmt;
use std::ops::RangeInclusive;

pub(crate) fn check_range(
    name: &str,
    value: Option<u32>,
    range: RangeInclusive<u32>,
) -> Result<(), LichessError> {
    match value {
        Some(v) if !range.contains(&v) => Err(LichessError::InvalidArgument(format!(
            "'{}' must be between {} and {}, got {}",
            name,
            range.start(),
            range.end(),
            v
        ))),
        _ => Ok(()),
    }
}

const CORRESPONDENCE_DAYS: [u32; 7] = [1, 2, 3, 5, 7, 10, 14];

fn check_days(days: Option<u32>) -> Result<(), LichessError> {
    match days {
        Some(d) if !CORRESPONDENCE_DAYS.contains(&d) => Err(LichessError::InvalidArgument(format!(
            "'days' must be one of {:?}, got {}",
            CORRESPONDENCE_DAYS, d
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRoom {
    Player,
    Spectator,
}

impl ChatRoom {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRoom::Player => "player",
            ChatRoom::Spectator => "spectator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChoice {
    Random,
    White,
    Black,
}

impl fmt::Display for ColorChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColorChoice::Random => "random",
            ColorChoice::White => "white",
            ColorChoice::Black => "black",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    Generic,
    Later,
    TooFast,
    TooSlow,
    TimeControl,
    Rated,
    Casual,
    Standard,
    Variant,
    NoBot,
    OnlyBot,
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeclineReason::Generic => "generic",
            DeclineReason::Later => "later",
            DeclineReason::TooFast => "tooFast",
            DeclineReason::TooSlow => "tooSlow",
            DeclineReason::TimeControl => "timeControl",
            DeclineReason::Rated => "rated",
            DeclineReason::Casual => "casual",
            DeclineReason::Standard => "standard",
            DeclineReason::Variant => "variant",
            DeclineReason::NoBot => "noBot",
            DeclineReason::OnlyBot => "onlyBot",
        })
    }
}

/// Options of `POST /api/challenge/{username}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChallengeOptions {
    pub rated: Option<bool>,
    /// Initial clock time in seconds.
    pub clock_limit: Option<u32>,
    /// Clock increment in seconds.
    pub clock_increment: Option<u32>,
    /// Days per turn, for correspondence games.
    pub days: Option<u32>,
    pub color: Option<ColorChoice>,
    pub variant: Option<String>,
    pub fen: Option<String>,
    pub message: Option<String>,
}

impl ChallengeOptions {
    pub(crate) fn into_form(self) -> Result<Vec<(&'static str, Option<String>)>, LichessError> {
        check_range("clock_limit", self.clock_limit, 0..=10800)?;
        check_range("clock_increment", self.clock_increment, 0..=180)?;
        check_days(self.days)?;
        Ok(vec![
            ("rated", self.rated.map(|v| v.to_string())),
            ("clock.limit", self.clock_limit.map(|v| v.to_string())),
            ("clock.increment", self.clock_increment.map(|v| v.to_string())),
            ("days", self.days.map(|v| v.to_string())),
            ("color", self.color.map(|v| v.to_string())),
            ("variant", self.variant),
            ("fen", self.fen),
            ("message", self.message),
        ])
    }
}

/// Options of `POST /api/board/seek`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekOptions {
    pub rated: Option<bool>,
    /// Initial clock time in minutes. Required for real-time seeks.
    pub time: Option<u32>,
    /// Clock increment in seconds. Required for real-time seeks.
    pub increment: Option<u32>,
    /// Days per turn. Required for correspondence seeks.
    pub days: Option<u32>,
    pub variant: Option<String>,
    pub color: Option<ColorChoice>,
    pub rating_range: Option<(u32, u32)>,
}

impl SeekOptions {
    pub(crate) fn into_form(self) -> Result<Vec<(&'static str, Option<String>)>, LichessError> {
        check_range("time", self.time, 0..=180)?;
        check_range("increment", self.increment, 0..=180)?;
        check_days(self.days)?;
        if let Some((low, high)) = self.rating_range {
            if low > high {
                return Err(LichessError::InvalidArgument(format!(
                    "'rating_range' is empty: {}-{}",
                    low, high
                )));
            }
        }
        Ok(vec![
            ("rated", self.rated.map(|v| v.to_string())),
            ("time", self.time.map(|v| v.to_string())),
            ("increment", self.increment.map(|v| v.to_string())),
            ("days", self.days.map(|v| v.to_string())),
            ("variant", self.variant),
            ("color", self.color.map(|v| v.to_string())),
            (
                "ratingRange",
                self.rating_range.map(|(low, high)| format!("{}-{}", low, high)),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_form() {
        let form = ChallengeOptions {
            rated: Some(true),
            clock_limit: Some(300),
            clock_increment: Some(2),
            color: Some(ColorChoice::White),
            ..Default::default()
        }
        .into_form()
        .unwrap();

        let set: Vec<_> = form.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect();
        assert_eq!(
            set,
            vec![
                ("rated", "true".to_string()),
                ("clock.limit", "300".to_string()),
                ("clock.increment", "2".to_string()),
                ("color", "white".to_string())
            ]
        );
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let too_long = SeekOptions {
            time: Some(181),
            ..Default::default()
        };
        assert!(matches!(too_long.into_form(), Err(LichessError::InvalidArgument(_))));

        let odd_days = ChallengeOptions {
            days: Some(4),
            ..Default::default()
        };
        assert!(matches!(odd_days.into_form(), Err(LichessError::InvalidArgument(_))));

        let inverted = SeekOptions {
            rating_range: Some((1800, 1500)),
            ..Default::default()
        };
        assert!(inverted.into_form().is_err());
    }

    #[test]
    fn test_seek_rating_range() {
        let form = SeekOptions {
            time: Some(10),
            increment: Some(0),
            rating_range: Some((1500, 1800)),
            ..Default::default()
        }
        .into_form()
        .unwrap();
        assert!(form.contains(&("ratingRange", Some("1500-1800".to_string()))));
    }
}
