//! Domain types served by the proxy.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::caching::StoreError;
use crate::upstream::UpstreamError;

/// The link type BGG uses for board game categories.
const CATEGORY_LINK: &str = "boardgamecategory";

/// The thing subtype of a base board game, the only subtype projected into a [`Game`].
pub const BOARDGAME_TYPE: &str = "boardgame";

/// Usernames longer than this are rejected before hitting any cache or BGG.
const MAX_USERNAME_LEN: usize = 64;

/// A BGG "thing": a board game, an expansion, an accessory, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingItem {
    pub id: u32,
    /// The thing subtype, e.g. `boardgame` or `boardgameexpansion`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub names: Vec<ThingName>,
    #[serde(default)]
    pub year_published: Option<i32>,
    #[serde(default)]
    pub min_players: Option<u32>,
    #[serde(default)]
    pub max_players: Option<u32>,
    #[serde(default)]
    pub playing_time: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub links: Vec<ThingLink>,
}

impl ThingItem {
    /// The primary name, or the first name if BGG did not mark one as primary.
    pub fn primary_name(&self) -> Option<&str> {
        self.names
            .iter()
            .find(|name| name.kind == "primary")
            .or_else(|| self.names.first())
            .map(|name| name.value.as_str())
    }

    /// Values of all links of the given type, in document order.
    pub fn link_values<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.links
            .iter()
            .filter(move |link| link.kind == kind)
            .map(|link| link.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingName {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingLink {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: u32,
    pub value: String,
}

/// A registered BGG user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BggUser {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub avatar_link: Option<String>,
    #[serde(default)]
    pub year_registered: Option<i32>,
    #[serde(default)]
    pub country: Option<String>,
}

/// The caller-facing view of a board game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub bgg_id: u32,
    pub name: String,
    pub categories: Vec<String>,
    pub year_published: Option<i32>,
}

impl From<&ThingItem> for Game {
    fn from(item: &ThingItem) -> Self {
        Self {
            bgg_id: item.id,
            name: item.primary_name().unwrap_or_default().to_owned(),
            categories: item.link_values(CATEGORY_LINK).map(str::to_owned).collect(),
            year_published: item.year_published,
        }
    }
}

/// A validated BGG thing id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThingId(u32);

impl ThingId {
    pub fn new(id: u32) -> Result<Self, FetchError> {
        if id == 0 {
            return Err(FetchError::InvalidId("thing id must be positive".into()));
        }
        Ok(Self(id))
    }

    /// Parses a decimal thing id, ignoring surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(FetchError::InvalidId("thing id is missing".into()));
        }
        let id = raw
            .parse::<u32>()
            .map_err(|_| FetchError::InvalidId(format!("`{raw}` is not a valid thing id")))?;
        Self::new(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl FromStr for ThingId {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ThingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A validated BGG username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(FetchError::InvalidId("username is missing".into()));
        }
        if name.chars().count() > MAX_USERNAME_LEN {
            return Err(FetchError::InvalidId(format!(
                "username is longer than {MAX_USERNAME_LEN} characters"
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(FetchError::InvalidId(
                "username contains control characters".into(),
            ));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Username {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The reason an entity lookup failed.
///
/// Every caller that joined the same coalesced lookup receives an equal copy of this error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The caller supplied a missing or malformed identifier.
    ///
    /// Produced before any cache or upstream interaction.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
    /// BGG answered, but had no entity of the expected type for the identifier.
    #[error("not found")]
    NotFound,
    /// The cache store could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The request to BGG failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// The coordinated lookup panicked or was aborted.
    #[error("internal error")]
    Internal,
}

impl FetchError {
    /// A short, stable tag for metrics.
    pub fn metrics_tag(&self) -> &'static str {
        match self {
            Self::InvalidId(_) => "invalid_id",
            Self::NotFound => "not_found",
            Self::Store(_) => "store",
            Self::Upstream(_) => "upstream",
            Self::Internal => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tigris() -> ThingItem {
        ThingItem {
            id: 42,
            kind: "boardgame".into(),
            names: vec![
                ThingName {
                    kind: "alternate".into(),
                    value: "Euphrat & Tigris".into(),
                },
                ThingName {
                    kind: "primary".into(),
                    value: "Tigris & Euphrates".into(),
                },
            ],
            year_published: Some(1997),
            min_players: Some(2),
            max_players: Some(4),
            playing_time: Some(90),
            description: None,
            thumbnail: None,
            image: None,
            links: vec![
                ThingLink {
                    kind: "boardgamecategory".into(),
                    id: 1050,
                    value: "Ancient".into(),
                },
                ThingLink {
                    kind: "boardgamedesigner".into(),
                    id: 2,
                    value: "Reiner Knizia".into(),
                },
                ThingLink {
                    kind: "boardgamecategory".into(),
                    id: 1015,
                    value: "Civilization".into(),
                },
            ],
        }
    }

    #[test]
    fn test_game_from_thing() {
        let game = Game::from(&tigris());
        assert_eq!(game.bgg_id, 42);
        assert_eq!(game.name, "Tigris & Euphrates");
        assert_eq!(game.categories, vec!["Ancient", "Civilization"]);
        assert_eq!(game.year_published, Some(1997));
    }

    #[test]
    fn test_primary_name_fallback() {
        let mut item = tigris();
        item.names.retain(|name| name.kind != "primary");
        assert_eq!(item.primary_name(), Some("Euphrat & Tigris"));

        item.names.clear();
        assert_eq!(item.primary_name(), None);
        assert_eq!(Game::from(&item).name, "");
    }

    #[test]
    fn test_thing_id_parse() {
        assert_eq!(ThingId::parse("42").unwrap().get(), 42);
        assert_eq!(ThingId::parse(" 7 \n").unwrap().get(), 7);

        for raw in ["", "   ", "0", "-3", "abc", "4.2", "99999999999"] {
            assert!(
                matches!(ThingId::parse(raw), Err(FetchError::InvalidId(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_username_parse() {
        assert_eq!(Username::parse(" alice ").unwrap().as_str(), "alice");
        assert!(Username::parse("").is_err());
        assert!(Username::parse("bob\u{7}").is_err());
        assert!(Username::parse(&"x".repeat(65)).is_err());
        assert!(Username::parse(&"x".repeat(64)).is_ok());
    }

    #[test]
    fn test_thing_json_roundtrip() {
        let item = tigris();
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains(r#""type":"boardgame""#));
        let back: ThingItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }
}
