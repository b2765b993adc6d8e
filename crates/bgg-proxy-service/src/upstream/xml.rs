//! Parsing of BGG XML API 2 documents.
//!
//! BGG encodes most scalar values as `<element value="..."/>`, and sends empty strings instead
//! of omitting unknown values. Numbers are therefore parsed leniently: anything that is not a
//! number becomes `None`.

use std::str::FromStr;

use serde::Deserialize;

use super::UpstreamError;
use crate::types::{BggUser, ThingItem, ThingLink, ThingName};

/// `<element value="..."/>`
#[derive(Debug, Default, Deserialize)]
struct Value {
    #[serde(rename = "@value", default)]
    value: String,
}

impl Value {
    fn parse<T: FromStr>(field: Option<Self>) -> Option<T> {
        field.and_then(|field| field.value.trim().parse().ok())
    }

    fn text(field: Option<Self>) -> Option<String> {
        non_empty(field.map(|field| field.value))
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

/// `<items><item .../>...</items>`, the response of `/thing`.
#[derive(Debug, Deserialize)]
struct Items {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "@id")]
    id: u32,
    #[serde(rename = "@type")]
    kind: String,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(rename = "name", default)]
    names: Vec<Name>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    yearpublished: Option<Value>,
    #[serde(default)]
    minplayers: Option<Value>,
    #[serde(default)]
    maxplayers: Option<Value>,
    #[serde(default)]
    playingtime: Option<Value>,
    #[serde(rename = "link", default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Name {
    #[serde(rename = "@type", default)]
    kind: String,
    #[serde(rename = "@value", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(rename = "@type", default)]
    kind: String,
    #[serde(rename = "@id", default)]
    id: u32,
    #[serde(rename = "@value", default)]
    value: String,
}

impl From<Item> for ThingItem {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            kind: item.kind,
            names: item
                .names
                .into_iter()
                .map(|name| ThingName {
                    kind: name.kind,
                    value: name.value,
                })
                .collect(),
            year_published: Value::parse(item.yearpublished),
            min_players: Value::parse(item.minplayers),
            max_players: Value::parse(item.maxplayers),
            playing_time: Value::parse(item.playingtime),
            description: non_empty(item.description),
            thumbnail: non_empty(item.thumbnail),
            image: non_empty(item.image),
            links: item
                .links
                .into_iter()
                .map(|link| ThingLink {
                    kind: link.kind,
                    id: link.id,
                    value: link.value,
                })
                .collect(),
        }
    }
}

/// `<user id="..." name="...">`, the response of `/user`.
#[derive(Debug, Deserialize)]
struct User {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(default)]
    firstname: Option<Value>,
    #[serde(default)]
    lastname: Option<Value>,
    #[serde(default)]
    avatarlink: Option<Value>,
    #[serde(default)]
    yearregistered: Option<Value>,
    #[serde(default)]
    country: Option<Value>,
}

/// Parses the response of the `/thing` endpoint.
pub fn parse_things(document: &str) -> Result<Vec<ThingItem>, UpstreamError> {
    let items: Items = quick_xml::de::from_str(document)
        .map_err(|err| UpstreamError::Malformed(err.to_string()))?;
    Ok(items.items.into_iter().map(ThingItem::from).collect())
}

/// Parses the response of the `/user` endpoint.
///
/// BGG answers with an empty `id` attribute for unknown users, which results in `None`.
pub fn parse_user(document: &str) -> Result<Option<BggUser>, UpstreamError> {
    let user: User = quick_xml::de::from_str(document)
        .map_err(|err| UpstreamError::Malformed(err.to_string()))?;

    let Ok(id) = user.id.trim().parse::<u64>() else {
        return Ok(None);
    };
    // "avatarlink" is literally "N/A" for users without an avatar
    let avatar_link = Value::text(user.avatarlink).filter(|link| link != "N/A");

    Ok(Some(BggUser {
        id,
        name: user.name,
        first_name: Value::text(user.firstname),
        last_name: Value::text(user.lastname),
        avatar_link,
        year_registered: Value::parse(user.yearregistered),
        country: Value::text(user.country),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use bgg_proxy_test::fixtures;

    #[test]
    fn test_parse_thing() {
        let items = parse_things(fixtures::THING_BOARDGAME).unwrap();
        assert_eq!(items.len(), 1);

        let item = &items[0];
        assert_eq!(item.id, 42);
        assert_eq!(item.kind, "boardgame");
        assert_eq!(item.primary_name(), Some("Tigris & Euphrates"));
        assert_eq!(item.names.len(), 2);
        assert_eq!(item.year_published, Some(1997));
        assert_eq!(item.min_players, Some(2));
        assert_eq!(item.max_players, Some(4));
        assert_eq!(item.playing_time, Some(90));
        assert_eq!(
            item.thumbnail.as_deref(),
            Some("https://cf.geekdo-images.com/tigris_thumb.jpg")
        );
        assert!(item.description.as_deref().unwrap().starts_with("Players build"));
        assert_eq!(
            item.link_values("boardgamecategory").collect::<Vec<_>>(),
            ["Ancient", "Civilization"]
        );
        assert_eq!(
            item.link_values("boardgamedesigner").collect::<Vec<_>>(),
            ["Reiner Knizia"]
        );
    }

    #[test]
    fn test_parse_expansion() {
        let items = parse_things(fixtures::THING_EXPANSION).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, "boardgameexpansion");
        // BGG reports unknown years as 0
        assert_eq!(items[0].year_published, Some(0));
    }

    #[test]
    fn test_parse_empty_items() {
        assert_eq!(parse_things(fixtures::THING_EMPTY).unwrap(), vec![]);
    }

    #[test]
    fn test_parse_user() {
        let user = parse_user(fixtures::USER_ALICE).unwrap().unwrap();
        assert_eq!(user.id, 1234);
        assert_eq!(user.name, "alice");
        assert_eq!(user.first_name.as_deref(), Some("Alice"));
        assert_eq!(user.last_name.as_deref(), Some("Liddell"));
        assert_eq!(user.avatar_link, None);
        assert_eq!(user.year_registered, Some(2008));
        assert_eq!(user.country.as_deref(), Some("United Kingdom"));
    }

    #[test]
    fn test_parse_unknown_user() {
        assert_eq!(parse_user(fixtures::USER_UNKNOWN).unwrap(), None);
    }

    #[test]
    fn test_parse_garbage() {
        let err = parse_things("this is not xml <<").unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)), "{err:?}");
    }
}
