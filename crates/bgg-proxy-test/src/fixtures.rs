//! BGG XML API 2 responses, trimmed down to the elements the proxy reads plus some it ignores.

macro_rules! items_header {
    () => {
        r#"<?xml version="1.0" encoding="utf-8"?><items termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">"#
    };
}

macro_rules! item_42 {
    () => {
        r#"
    <item type="boardgame" id="42">
        <thumbnail>https://cf.geekdo-images.com/tigris_thumb.jpg</thumbnail>
        <image>https://cf.geekdo-images.com/tigris.jpg</image>
        <name type="primary" sortindex="1" value="Tigris &amp; Euphrates" />
        <name type="alternate" sortindex="1" value="Euphrat &amp; Tigris" />
        <description>Players build civilizations in the Fertile Crescent.&#10;&#10;Knizia&#039;s classic.</description>
        <yearpublished value="1997" />
        <minplayers value="2" />
        <maxplayers value="4" />
        <playingtime value="90" />
        <minplaytime value="90" />
        <maxplaytime value="90" />
        <minage value="12" />
        <link type="boardgamecategory" id="1050" value="Ancient" />
        <link type="boardgamecategory" id="1015" value="Civilization" />
        <link type="boardgamemechanic" id="2080" value="Area Majority / Influence" />
        <link type="boardgamedesigner" id="2" value="Reiner Knizia" />
    </item>"#
    };
}

macro_rules! item_43 {
    () => {
        r#"
    <item type="boardgame" id="43">
        <thumbnail>https://cf.geekdo-images.com/starbase_thumb.jpg</thumbnail>
        <image>https://cf.geekdo-images.com/starbase.jpg</image>
        <name type="primary" sortindex="1" value="Starbase Jeff" />
        <description></description>
        <yearpublished value="" />
        <minplayers value="1" />
        <maxplayers value="1" />
        <playingtime value="0" />
        <link type="boardgamecategory" id="1016" value="Science Fiction" />
    </item>"#
    };
}

macro_rules! item_44 {
    () => {
        r#"
    <item type="boardgameexpansion" id="44">
        <name type="primary" sortindex="1" value="Tigris &amp; Euphrates: Tournament Tiles" />
        <yearpublished value="0" />
        <link type="boardgamecategory" id="1050" value="Ancient" />
        <link type="boardgameexpansion" id="42" value="Tigris &amp; Euphrates" inbound="true" />
    </item>"#
    };
}

/// The `<item>` element of the board game with id 42.
pub const ITEM_42: &str = item_42!();
/// The `<item>` element of the board game with id 43.
pub const ITEM_43: &str = item_43!();
/// The `<item>` element of the expansion with id 44.
pub const ITEM_44: &str = item_44!();

/// The start of a `/thing` response, up to the first item.
pub const ITEMS_HEADER: &str = items_header!();
/// The end of a `/thing` response.
pub const ITEMS_FOOTER: &str = "\n</items>";

/// `/thing?id=42`: a board game.
pub const THING_BOARDGAME: &str = concat!(items_header!(), item_42!(), "\n</items>");

/// `/thing?id=44`: an expansion, which is not a board game.
pub const THING_EXPANSION: &str = concat!(items_header!(), item_44!(), "\n</items>");

/// `/thing?id=999`: BGG answers unknown ids with an empty item list.
pub const THING_EMPTY: &str = concat!(items_header!(), "\n</items>");

/// `/user?name=alice`
pub const USER_ALICE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<user id="1234" name="alice" termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">
    <firstname value="Alice" />
    <lastname value="Liddell" />
    <avatarlink value="N/A" />
    <yearregistered value="2008" />
    <lastlogin value="2024-05-01" />
    <stateorprovince value="" />
    <country value="United Kingdom" />
    <webaddress value="" />
    <xboxaccount value="" />
    <wiiaccount value="" />
    <psnaccount value="" />
    <battlenetaccount value="" />
    <steamaccount value="" />
    <traderating value="3" />
</user>"#;

/// `/user?name=nobody`: BGG answers unknown users with an empty id.
pub const USER_UNKNOWN: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<user id="" name="nobody" termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">
    <firstname value="" />
    <lastname value="" />
    <avatarlink value="N/A" />
    <yearregistered value="" />
    <lastlogin value="" />
    <stateorprovince value="" />
    <country value="" />
    <traderating value="0" />
</user>"#;
