// Mirrors schema.rs with SQLite column types; timestamps are RFC 3339 text.

diesel::table! {
    reposts (id) {
        id -> Integer,
        original_channel_id -> Text,
        original_message_id -> Text,
        board_channel_id -> Text,
        board_message_id -> Text,
        guild_id -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    guild_settings (guild_id) {
        guild_id -> Text,
        name -> Text,
        star_emote -> Text,
        stars_required -> Integer,
        channel_stars -> Text,
        allow_self_star -> Bool,
        ignore_bots -> Bool,
        blacklisted_users -> Text,
        banned_channels -> Text,
        starboard_channel_id -> Nullable<Text>,
        nsfw_starboard_channel_id -> Nullable<Text>,
        enabled -> Bool,
        embed_colour -> Integer,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(reposts, guild_settings);
