//! Typed endpoint-path builders.
//!
//! Plain functions that format API paths for the common resources. The
//! dispatch engine only ever needs `(method, path)`; these helpers exist so
//! callers assemble paths without string-formatting mistakes, and so IDs
//! are visibly snowflakes (`u64`) at the call site.

/// `/gateway`
pub fn gateway() -> String {
    "/gateway".to_string()
}

/// `/gateway/bot`
pub fn gateway_bot() -> String {
    "/gateway/bot".to_string()
}

/// `/users/@me`
pub fn current_user() -> String {
    "/users/@me".to_string()
}

/// `/users/{user}`
pub fn user(user_id: u64) -> String {
    format!("/users/{user_id}")
}

/// `/users/@me/channels` (create/list DM channels)
pub fn user_channels() -> String {
    "/users/@me/channels".to_string()
}

/// `/channels/{channel}`
pub fn channel(channel_id: u64) -> String {
    format!("/channels/{channel_id}")
}

/// `/channels/{channel}/messages`
pub fn channel_messages(channel_id: u64) -> String {
    format!("/channels/{channel_id}/messages")
}

/// `/channels/{channel}/messages/{message}`
pub fn channel_message(channel_id: u64, message_id: u64) -> String {
    format!("/channels/{channel_id}/messages/{message_id}")
}

/// `/channels/{channel}/messages/{message}/reactions/{emoji}/@me`
pub fn own_reaction(channel_id: u64, message_id: u64, emoji: &str) -> String {
    format!("/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me")
}

/// `/channels/{channel}/messages/{message}/reactions/{emoji}`
pub fn message_reactions(channel_id: u64, message_id: u64, emoji: &str) -> String {
    format!("/channels/{channel_id}/messages/{message_id}/reactions/{emoji}")
}

/// `/channels/{channel}/typing`
pub fn channel_typing(channel_id: u64) -> String {
    format!("/channels/{channel_id}/typing")
}

/// `/channels/{channel}/invites`
pub fn channel_invites(channel_id: u64) -> String {
    format!("/channels/{channel_id}/invites")
}

/// `/channels/{channel}/pins`
pub fn channel_pins(channel_id: u64) -> String {
    format!("/channels/{channel_id}/pins")
}

/// `/channels/{channel}/pins/{message}`
pub fn channel_pin(channel_id: u64, message_id: u64) -> String {
    format!("/channels/{channel_id}/pins/{message_id}")
}

/// `/guilds/{guild}`
pub fn guild(guild_id: u64) -> String {
    format!("/guilds/{guild_id}")
}

/// `/guilds/{guild}/channels`
pub fn guild_channels(guild_id: u64) -> String {
    format!("/guilds/{guild_id}/channels")
}

/// `/guilds/{guild}/members`
pub fn guild_members(guild_id: u64) -> String {
    format!("/guilds/{guild_id}/members")
}

/// `/guilds/{guild}/members/{user}`
pub fn guild_member(guild_id: u64, user_id: u64) -> String {
    format!("/guilds/{guild_id}/members/{user_id}")
}

/// `/guilds/{guild}/members/{user}/roles/{role}`
pub fn guild_member_role(guild_id: u64, user_id: u64, role_id: u64) -> String {
    format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}")
}

/// `/guilds/{guild}/roles`
pub fn guild_roles(guild_id: u64) -> String {
    format!("/guilds/{guild_id}/roles")
}

/// `/guilds/{guild}/roles/{role}`
pub fn guild_role(guild_id: u64, role_id: u64) -> String {
    format!("/guilds/{guild_id}/roles/{role_id}")
}

/// `/guilds/{guild}/bans`
pub fn guild_bans(guild_id: u64) -> String {
    format!("/guilds/{guild_id}/bans")
}

/// `/guilds/{guild}/bans/{user}`
pub fn guild_ban(guild_id: u64, user_id: u64) -> String {
    format!("/guilds/{guild_id}/bans/{user_id}")
}

/// `/guilds/{guild}/emojis`
pub fn guild_emojis(guild_id: u64) -> String {
    format!("/guilds/{guild_id}/emojis")
}

/// `/guilds/{guild}/emojis/{emoji}`
pub fn guild_emoji(guild_id: u64, emoji_id: u64) -> String {
    format!("/guilds/{guild_id}/emojis/{emoji_id}")
}

/// `/invites/{code}`
pub fn invite(code: &str) -> String {
    format!("/invites/{code}")
}

/// `/channels/{channel}/webhooks`
pub fn channel_webhooks(channel_id: u64) -> String {
    format!("/channels/{channel_id}/webhooks")
}

/// `/webhooks/{webhook}`
pub fn webhook(webhook_id: u64) -> String {
    format!("/webhooks/{webhook_id}")
}

/// `/webhooks/{webhook}/{token}`
pub fn webhook_with_token(webhook_id: u64, token: &str) -> String {
    format!("/webhooks/{webhook_id}/{token}")
}

/// `/interactions/{interaction}/{token}/callback`
pub fn interaction_callback(interaction_id: u64, token: &str) -> String {
    format!("/interactions/{interaction_id}/{token}/callback")
}

/// `/webhooks/{application}/{token}/messages/@original`
pub fn interaction_original_response(application_id: u64, token: &str) -> String {
    format!("/webhooks/{application_id}/{token}/messages/@original")
}

/// `/applications/{application}/commands`
pub fn application_commands(application_id: u64) -> String {
    format!("/applications/{application_id}/commands")
}

/// `/applications/{application}/guilds/{guild}/commands`
pub fn application_guild_commands(application_id: u64, guild_id: u64) -> String {
    format!("/applications/{application_id}/guilds/{guild_id}/commands")
}
