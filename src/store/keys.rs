use crate::datebucket::DateBucket;

pub fn user_counter_key(
    guild_id: &str,
    channel_id: &str,
    user_id: &str,
    date: DateBucket,
) -> String {
    format!("{}:{}:{}:{}", guild_id, channel_id, user_id, date.compact())
}

pub fn general_counter_key(guild_id: &str, channel_id: &str, date: DateBucket) -> String {
    format!("{}:{}:{}", guild_id, channel_id, date.compact())
}

pub fn daily_active_users_key(date: DateBucket) -> String {
    date.compact()
}

pub fn consent_key(user_id: &str) -> String {
    user_id.to_string()
}
