use std::sync::Mutex;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, MediaKind, MessageId, MessageKind as TgMessageKind, Recipient, UpdateKind,
};
use teloxide::{ApiError, RequestError};
use tracing::{debug, info, warn};

use super::{newest_first, Deliverer, MessageKind, RecipientId, Session, SourceMessage, SourceReader};
use crate::error::{DeliveryError, FetchError};

/// Upper bound Telegram accepts for a single getUpdates call
const UPDATE_BATCH: u8 = 100;

/// Bot API transport.
///
/// The source window is read from the bot's pending update queue (messages and
/// channel posts). Updates stay queued until [`SourceReader::acknowledge`] is
/// called, so a run that dies before saving its cursor sees the same window again.
pub struct TelegramTransport {
    bot: Bot,
    /// Update ids seen by the last fetch, with the source message id they
    /// carried (`None` for updates from other chats)
    seen: Mutex<Vec<(Option<u64>, u32)>>,
}

impl TelegramTransport {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Resolve a chat id or `@username` and return its canonical id plus a
    /// debug dump of everything Telegram reports about it.
    pub async fn lookup_chat(&self, target: &RecipientId) -> Result<(i64, String), FetchError> {
        let recipient =
            parse_recipient(target).map_err(|e| FetchError::Unreachable(e.to_string()))?;
        let chat = self.bot.get_chat(recipient).await.map_err(fetch_error)?;
        Ok((chat.id.0, format!("{:#?}", chat)))
    }
}

#[async_trait]
impl Session for TelegramTransport {
    async fn connect(&self) -> Result<(), FetchError> {
        let me = self.bot.get_me().await.map_err(fetch_error)?;
        info!("Connected as @{} ({})", me.username(), me.id.0);
        Ok(())
    }

    async fn disconnect(&self) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.clear();
        }
        debug!("Telegram session closed");
    }
}

#[async_trait]
impl SourceReader for TelegramTransport {
    async fn fetch_recent(&self, chat: i64, limit: usize) -> Result<Vec<SourceMessage>, FetchError> {
        let updates = self
            .bot
            .get_updates()
            .limit(UPDATE_BATCH)
            .timeout(0)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost])
            .await
            .map_err(fetch_error)?;

        debug!("Fetched {} pending update(s)", updates.len());

        let mut seen = Vec::with_capacity(updates.len());
        let mut messages = Vec::new();
        for update in updates {
            let message = match update.kind {
                UpdateKind::Message(m) | UpdateKind::ChannelPost(m) => m,
                _ => {
                    seen.push((None, update.id.0));
                    continue;
                }
            };
            let id = u64::try_from(message.id.0).ok();
            match id {
                Some(id) if message.chat.id.0 == chat => {
                    seen.push((Some(id), update.id.0));
                    messages.push(to_source_message(&message, id));
                }
                _ => seen.push((None, update.id.0)),
            }
        }

        if let Ok(mut guard) = self.seen.lock() {
            *guard = seen;
        }

        Ok(newest_first(messages, limit))
    }

    async fn acknowledge(&self, up_to: u64) {
        let last_update = match self.seen.lock() {
            Ok(seen) => seen
                .iter()
                .filter(|(message_id, _)| message_id.map_or(true, |id| id <= up_to))
                .map(|(_, update_id)| *update_id)
                .max(),
            Err(_) => None,
        };
        let Some(last_update) = last_update else {
            return;
        };

        // Asking for updates past an offset confirms everything before it.
        let Ok(offset) = i32::try_from(u64::from(last_update) + 1) else {
            return;
        };
        match self
            .bot
            .get_updates()
            .offset(offset)
            .limit(1)
            .timeout(0)
            .await
        {
            Ok(_) => debug!("Acknowledged updates up to {}", last_update),
            Err(e) => warn!("Failed to acknowledge updates up to {}: {}", last_update, e),
        }
    }
}

#[async_trait]
impl Deliverer for TelegramTransport {
    async fn send(
        &self,
        recipient: &RecipientId,
        message: &SourceMessage,
    ) -> Result<(), DeliveryError> {
        let target = parse_recipient(recipient)?;
        let message_id = i32::try_from(message.id)
            .map_err(|_| DeliveryError::Permanent(format!("message id {} out of range", message.id)))?;

        self.bot
            .copy_message(target, ChatId(message.chat_id), MessageId(message_id))
            .await
            .map(|_| ())
            .map_err(delivery_error)
    }
}

fn to_source_message(message: &Message, id: u64) -> SourceMessage {
    let out = SourceMessage::new(id, message_kind(message), message.chat.id.0);
    match message.text().or_else(|| message.caption()) {
        Some(text) => out.with_preview(text),
        None => out,
    }
}

/// Anything carrying non-poll media counts as media, whatever its type.
fn message_kind(message: &Message) -> MessageKind {
    match &message.kind {
        TgMessageKind::Common(common) => match &common.media_kind {
            MediaKind::Poll(_) => MessageKind::Poll,
            MediaKind::Text(text) if text.text.trim().is_empty() => MessageKind::Empty,
            MediaKind::Text(_) => MessageKind::Text,
            _ => MessageKind::Media,
        },
        TgMessageKind::Dice(_) | TgMessageKind::Invoice(_) => MessageKind::Media,
        _ => MessageKind::Other,
    }
}

/// Numeric ids are chats; `@name` is a public channel or group username.
fn parse_recipient(recipient: &RecipientId) -> Result<Recipient, DeliveryError> {
    let raw = recipient.as_str().trim();
    if let Ok(id) = raw.parse::<i64>() {
        return Ok(Recipient::Id(ChatId(id)));
    }
    if raw.starts_with('@') && raw.len() > 1 {
        return Ok(Recipient::ChannelUsername(raw.to_string()));
    }
    Err(DeliveryError::Permanent(format!(
        "unrecognised recipient {:?}",
        raw
    )))
}

fn fetch_error(err: RequestError) -> FetchError {
    match err {
        RequestError::Api(ApiError::InvalidToken) => FetchError::Unauthorized(err.to_string()),
        other => FetchError::Unreachable(other.to_string()),
    }
}

fn delivery_error(err: RequestError) -> DeliveryError {
    match err {
        RequestError::RetryAfter(wait) => DeliveryError::RateLimited(wait.duration()),
        RequestError::Network(e) => DeliveryError::Transient(e.to_string()),
        RequestError::Io(e) => DeliveryError::Transient(e.to_string()),
        other => DeliveryError::Permanent(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use teloxide::types::Seconds;

    fn channel_post(content: serde_json::Value) -> Message {
        let mut json = serde_json::json!({
            "message_id": 42,
            "date": 1700000000,
            "chat": { "id": -1001234567890_i64, "type": "channel", "title": "source" }
        });
        if let (Some(target), Some(extra)) = (json.as_object_mut(), content.as_object()) {
            for (k, v) in extra {
                target.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_text_message_kind() {
        let m = channel_post(serde_json::json!({ "text": "hello" }));
        assert_eq!(message_kind(&m), MessageKind::Text);
    }

    #[test]
    fn test_photo_message_kind() {
        let m = channel_post(serde_json::json!({
            "photo": [{ "file_id": "f", "file_unique_id": "u", "width": 1, "height": 1, "file_size": 10 }],
            "caption": "look"
        }));
        assert_eq!(message_kind(&m), MessageKind::Media);
    }

    #[test]
    fn test_venue_counts_as_media() {
        let m = channel_post(serde_json::json!({
            "location": { "latitude": 52.5, "longitude": 13.4 },
            "venue": {
                "location": { "latitude": 52.5, "longitude": 13.4 },
                "title": "Cafe",
                "address": "Main street 1"
            }
        }));
        assert_eq!(message_kind(&m), MessageKind::Media);
    }

    #[test]
    fn test_dice_counts_as_media() {
        let m = channel_post(serde_json::json!({ "dice": { "emoji": "🎲", "value": 4 } }));
        assert_eq!(message_kind(&m), MessageKind::Media);
    }

    #[test]
    fn test_poll_message_kind() {
        let m = channel_post(serde_json::json!({
            "poll": {
                "id": "1",
                "question": "Lunch?",
                "options": [
                    { "text": "yes", "voter_count": 0 },
                    { "text": "no", "voter_count": 0 }
                ],
                "total_voter_count": 0,
                "is_closed": false,
                "is_anonymous": true,
                "type": "regular",
                "allows_multiple_answers": false
            }
        }));
        assert_eq!(message_kind(&m), MessageKind::Poll);
    }

    #[test]
    fn test_service_message_is_other() {
        let m = channel_post(serde_json::json!({ "new_chat_title": "renamed" }));
        assert_eq!(message_kind(&m), MessageKind::Other);
    }

    #[test]
    fn test_parse_numeric_recipient() {
        let r = parse_recipient(&RecipientId::new("6339008344")).unwrap();
        assert_eq!(r, Recipient::Id(ChatId(6339008344)));
    }

    #[test]
    fn test_parse_negative_chat_recipient() {
        let r = parse_recipient(&RecipientId::new("-1001234567890")).unwrap();
        assert_eq!(r, Recipient::Id(ChatId(-1001234567890)));
    }

    #[test]
    fn test_parse_username_recipient() {
        let r = parse_recipient(&RecipientId::new("@relay_target")).unwrap();
        assert_eq!(r, Recipient::ChannelUsername("@relay_target".to_string()));
    }

    #[test]
    fn test_parse_garbage_recipient_is_permanent() {
        let err = parse_recipient(&RecipientId::new("priya")).unwrap_err();
        assert!(matches!(err, DeliveryError::Permanent(_)));
        let err = parse_recipient(&RecipientId::new("@")).unwrap_err();
        assert!(matches!(err, DeliveryError::Permanent(_)));
    }

    #[test]
    fn test_retry_after_maps_to_rate_limit() {
        let err = delivery_error(RequestError::RetryAfter(Seconds::from_seconds(12)));
        assert_eq!(err, DeliveryError::RateLimited(Duration::from_secs(12)));
    }

    #[test]
    fn test_api_errors_are_permanent() {
        let err = delivery_error(RequestError::Api(ApiError::BotBlocked));
        assert!(matches!(err, DeliveryError::Permanent(_)));
    }

    #[test]
    fn test_io_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = delivery_error(RequestError::Io(std::sync::Arc::new(io)));
        assert!(matches!(err, DeliveryError::Transient(_)));
    }

    #[test]
    fn test_invalid_token_is_unauthorized() {
        let err = fetch_error(RequestError::Api(ApiError::InvalidToken));
        assert!(matches!(err, FetchError::Unauthorized(_)));
    }
}
