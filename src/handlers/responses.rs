use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ReplyParameters};
use teloxide::RequestError;
use tracing::warn;

const TELEGRAM_RETRY_ATTEMPTS: usize = 3;

fn telegram_retryable_error(err: &RequestError) -> bool {
    matches!(
        err,
        RequestError::Network(_) | RequestError::RetryAfter(_) | RequestError::Io(_)
    )
}

pub async fn reply_text(bot: &Bot, message: &Message, text: impl Into<String>) -> Result<Message> {
    Ok(bot
        .send_message(message.chat.id, text.into())
        .reply_parameters(ReplyParameters::new(message.id))
        .await?)
}

pub struct OutgoingDocument<'a> {
    pub path: &'a Path,
    pub file_name: &'a str,
    pub thumbnail: Option<&'a Path>,
    pub caption: &'a str,
}

pub async fn send_document_with_retry(
    bot: &Bot,
    chat_id: ChatId,
    document: &OutgoingDocument<'_>,
    reply_to: Option<MessageId>,
) -> Result<Message> {
    let mut delay = Duration::from_secs_f32(1.5);
    for attempt in 0..TELEGRAM_RETRY_ATTEMPTS {
        let input = InputFile::file(document.path.to_path_buf())
            .file_name(document.file_name.to_string());
        let mut request = bot
            .send_document(chat_id, input)
            .caption(document.caption.to_string());
        if let Some(thumbnail) = document.thumbnail {
            request = request.thumbnail(InputFile::file(thumbnail.to_path_buf()));
        }
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(reply_to));
        }
        match request.await {
            Ok(message) => return Ok(message),
            Err(err) => {
                if !telegram_retryable_error(&err) || attempt + 1 == TELEGRAM_RETRY_ATTEMPTS {
                    return Err(err.into());
                }
                warn!("send_document attempt {} failed: {err}", attempt + 1);
                if let RequestError::RetryAfter(wait) = err {
                    tokio::time::sleep(wait.duration()).await;
                } else {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    unreachable!("send_document retry loop exhausted")
}
