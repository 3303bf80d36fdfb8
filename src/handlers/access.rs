use teloxide::prelude::*;
use teloxide::types::ReplyParameters;
use tracing::warn;

use crate::config::CONFIG;
use crate::utils::telegram::sender_id;

pub fn is_owner(user_id: Option<i64>) -> bool {
    user_id.is_some_and(|id| CONFIG.is_owner(id))
}

/// Replies with a refusal and returns false unless the sender is `OWNER_ID`.
pub async fn check_owner_access(bot: &Bot, message: &Message, command: &str) -> bool {
    let user_id = sender_id(message);
    if is_owner(user_id) {
        return true;
    }

    let notice = if CONFIG.owner_id.is_none() {
        "This command is disabled because no bot owner is configured."
    } else {
        "You are not authorized to use this command."
    };
    warn!("Rejected /{} from user {:?}", command, user_id);
    let _ = bot
        .send_message(message.chat.id, notice)
        .reply_parameters(ReplyParameters::new(message.id))
        .await;
    false
}
