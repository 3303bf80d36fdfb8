use std::time::Instant;

use chrono::{DateTime, Utc};
use teloxide::types::Message;
use tracing::info;

use crate::utils::logging::TIMING_TARGET;

const LOGGED_TEXT_LIMIT: usize = 300;

#[derive(Debug)]
pub struct CommandTimer {
    command: String,
    chat_id: Option<i64>,
    user_id: Option<i64>,
    message_id: Option<i64>,
    text: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

fn loggable_text(message: &Message) -> Option<String> {
    message
        .text()
        .or_else(|| message.caption())
        .or_else(|| message.document().and_then(|doc| doc.file_name.as_deref()))
        .map(|value| {
            value
                .replace('\n', " ")
                .chars()
                .take(LOGGED_TEXT_LIMIT)
                .collect()
        })
}

impl CommandTimer {
    pub fn from_message(command: &str, message: &Message) -> Self {
        let user = message.from.as_ref();
        CommandTimer {
            command: command.to_string(),
            chat_id: Some(message.chat.id.0),
            user_id: user.and_then(|u| i64::try_from(u.id.0).ok()),
            message_id: Some(message.id.0 as i64),
            text: loggable_text(message),
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "aborted".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=command_received command={} chat_id={:?} user_id={:?} message_id={:?} received_at={} text={:?}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            self.text
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=command_completed command={} chat_id={:?} user_id={:?} message_id={:?} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

// A timer dropped on an early return still gets its completion line.
impl Drop for CommandTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_command_timer(command: &str, message: &Message) -> CommandTimer {
    let timer = CommandTimer::from_message(command, message);
    timer.log_received();
    timer
}

pub fn complete_command_timer(timer: &mut CommandTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}
