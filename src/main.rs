use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::Me;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

mod config;
mod db;
mod handlers;
mod keep_alive;
mod media;
mod naming;
mod state;
mod utils;

use config::CONFIG;
use handlers::{commands, documents};
use media::remux::{FfmpegRemuxer, Remuxer};
use state::AppState;
use utils::logging::init_logging;
use utils::telegram::is_command;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case", description = "Available commands:")]
enum Command {
    #[command(description = "resume file processing")]
    Start,
    #[command(description = "pause file processing (owner only)")]
    Stop,
    #[command(description = "show help")]
    Help,
    #[command(description = "save a photo as your thumbnail")]
    SetThumb,
    #[command(description = "remove your saved thumbnail")]
    DeleteThumb,
    #[command(description = "show your saved thumbnail")]
    ViewThumb,
    #[command(description = "show bot status (owner only)")]
    Status,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

fn is_set_thumb_caption(message: &Message, me: &Me) -> bool {
    message.photo().is_some()
        && message
            .caption()
            .is_some_and(|caption| is_command(caption, "set_thumb", me.username()))
}

fn build_bot() -> anyhow::Result<Bot> {
    let bot = Bot::new(CONFIG.bot_token.clone());
    match &CONFIG.bot_api_url {
        Some(raw) => {
            let url = url::Url::parse(raw)
                .map_err(|err| anyhow::anyhow!("Invalid BOT_API_URL '{raw}': {err}"))?;
            info!("Using Bot API server at {}", url);
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();

    let token_missing = std::env::var("BOT_TOKEN")
        .map(|token| token.trim().is_empty())
        .unwrap_or(true);
    if token_missing {
        return Err("BOT_TOKEN is required".into());
    }

    let _guards = init_logging(&CONFIG.log_level);
    info!("Starting thumbnail rename bot");

    tokio::fs::create_dir_all(&CONFIG.thumbnail_dir).await?;
    tokio::fs::create_dir_all(&CONFIG.download_dir).await?;

    let thumbnails = db::open_store(&CONFIG).await?;
    let remuxer: Arc<dyn Remuxer> = Arc::new(FfmpegRemuxer::new(
        CONFIG.ffmpeg_path.clone(),
        CONFIG.remux_timeout,
    ));
    info!("Remux: {}", CONFIG.remux_options.describe());
    let state = AppState::new(
        thumbnails,
        remuxer,
        Duration::from_secs(CONFIG.rate_limit_seconds),
    );

    let processing = state.processing.clone();
    tokio::spawn(async move {
        if let Err(err) = keep_alive::serve(CONFIG.port, processing).await {
            error!("Keep-alive endpoint stopped: {err}");
        }
    });

    let bot = build_bot()?;
    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {err}");
    }

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message, me: Me| is_set_thumb_caption(&msg, &me))
                .endpoint(handle_set_thumb),
        )
        .branch(
            dptree::filter(|msg: Message| msg.document().is_some()).endpoint(handle_document),
        )
        .endpoint(ignore_message);

    Dispatcher::builder(bot, message_handler)
        .dependencies(dptree::deps![state.clone()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    state.thumbnails.close().await;
    info!("Bot stopped");
    Ok(())
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    match command {
        Command::Start => commands::start_handler(bot, state, message).await?,
        Command::Stop => commands::stop_handler(bot, state, message).await?,
        Command::Help => commands::help_handler(bot, message).await?,
        Command::SetThumb => handle_set_thumb(bot, state, message).await?,
        Command::DeleteThumb => commands::delete_thumb_handler(bot, state, message).await?,
        Command::ViewThumb => commands::view_thumb_handler(bot, state, message).await?,
        Command::Status => commands::status_handler(bot, state, message).await?,
    }
    Ok(())
}

async fn handle_set_thumb(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    tokio::spawn(async move {
        if let Err(err) = commands::set_thumb_handler(bot.clone(), state, message.clone()).await {
            error!("set_thumb handler failed: {err:#}");
            let _ = bot
                .send_message(message.chat.id, format!("❌ Failed to save thumbnail: {err}"))
                .await;
        }
    });
    Ok(())
}

async fn handle_document(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    tokio::spawn(async move {
        if let Err(err) = documents::process_document(bot, state, message).await {
            error!("document handler failed: {err:#}");
        }
    });
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
