use crate::AppState;
use anyhow::Result;
use pgcet_core::dialogue::{Reply, Sender};
use pgcet_notifier::telegram::{TelegramClient, Update};
use std::time::Duration;
use tokio::time::sleep;

const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub async fn run(state: AppState, telegram: TelegramClient) {
    tracing::info!("telegram bot polling");
    let mut offset: Option<i64> = None;
    loop {
        match telegram.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    let update_id = update.update_id;
                    if let Err(e) = handle_update(&state, &telegram, update).await {
                        tracing::warn!(update_id, error = %e, "failed to handle update");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "getUpdates failed; retrying");
                sleep(RETRY_DELAY).await;
            }
        }
    }
}

async fn handle_update(state: &AppState, telegram: &TelegramClient, update: Update) -> Result<()> {
    let Some(message) = update.message else { return Ok(()) };
    let Some(text) = message.text.as_deref() else { return Ok(()) };
    let chat_id = message.chat.id;
    let sender = match &message.from {
        Some(user) => Sender::new(user.id, Some(user.first_name.clone())),
        None => Sender::new(chat_id, None),
    };
    let reply = state.dialogue.handle(&sender, text)?;
    deliver(state, telegram, chat_id, reply).await
}

pub async fn deliver(state: &AppState, telegram: &TelegramClient, chat_id: i64, reply: Reply) -> Result<()> {
    match state.resolve_reply(reply).await {
        Reply::Text { text, markdown } => telegram.send_message(chat_id, &text, markdown).await,
        Reply::Document { document } => {
            let path = state.docs_dir.join(document.file_name());
            match std::fs::read(&path) {
                Ok(bytes) => telegram.send_document(chat_id, bytes, document.display_name()).await,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "document missing");
                    telegram
                        .send_message(chat_id, "⚠️ That document is not available right now. Please try again later.", false)
                        .await
                }
            }
        }
        Reply::Announcements | Reply::Silent => Ok(()),
    }
}
