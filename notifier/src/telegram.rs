use anyhow::{anyhow, Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> { Self::with_api_base(API_BASE, token) }

    pub fn with_api_base(api_base: &str, token: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(anyhow!("empty bot token"));
        }
        // Long polls hold the connection open, so the request timeout has to outlast them.
        let client = Client::builder().timeout(Duration::from_secs(90)).build()?;
        Ok(Self { client, base: format!("{}/bot{}", api_base.trim_end_matches('/'), token.trim()) })
    }

    fn method(&self, name: &str) -> String { format!("{}/{}", self.base, name) }

    async fn call<T: DeserializeOwned>(&self, name: &str, req: RequestBuilder) -> Result<T> {
        let resp = req.send().await.with_context(|| format!("telegram {name} request failed"))?;
        let status = resp.status();
        let envelope: Envelope<T> = resp
            .json()
            .await
            .with_context(|| format!("telegram {name} returned an unreadable body ({status})"))?;
        match envelope {
            Envelope { ok: true, result: Some(result), .. } => Ok(result),
            Envelope { description, .. } => Err(anyhow!(
                "telegram {name} failed ({status}): {}",
                description.unwrap_or_else(|| "no description".into())
            )),
        }
    }

    pub async fn send_message(&self, chat_id: i64, text: &str, markdown: bool) -> Result<()> {
        let body = SendMessage { chat_id, text, parse_mode: markdown.then_some("Markdown") };
        let req = self.client.post(self.method("sendMessage")).json(&body);
        self.call::<IgnoredAny>("sendMessage", req).await?;
        Ok(())
    }

    pub async fn send_document(&self, chat_id: i64, bytes: Vec<u8>, filename: String) -> Result<()> {
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", Part::bytes(bytes).file_name(filename).mime_str("application/pdf")?);
        let req = self.client.post(self.method("sendDocument")).multipart(form);
        self.call::<IgnoredAny>("sendDocument", req).await?;
        Ok(())
    }

    /// Long-poll for new messages. Pass the last seen `update_id + 1` as `offset` to acknowledge.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        let body = GetUpdates { offset, timeout: timeout_secs, allowed_updates: ["message"] };
        let req = self.client.post(self.method("getUpdates")).json(&body);
        self.call("getUpdates", req).await
    }
}
