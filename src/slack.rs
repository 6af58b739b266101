use crate::error::{Result, SlackError};
use crate::logs::LogMessage;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

const SLACK_API_BASE: &str = "https://slack.com/api";

// An inbound event after envelope unwrapping, reduced to the fields the bot
// acts on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub channel_type: String,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub files: Vec<InboundFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub url_private_download: String,
}

impl InboundEvent {
    // Noise filter: bot echoes, edits/joins/etc. (any subtype), and traffic
    // outside direct-message channels are dropped without a reply.
    pub fn is_actionable_dm(&self) -> bool {
        self.event_type == "message"
            && self.bot_id.is_none()
            && self.subtype.is_none()
            && self.channel_type == "im"
            && !self.user.is_empty()
    }

    // A channel mention of the bot. Carries no creation state; the reply
    // goes back in-thread.
    pub fn is_mention(&self) -> bool {
        self.event_type == "app_mention" && self.bot_id.is_none() && !self.user.is_empty()
    }

    pub fn pdf_attachment(&self) -> Option<&InboundFile> {
        self.files.iter().find(|f| {
            f.mimetype == "application/pdf" || f.name.to_lowercase().ends_with(".pdf")
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub name: String,
}

impl SlackUser {
    // Workspace members eligible for onboarding. Slackbot hides behind a
    // fixed id rather than `is_bot`.
    pub fn is_onboardable(&self) -> bool {
        !self.is_bot && !self.deleted && self.id != "USLACKBOT"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImChannel {
    pub id: String,
    #[serde(default)]
    pub user: String,
}

pub struct SlackClient {
    http: reqwest::Client,
    bot_token: String,
    app_token: String,
}

impl SlackClient {
    pub fn new(bot_token: &str, app_token: &str) -> Self {
        SlackClient {
            http: reqwest::Client::new(),
            bot_token: bot_token.to_string(),
            app_token: app_token.to_string(),
        }
    }

    async fn call(&self, method: &str, args: Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{SLACK_API_BASE}/{method}"))
            .bearer_auth(&self.bot_token)
            .json(&args)
            .send()
            .await
            .map_err(SlackError::Http)?;
        Self::check(method, response).await
    }

    // Some Web API methods only take form-encoded arguments.
    async fn call_form(&self, method: &str, params: &[(&str, String)]) -> Result<Value> {
        let response = self
            .http
            .post(format!("{SLACK_API_BASE}/{method}"))
            .bearer_auth(&self.bot_token)
            .form(params)
            .send()
            .await
            .map_err(SlackError::Http)?;
        Self::check(method, response).await
    }

    async fn check(method: &str, response: reqwest::Response) -> Result<Value> {
        let body: Value = response.json().await.map_err(SlackError::Http)?;
        if body["ok"].as_bool() != Some(true) {
            let error = body["error"].as_str().unwrap_or("unknown_error");
            return Err(SlackError::Api(format!("{method}: {error}")).into());
        }
        Ok(body)
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        self.call(
            "chat.postMessage",
            json!({ "channel": channel, "text": text }),
        )
        .await?;
        Ok(())
    }

    // Reply inside an existing thread when the triggering message had one.
    pub async fn post_threaded(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<()> {
        let mut args = json!({ "channel": channel, "text": text });
        if let Some(ts) = thread_ts {
            args["thread_ts"] = json!(ts);
        }
        self.call("chat.postMessage", args).await?;
        Ok(())
    }

    // Opens (or reuses) the DM channel with a user and returns its id.
    pub async fn open_dm(&self, user_id: &str) -> Result<String> {
        let body = self
            .call("conversations.open", json!({ "users": user_id }))
            .await?;
        body["channel"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SlackError::Api("conversations.open: missing channel id".into()).into())
    }

    // Three-step external upload flow: reserve an upload URL, POST the
    // bytes, then complete the upload into the channel.
    pub async fn upload_file(
        &self,
        channel: &str,
        path: &Path,
        title: &str,
        initial_comment: &str,
    ) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.pdf".to_string());

        let reservation = self
            .call_form(
                "files.getUploadURLExternal",
                &[
                    ("filename", filename.clone()),
                    ("length", bytes.len().to_string()),
                ],
            )
            .await?;
        let upload_url = reservation["upload_url"]
            .as_str()
            .ok_or_else(|| SlackError::Api("files.getUploadURLExternal: missing url".into()))?
            .to_string();
        let file_id = reservation["file_id"]
            .as_str()
            .ok_or_else(|| SlackError::Api("files.getUploadURLExternal: missing file_id".into()))?
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new().part("file", part);
        self.http
            .post(&upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(SlackError::Http)?
            .error_for_status()
            .map_err(SlackError::Http)?;

        self.call(
            "files.completeUploadExternal",
            json!({
                "files": [{ "id": file_id, "title": title }],
                "channel_id": channel,
                "initial_comment": initial_comment,
            }),
        )
        .await?;
        Ok(())
    }

    // Fetches a file a user attached to a DM. Private URLs require the bot
    // token.
    pub async fn download_file(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bot_token)
            .send()
            .await
            .map_err(SlackError::Http)?
            .error_for_status()
            .map_err(SlackError::Http)?;
        let bytes = response.bytes().await.map_err(SlackError::Http)?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    // All direct-message channels the bot participates in, with the user on
    // the other end.
    pub async fn list_im_channels(&self) -> Result<Vec<ImChannel>> {
        let mut channels = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut params = vec![
                ("types", "im".to_string()),
                ("limit", "200".to_string()),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }
            let body = self.call_form("conversations.list", &params).await?;
            if let Some(list) = body["channels"].as_array() {
                for channel in list {
                    if let Ok(channel) = serde_json::from_value::<ImChannel>(channel.clone()) {
                        channels.push(channel);
                    }
                }
            }
            match body["response_metadata"]["next_cursor"].as_str() {
                Some(next) if !next.is_empty() => cursor = next.to_string(),
                _ => break,
            }
        }
        Ok(channels)
    }

    // Full message history of one channel, oldest first. Pagination only;
    // thread replies are not expanded.
    pub async fn conversation_history(&self, channel: &str) -> Result<Vec<LogMessage>> {
        let mut messages: Vec<LogMessage> = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut params = vec![
                ("channel", channel.to_string()),
                ("limit", "200".to_string()),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }
            let body = self.call_form("conversations.history", &params).await?;
            if let Some(page) = body["messages"].as_array() {
                for message in page {
                    if let Ok(message) = serde_json::from_value::<LogMessage>(message.clone()) {
                        messages.push(message);
                    }
                }
            }
            match body["response_metadata"]["next_cursor"].as_str() {
                Some(next) if !next.is_empty() => cursor = next.to_string(),
                _ => break,
            }
        }
        messages.sort_by(|a, b| a.ts_value().total_cmp(&b.ts_value()));
        Ok(messages)
    }

    pub async fn list_users(&self) -> Result<Vec<SlackUser>> {
        let mut users = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut params = vec![("limit", "200".to_string())];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }
            let body = self.call_form("users.list", &params).await?;
            if let Some(members) = body["members"].as_array() {
                for member in members {
                    if let Ok(user) = serde_json::from_value::<SlackUser>(member.clone()) {
                        users.push(user);
                    }
                }
            }
            match body["response_metadata"]["next_cursor"].as_str() {
                Some(next) if !next.is_empty() => cursor = next.to_string(),
                _ => break,
            }
        }
        Ok(users)
    }

    // Opens a Socket Mode connection. The returned listener yields events
    // and handles envelope acknowledgement internally.
    pub async fn connect_socket_mode(&self) -> Result<SocketModeListener> {
        let response = self
            .http
            .post(format!("{SLACK_API_BASE}/apps.connections.open"))
            .bearer_auth(&self.app_token)
            .send()
            .await
            .map_err(SlackError::Http)?;
        let body: Value = response.json().await.map_err(SlackError::Http)?;
        if body["ok"].as_bool() != Some(true) {
            let error = body["error"].as_str().unwrap_or("unknown_error");
            return Err(SlackError::Api(format!("apps.connections.open: {error}")).into());
        }
        let url = body["url"]
            .as_str()
            .ok_or_else(|| SlackError::Api("apps.connections.open: missing url".into()))?;

        let (stream, _) = connect_async(url).await.map_err(SlackError::WebSocket)?;
        log::info!("Socket Mode connection established.");
        Ok(SocketModeListener { stream })
    }
}

pub struct SocketModeListener {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl SocketModeListener {
    // Next inbound event. Returns Err(Disconnected) when Slack asks us to
    // reconnect or the stream closes; the caller reconnects with a fresh
    // `connect_socket_mode`.
    pub async fn next_event(&mut self) -> Result<InboundEvent> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(SlackError::WebSocket(e).into()),
                None => return Err(SlackError::Disconnected.into()),
            };

            match message {
                Message::Ping(payload) => {
                    self.stream
                        .send(Message::Pong(payload))
                        .await
                        .map_err(SlackError::WebSocket)?;
                }
                Message::Close(_) => return Err(SlackError::Disconnected.into()),
                Message::Text(text) => {
                    let envelope: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(e) => {
                            log::warn!("Unparseable Socket Mode frame: {e}");
                            continue;
                        }
                    };
                    match envelope["type"].as_str() {
                        Some("hello") => log::info!("Socket Mode hello received."),
                        Some("disconnect") => return Err(SlackError::Disconnected.into()),
                        Some("events_api") => {
                            if let Some(envelope_id) = envelope["envelope_id"].as_str() {
                                self.ack(envelope_id).await?;
                            }
                            let event = envelope["payload"]["event"].clone();
                            // team_join carries the user as an object rather
                            // than an id string.
                            if event["type"].as_str() == Some("team_join") {
                                if let Some(user_id) = event["user"]["id"].as_str() {
                                    return Ok(InboundEvent {
                                        event_type: "team_join".to_string(),
                                        user: user_id.to_string(),
                                        ..InboundEvent::default()
                                    });
                                }
                                log::warn!("team_join event with unexpected structure.");
                                continue;
                            }
                            match serde_json::from_value::<InboundEvent>(event) {
                                Ok(event) => return Ok(event),
                                Err(e) => log::warn!("Unparseable event payload: {e}"),
                            }
                        }
                        other => log::debug!("Ignoring Socket Mode frame type {other:?}"),
                    }
                }
                _ => {}
            }
        }
    }

    async fn ack(&mut self, envelope_id: &str) -> Result<()> {
        let ack = json!({ "envelope_id": envelope_id }).to_string();
        self.stream
            .send(Message::Text(ack))
            .await
            .map_err(SlackError::WebSocket)?;
        Ok(())
    }
}
