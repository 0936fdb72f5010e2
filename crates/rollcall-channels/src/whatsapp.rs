//! WhatsApp channel over an HTTP bridge.
//!
//! The bridge runs the WhatsApp Web session and exposes a small REST API
//! (send text, send poll, read chat history, list group participants).
//! Requires: bridge base URL + session name, optionally an API key.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use rollcall_core::config::WhatsAppConfig;
use rollcall_core::error::{Result, RollCallError};
use rollcall_core::traits::{MessageTransport, RosterAccessor};
use rollcall_core::types::{
    HistoryMessage, OutgoingMessage, Participant, PollRequest, PollVote, ReactionGroup,
    SentMessage,
};
use tokio::sync::OnceCell;

/// WhatsApp bridge client.
pub struct WhatsAppBridge {
    config: WhatsAppConfig,
    client: reqwest::Client,
    self_id: OnceCell<String>,
}

impl WhatsAppBridge {
    pub fn new(config: WhatsAppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RollCallError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            self_id: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.bridge_url.trim_end_matches('/'), path)
    }

    fn session_url(&self, path: &str) -> String {
        self.url(&format!("/api/{}{}", self.config.session, path))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            req
        } else {
            req.header("X-Api-Key", &self.config.api_key)
        }
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| RollCallError::Channel(format!("WhatsApp bridge request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RollCallError::Channel(format!(
                "WhatsApp bridge error {status}: {error_text}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RollCallError::Channel(format!("Invalid bridge response: {e}")))?;
        parse_body(&body)
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<(StatusCode, serde_json::Value)> {
        let response = self
            .authorize(self.client.post(self.url(path)))
            .json(body)
            .send()
            .await
            .map_err(|e| RollCallError::Channel(format!("WhatsApp bridge request failed: {e}")))?;

        let status = response.status();
        let value = if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| RollCallError::Channel(format!("Invalid bridge response: {e}")))?;
            parse_body(&body)?
        } else {
            serde_json::Value::String(response.text().await.unwrap_or_default())
        };
        Ok((status, value))
    }

    /// Check the bridge session is up. Called once at startup.
    pub async fn verify(&self) -> Result<String> {
        let me = self.self_identity().await?;
        tracing::info!("WhatsApp bridge: connected as {} (session={})", me, self.config.session);
        Ok(me)
    }
}

#[async_trait]
impl RosterAccessor for WhatsAppBridge {
    async fn participants(&self, group: &str) -> Result<Vec<Participant>> {
        let url = self.session_url(&format!("/groups/{group}/participants"));
        let value = self.get_json(&url).await.map_err(|e| RollCallError::RosterUnavailable {
            group: group.to_string(),
            reason: e.to_string(),
        })?;
        let participants = parse_participants(&value);
        if participants.is_empty() {
            return Err(RollCallError::RosterUnavailable {
                group: group.to_string(),
                reason: "bridge returned no participants".into(),
            });
        }
        Ok(participants)
    }

    async fn self_identity(&self) -> Result<String> {
        let id = self
            .self_id
            .get_or_try_init(|| async {
                let value = self.get_json(&self.session_url("/me")).await?;
                serialized_id(&value["id"])
                    .or_else(|| serialized_id(&value))
                    .ok_or_else(|| RollCallError::AuthFailed("Bridge session has no account id".into()))
            })
            .await?;
        Ok(id.clone())
    }
}

#[async_trait]
impl MessageTransport for WhatsAppBridge {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<SentMessage> {
        let mut body = serde_json::json!({
            "session": self.config.session,
            "chatId": message.thread_id,
            "text": message.content,
        });
        if !message.mentions.is_empty() {
            body["mentions"] = serde_json::json!(message.mentions);
        }
        if let Some(reply_to) = &message.reply_to {
            body["reply_to"] = serde_json::json!(reply_to);
        }

        let (status, value) = self.post_json("/api/sendText", &body).await?;
        if !status.is_success() {
            return Err(RollCallError::Channel(format!(
                "WhatsApp sendText error {status}: {value}"
            )));
        }

        let sent = sent_message(&value);
        tracing::debug!("WhatsApp message sent: {} → {}", sent.id, message.thread_id);
        Ok(sent)
    }

    async fn send_poll(&self, group: &str, poll: &PollRequest) -> Result<SentMessage> {
        let body = serde_json::json!({
            "session": self.config.session,
            "chatId": group,
            "poll": {
                "name": poll.question,
                "options": poll.options,
                "multipleAnswers": poll.allow_multiple,
            }
        });

        let (status, value) = self.post_json("/api/sendPoll", &body).await?;
        match status {
            s if s.is_success() => {
                let sent = sent_message(&value);
                tracing::debug!("WhatsApp poll sent: {} → {}", sent.id, group);
                Ok(sent)
            }
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                Err(RollCallError::PollUnsupported(format!("bridge answered {status}")))
            }
            _ => Err(RollCallError::Channel(format!(
                "WhatsApp sendPoll error {status}: {value}"
            ))),
        }
    }

    async fn fetch_recent_messages(&self, group: &str, limit: usize) -> Result<Vec<HistoryMessage>> {
        let url = self.session_url(&format!("/chats/{group}/messages?limit={limit}"));
        let value = self.get_json(&url).await.map_err(|e| RollCallError::HistoryFetchFailed {
            group: group.to_string(),
            reason: e.to_string(),
        })?;
        let mut messages = parse_history(&value);
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }
}

// --- Bridge payload parsing ---

/// Identity fields come either as plain strings or as `{ "_serialized": .. }`.
pub(crate) fn serialized_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Object(_) => value["_serialized"]
            .as_str()
            .or_else(|| value["id"].as_str())
            .filter(|s| !s.is_empty())
            .map(String::from),
        _ => None,
    }
}

/// Unix seconds (or milliseconds) into a UTC timestamp.
pub(crate) fn unix_time(value: &serde_json::Value) -> DateTime<Utc> {
    let raw = value.as_i64().unwrap_or(0);
    let secs = if raw > 100_000_000_000 { raw / 1000 } else { raw };
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

fn sent_message(value: &serde_json::Value) -> SentMessage {
    let id = serialized_id(&value["id"])
        .or_else(|| value["key"]["id"].as_str().map(String::from))
        .unwrap_or_else(|| "unknown".to_string());
    let timestamp = if value["timestamp"].is_null() {
        Utc::now()
    } else {
        unix_time(&value["timestamp"])
    };
    SentMessage { id, timestamp }
}

pub(crate) fn parse_participants(value: &serde_json::Value) -> Vec<Participant> {
    let list = value
        .as_array()
        .or_else(|| value["participants"].as_array())
        .cloned()
        .unwrap_or_default();

    list.iter()
        .filter_map(|p| serialized_id(&p["id"]).or_else(|| serialized_id(p)))
        .map(Participant::new)
        .collect()
}

pub(crate) fn parse_history(value: &serde_json::Value) -> Vec<HistoryMessage> {
    let list = value
        .as_array()
        .or_else(|| value["messages"].as_array())
        .cloned()
        .unwrap_or_default();

    list.iter().filter_map(parse_history_message).collect()
}

fn parse_history_message(msg: &serde_json::Value) -> Option<HistoryMessage> {
    let id = serialized_id(&msg["id"])?;
    let from_self = msg["fromMe"].as_bool().unwrap_or(false);
    let sender_id = serialized_id(&msg["author"])
        .or_else(|| serialized_id(&msg["participant"]))
        .or_else(|| serialized_id(&msg["from"]))
        .unwrap_or_default();
    let msg_type = msg["type"].as_str().unwrap_or("chat");

    let reactions = msg["reactions"]
        .as_array()
        .map(|groups| {
            groups
                .iter()
                .filter_map(|g| {
                    let emoji = g["emoji"].as_str().or_else(|| g["aggregateEmoji"].as_str())?;
                    let senders = g["senders"]
                        .as_array()
                        .map(|s| {
                            s.iter()
                                .filter_map(|x| serialized_id(&x["senderId"]).or_else(|| serialized_id(x)))
                                .collect()
                        })
                        .unwrap_or_default();
                    Some(ReactionGroup { emoji: emoji.to_string(), senders })
                })
                .collect()
        })
        .unwrap_or_default();

    let poll_votes = msg["pollVotes"]
        .as_array()
        .map(|votes| {
            votes
                .iter()
                .filter_map(|v| {
                    let sender = serialized_id(&v["sender"]).or_else(|| serialized_id(&v["voter"]))?;
                    let selected_options = v["selectedOptions"]
                        .as_array()
                        .map(|opts| {
                            opts.iter()
                                .filter_map(|o| o["name"].as_str().or_else(|| o.as_str()))
                                .map(String::from)
                                .collect()
                        })
                        .unwrap_or_default();
                    Some(PollVote { sender, selected_options })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(HistoryMessage {
        id,
        sender_id,
        body: msg["body"].as_str().unwrap_or("").to_string(),
        timestamp: unix_time(&msg["timestamp"]),
        from_self,
        is_poll: msg_type == "poll_creation",
        reactions,
        poll_votes,
        quoted_id: serialized_id(&msg["quotedMsgId"])
            .or_else(|| serialized_id(&msg["replyTo"]["id"])),
    })
}

/// Bridge response body as JSON. Some endpoints answer 200 with no body.
fn parse_body(body: &str) -> Result<serde_json::Value> {
    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body("").unwrap(), serde_json::Value::Null);
        assert_eq!(parse_body(r#"{"id":"X"}"#).unwrap()["id"], "X");
        let err = parse_body("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, RollCallError::Serialization(_)));
    }

    #[test]
    fn test_parse_participants_both_shapes() {
        let value = serde_json::json!([
            {"id": {"_serialized": "5511900000001@c.us", "user": "5511900000001"}},
            {"id": "5511900000002@c.us"},
            "5511900000003@c.us",
            {"isAdmin": true}
        ]);
        let roster = parse_participants(&value);
        assert_eq!(roster.len(), 3);
        assert_eq!(roster[0].handle, "5511900000001");
        assert_eq!(roster[2].id, "5511900000003@c.us");
    }

    #[test]
    fn test_parse_history_reactions_and_votes() {
        let value = serde_json::json!({"messages": [
            {
                "id": {"_serialized": "true_g@g.us_ABC"},
                "fromMe": true,
                "from": "bot@c.us",
                "type": "poll_creation",
                "body": "📊 Tiragem de Falta - 16/10/2026",
                "timestamp": 1_792_152_000,
                "pollVotes": [
                    {"sender": "a@c.us", "selectedOptions": [{"name": "✅ Presente"}]}
                ]
            },
            {
                "id": "false_g@g.us_DEF",
                "fromMe": false,
                "author": "b@c.us",
                "body": "1",
                "timestamp": 1_792_152_060_000_i64,
                "quotedMsgId": "true_g@g.us_ABC",
                "reactions": [
                    {"emoji": "✅", "senders": [{"senderId": "c@c.us"}, "d@c.us"]}
                ]
            }
        ]});
        let history = parse_history(&value);
        assert_eq!(history.len(), 2);
        assert!(history[0].is_poll);
        assert_eq!(history[0].poll_votes[0].selected_options, vec!["✅ Presente"]);
        assert_eq!(history[1].sender_id, "b@c.us");
        assert_eq!(history[1].quoted_id.as_deref(), Some("true_g@g.us_ABC"));
        assert_eq!(history[1].reactions[0].senders, vec!["c@c.us", "d@c.us"]);
        // Millisecond timestamps are normalised.
        assert_eq!(history[1].timestamp.timestamp(), 1_792_152_060);
    }

    #[test]
    fn test_sent_message_fallback_id() {
        let sent = sent_message(&serde_json::json!({}));
        assert_eq!(sent.id, "unknown");
        let sent = sent_message(&serde_json::json!({"key": {"id": "K1"}, "timestamp": 10}));
        assert_eq!(sent.id, "K1");
        assert_eq!(sent.timestamp.timestamp(), 10);
    }

    #[test]
    fn test_urls() {
        let bridge = WhatsAppBridge::new(WhatsAppConfig {
            bridge_url: "http://bridge:3001/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(bridge.url("/api/sendText"), "http://bridge:3001/api/sendText");
        assert_eq!(bridge.session_url("/me"), "http://bridge:3001/api/default/me");
    }
}
