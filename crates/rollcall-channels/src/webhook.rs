//! Bridge webhook events → typed `InboundEvent`s.
//! Handles: message, message.any (own messages only), poll.vote, message.reaction.

use rollcall_core::types::{InboundEvent, IncomingMessage, PollVote, ThreadType};

use crate::whatsapp::{serialized_id, unix_time};

/// Parse one webhook delivery. Returns `None` for events the bot ignores.
pub fn parse_bridge_event(body: &serde_json::Value) -> Option<InboundEvent> {
    let event = body["event"].as_str().unwrap_or("");
    let payload = &body["payload"];

    match event {
        // `message.any` repeats incoming messages; only keep our own from it.
        "message" => parse_message(payload).filter(|m| !m.from_self).map(InboundEvent::Message),
        "message.any" => parse_message(payload).filter(|m| m.from_self).map(InboundEvent::Message),
        "poll.vote" => parse_poll_vote(payload),
        "message.reaction" => parse_reaction(payload),
        other => {
            tracing::trace!("Ignoring bridge event '{}'", other);
            None
        }
    }
}

fn is_group(id: &str) -> bool {
    id.ends_with("@g.us")
}

/// Pick the group side of a from/to pair.
fn group_of(payload: &serde_json::Value) -> Option<String> {
    [&payload["from"], &payload["to"]]
        .into_iter()
        .filter_map(serialized_id)
        .find(|id| is_group(id))
}

fn parse_message(payload: &serde_json::Value) -> Option<IncomingMessage> {
    let id = serialized_id(&payload["id"])?;
    let from_self = payload["fromMe"].as_bool().unwrap_or(false);
    let from = serialized_id(&payload["from"]).unwrap_or_default();
    let to = serialized_id(&payload["to"]).unwrap_or_default();

    let (thread_id, thread_type) = match group_of(payload) {
        Some(group) => (group, ThreadType::Group),
        None if from_self => (to.clone(), ThreadType::Direct),
        None => (from.clone(), ThreadType::Direct),
    };
    if thread_id.is_empty() {
        return None;
    }

    let sender_id = serialized_id(&payload["author"])
        .or_else(|| serialized_id(&payload["participant"]))
        .unwrap_or_else(|| if from_self { to.clone() } else { from.clone() });

    Some(IncomingMessage {
        id,
        thread_id,
        thread_name: payload["chatName"]
            .as_str()
            .or_else(|| payload["_data"]["chatName"].as_str())
            .map(String::from),
        sender_id: if from_self && thread_type == ThreadType::Group {
            from
        } else {
            sender_id
        },
        sender_name: payload["_data"]["notifyName"].as_str().map(String::from),
        content: payload["body"].as_str().unwrap_or("").to_string(),
        thread_type,
        from_self,
        timestamp: unix_time(&payload["timestamp"]),
        reply_to: serialized_id(&payload["replyTo"]["id"])
            .or_else(|| serialized_id(&payload["quotedMsgId"])),
    })
}

fn parse_poll_vote(payload: &serde_json::Value) -> Option<InboundEvent> {
    let vote = &payload["vote"];
    let poll = &payload["poll"];
    let group = group_of(vote).or_else(|| group_of(poll))?;
    let sender = serialized_id(&vote["participant"]).or_else(|| serialized_id(&vote["from"]))?;
    let selected_options = vote["selectedOptions"]
        .as_array()
        .map(|opts| {
            opts.iter()
                .filter_map(|o| o.as_str().or_else(|| o["name"].as_str()))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Some(InboundEvent::PollVote {
        group,
        poll_id: serialized_id(&poll["id"]).unwrap_or_default(),
        vote: PollVote { sender, selected_options },
        at: unix_time(&vote["timestamp"]),
    })
}

fn parse_reaction(payload: &serde_json::Value) -> Option<InboundEvent> {
    let group = group_of(payload)?;
    let sender = serialized_id(&payload["participant"]).or_else(|| serialized_id(&payload["from"]))?;
    let reaction = &payload["reaction"];
    Some(InboundEvent::Reaction {
        group,
        message_id: serialized_id(&reaction["messageId"]).unwrap_or_default(),
        sender,
        // An empty text means the reaction was removed.
        emoji: reaction["text"].as_str().unwrap_or("").to_string(),
        at: unix_time(&payload["timestamp"]),
    })
}
