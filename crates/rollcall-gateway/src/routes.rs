//! API route handlers for the gateway.

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::Utc;
use rollcall_channels::parse_bridge_event;
use rollcall_core::types::InboundEvent;

use crate::server::AppState;

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "rollcall-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Live roll calls and uptime.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let store = state.scheduler.store();
    let cycles: Vec<serde_json::Value> = store
        .live_groups()
        .iter()
        .filter_map(|g| store.cycle(g))
        .map(|c| {
            serde_json::json!({
                "group": c.group,
                "correlation_id": c.correlation_id,
                "channel": c.channel,
                "prompt_at": c.prompt_at.to_rfc3339(),
                "responses": store.responses_for(&c.group).len(),
            })
        })
        .collect();

    Json(serde_json::json!({
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "target_groups": state.scheduler.settings().target_groups(),
        "cycles": cycles,
    }))
}

/// Bridge webhook (POST): messages, poll votes and reactions.
/// Answers right away; commands run in the background.
pub async fn bridge_webhook(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let handled = match parse_bridge_event(&body) {
        Some(event) => ingest(&state, event),
        None => false,
    };
    Json(serde_json::json!({"ok": true, "handled": handled}))
}

/// Route one event: commands to the handler, everything else to the live cycle.
pub fn ingest(state: &Arc<AppState>, event: InboundEvent) -> bool {
    if let InboundEvent::Message(msg) = &event {
        if state.commands.parse(msg).is_some() {
            let commands = state.commands.clone();
            let msg = msg.clone();
            tokio::spawn(async move {
                commands.handle(&msg, Utc::now()).await;
            });
            return true;
        }
    }
    state.scheduler.record_event(&event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandHandler;
    use crate::server::build_router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rollcall_core::config::{ResponseChannelKind, RollCallConfig, ScheduleConfig};
    use rollcall_scheduler::testing::FakeTransport;
    use rollcall_scheduler::{CycleScheduler, CycleStore, RollCallSchedule};
    use tower::ServiceExt;

    const TARGET: &str = "120363000000001@g.us";

    fn state(channel: ResponseChannelKind) -> (Arc<FakeTransport>, AppState) {
        let mut config = RollCallConfig::default();
        config.roll_call.channel = channel;
        config.roll_call.target_group = Some(TARGET.into());
        config.roll_call.poll_delay_ms = 0;

        let fake = Arc::new(FakeTransport::new("bot@c.us"));
        fake.set_roster(TARGET, &["a@c.us", "b@c.us"]);
        let schedule = RollCallSchedule::from_config(&ScheduleConfig::default()).unwrap();
        let scheduler = Arc::new(CycleScheduler::new(
            config.roll_call.clone(),
            &schedule,
            fake.clone(),
            fake.clone(),
            Arc::new(CycleStore::new()),
        ));
        let commands = Arc::new(CommandHandler::new(
            &config,
            &schedule,
            fake.clone(),
            fake.clone(),
            scheduler.clone(),
        ));
        (fake, AppState::new(scheduler, commands))
    }

    async fn post_webhook(app: axum::Router, body: serde_json::Value) -> serde_json::Value {
        let request = Request::builder()
            .method("POST")
            .uri("/webhook/whatsapp")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_, state) = state(ResponseChannelKind::Poll);
        let response = build_router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_vote_webhook_records_answer() {
        let (_, state) = state(ResponseChannelKind::Poll);
        let cycle = state.scheduler.run_prompt(TARGET, Utc::now()).await.unwrap();

        let body = serde_json::json!({
            "event": "poll.vote",
            "payload": {
                "vote": {
                    "from": TARGET,
                    "participant": "a@c.us",
                    "selectedOptions": ["✅ Presente"],
                    "timestamp": Utc::now().timestamp()
                },
                "poll": {"id": cycle.correlation_id, "to": TARGET}
            }
        });
        let reply = post_webhook(build_router(state.clone()), body).await;
        assert_eq!(reply["handled"], true);
        assert_eq!(state.scheduler.store().responses_for(TARGET).len(), 1);
    }

    #[tokio::test]
    async fn test_reaction_without_cycle_ignored() {
        let (_, state) = state(ResponseChannelKind::Reaction);
        let body = serde_json::json!({
            "event": "message.reaction",
            "payload": {
                "from": TARGET,
                "participant": "a@c.us",
                "reaction": {"text": "✅", "messageId": "whatever"},
                "timestamp": 1
            }
        });
        let reply = post_webhook(build_router(state), body).await;
        assert_eq!(reply["handled"], false);
    }

    #[tokio::test]
    async fn test_text_reply_ingested() {
        let (_, state) = state(ResponseChannelKind::Text);
        state.scheduler.run_prompt(TARGET, Utc::now()).await.unwrap();

        let event = InboundEvent::Message(rollcall_core::types::IncomingMessage {
            id: "R1".into(),
            thread_id: TARGET.into(),
            thread_name: None,
            sender_id: "b@c.us".into(),
            sender_name: None,
            content: "presente".into(),
            thread_type: rollcall_core::types::ThreadType::Group,
            from_self: false,
            timestamp: Utc::now() + chrono::Duration::seconds(5),
            reply_to: None,
        });
        assert!(ingest(&Arc::new(state.clone()), event));
        assert_eq!(state.scheduler.store().responses_for(TARGET).len(), 1);
    }
}
