//! Chat commands: `!aviso`, `!grupoid`, `!help`, `!teste`, `!tiragem`, `!resultado`.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use rollcall_core::config::RollCallConfig;
use rollcall_core::error::{Result, RollCallError};
use rollcall_core::traits::{MessageTransport, RosterAccessor};
use rollcall_core::types::{IncomingMessage, OutgoingMessage};
use rollcall_scheduler::tally::eligible_roster;
use rollcall_scheduler::{CycleScheduler, RollCallSchedule};
use rollcall_security::{Allowlist, CommandScope, Decision};

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Announcement mentioning everyone; empty text shows usage.
    Aviso(String),
    GrupoId,
    Help,
    Teste,
    Tiragem,
    Resultado,
}

impl Command {
    /// Parse `content` if it starts with `prefix` and names a known command.
    pub fn parse(content: &str, prefix: &str) -> Option<Self> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next()?.to_lowercase();
        let args = parts.next().unwrap_or("").trim().to_string();

        match name.as_str() {
            "aviso" => Some(Command::Aviso(args)),
            "grupoid" => Some(Command::GrupoId),
            "help" | "ajuda" | "comandos" => Some(Command::Help),
            "teste" => Some(Command::Teste),
            "tiragem" => Some(Command::Tiragem),
            "resultado" => Some(Command::Resultado),
            _ => None,
        }
    }

    pub fn scope(&self) -> CommandScope {
        match self {
            Command::GrupoId => CommandScope::Open,
            Command::Tiragem | Command::Resultado => CommandScope::RollCall,
            _ => CommandScope::Group,
        }
    }
}

/// Runs commands against the transport and the cycle scheduler.
pub struct CommandHandler {
    enabled: bool,
    prefix: String,
    allowlist: Allowlist,
    offset: FixedOffset,
    prompt_time: String,
    result_time: String,
    transport: Arc<dyn MessageTransport>,
    roster: Arc<dyn RosterAccessor>,
    scheduler: Arc<CycleScheduler>,
}

impl CommandHandler {
    pub fn new(
        config: &RollCallConfig,
        schedule: &RollCallSchedule,
        transport: Arc<dyn MessageTransport>,
        roster: Arc<dyn RosterAccessor>,
        scheduler: Arc<CycleScheduler>,
    ) -> Self {
        Self {
            enabled: config.commands.enabled,
            prefix: config.commands.prefix.clone(),
            allowlist: Allowlist::new(&config.commands, &config.roll_call),
            offset: schedule.offset,
            prompt_time: format!(
                "{:02}:{:02}",
                config.schedule.prompt_hour, config.schedule.prompt_minute
            ),
            result_time: schedule.result_time_label(),
            transport,
            roster,
            scheduler,
        }
    }

    /// The command in `msg`, if commands are enabled and it is one.
    pub fn parse(&self, msg: &IncomingMessage) -> Option<Command> {
        if !self.enabled {
            return None;
        }
        Command::parse(&msg.content, &self.prefix)
    }

    /// Handle `msg` at time `now`. Returns the command that ran, if any.
    pub async fn handle(&self, msg: &IncomingMessage, now: DateTime<Utc>) -> Option<Command> {
        let command = self.parse(msg)?;
        tracing::info!("📩 Command from {} in {}: {:?}", msg.sender_id, msg.thread_id, command);

        match self.allowlist.check(msg, command.scope()) {
            Decision::Allow => {}
            Decision::RejectNotGroup => {
                self.reply(msg, "❌ Este comando só funciona em grupos!").await;
                return None;
            }
            Decision::Ignore => return None,
        }

        if let Err(e) = self.execute(&command, msg, now).await {
            tracing::error!("❌ Command {:?} failed in {}: {}", command, msg.thread_id, e);
            let text = match (&command, &e) {
                (Command::Resultado, RollCallError::NoCycle(_)) => format!(
                    "⚠️ Nenhuma tiragem ativa neste grupo. Use *{}tiragem* primeiro.",
                    self.prefix
                ),
                (Command::Aviso(_), _) => "❌ Ocorreu um erro ao enviar o aviso. Tente novamente.".into(),
                (Command::Tiragem, _) => "❌ Ocorreu um erro ao enviar a tiragem. Tente novamente.".into(),
                _ => "❌ Ocorreu um erro ao gerar o resultado. Tente novamente.".into(),
            };
            self.reply(msg, &text).await;
        }
        Some(command)
    }

    async fn execute(&self, command: &Command, msg: &IncomingMessage, now: DateTime<Utc>) -> Result<()> {
        let group = msg.thread_id.as_str();
        match command {
            Command::Aviso(text) if text.is_empty() => {
                let usage = format!(
                    "❌ *Uso incorreto!*\n\n📝 *Como usar:*\n`{p}aviso [sua mensagem]`\n\n📌 *Exemplo:*\n`{p}aviso Reunião amanhã às 14h!`",
                    p = self.prefix
                );
                self.reply(msg, &usage).await;
            }
            Command::Aviso(text) => {
                let roster = eligible_roster(self.roster.as_ref(), group).await?;
                let handles: Vec<String> = roster.iter().map(|p| format!("@{}", p.handle)).collect();
                let body = format!(
                    "🚨 *AVISO IMPORTANTE* 🚨\n\n📢 {}\n\n━━━━━━━━━━━━━━━━━━━━━\n👥 *Atenção todos:*\n{}",
                    text,
                    handles.join(" ")
                );
                let mentions = roster.into_iter().map(|p| p.id).collect();
                self.transport
                    .send_message(&OutgoingMessage::text(group, body).with_mentions(mentions))
                    .await?;
                tracing::info!("✅ Announcement sent to {}", group);
            }
            Command::GrupoId => {
                let name = msg.thread_name.as_deref().unwrap_or("(sem nome)");
                let text = format!(
                    "📋 *Informações do Grupo*\n\n📛 *Nome:* {}\n🆔 *ID:* `{}`\n\n💡 *Dica:* Copie este ID para `allowed_groups` ou `target_group` na configuração para autorizar este grupo.",
                    name, group
                );
                self.reply(msg, &text).await;
            }
            Command::Help => {
                let text = self.help_text();
                self.reply(msg, &text).await;
            }
            Command::Teste => {
                let local = now.with_timezone(&self.offset);
                let text = format!(
                    "✅ *Bot está funcionando!*\n\n🟢 Status: Online\n⏰ Horário atual: {}\n📅 Data: {}",
                    local.format("%H:%M:%S"),
                    local.format("%d/%m/%Y")
                );
                self.reply(msg, &text).await;
            }
            Command::Tiragem => {
                self.reply(msg, "📊 Enviando tiragem de falta...").await;
                self.scheduler.run_prompt(group, now).await?;
                tracing::info!("✅ Manual roll call started in {}", group);
            }
            Command::Resultado => {
                if self.scheduler.store().cycle(group).is_none() {
                    return Err(RollCallError::NoCycle(group.to_string()));
                }
                self.reply(msg, "📋 Gerando resultado da tiragem...").await;
                self.scheduler.run_result(group, now).await?;
                tracing::info!("✅ Manual result posted in {}", group);
            }
        }
        Ok(())
    }

    fn help_text(&self) -> String {
        let p = &self.prefix;
        format!(
            "🤖 *BOT DE AVISOS - COMANDOS* 🤖\n\n\
             ━━━━━━━━━━━━━━━━━━━━━\n\n\
             📢 *{p}aviso [mensagem]*\n   Envia um aviso marcando todos do grupo\n\n\
             📊 *{p}tiragem*\n   Envia a tiragem de falta manualmente\n\n\
             📋 *{p}resultado*\n   Mostra o resultado da tiragem atual\n\n\
             🆔 *{p}grupoid*\n   Mostra o ID do grupo atual\n\n\
             ❓ *{p}help*\n   Mostra esta mensagem de ajuda\n\n\
             🧪 *{p}teste*\n   Testa se o bot está funcionando\n\n\
             ━━━━━━━━━━━━━━━━━━━━━\n\n\
             ⏰ *Tiragem de Falta Automática*\n   \
             • {} - Envia a tiragem de falta\n   \
             • {} - Envia o resultado automático",
            self.prompt_time, self.result_time
        )
    }

    /// Reply quoting `msg`. Failures are only logged.
    async fn reply(&self, msg: &IncomingMessage, text: &str) {
        let reply = OutgoingMessage::text(&msg.thread_id, text).replying_to(&msg.id);
        if let Err(e) = self.transport.send_message(&reply).await {
            tracing::warn!("⚠️ Reply to {} failed: {}", msg.thread_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::config::{ResponseChannelKind, ScheduleConfig};
    use rollcall_core::types::ThreadType;
    use rollcall_scheduler::CycleStore;
    use rollcall_scheduler::testing::FakeTransport;

    const TARGET: &str = "target@g.us";
    const OTHER: &str = "other@g.us";

    fn setup(allowed: &[&str]) -> (Arc<FakeTransport>, CommandHandler) {
        let mut config = RollCallConfig::default();
        config.roll_call.channel = ResponseChannelKind::Reaction;
        config.roll_call.target_group = Some(TARGET.into());
        config.roll_call.allowed_groups = allowed.iter().map(|s| s.to_string()).collect();
        config.roll_call.poll_delay_ms = 0;
        config.commands.owners = vec!["5500000000000".into()];

        let fake = Arc::new(FakeTransport::new("bot@c.us"));
        fake.set_roster(TARGET, &["a@c.us", "b@c.us", "bot@c.us"]);
        fake.set_roster(OTHER, &["c@c.us"]);

        let schedule = RollCallSchedule::from_config(&ScheduleConfig::default()).unwrap();
        let scheduler = Arc::new(CycleScheduler::new(
            config.roll_call.clone(),
            &schedule,
            fake.clone(),
            fake.clone(),
            Arc::new(CycleStore::new()),
        ));
        let handler = CommandHandler::new(&config, &schedule, fake.clone(), fake.clone(), scheduler);
        (fake, handler)
    }

    fn msg(thread: &str, sender: &str, content: &str) -> IncomingMessage {
        IncomingMessage {
            id: "M1".into(),
            thread_id: thread.into(),
            thread_name: Some("Turma".into()),
            sender_id: sender.into(),
            sender_name: None,
            content: content.into(),
            thread_type: if thread.ends_with("@g.us") { ThreadType::Group } else { ThreadType::Direct },
            from_self: false,
            timestamp: Utc::now(),
            reply_to: None,
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("!aviso  Reunião às 14h", "!"), Some(Command::Aviso("Reunião às 14h".into())));
        assert_eq!(Command::parse("!AVISO", "!"), Some(Command::Aviso(String::new())));
        assert_eq!(Command::parse("!ajuda", "!"), Some(Command::Help));
        assert_eq!(Command::parse("!comandos", "!"), Some(Command::Help));
        assert_eq!(Command::parse("/tiragem", "/"), Some(Command::Tiragem));
        assert_eq!(Command::parse("!tiragem", "/"), None);
        assert_eq!(Command::parse("!desconhecido", "!"), None);
        assert_eq!(Command::parse("bom dia", "!"), None);
    }

    #[tokio::test]
    async fn test_aviso_mentions_everyone() {
        let (fake, handler) = setup(&[]);
        let ran = handler.handle(&msg(TARGET, "a@c.us", "!aviso Prova amanhã"), Utc::now()).await;
        assert!(matches!(ran, Some(Command::Aviso(_))));

        let sent = fake.sent_to(TARGET);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].content.starts_with("🚨 *AVISO IMPORTANTE* 🚨\n\n📢 Prova amanhã"));
        assert_eq!(sent[0].mentions, vec!["a@c.us", "b@c.us"]);
    }

    #[tokio::test]
    async fn test_aviso_without_text_shows_usage() {
        let (fake, handler) = setup(&[]);
        handler.handle(&msg(TARGET, "a@c.us", "!aviso"), Utc::now()).await;
        let sent = fake.sent_to(TARGET);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].content.contains("Uso incorreto"));
        assert_eq!(sent[0].reply_to.as_deref(), Some("M1"));
    }

    #[tokio::test]
    async fn test_direct_chat_rejected() {
        let (fake, handler) = setup(&[]);
        let ran = handler.handle(&msg("x@c.us", "x@c.us", "!aviso oi"), Utc::now()).await;
        assert!(ran.is_none());
        assert!(fake.sent_to("x@c.us")[0].content.contains("só funciona em grupos"));
    }

    #[tokio::test]
    async fn test_unauthorized_group_ignored_silently() {
        let (fake, handler) = setup(&[TARGET]);
        let ran = handler.handle(&msg(OTHER, "c@c.us", "!aviso oi"), Utc::now()).await;
        assert!(ran.is_none());
        assert!(fake.sent().is_empty());

        // Owners are not restricted to the allow-list.
        let ran = handler.handle(&msg(OTHER, "5500000000000@c.us", "!teste"), Utc::now()).await;
        assert_eq!(ran, Some(Command::Teste));
    }

    #[tokio::test]
    async fn test_grupoid_works_anywhere() {
        let (fake, handler) = setup(&[TARGET]);
        handler.handle(&msg(OTHER, "c@c.us", "!grupoid"), Utc::now()).await;
        let sent = fake.sent_to(OTHER);
        assert!(sent[0].content.contains("`other@g.us`"));
        assert!(sent[0].content.contains("Turma"));
    }

    #[tokio::test]
    async fn test_help_shows_schedule() {
        let (fake, handler) = setup(&[]);
        handler.handle(&msg(TARGET, "a@c.us", "!help"), Utc::now()).await;
        let text = &fake.sent_to(TARGET)[0].content;
        assert!(text.contains("• 07:00 - Envia a tiragem de falta"));
        assert!(text.contains("• 07:15 - Envia o resultado automático"));
    }

    #[tokio::test]
    async fn test_tiragem_then_resultado() {
        let (fake, handler) = setup(&[]);
        handler.handle(&msg(TARGET, "a@c.us", "!tiragem"), Utc::now()).await;
        let sent = fake.sent_to(TARGET);
        // Acknowledgement, then the prompt.
        assert_eq!(sent.len(), 2);
        assert!(sent[1].content.contains("TIRAGEM DE FALTA"));

        handler.handle(&msg(TARGET, "a@c.us", "!resultado"), Utc::now()).await;
        let sent = fake.sent_to(TARGET);
        assert_eq!(sent.len(), 4);
        assert!(sent[3].content.contains("RESULTADO DA TIRAGEM DE FALTA"));
    }

    #[tokio::test]
    async fn test_resultado_without_cycle() {
        let (fake, handler) = setup(&[]);
        handler.handle(&msg(TARGET, "a@c.us", "!resultado"), Utc::now()).await;
        let sent = fake.sent_to(TARGET);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].content.contains("Nenhuma tiragem ativa"));
    }

    #[tokio::test]
    async fn test_roll_call_commands_need_target_group() {
        // Empty allow-list: other groups may use commands, but never start a roll call.
        let (fake, handler) = setup(&[]);
        let ran = handler.handle(&msg(OTHER, "c@c.us", "!tiragem"), Utc::now()).await;
        assert!(ran.is_none());
        assert!(fake.sent_to(OTHER).is_empty());

        let ran = handler.handle(&msg(OTHER, "5500000000000@c.us", "!tiragem"), Utc::now()).await;
        assert!(ran.is_none());

        let ran = handler.handle(&msg(OTHER, "c@c.us", "!teste"), Utc::now()).await;
        assert_eq!(ran, Some(Command::Teste));
    }
}
