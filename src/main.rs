//! # RollCall: daily roll call for WhatsApp groups
//!
//! Sends the "tiragem de falta" prompt on weekday mornings, collects the
//! answers and posts the tally, plus a few chat commands for announcements.
//!
//! Usage:
//!   rollcall                              # Run gateway + scheduler
//!   rollcall --config ./rollcall.toml run # Custom config
//!   rollcall prompt --group 1203..@g.us   # Send one prompt now
//!   rollcall check-config                 # Show resolved schedule and targets

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rollcall_channels::WhatsAppBridge;
use rollcall_core::RollCallConfig;
use rollcall_gateway::{AppState, CommandHandler};
use rollcall_scheduler::{CycleScheduler, CycleStore, RollCallSchedule, TriggerTimers};
use tracing_subscriber::EnvFilter;

/// How often the scheduler loop checks for due phases.
const CHECK_INTERVAL_SECS: u64 = 15;

#[derive(Parser)]
#[command(name = "rollcall", version, about = "📋 RollCall: tiragem de falta para grupos do WhatsApp")]
struct Cli {
    /// Config file (default: ~/.rollcall/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook gateway and the daily scheduler
    Run,
    /// Run the prompt phase for one group right away
    Prompt {
        /// Group id, e.g. 120363000000000000@g.us
        #[arg(long)]
        group: String,
    },
    /// Print the resolved schedule and target groups
    CheckConfig,
}

fn load_config(path: Option<&str>) -> Result<RollCallConfig> {
    let mut config = match path {
        Some(p) => RollCallConfig::load_from(&RollCallConfig::expand_path(p))?,
        None => RollCallConfig::load()?,
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

struct Runtime {
    bridge: Arc<WhatsAppBridge>,
    schedule: RollCallSchedule,
    scheduler: Arc<CycleScheduler>,
}

fn build_runtime(config: &RollCallConfig) -> Result<Runtime> {
    let schedule = RollCallSchedule::from_config(&config.schedule)?;
    let bridge = Arc::new(WhatsAppBridge::new(config.whatsapp.clone())?);
    let scheduler = Arc::new(CycleScheduler::new(
        config.roll_call.clone(),
        &schedule,
        bridge.clone(),
        bridge.clone(),
        Arc::new(CycleStore::new()),
    ));
    Ok(Runtime {
        bridge,
        schedule,
        scheduler,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "rollcall=debug,rollcall_scheduler=debug,rollcall_gateway=debug,rollcall_channels=debug,tower_http=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => check_config(&config),
        Commands::Prompt { group } => {
            let runtime = build_runtime(&config)?;
            runtime.bridge.verify().await?;
            let cycle = runtime.scheduler.run_prompt(&group, Utc::now()).await?;
            println!("✅ Prompt sent to {} (correlation id {})", cycle.group, cycle.correlation_id);
            Ok(())
        }
        Commands::Run => run(config).await,
    }
}

fn check_config(config: &RollCallConfig) -> Result<()> {
    let schedule = RollCallSchedule::from_config(&config.schedule)?;
    let targets = config.roll_call.target_groups();

    println!("📋 RollCall v{}", env!("CARGO_PKG_VERSION"));
    println!("   ⏰ Prompt:   {} (UTC{})", schedule.prompt_expression, config.schedule.utc_offset);
    println!("   📊 Result:   {}", schedule.result_expression);
    println!("   🗳️  Channel:  {}", config.roll_call.channel);
    if targets.is_empty() {
        println!("   👥 Targets:  ⚠️ none configured (set target_group or allowed_groups)");
    } else {
        println!("   👥 Targets:  {}", targets.join(", "));
    }
    println!("   💬 Prefix:   {}", config.commands.prefix);
    println!("   🔌 Bridge:   {} (session {})", config.whatsapp.bridge_url, config.whatsapp.session);
    Ok(())
}

async fn run(config: RollCallConfig) -> Result<()> {
    let runtime = build_runtime(&config)?;

    if let Err(e) = runtime.bridge.verify().await {
        tracing::warn!("⚠️ WhatsApp bridge not reachable yet: {e}");
    }

    let targets = config.roll_call.target_groups();
    if targets.is_empty() {
        tracing::warn!("⚠️ No target group configured, scheduled roll calls will do nothing");
    }

    let timers = TriggerTimers::new(runtime.schedule.clone(), Utc::now());
    let offset = runtime.schedule.offset;
    let show = |t: Option<chrono::DateTime<Utc>>| {
        t.map(|t| t.with_timezone(&offset).format("%d/%m/%Y %H:%M").to_string())
            .unwrap_or_else(|| "-".into())
    };

    println!("📋 RollCall v{}", env!("CARGO_PKG_VERSION"));
    println!("   🌐 Gateway:     http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   ⏰ Next prompt: {}", show(timers.next_prompt));
    println!("   📊 Next result: {}", show(timers.next_result));
    println!("   👥 Targets:     {}", targets.join(", "));
    println!();

    let commands = Arc::new(CommandHandler::new(
        &config,
        &runtime.schedule,
        runtime.bridge.clone(),
        runtime.bridge.clone(),
        runtime.scheduler.clone(),
    ));

    tokio::spawn(rollcall_scheduler::spawn_scheduler(
        runtime.scheduler.clone(),
        runtime.schedule.clone(),
        CHECK_INTERVAL_SECS,
    ));

    let state = AppState::new(runtime.scheduler.clone(), commands);
    rollcall_gateway::start(&config.gateway, state).await
}
