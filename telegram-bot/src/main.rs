//! Telegram front-end and admin HTTP API binary. Wires `core`'s services to
//! a real `teloxide::Bot` and a real `HttpProvider`, and hosts the `api`
//! router. Command parsing, inline-keyboard navigation, localization, and
//! file uploads are out of scope here: this binary's only job is to give
//! the core a real `ChatSender` and `Provider` to call through.

mod teloxide_chat;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use teloxide::prelude::*;
use tracing::info;

use genhub_core::broadcast::{BroadcastRateLimiter, BroadcastScheduler};
use genhub_core::chat::ChatSender;
use genhub_core::gateway::{Gateway, GatewayConfig, ProviderDispatchTable};
use genhub_core::ledger::Ledger;
use genhub_core::poller::{PollerConfig, PollerContext};
use genhub_core::provider::{HttpProvider, Provider};
use genhub_core::provider_gate::ProviderGate;
use genhub_core::reaper::{Reaper, ReaperConfig};
use genhub_core::store::{BroadcastRepo, Db, GenerationRepo, LedgerRepo, ModelRepo, UserRepo};

use teloxide_chat::TeloxideChatSender;

#[derive(Parser, Debug)]
struct Args {
    /// Address the admin/internal HTTP API binds to.
    #[arg(long, env = "HTTP_ADDR", default_value = "127.0.0.1:8080")]
    http_addr: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn admin_chat_ids() -> Vec<i64> {
    env::var("GENHUB_ADMIN_CHAT_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_and_apply("genhub", None)?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let db_path = env_or("GENHUB_DATABASE_PATH", "genhub.db");
    let db = Db::open(&db_path)?;
    let users = UserRepo::new(db.clone());
    let models = ModelRepo::new(db.clone());
    let generations = GenerationRepo::new(db.clone());
    let ledger = Ledger::new(LedgerRepo::new(db.clone()));
    let broadcast_repo = BroadcastRepo::new(db.clone());

    let bot_token = env::var("GENHUB_BOT_TOKEN").expect("GENHUB_BOT_TOKEN must be set");
    let base_url = env::var("GENHUB_PROVIDER_BASE_URL").expect("GENHUB_PROVIDER_BASE_URL must be set");
    let api_key = env::var("GENHUB_PROVIDER_API_KEY").expect("GENHUB_PROVIDER_API_KEY must be set");
    let min_balance = env_parse("GENHUB_PROVIDER_MIN_BALANCE", 500i64);

    let provider: Arc<dyn Provider> = Arc::new(HttpProvider::new(base_url, api_key));
    let provider_gate = Arc::new(ProviderGate::new(provider.clone(), min_balance));

    let mut dispatch = ProviderDispatchTable::new();
    for model in models.list_active().await? {
        dispatch.register(&model.model_key, provider.clone());
    }

    let bot = Bot::new(bot_token);
    let chat: Arc<dyn ChatSender> = Arc::new(TeloxideChatSender::new(bot));

    let poller = Arc::new(PollerContext {
        generations: generations.clone(),
        ledger: ledger.clone(),
        provider: provider.clone(),
        chat: chat.clone(),
        config: PollerConfig {
            poll_interval: Duration::from_secs(env_parse("GENHUB_POLL_INTERVAL_SECONDS", 3)),
            max_duration: Duration::from_secs(env_parse("GENHUB_POLL_MAX_DURATION_SECONDS", 300)),
        },
    });

    let gateway = Arc::new(Gateway::new(
        users.clone(),
        models,
        generations.clone(),
        ledger.clone(),
        provider_gate,
        dispatch,
        poller.clone(),
        Some(chat.clone()),
        GatewayConfig {
            max_parallel_per_user: env_parse("GENHUB_MAX_PARALLEL_PER_USER", 2),
            markup: genhub_core::Credits::ZERO,
            admin_chat_ids: admin_chat_ids(),
        },
    ));

    let rate_limiter = Arc::new(BroadcastRateLimiter::new(env_parse(
        "GENHUB_BROADCAST_RATE_PER_SECOND",
        20,
    )));
    let broadcasts = Arc::new(BroadcastScheduler::new(
        broadcast_repo.clone(),
        users.clone(),
        chat.clone(),
        rate_limiter,
    ));

    let reaper = Reaper::new(
        generations.clone(),
        ledger.clone(),
        ReaperConfig {
            sweep_interval: Duration::from_secs(env_parse("GENHUB_REAPER_INTERVAL_SECONDS", 60)),
            stuck_threshold: Duration::from_secs(env_parse("GENHUB_STUCK_THRESHOLD_SECONDS", 600)),
        },
    );
    reaper.spawn();

    let state = Arc::new(api::AppState {
        gateway,
        ledger,
        broadcasts,
        broadcast_repo,
        generations,
        users,
        poller,
    });
    let app = api::router(state);

    info!(addr = %args.http_addr, "starting genhub telegram-bot");
    let listener = tokio::net::TcpListener::bind(args.http_addr.as_str()).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
