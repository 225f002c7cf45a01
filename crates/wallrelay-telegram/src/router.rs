use std::{future::Future, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wallrelay_core::{
    config::Config,
    conversation::{sessions::ConversationStore, ChatPorts, ChatService, ChatSettings},
    crosspost::CrossPoster,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    ports::{Publisher, SourceFetcher},
    profiles::ProfileStore,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
}

/// Application services built before the bot connects.
pub struct RelayServices {
    pub profiles: Arc<dyn ProfileStore>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub publisher: Arc<dyn Publisher>,
    pub crossposter: Arc<CrossPoster>,
}

pub fn command_menu() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "Register with the bot"),
        BotCommand::new("group_parsing", "Get a digest of a group's latest posts"),
        BotCommand::new("post", "Publish a post to the group"),
        BotCommand::new("cancel", "Cancel the current dialogue"),
    ]
}

/// Run long polling until ctrl-c or SIGTERM, then stop the scheduler and wait for it.
pub async fn run_polling(cfg: Arc<Config>, services: RelayServices) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "telegram bot connected"),
        Err(e) => warn!(error = %e, "get_me failed; continuing"),
    }
    if let Err(e) = bot.set_my_commands(command_menu()).await {
        warn!(error = %e, "failed to register command menu");
    }

    // A 429 RetryAfter is still retried once inside the Telegram adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let throttled = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));
    let messenger: Arc<dyn MessagingPort> = throttled.clone();

    let shutdown = CancellationToken::new();
    let sessions = Arc::new(ConversationStore::new(cfg.session_idle_timeout));
    let sweeper = sessions
        .clone()
        .spawn_sweeper(cfg.session_idle_timeout, shutdown.clone());
    let pruner = throttled.spawn_pruner(cfg.session_idle_timeout, shutdown.clone());
    let scheduler = services.crossposter.clone().spawn(shutdown.clone());

    let service = Arc::new(ChatService::new(
        ChatSettings::from_config(&cfg),
        ChatPorts {
            messenger,
            profiles: services.profiles,
            fetcher: services.fetcher,
            publisher: services.publisher,
            crossposter: services.crossposter,
        },
        sessions,
        shutdown.clone(),
    ));
    let state = Arc::new(AppState { service });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    let dispatcher_token = dispatcher.shutdown_token();
    tokio::spawn(stop_on_signal(
        async {
            tokio::select! {
                _ = interrupt_signal() => info!("ctrl-c received"),
                _ = terminate_signal() => info!("SIGTERM received"),
            }
        },
        shutdown.clone(),
        move || {
            if dispatcher_token.shutdown().is_err() {
                warn!("dispatcher was not running");
            }
        },
    ));

    info!("polling for updates");
    dispatcher.dispatch().await;

    info!("dispatcher stopped, waiting for the scheduler");
    shutdown.cancel();
    if let Err(e) = scheduler.await {
        warn!(error = %e, "cross-post scheduler task failed");
    }
    let _ = sweeper.await;
    let _ = pruner.await;
    info!("shutdown complete");

    Ok(())
}

/// Cancel background work first, so a running tick stops pacing, then stop polling.
/// The dispatcher waits for in-flight handlers, which may be inside a manual tick.
async fn stop_on_signal(
    signal: impl Future<Output = ()>,
    shutdown: CancellationToken,
    stop_dispatcher: impl FnOnce(),
) {
    signal.await;
    info!("stopping background tasks and update polling");
    shutdown.cancel();
    stop_dispatcher();
}

async fn interrupt_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
