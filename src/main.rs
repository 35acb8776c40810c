use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod ai;
mod commands;
mod components;
mod config;
mod crypto;
mod database;
mod error;
mod loans;
mod offer;
mod tasks;

use ai::ChatClient;
use config::BotConfig;
use crypto::LedgerSigner;
use database::Database;
use offer::OfferDesk;

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

pub struct Data {
    database: Arc<Database>,
    offers: OfferDesk<Database>,
    config: BotConfig,
    chat: Option<ChatClient>,
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command '{}': {:?}", ctx.command().name, error);
            let reply = poise::CreateReply::default()
                .content(commands::GENERIC_FAILURE)
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                error!("Failed to report command error: {:?}", e);
            }
        }
        poise::FrameworkError::EventHandler { error, event, .. } => {
            error!("Error in event handler for {:?}: {:?}", event.snake_case_name(), error);
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!("Logged in as {}", data_about_bot.user.name);
        }
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => {
            commands::handle_component(ctx, component, data).await?;
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize the logger
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BotConfig::from_env()?;

    // Initialize database
    let signer = LedgerSigner::new(&config.ledger_key);
    let database = Arc::new(Database::new(&config.database_url, signer).await?);
    info!("Database ready at {}", config.database_url);

    let offers = OfferDesk::new(database.clone(), config.offer_ttl_secs, config.default_loan_amount);

    let chat = ChatClient::from_config(&config)?;
    if chat.is_none() {
        info!("TOGETHER_API_KEY not set, /ai is disabled");
    }

    let token = config.discord_token.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::loan(),
                commands::balance(),
                commands::baltop(),
                commands::debts(),
                commands::history(),
                commands::repay(),
                commands::transfer(),
                commands::clear_debt(),
                commands::transactions(),
                commands::stats(),
                commands::audit(),
                commands::ai(),
                commands::help(),
            ],
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Registered {} slash commands", framework.options().commands.len());

                commands::loan::recover_offers(ctx.http.clone(), &offers).await;
                tasks::spawn_interest_watcher(ctx.http.clone(), database.clone(), config.clone());

                Ok(Data { database, offers, config, chat })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    // Set up graceful shutdown handling
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {:?}", e);
            return;
        }
        info!("Received shutdown signal, shutting down");
        shard_manager.shutdown_all().await;
    });

    info!("Starting bot...");

    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
        return Err(why.into());
    }

    Ok(())
}
