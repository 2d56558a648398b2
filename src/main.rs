use std::env;
use std::sync::Arc;

use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tokio::sync::mpsc;
use tracing::info;

use warden_daemon::scheduler::{
    DiscordGateway, SchedulerConfig, SchedulerService, SystemClock, YamlReversalStore,
};
use warden_daemon::{Data, Error, commands, data, handlers, logging, notify};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    // Load environment variables
    let token = env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN must be set");

    // Load the durable reversal store and build the scheduler on top of it
    let store = Arc::new(YamlReversalStore::load(data::REVERSALS_FILE).await);
    let scheduler =
        SchedulerService::new(store, Arc::new(SystemClock), SchedulerConfig::default());
    let data = Data::load(scheduler).await;

    // Configure the Poise framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::ping(),
                commands::tempmute(),
                commands::unmute(),
                commands::tempban(),
                commands::unban(),
                commands::temprole(),
                commands::removerole(),
                commands::setlogchannel(),
            ],
            pre_command: |ctx| {
                Box::pin(async move {
                    // Log the start of command execution
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    // Log the end of command execution
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    // Log the error using our logging system
                    logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands".to_string());
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Recover persisted reversals and start the sweep task before
                // the bot is considered ready
                let gateway = Arc::new(DiscordGateway::new(ctx.http.clone()));
                let (notice_tx, notice_rx) = mpsc::channel(100);
                data.scheduler.bootstrap(gateway, Some(notice_tx)).await?;
                notify::start_notice_task(data.clone(), ctx.http.clone(), notice_rx);

                // Register the bot's data
                Ok(data)
            })
        })
        .build();

    // Configure the Serenity client
    let intents = GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handlers::Handler)
        .framework(framework)
        .await
        .expect("Failed to create client");

    info!("Starting bot...");
    // Start the bot
    if let Err(err) = client.start().await {
        eprintln!("Error starting the bot: {}", err);
    }

    Ok(())
}

fn main() {
    // Run the async main function
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async_main());

    // Handle any errors that occurred during execution
    if let Err(err) = result {
        eprintln!("Error: {}", err);
    }
}
