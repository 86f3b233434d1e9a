use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;

use absenbot::cli::{Cli, Commands};
use absenbot::core::{config, init_logger};
use absenbot::dashboard::{start_dashboard, DashState};
use absenbot::invoice::{AssetResolver, InvoiceService};
use absenbot::storage::{repo, AttendanceRepo, ObjectStore};
use absenbot::telegram::{schema, HandlerDeps};

/// Everything the bot and the dashboard share.
struct AppContext {
    repo: AttendanceRepo,
    store: Option<ObjectStore>,
    resolver: AssetResolver,
    invoices: Arc<InvoiceService>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Log panics from spawned tasks instead of dying silently
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!(
                "Panic at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
    }));

    // .env first so the config statics see it
    let _ = dotenv();
    init_logger(&config::LOG_FILE_PATH)?;

    match cli.command {
        Some(Commands::Bot) => {
            log::info!("Running bot only");
            run_bot(connect().await?).await
        }
        Some(Commands::Dashboard { port }) => {
            let port = port.unwrap_or(*config::DASHBOARD_PORT);
            log::info!("Running dashboard only on port {}", port);
            run_dashboard(connect().await?, port).await
        }
        Some(Commands::Invoice { nama }) => run_invoice_once(connect().await?, &nama).await,
        Some(Commands::Run) | None => {
            log::info!("Running bot and dashboard together");
            let ctx = connect().await?;
            let dash_state = DashState {
                repo: ctx.repo.clone(),
                invoices: Arc::clone(&ctx.invoices),
                resolver: ctx.resolver.clone(),
            };
            let port = *config::DASHBOARD_PORT;
            tokio::spawn(async move {
                if let Err(e) = start_dashboard(port, dash_state).await {
                    log::error!("Dashboard server error: {}", e);
                }
            });
            run_bot(ctx).await
        }
    }
}

/// Connect to MongoDB and build the shared services.
async fn connect() -> Result<AppContext> {
    let repo = repo::connect(&config::MONGODB_URI, &config::MONGODB_DATABASE).await?;
    let store = ObjectStore::from_env();
    let resolver = AssetResolver::new(store.clone());
    let invoices = Arc::new(InvoiceService::new(repo.clone(), resolver.clone()));

    Ok(AppContext {
        repo,
        store,
        resolver,
        invoices,
    })
}

/// Run the Telegram bot in long polling mode.
async fn run_bot(ctx: AppContext) -> Result<()> {
    if config::BOT_TOKEN.is_empty() {
        return Err(anyhow::anyhow!("BOT_TOKEN environment variable not set"));
    }
    let bot = Bot::new(config::BOT_TOKEN.as_str());

    let me = bot.get_me().await?;
    log::info!("Bot @{} connected", me.username());

    let deps = HandlerDeps::new(
        ctx.repo.clone(),
        Arc::clone(&ctx.invoices),
        ctx.resolver.clone(),
        ctx.store.clone(),
    );
    let handler = schema(deps);

    log::info!("Ready to receive updates");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn run_dashboard(ctx: AppContext, port: u16) -> Result<()> {
    let state = DashState {
        repo: ctx.repo,
        invoices: ctx.invoices,
        resolver: ctx.resolver,
    };
    start_dashboard(port, state).await?;
    Ok(())
}

/// One-shot invoice generation from the command line.
async fn run_invoice_once(ctx: AppContext, nama: &str) -> Result<()> {
    let generated = ctx.invoices.generate_for_student(nama).await?;
    println!(
        "Invoice for {}: {} records, total Rp {}",
        generated.nama, generated.record_count, generated.total
    );
    println!(
        "Saved to {}/{}",
        config::INVOICE_DIR.as_str(),
        generated.filename
    );
    Ok(())
}
