use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{
    load_recipe_list, HttpFetchClient, ImageSource, RecipeListState, RecipeSource, RotationEngine,
    RotationEvent, RotationSchedule, RotationStatus,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod ui;

use config::{load_settings, Settings};
use ui::{carousel::CarouselView, recipes::render_recipe_list};

#[derive(Parser, Debug)]
#[command(name = "coffee-explorer", about = "Browse coffee recipes and a rotating image gallery")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
    /// TOML settings file; defaults to ./explorer.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    window_size: Option<usize>,
    #[arg(long, global = true)]
    refresh_seconds: Option<u64>,
    #[arg(long, global = true)]
    advance_seconds: Option<u64>,
    #[arg(long, global = true)]
    timeout_seconds: Option<u64>,
    /// Stop the carousel after this many seconds instead of waiting for Ctrl-C.
    #[arg(long, global = true)]
    run_for_seconds: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Fetch the recipe list once and print it.
    Recipes,
    /// Run the rotating image carousel.
    Carousel,
    /// Recipes, then the carousel.
    All,
}

impl Args {
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(v) = self.window_size {
            settings.window_size = v;
        }
        if let Some(v) = self.refresh_seconds {
            settings.refresh_seconds = v;
        }
        if let Some(v) = self.advance_seconds {
            settings.advance_seconds = v;
        }
        if let Some(v) = self.timeout_seconds {
            settings.fetch_timeout_seconds = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    args.apply_to(&mut settings);

    let filter =
        EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let schedule = settings.schedule()?;
    let client = Arc::new(HttpFetchClient::new(
        &settings.recipe_endpoint,
        &settings.image_endpoint,
        settings.fetch_timeout(),
    )?);
    info!(
        recipe_endpoint = %settings.recipe_endpoint,
        image_endpoint = %settings.image_endpoint,
        timeout_secs = client.timeout().as_secs(),
        "explorer: starting"
    );

    let run_for = args.run_for_seconds.map(Duration::from_secs);
    match args.command.unwrap_or(Command::All) {
        Command::Recipes => show_recipes(&*client).await,
        Command::Carousel => run_carousel(client, schedule, run_for).await,
        Command::All => {
            show_recipes(&*client).await;
            run_carousel(client, schedule, run_for).await;
        }
    }

    Ok(())
}

async fn show_recipes(source: &dyn RecipeSource) {
    println!("{}\n", render_recipe_list(&RecipeListState::Loading));
    let state = load_recipe_list(source).await;
    println!("{}\n", render_recipe_list(&state));
}

async fn run_carousel(
    source: Arc<dyn ImageSource>,
    schedule: RotationSchedule,
    run_for: Option<Duration>,
) {
    let view = CarouselView::new(&schedule);
    let engine = RotationEngine::new(source);
    let mut events = engine.subscribe();
    let handle = engine.start(schedule);

    let stop_after = async {
        match run_for {
            Some(period) => tokio::time::sleep(period).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(stop_after);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("explorer: interrupted");
                break;
            }
            _ = &mut stop_after => {
                info!("explorer: run time elapsed");
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(RotationEvent::StatusChanged(RotationStatus::Failed { .. })) => {
                        println!("{}\n", view.render(&engine.snapshot().await));
                        break;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "explorer: render fell behind engine events");
                    }
                    Err(RecvError::Closed) => break,
                }
                println!("{}\n", view.render(&engine.snapshot().await));
            }
        }
    }

    handle.shutdown();
}
