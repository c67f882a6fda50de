mod alarm;
mod app;
mod camera;
mod config;
mod error;
mod event;
mod fleet;
mod grid;
mod input;
mod log;
mod monitor;
mod notify;
mod predefined;
mod registry;
mod render;
mod store;
mod transport;
mod watchdog;

use app::App;
use clap::Parser;
use config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "camgrid")]
#[command(about = "Multi-camera monitoring grid with unknown-person alerts")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "camgrid.ini")]
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // Logs go to stderr so the grid on stdout stays readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camgrid=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Show app info
    println!(
        "{} v{} - {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_DESCRIPTION")
    );

    let config = match Config::load_or_default(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if !args.config.exists() {
        println!("No config file at {}, using defaults", args.config.display());
    }

    // Show configuration
    println!();
    println!("Server:");
    println!("  URL: {}", config.server.url);
    println!();
    println!("Grid:");
    println!("  Layout: {} slots", config.grid.layout);
    println!();
    println!("Storage:");
    println!("  Directory: {}", config.storage.directory);
    println!();
    println!("Alerts:");
    println!("  Sound: {}", if config.alert.sound { "enabled" } else { "disabled" });
    println!();
    println!("Logging:");
    if let Some(ref dir) = config.logging.directory {
        println!("  Directory: {}", dir);
    } else {
        println!("  Directory: (not configured)");
    }
    println!();

    // Set up signal handler for clean shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    let mut app = match App::new(&config, running) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to initialize app: {}", e);
            std::process::exit(1);
        }
    };

    app.run().await;
    eprintln!("Streams closed.");
}
