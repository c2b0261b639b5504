use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use terrane_world::config::EngineConfig;
use terrane_world::engine::{self, EngineOptions};

fn main() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();

    let mut world_path = PathBuf::from("world");
    let mut config_path: Option<PathBuf> = None;
    let mut seed: Option<u64> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--world" => {
                let Some(value) = args.next() else {
                    eprintln!("--world expects a path argument");
                    std::process::exit(2);
                };
                world_path = PathBuf::from(value);
            }
            "--config" => {
                let Some(value) = args.next() else {
                    eprintln!("--config expects a path argument");
                    std::process::exit(2);
                };
                config_path = Some(PathBuf::from(value));
            }
            "--seed" => {
                let Some(value) = args.next() else {
                    eprintln!("--seed expects a numeric argument");
                    std::process::exit(2);
                };
                match value.parse::<u64>() {
                    Ok(parsed) => seed = Some(parsed),
                    Err(err) => {
                        eprintln!("invalid seed '{value}': {err}");
                        std::process::exit(2);
                    }
                }
            }
            "--help" | "-h" => {
                println!("Usage: terrane_world [--world <path>] [--config <path>] [--seed <u64>]");
                return;
            }
            other => {
                eprintln!("unknown argument: {other}");
                std::process::exit(2);
            }
        }
    }

    let config_path = config_path.unwrap_or_else(|| world_path.join("engine.toml"));
    let mut config = match EngineConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load {}: {err}", config_path.display());
            std::process::exit(1);
        }
    };
    if seed.is_some() {
        config.world.seed = seed;
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        eprintln!("\nShutdown signal received, saving world...");
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("failed to set Ctrl+C handler: {err}");
    }

    let options = EngineOptions { world_path, config };
    if let Err(err) = engine::run(options, running) {
        eprintln!("engine failed: {err}");
        std::process::exit(1);
    }
}
