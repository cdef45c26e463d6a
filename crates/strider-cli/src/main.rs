//! `strider` – operator entry point for the legged robot.
//!
//! 1. Loads `~/.strider/config.toml`, writing defaults on first run, then
//!    applies `STRIDER_*` overrides.
//! 2. Starts the [`RobotService`] over the simulated driver and sensor, and
//!    the cockpit server in the background.
//! 3. Drops the operator into the REPL.
//! 4. On `/quit`, end of input, or Ctrl-C: cancels autonomy, drains the
//!    worker, emergency-stops the actuators, and exits.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use strider_cockpit::CockpitServer;
use strider_hal::{SimDriver, SimSensor};
use strider_runtime::{RobotService, init_tracing};

fn main() {
    // Installed before the runtime exists; the OTLP exporter is synchronous.
    let _tracing = init_tracing("strider");

    print_banner();

    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return;
        }
    };
    let handle = runtime.handle().clone();

    let service = {
        let _enter = runtime.enter();
        RobotService::builder(
            Arc::new(SimDriver::new()),
            Arc::new(SimSensor::new(cfg.sim_distance_cm)),
        )
        .with_config(cfg.control.clone())
        .start()
    };

    let cockpit = CockpitServer::new(service.clone())
        .with_port(cfg.port)
        .with_rate_limit(cfg.rate_limit);
    runtime.spawn(async move {
        if let Err(err) = cockpit.run().await {
            error!(%err, "cockpit server stopped");
        }
    });
    println!(
        "  Cockpit listening on {}",
        format!("ws://0.0.0.0:{}", cfg.port).bold()
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // The REPL blocks on stdin, so the handler performs the shutdown itself
    // and exits the process.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let service = service.clone();
        let handle = handle.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
            shutdown.store(true, Ordering::SeqCst);
            stop(&service, &handle);
            std::process::exit(0);
        }) {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());
    repl::run(&service, &handle, shutdown);

    stop(&service, &handle);
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
}

fn stop(service: &RobotService, handle: &tokio::runtime::Handle) {
    match handle.block_on(service.shutdown()) {
        Ok(()) => println!("{}", "  ✓ Robot stopped.".green()),
        Err(err) => println!("{}: {}", "  Emergency stop failed".red(), err),
    }
    info!("strider exiting");
}

fn first_run() -> config::Config {
    let cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

fn print_banner() {
    println!();
    println!("{}", r#"   _____ __       _     __         "#.bold().cyan());
    println!("{}", r#"  / ___// /______(_)___/ /__  _____"#.bold().cyan());
    println!("{}", r#"  \__ \/ __/ ___/ / __  / _ \/ ___/"#.bold().cyan());
    println!("{}", r#" ___/ / /_/ /  / / /_/ /  __/ /    "#.bold().cyan());
    println!("{}", r#"/____/\__/_/  /_/\__,_/\___/_/     "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Strider".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Legged robot command arbitration");
    println!();
}
