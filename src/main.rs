//! # agrisense operator console
//!
//! Interactive front end over `Monitor`, running against the simulated sensor
//! node and light bulb.
//!
//! ## Threads
//! - **ingest-worker:** session + transport, decodes notifications.
//! - **control-loop:** light control law, forwards events.
//! - **printer:** renders the presentation stream below the menu.
//!
//! ## Usage
//! `agrisense [config.toml]` (default `config/agrisense.toml`).
//! Log filter comes from `[logging] level` unless `RUST_LOG` is set.

use std::{
    io::{Write, stdin, stdout},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::Context;
use crossbeam::channel::RecvTimeoutError;
use log::info;
use parking_lot::Mutex;

use agrisense::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    Event, EventReceiver, Monitor, PeerDescriptor, SimulatedTransport, StatusDetail,
};

type PeerList = Arc<Mutex<Vec<PeerDescriptor>>>;

fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load_or_default(&path).with_context(|| format!("loading {}", path))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.logging.level.as_str()))
        .init();
    info!("=== AGRISENSE START ===");
    config.print_summary();

    let mut monitor: Monitor<SimulatedTransport> =
        Monitor::new(config.simulation.transport(), &config).context("starting control loop")?;
    monitor.start_worker().context("starting ingestion worker")?;

    let printing = Arc::new(AtomicBool::new(true));
    let show_readings = Arc::new(AtomicBool::new(true));
    let peers: PeerList = Arc::new(Mutex::new(Vec::new()));
    let printer = spawn_printer(monitor.events(), printing.clone(), show_readings.clone(), peers.clone())?;

    loop {
        let choice = prompt_menu(&monitor);
        let result = match choice.as_str() {
            "1" => monitor.scan(),
            "2" => match prompt_address(&peers) {
                Some(address) => monitor.connect(&address),
                None => Ok(()),
            },
            "3" => monitor.disconnect(),
            "4" => {
                let mode = monitor.config().mode.toggled();
                println!("Mode -> {}", mode);
                monitor.set_mode(mode)
            }
            "5" => match prompt_number("Lux threshold") {
                Some(lux) => monitor.set_lux_threshold(lux),
                None => Ok(()),
            },
            "6" => match prompt_number("Manual brightness 0-100") {
                Some(percent) => monitor.set_manual_brightness(percent),
                None => Ok(()),
            },
            "7" => monitor.apply_manual_brightness(),
            "8" => {
                println!("{}", monitor.metrics());
                Ok(())
            }
            "9" => {
                let on = !show_readings.load(Ordering::Relaxed);
                show_readings.store(on, Ordering::Relaxed);
                println!("Live readings {}", if on { "on" } else { "off" });
                Ok(())
            }
            "0" | "q" => break,
            "" => Ok(()),
            other => {
                println!("Unrecognized option '{}', please try again.", other);
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("  ! {}", e);
        }
        // Let the printer catch up before the menu is redrawn.
        thread::sleep(Duration::from_millis(300));
    }

    println!("Shutting down...");
    monitor.shutdown();
    printing.store(false, Ordering::Release);
    let _ = printer.join();
    println!("{}", monitor.metrics());
    info!("=== AGRISENSE FINISHED ===");
    Ok(())
}

fn prompt_menu(monitor: &Monitor<SimulatedTransport>) -> String {
    let cfg = monitor.config();
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│  AGRISENSE   mode {:<6} threshold {:>5} lx │", cfg.mode.to_string(), cfg.lux_threshold);
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) Scan                                    │");
    println!("│  2) Connect                                 │");
    println!("│  3) Disconnect                              │");
    println!("│  4) Toggle AUTO / MANUAL                    │");
    println!("│  5) Set lux threshold                       │");
    println!("│  6) Set manual brightness ({:>3}%)           │", cfg.manual_brightness);
    println!("│  7) Apply manual brightness                 │");
    println!("│  8) Show metrics                            │");
    println!("│  9) Toggle live readings                    │");
    println!("│  0) Exit                                    │");
    println!("└─────────────────────────────────────────────┘");
    print!("Select: ");
    let _ = stdout().flush();
    read_line()
}

fn read_line() -> String {
    let mut input = String::new();
    let _ = stdin().read_line(&mut input);
    input.trim().to_string()
}

fn prompt_number(label: &str) -> Option<i32> {
    print!("{}: ", label);
    let _ = stdout().flush();
    let input = read_line();
    match input.parse::<i32>() {
        Ok(v) => Some(v),
        Err(_) => {
            println!("  ! '{}' is not a number", input);
            None
        }
    }
}

/// Accepts an index into the last scan, or a raw address.
fn prompt_address(peers: &PeerList) -> Option<String> {
    let known = peers.lock().clone();
    for (i, p) in known.iter().enumerate() {
        println!("  [{}] {}", i + 1, p);
    }
    print!("Device number or address: ");
    let _ = stdout().flush();
    let input = read_line();
    if input.is_empty() {
        return None;
    }
    match input.parse::<usize>() {
        Ok(i) if (1..=known.len()).contains(&i) => Some(known[i - 1].address.clone()),
        _ => Some(input),
    }
}

fn spawn_printer(
    events: EventReceiver,
    running: Arc<AtomicBool>,
    show_readings: Arc<AtomicBool>,
    peers: PeerList,
) -> anyhow::Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("printer".to_string())
        .spawn(move || {
            while running.load(Ordering::Acquire) {
                let event = match events.recv_timeout(Duration::from_millis(100)) {
                    Ok(e) => e,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                match &event {
                    Event::SensorUpdate(_) if !show_readings.load(Ordering::Relaxed) => {}
                    Event::Status(status) => {
                        if let StatusDetail::ScanComplete(found) = &status.detail {
                            *peers.lock() = found.clone();
                            for (i, p) in found.iter().enumerate() {
                                println!("  [{}] {}", i + 1, p);
                            }
                        }
                        println!("  {}", event);
                    }
                    _ => println!("  {}", event),
                }
            }
        })
        .context("spawning printer thread")?;
    Ok(handle)
}
