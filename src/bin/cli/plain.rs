use chrono::Local;
use logsub::{Client, ClientConfig, ConfigError, Event, LogsFilter, Notification};
use std::time::Duration;

use super::args::Cli;
use super::state::SessionState;

/// Run the CLI: print notifications until Ctrl-C
pub async fn run(cli: &Cli) -> Result<(), (String, u8)> {
    let filter = build_filter(cli)?;
    let config = build_config(cli, filter.clone());

    let client = Client::start(config).map_err(|e| format_config_error(&e))?;
    let mut state = SessionState::new(cli.url.clone(), filter.to_string(), cli.contains.clone())
        .dedupe(cli.dedupe, cli.dedupe_key.clone());

    println!("Subscribing to {} logs at {} ({})...", filter, cli.url, cli.commitment);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Disconnecting...");
                client.shutdown().await;
                break;
            }
            event = client.next_event() => {
                match event {
                    Some(event) => handle_event(event, cli, &mut state),
                    None => break,
                }
            }
        }
    }

    if cli.summary {
        println!("{}", state.generate_summary());
    }
    Ok(())
}

fn build_filter(cli: &Cli) -> Result<LogsFilter, (String, u8)> {
    match (&cli.mentions, cli.all) {
        (Some(address), false) => Ok(LogsFilter::mentions(address.clone())),
        (None, true) if cli.with_votes => Ok(LogsFilter::AllWithVotes),
        (None, true) => Ok(LogsFilter::All),
        _ => Err((
            "Either --mentions <ADDRESS> or --all is required".to_string(),
            super::exit_codes::CONFIG_ERROR,
        )),
    }
}

fn build_config(cli: &Cli, filter: LogsFilter) -> ClientConfig {
    let ping = (cli.ping_secs > 0).then(|| Duration::from_secs(cli.ping_secs));
    ClientConfig::new(cli.url.clone(), filter)
        .commitment(cli.commitment)
        .reconnect_delay(
            Duration::from_millis(cli.reconnect_base_ms),
            Duration::from_millis(cli.reconnect_cap_ms),
        )
        .idle_timeout(Duration::from_secs(cli.idle_timeout_secs))
        .ping_interval(ping)
}

fn handle_event(event: Event, cli: &Cli, state: &mut SessionState) {
    let time = Local::now().format("%H:%M:%S");
    match event {
        Event::Connected => {
            state.record_connected();
            println!("[{}] Connected to {}", time, cli.url);
        }
        Event::Subscribed(id) => println!("[{}] Subscribed (id {})", time, id),
        Event::Notification(n) => {
            state.notifications += 1;
            print_notification(&n, cli, state);
        }
        Event::Disconnected(reason) => println!("[{}] Disconnected: {}", time, reason),
        Event::Error(err) => {
            state.errors += 1;
            eprintln!("[{}] Error: {}", time, err);
        }
        Event::Closed => println!("[{}] Closed", time),
    }
}

fn print_notification(n: &Notification, cli: &Cli, state: &mut SessionState) {
    let time = Local::now().format("%H:%M:%S");
    if cli.raw {
        println!("[{}] {}", time, n.payload);
        return;
    }
    match n.logs() {
        Ok(logs) => {
            for line in &logs.value.logs {
                if state.accept_line(line) {
                    println!("[{}] slot {} {}: {}", time, logs.context.slot, logs.value.signature, line);
                }
            }
        }
        // Not the logs shape; show it as-is rather than losing it.
        Err(_) => println!("[{}] {}", time, n.payload),
    }
}

fn format_config_error(err: &ConfigError) -> (String, u8) {
    (
        format!("Invalid configuration: {}", err),
        super::exit_codes::CONFIG_ERROR,
    )
}
