//! Subject Monitor - Pubgate
//!
//! A small debugging companion for the gateway: subscribes to a subject on
//! the broker and prints every message the gateway publishes there. Useful
//! for checking what actually went over the wire, byte for byte.

use clap::Parser;
use pubgate::broker::mqtt::configure_options;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::signal;
use tracing::{error, info, warn};

/// Subject monitor for the publish gateway
#[derive(Parser)]
#[command(name = "subject-monitor")]
#[command(about = "Watch messages published to a broker subject")]
#[command(version)]
struct Args {
    /// Subject to watch
    #[arg(short, long, default_value = "subjectName")]
    subject: String,

    /// Output format (pretty, compact, or json)
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// Broker URL (mqtt:// or mqtts://)
    #[arg(long, default_value = "mqtt://localhost:1883")]
    broker_url: String,
}

/// Output formatting options
#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    /// Human-readable with timestamps and pretty-printed JSON (default)
    Pretty,
    /// Single line per message, minimal formatting
    Compact,
    /// Raw JSON output for programmatic processing
    Json,
}

const HEADER_COLOR: &str = "\x1b[1;32m";
const RESET: &str = "\x1b[0m";

/// UTC wall-clock time of day, HH:MM:SS
fn timestamp() -> String {
    let secs_today = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() % 86_400)
        .unwrap_or(0);
    format!(
        "{:02}:{:02}:{:02}",
        secs_today / 3600,
        (secs_today % 3600) / 60,
        secs_today % 60
    )
}

fn format_message(topic: &str, payload: &str, format: &OutputFormat) -> String {
    let timestamp = timestamp();

    match format {
        OutputFormat::Json => {
            let json_output = serde_json::json!({
                "timestamp": timestamp,
                "topic": topic,
                "payload": if let Ok(json) = serde_json::from_str::<serde_json::Value>(payload) {
                    json
                } else {
                    serde_json::Value::String(payload.to_string())
                }
            });
            serde_json::to_string(&json_output).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Compact => format!(
            "{} {} {}",
            timestamp,
            topic,
            payload.replace('\n', " ").trim()
        ),
        OutputFormat::Pretty => {
            // Pretty-print when the payload parses as JSON; the gateway also
            // sends raw strings, which go through untouched
            let formatted_payload =
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(payload) {
                    serde_json::to_string_pretty(&json).unwrap_or_else(|_| payload.to_string())
                } else {
                    payload.to_string()
                };
            format!("{HEADER_COLOR}[{timestamp}] {topic}{RESET}\n{formatted_payload}\n")
        }
    }
}

fn setup_mqtt_client(broker_url: &str) -> Result<(AsyncClient, EventLoop), Box<dyn std::error::Error>> {
    let options = configure_options(broker_url)?;
    let (client, eventloop) = AsyncClient::new(options, 100);
    Ok((client, eventloop))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("subject_monitor=info,rumqttc=warn")
        .init();

    let args = Args::parse();

    println!("Pubgate - Subject Monitor");
    println!("=========================");
    println!("Subject: {}", args.subject);
    println!("Format: {:?}", args.format);
    println!("Broker: {}", args.broker_url);
    println!("Press Ctrl+C to stop monitoring");
    println!();

    // Handle Ctrl+C gracefully
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received...");
        shutdown_clone.store(true, Ordering::Relaxed);

        // If we don't exit within 2 seconds, force exit
        tokio::time::sleep(Duration::from_secs(2)).await;
        warn!("Graceful shutdown timed out, forcing exit");
        std::process::exit(0);
    });

    // Main connection loop with automatic reconnection
    let mut reconnect_delay = 1;
    const MAX_RECONNECT_DELAY: u64 = 30;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutting down monitor...");
            break;
        }

        info!("Connecting to MQTT broker...");

        let (client, mut eventloop) = match setup_mqtt_client(&args.broker_url) {
            Ok(client_and_loop) => client_and_loop,
            Err(e) => {
                error!("Failed to setup MQTT client: {}", e);
                tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
                reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
                continue;
            }
        };

        if let Err(e) = client.subscribe(&args.subject, QoS::AtLeastOnce).await {
            error!("Failed to subscribe to subject: {}", e);
            tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
            reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
            continue;
        }

        // Reset reconnect delay on successful connection
        reconnect_delay = 1;
        let mut connection_stable = false;

        // Process MQTT events until disconnection
        loop {
            // Check for shutdown more frequently
            if shutdown.load(Ordering::Relaxed) {
                info!("Disconnecting from MQTT broker...");
                let disconnect_timeout =
                    tokio::time::timeout(Duration::from_millis(500), client.disconnect()).await;

                if disconnect_timeout.is_err() {
                    warn!("Disconnect timed out, forcing exit");
                }
                return Ok(());
            }

            // Poll with timeout to allow regular shutdown checks
            let poll_result =
                tokio::time::timeout(Duration::from_millis(100), eventloop.poll()).await;

            match poll_result {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    let topic = String::from_utf8_lossy(&publish.topic).to_string();
                    let payload = String::from_utf8_lossy(&publish.payload);

                    let formatted = format_message(&topic, &payload, &args.format);
                    match args.format {
                        OutputFormat::Pretty => print!("{formatted}"),
                        _ => println!("{formatted}"),
                    }
                }
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                    info!("Connected to MQTT broker");
                    connection_stable = true;
                }
                Ok(Ok(Event::Incoming(Packet::SubAck(_)))) => {
                    info!("Subscribed to subject: {}", args.subject);
                }
                Ok(Ok(_)) => {} // Ignore other events
                Ok(Err(e)) => {
                    if connection_stable {
                        warn!("MQTT connection lost: {}", e);
                    } else {
                        error!("MQTT connection error during setup: {}", e);
                    }
                    break; // Exit inner loop to reconnect
                }
                Err(_) => {
                    // Timeout occurred, continue to check for shutdown
                    continue;
                }
            }
        }

        // Connection lost, wait before reconnecting
        if !shutdown.load(Ordering::Relaxed) {
            warn!("Reconnecting in {} seconds...", reconnect_delay);
            tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
            reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
        }
    }

    Ok(())
}
