use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api_client;
mod commands;
mod error;
mod models;

use api_client::EquipmentApiClient;
use commands::{Cli, Commands};
use models::{Dataset, Summary};

const COLUMNS: [&str; 5] = ["Equipment Name", "Type", "Flowrate", "Pressure", "Temperature"];

fn format_value(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "N/A".to_string())
}

fn print_summary(summary: &Summary) {
    println!(
        "  Total equipment: {}",
        summary
            .total_equipment
            .map(|n| n.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    );
    for (label, avg, min, max) in [
        (
            "Flowrate",
            summary.average_flowrate,
            summary.min_flowrate,
            summary.max_flowrate,
        ),
        (
            "Pressure",
            summary.average_pressure,
            summary.min_pressure,
            summary.max_pressure,
        ),
        (
            "Temperature",
            summary.average_temperature,
            summary.min_temperature,
            summary.max_temperature,
        ),
    ] {
        println!(
            "  {:<12} avg {:>10}  min {:>10}  max {:>10}",
            label,
            format_value(avg),
            format_value(min),
            format_value(max)
        );
    }
    if let Some(distribution) = &summary.type_distribution {
        println!("  Type distribution:");
        for (kind, count) in distribution {
            println!("    {:<20} {}", kind, count);
        }
    }
}

fn print_dataset(dataset: &Dataset, max_rows: Option<usize>) {
    println!(
        "Dataset {} - {} (uploaded {})",
        dataset.id,
        dataset.file_name,
        dataset.uploaded_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    print_summary(&dataset.summary);

    if let Some(limit) = max_rows {
        println!("  Rows ({} total):", dataset.raw_data.len());
        for row in dataset.raw_data.iter().take(limit) {
            let cells: Vec<String> = COLUMNS
                .iter()
                .map(|column| match row.get(*column) {
                    Some(value) => value
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| value.to_string()),
                    None => String::new(),
                })
                .collect();
            println!("    {}", cells.join(" | "));
        }
    }
}

async fn login(client: &EquipmentApiClient, cli: &Cli) -> anyhow::Result<()> {
    let username = cli
        .username
        .as_deref()
        .ok_or_else(|| anyhow!("a username is required (--username or EQUIPMENT_USERNAME)"))?;
    let password = cli
        .password
        .as_deref()
        .ok_or_else(|| anyhow!("a password is required (--password or EQUIPMENT_PASSWORD)"))?;
    client.login(username, password).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "equipment_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!("Using equipment service at {}", cli.api_url);

    run(&cli).await
}

/// Logs in when needed, runs the command and always ends the session it opened.
async fn run(cli: &Cli) -> anyhow::Result<()> {
    let client = EquipmentApiClient::new(&cli.api_url)?;
    if !cli.command.requires_login() {
        return run_command(&client, cli).await;
    }

    login(&client, cli).await?;
    let outcome = run_command(&client, cli).await;
    if let Err(err) = client.logout().await {
        warn!("Failed to end session: {}", err);
    }
    outcome
}

async fn run_command(client: &EquipmentApiClient, cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Health => {
            let health = client.health().await?;
            println!("{} (version {})", health.status, health.version);
        }
        Commands::Register { email } => {
            let username = cli
                .username
                .as_deref()
                .ok_or_else(|| anyhow!("--username is required to register"))?;
            let password = cli
                .password
                .as_deref()
                .ok_or_else(|| anyhow!("--password is required to register"))?;
            let account = client
                .register(username, password, email.as_deref())
                .await?;
            println!("{}: {}", account.message, account.username);
        }
        Commands::CheckAuth => {
            let status = client.check_auth().await?;
            match status.username {
                Some(username) if status.authenticated => println!("Authenticated as {}", username),
                _ => println!("Not authenticated"),
            }
        }
        Commands::Upload { path } => {
            let dataset = client
                .upload(path)
                .await
                .with_context(|| format!("uploading {}", path.display()))?;
            print_dataset(&dataset, None);
        }
        Commands::Summary => {
            let dataset = client.summary().await?;
            print_dataset(&dataset, None);
        }
        Commands::History => {
            let history = client.history().await?;
            if history.is_empty() {
                println!("No uploads yet");
            }
            for entry in history {
                println!(
                    "{:>6}  {}  {}  ({} items)",
                    entry.id,
                    entry.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.file_name,
                    entry
                        .summary
                        .total_equipment
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "N/A".to_string())
                );
            }
        }
        Commands::Dataset { id, rows } => {
            let dataset = client.dataset(*id).await?;
            print_dataset(&dataset, Some(*rows));
        }
        Commands::Report { id, output } => {
            let report = client.report(*id).await?;
            let target = output
                .clone()
                .unwrap_or_else(|| report.file_name.clone().into());
            tokio::fs::write(&target, &report.bytes)
                .await
                .with_context(|| format!("writing {}", target.display()))?;
            println!("Saved {} ({} bytes)", target.display(), report.bytes.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP responder that records request lines.
    async fn spawn_service(summary_status: u16) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buffer = Vec::new();
                let mut chunk = [0u8; 1024];
                let header_end = loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break None;
                    }
                    buffer.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                        break Some(pos + 4);
                    }
                };
                let Some(header_end) = header_end else {
                    continue;
                };
                let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
                let content_length = head
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                while buffer.len() < header_end + content_length {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buffer.extend_from_slice(&chunk[..n]);
                }

                let request_line = head.lines().next().unwrap_or_default().to_string();
                log.lock().unwrap().push(request_line.clone());

                let (status, body, cookie) = if request_line.contains("/api/login") {
                    (200, r#"{"message":"Login successful","username":"op"}"#, true)
                } else if request_line.contains("/api/summary") {
                    (summary_status, r#"{"error":"No datasets uploaded yet"}"#, false)
                } else {
                    (200, r#"{"message":"Logout successful"}"#, false)
                };
                let set_cookie = if cookie {
                    "Set-Cookie: sessionid=abc; Path=/\r\n"
                } else {
                    ""
                };
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    set_cookie,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{}/api", addr), seen)
    }

    fn summary_cli(api_url: &str) -> Cli {
        Cli::try_parse_from([
            "equipment-client",
            "--api-url",
            api_url,
            "--username",
            "op",
            "--password",
            "plant-pass-123",
            "summary",
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn failed_command_still_logs_out() {
        let (api_url, seen) = spawn_service(404).await;

        let result = run(&summary_cli(&api_url)).await;
        assert!(result.is_err());

        let requests = seen.lock().unwrap().clone();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].starts_with("POST /api/login"));
        assert!(requests[1].starts_with("GET /api/summary"));
        assert!(requests[2].starts_with("POST /api/logout"));
    }

    #[test]
    fn not_available_for_missing_values() {
        assert_eq!(format_value(None), "N/A");
        assert_eq!(format_value(Some(11.666)), "11.67");
    }
}
