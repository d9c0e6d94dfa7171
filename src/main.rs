// src/main.rs

use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use color_eyre::eyre::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use palisade_rs_client::core::aggregate;
use palisade_rs_client::core::models::ScanJob;
use palisade_rs_client::core::poll::{PollCallbacks, PollingController};
use palisade_rs_client::{logging, ResultSet, ScanApiClient};

/// Watch a scan job on a Palisade backend and summarize what it found.
#[derive(Debug, Parser)]
#[command(name = "palisade-watch", version, about)]
struct Args {
    /// Scan job id to watch.
    scan_id: String,

    /// Base URL of the backend API.
    #[arg(long, default_value = "http://127.0.0.1:8080/api/")]
    base_url: String,

    /// Seconds between status fetches.
    #[arg(long, default_value_t = 10)]
    interval: u64,

    /// Result document to fetch and summarize once the job ends.
    #[arg(long)]
    result_id: Option<String>,

    /// Project whose vulnerabilities feed the summary.
    #[arg(long)]
    project_id: Option<String>,

    /// Also list the backend's tool catalog.
    #[arg(long)]
    show_tools: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::initialize_logging()?;
    let args = Args::parse();

    let client = ScanApiClient::new(&args.base_url)?;
    info!(scan_id = %args.scan_id, base_url = %client.base_url(), "Watching scan.");
    println!("Watching scan {} via {}", args.scan_id, client.base_url());

    let interval = Duration::from_secs(args.interval.max(1));
    let final_job = watch_scan(&client, &args.scan_id, interval).await;

    match &final_job {
        Some(job) if !job.is_active() => println!("Scan ended in state: {}", job.state),
        Some(job) => println!("Watch interrupted; last seen state: {}", job.state),
        None => println!("No status update received."),
    }

    if let Some(result_id) = &args.result_id {
        match fetch_results(&client, result_id, args.project_id.as_deref()).await {
            Ok(results) => render_results(&results),
            Err(err) => {
                warn!(error = %err, "Result fetch failed.");
                eprintln!("Could not fetch results: {err}");
            }
        }
    }

    if args.show_tools {
        if let Err(err) = render_tools(&client).await {
            warn!(error = %err, "Tool catalog fetch failed.");
            eprintln!("Could not fetch tool catalog: {err}");
        }
    }

    Ok(())
}

/// Poll the scan until it leaves its active states or the user interrupts,
/// returning the last snapshot seen.
async fn watch_scan(client: &ScanApiClient, scan_id: &str, interval: Duration) -> Option<ScanJob> {
    let controller = PollingController::new();
    let (tx, mut rx) = mpsc::channel(16);

    let callbacks = PollCallbacks::new(move |job: &ScanJob| {
        let _ = tx.try_send(job.clone());
    })
    .with_on_error(|err| eprintln!("status fetch failed: {err}"));

    let fetch = client.clone().status_fetcher(scan_id.to_string());
    let handle = controller.start(fetch, interval, callbacks);

    let mut last = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nInterrupted; stopping watch.");
                handle.stop();
                break;
            }
            update = rx.recv() => match update {
                Some(job) => {
                    let now = Utc::now();
                    println!(
                        "[{}] state: {} ({}%)",
                        now.format("%H:%M:%S"),
                        job.state,
                        job.progress_hint(now)
                    );
                    let active = job.is_active();
                    last = Some(job);
                    if !active {
                        break;
                    }
                }
                // The poll task dropped its sender; nothing more will come.
                None => break,
            }
        }
    }
    last
}

async fn fetch_results(
    client: &ScanApiClient,
    result_id: &str,
    project_id: Option<&str>,
) -> palisade_rs_client::client::Result<ResultSet> {
    let payload = client.scan_result(result_id).await?;
    let mut results = ResultSet::from_payload(&payload);
    if let Some(project_id) = project_id {
        let vulns = client.project_vulnerabilities(project_id).await?;
        results = results.with_vulnerabilities(vulns);
    }
    Ok(results)
}

fn render_results(results: &ResultSet) {
    let summary = aggregate::summarize(results);
    println!();
    println!(
        "Results: {} records across {} distinct assets",
        summary.total_results, summary.assets_count
    );
    let counts = summary.vulnerability_counts;
    if counts.bucket_total() > 0 {
        println!(
            "Vulnerabilities: {} critical, {} high, {} medium, {} low, {} info",
            counts.critical, counts.high, counts.medium, counts.low, counts.info
        );
    }

    let hosts = aggregate::sort_hosts(results.subdomains.clone());
    if !hosts.is_empty() {
        println!();
        println!("{:<16} {:<40} {:>5}  TITLE", "IP", "DOMAIN", "HTTP");
        for host in &hosts {
            // Repeated IPs print blank so rows group visually per address.
            let ip = if host.is_first_ip {
                host.record.ip.as_str()
            } else {
                ""
            };
            let status = host
                .record
                .http_status
                .map(|s| s.to_string())
                .unwrap_or_default();
            println!(
                "{:<16} {:<40} {:>5}  {}",
                ip, host.record.domain, status, host.record.http_title
            );
        }
    }

    if !results.ports.is_empty() {
        println!();
        println!("{:<16} {:>5}  SERVICE", "HOST", "PORT");
        for port in &results.ports {
            let number = port.number().map(|n| n.to_string()).unwrap_or_default();
            println!("{:<16} {:>5}  {}", port.host(), number, port.service());
        }
    }

    if !results.paths.is_empty() {
        println!();
        println!("{:<50} STATUS", "PATH");
        for path in &results.paths {
            println!("{:<50} {}", path.path, path.status);
        }
    }
}

async fn render_tools(client: &ScanApiClient) -> palisade_rs_client::client::Result<()> {
    let catalog = client.available_tools().await?;
    let tools = aggregate::flatten_tools(&catalog);
    println!();
    println!("{:<16} {:<20} AVAILABLE", "CATEGORY", "TOOL");
    for tool in &tools {
        let mark = if tool.available { "yes" } else { "no" };
        println!("{:<16} {:<20} {}", tool.category, tool.name, mark);
    }
    Ok(())
}
