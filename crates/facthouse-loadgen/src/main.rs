//! `loadgen` — synthetic request-fact traffic against a running ingestion
//! service. Useful for soak-testing the sink's rotation/upload path and
//! for giving rollups something to chew on in a dev environment.
//!
//! ```bash
//! loadgen --target http://localhost:8080/api/v1/facts --qps 20 --concurrency 4
//! ```

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use facthouse_core::RequestFact;

const SERVICES: &[&str] = &[
    "auth-service",
    "payment-service",
    "inventory-service",
    "user-service",
    "cart-service",
];
const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE"];
const PATHS: &[&str] = &[
    "/api/v1/login",
    "/api/v1/users/{id}",
    "/api/v1/products",
    "/api/v1/cart/checkout",
];
const USER_AGENTS: &[&str] = &["Chrome", "Firefox", "Safari", "Edge", "Postman", "LoadGenerator"];

#[derive(Parser)]
#[command(name = "loadgen", about = "Facthouse ingestion load generator", long_about = None)]
struct Args {
    /// Target ingestion endpoint
    #[arg(long, default_value = "http://localhost:8080/api/v1/facts")]
    target: String,

    /// API key sent as X-API-Key (empty disables the header)
    #[arg(long, default_value = "")]
    api_key: String,

    /// Average requests per second across all workers
    #[arg(long, default_value_t = 5.0)]
    qps: f64,

    /// Number of concurrent workers
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Seconds to run (0 = until interrupted)
    #[arg(long, default_value_t = 0)]
    duration_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(
        target = %args.target,
        qps = args.qps,
        concurrency = args.concurrency,
        "starting load generator"
    );

    let cancel = CancellationToken::new();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, stopping");
            interrupt.cancel();
        }
    });

    if args.duration_secs > 0 {
        let deadline = cancel.clone();
        let duration = Duration::from_secs(args.duration_secs);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            info!("duration reached, stopping");
            deadline.cancel();
        });
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("failed to build HTTP client")?;

    let per_worker_qps = (args.qps / args.concurrency.max(1) as f64).max(0.1);
    let mut workers = Vec::new();
    for id in 0..args.concurrency.max(1) {
        workers.push(tokio::spawn(run_worker(
            id,
            client.clone(),
            args.target.clone(),
            args.api_key.clone(),
            per_worker_qps,
            cancel.clone(),
        )));
    }

    for worker in workers {
        let _ = worker.await;
    }
    info!("load generator stopped");
    Ok(())
}

async fn run_worker(
    id: usize,
    client: reqwest::Client,
    target: String,
    api_key: String,
    qps: f64,
    cancel: CancellationToken,
) {
    let interval = Duration::from_secs_f64(1.0 / qps);
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => send_one(id, &client, &target, &api_key).await,
        }
    }
}

async fn send_one(worker: usize, client: &reqwest::Client, target: &str, api_key: &str) {
    let fact = random_fact();

    let mut request = client.post(target).json(&fact);
    if !api_key.is_empty() {
        request = request.header("X-API-Key", api_key);
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            debug!(worker, event_id = %fact.event_id, status = %response.status(), "sent");
        }
        Ok(response) => {
            warn!(worker, status = %response.status(), "unexpected response");
        }
        Err(err) => {
            warn!(worker, error = %err, "request failed");
        }
    }
}

/// A fact with a latency distribution rough enough to make percentiles
/// interesting: p50 around 50 ms, a long tail past a second.
fn random_fact() -> RequestFact {
    let mut rng = rand::thread_rng();

    let latency_ms = match rng.gen::<f64>() {
        r if r < 0.90 => rng.gen_range(10..110),
        r if r < 0.99 => rng.gen_range(100..600),
        _ => rng.gen_range(500..2500),
    };

    let status_code = match rng.gen::<f64>() {
        r if r > 0.98 => 500,
        r if r > 0.95 => 400,
        _ => 200,
    };

    RequestFact {
        event_id: Uuid::now_v7(),
        event_time: Utc::now(),
        service: pick(&mut rng, SERVICES),
        method: pick(&mut rng, METHODS),
        path_template: pick(&mut rng, PATHS),
        status_code,
        latency_ms,
        user_agent_family: Some(pick(&mut rng, USER_AGENTS)),
    }
}

fn pick(rng: &mut impl Rng, options: &[&str]) -> String {
    options
        .choose(rng)
        .copied()
        .unwrap_or(options[0])
        .to_string()
}
