use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use envconfig::Envconfig;
use eyre::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

const TOPICS: &[&str] = &[
    "user.login",
    "user.logout",
    "order.created",
    "order.completed",
    "payment.processed",
];

#[derive(Envconfig)]
struct Config {
    #[envconfig(default = "http://localhost:8080/publish")]
    pub aggregator_url: String,

    #[envconfig(default = "25000")]
    pub num_events: usize,

    // Share of the total that are redeliveries of earlier events.
    #[envconfig(default = "0.30")]
    pub duplication_rate: f64,

    #[envconfig(default = "100")]
    pub batch_size: usize,

    #[envconfig(default = "10")]
    pub delay_ms: u64,

    #[envconfig(default = "5")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize)]
struct Event {
    topic: String,
    event_id: String,
    timestamp: String,
    source: String,
    payload: Value,
}

fn generate_event(rng: &mut impl Rng, topic: &str) -> Event {
    Event {
        topic: topic.to_owned(),
        event_id: format!("evt-{}", Uuid::now_v7()),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        source: "publisher-service".to_owned(),
        payload: json!({
            "user_id": rng.gen_range(1..=1000),
            "session_id": Uuid::now_v7().to_string(),
            "data": format!("sample data for {topic}"),
            "random_value": rng.gen::<f64>(),
        }),
    }
}

/// Build the full traffic mix up front: unique events plus redeliveries with
/// refreshed timestamps, shuffled together the way an at-least-once producer
/// would interleave retries.
fn generate_traffic(num_events: usize, duplication_rate: f64) -> (Vec<Event>, usize) {
    let mut rng = rand::thread_rng();

    let num_unique = ((num_events as f64) * (1.0 - duplication_rate)) as usize;
    let num_duplicates = num_events - num_unique;

    let unique: Vec<Event> = (0..num_unique)
        .map(|_| {
            let topic = TOPICS.choose(&mut rng).copied().unwrap_or(TOPICS[0]);
            generate_event(&mut rng, topic)
        })
        .collect();

    let mut all = unique.clone();
    for _ in 0..num_duplicates {
        if let Some(original) = unique.choose(&mut rng) {
            let mut duplicate = original.clone();
            // A redelivered event carries a fresh timestamp; identity is
            // (topic, event_id).
            duplicate.timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
            all.push(duplicate);
        }
    }

    all.shuffle(&mut rng);

    (all, num_unique)
}

async fn publish_batch(client: &reqwest::Client, url: &str, batch: &[Event]) -> Result<()> {
    let response = client
        .post(url)
        .json(&json!({ "events": batch }))
        .timeout(Duration::from_secs(10))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        eyre::bail!("aggregator responded {status}: {body}");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    tracing::info!(
        num_events = config.num_events,
        duplication_rate = config.duplication_rate,
        batch_size = config.batch_size,
        url = config.aggregator_url,
        "starting publisher"
    );

    let (all_events, num_unique) = generate_traffic(config.num_events, config.duplication_rate);
    let num_duplicates = all_events.len() - num_unique;

    tracing::info!(
        total = all_events.len(),
        unique = num_unique,
        duplicates = num_duplicates,
        "generated traffic"
    );

    let client = reqwest::Client::new();
    let start = Instant::now();
    let mut published: usize = 0;
    let mut errored: usize = 0;

    for (batch_index, batch) in all_events.chunks(config.batch_size).enumerate() {
        let mut attempt = 0;
        loop {
            match publish_batch(&client, &config.aggregator_url, batch).await {
                Ok(()) => {
                    published += batch.len();
                    break;
                }
                Err(err) if attempt < config.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_secs(1 << attempt);
                    tracing::warn!(
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        "batch publish failed, retrying: {err}"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    tracing::error!("giving up on batch after {attempt} retries: {err}");
                    errored += batch.len();
                    break;
                }
            }
        }

        if config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
        }

        if batch_index % 10 == 0 && batch_index > 0 {
            tracing::info!(published, total = all_events.len(), "progress");
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    tracing::info!(
        published,
        unique = num_unique,
        duplicates = num_duplicates,
        errors = errored,
        elapsed_secs = format!("{elapsed:.2}"),
        throughput = format!("{:.2}", published as f64 / elapsed.max(f64::EPSILON)),
        "publishing complete"
    );

    Ok(())
}
