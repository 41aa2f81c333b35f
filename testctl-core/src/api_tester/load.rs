use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};

use super::ApiTesterError;
use crate::contracts::{ApiTestSpec, HttpMethod};

const INTRA_SESSION_DELAY: Duration = Duration::from_millis(100);
const MAX_RECORDED_ERRORS: usize = 10;

#[derive(Debug, Clone)]
pub(super) struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub requests: u32,
    pub successes: u32,
    pub response_times_ms: Vec<f64>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadStats {
    pub total_requests: u32,
    pub successful_requests: u32,
    pub success_rate: f64,
    pub response_time_mean_ms: f64,
    pub response_time_min_ms: f64,
    pub response_time_max_ms: f64,
    pub response_time_p95_ms: f64,
    pub requests_per_second: f64,
    pub errors: Vec<String>,
}

pub(super) async fn run(
    client: Client,
    spec: ApiTestSpec,
    url: String,
    concurrent_users: u32,
    duration_seconds: u64,
) -> Result<LoadStats, ApiTesterError> {
    let wall_clock_start = Instant::now();
    let mut handles = Vec::with_capacity(concurrent_users as usize);
    for _ in 0..concurrent_users {
        let client = client.clone();
        let spec = spec.clone();
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            run_session(client, spec, url, duration_seconds).await
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(outcome) = handle.await {
            outcomes.push(outcome);
        }
    }

    Ok(aggregate(outcomes, wall_clock_start.elapsed()))
}

async fn run_session(client: Client, spec: ApiTestSpec, url: String, duration_seconds: u64) -> SessionOutcome {
    let deadline = Duration::from_secs(duration_seconds);
    let start = Instant::now();
    let mut outcome = SessionOutcome {
        requests: 0,
        successes: 0,
        response_times_ms: Vec::new(),
        errors: Vec::new(),
    };

    while start.elapsed() < deadline {
        let attempt_start = Instant::now();
        match send(&client, &spec, &url).await {
            Ok(status) => {
                outcome.requests += 1;
                outcome.response_times_ms.push(attempt_start.elapsed().as_secs_f64() * 1000.0);
                if status == spec.expected_status {
                    outcome.successes += 1;
                }
            }
            Err(err) => {
                outcome.requests += 1;
                outcome.response_times_ms.push(attempt_start.elapsed().as_secs_f64() * 1000.0);
                if outcome.errors.len() < MAX_RECORDED_ERRORS {
                    outcome.errors.push(err.to_string());
                }
            }
        }
        tokio::time::sleep(INTRA_SESSION_DELAY).await;
    }
    outcome
}

async fn send(client: &Client, spec: &ApiTestSpec, url: &str) -> Result<u16, reqwest::Error> {
    let method = match spec.method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    };
    let mut builder = client.request(method, url);
    for (key, value) in &spec.headers {
        builder = builder.header(key, value);
    }
    if let Some(body) = &spec.request_body {
        builder = builder.json(body);
    }
    let response = builder.send().await?;
    Ok(response.status().as_u16())
}

fn aggregate(outcomes: Vec<SessionOutcome>, wall_clock: Duration) -> LoadStats {
    let total_requests: u32 = outcomes.iter().map(|o| o.requests).sum();
    let successful_requests: u32 = outcomes.iter().map(|o| o.successes).sum();
    let all_times: Vec<f64> = outcomes
        .iter()
        .flat_map(|o| o.response_times_ms.iter().copied())
        .collect();
    let mean = if all_times.is_empty() {
        0.0
    } else {
        all_times.iter().sum::<f64>() / all_times.len() as f64
    };
    let min = all_times.iter().copied().fold(f64::INFINITY, f64::min);
    let max = all_times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut errors: Vec<String> = outcomes.into_iter().flat_map(|o| o.errors).collect();
    errors.truncate(MAX_RECORDED_ERRORS);

    LoadStats {
        total_requests,
        successful_requests,
        success_rate: if total_requests == 0 {
            0.0
        } else {
            successful_requests as f64 / total_requests as f64
        },
        response_time_mean_ms: mean,
        response_time_min_ms: if min.is_finite() { min } else { 0.0 },
        response_time_max_ms: if max.is_finite() { max } else { 0.0 },
        response_time_p95_ms: super::percentile(&all_times, 95.0),
        requests_per_second: if wall_clock.as_secs_f64() > 0.0 {
            total_requests as f64 / wall_clock.as_secs_f64()
        } else {
            0.0
        },
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_handles_no_sessions() {
        let stats = aggregate(Vec::new(), Duration::from_secs(1));
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.success_rate, 0.0);
    }

    #[test]
    fn aggregate_computes_success_rate() {
        let outcomes = vec![
            SessionOutcome {
                requests: 10,
                successes: 8,
                response_times_ms: vec![10.0, 20.0, 30.0],
                errors: vec!["boom".to_string()],
            },
            SessionOutcome {
                requests: 5,
                successes: 5,
                response_times_ms: vec![5.0],
                errors: Vec::new(),
            },
        ];
        let stats = aggregate(outcomes, Duration::from_secs(1));
        assert_eq!(stats.total_requests, 15);
        assert_eq!(stats.successful_requests, 13);
        assert!((stats.success_rate - 13.0 / 15.0).abs() < 1e-9);
        assert_eq!(stats.errors, vec!["boom".to_string()]);
    }
}
