//! `batchkit bench` — measure how well a burst of calls coalesces.

use std::convert::Infallible;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use batchkit_core::{Batcher, BatcherConfig};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
struct BenchReport {
    calls: usize,
    distinct_keys: u64,
    invocations: u64,
    calls_per_invocation: f64,
    elapsed_ms: u128,
    config: BatcherConfig,
}

pub async fn run(
    calls: usize,
    distinct: u64,
    latency: Duration,
    config: BatcherConfig,
    as_json: bool,
) -> Result<()> {
    if distinct == 0 {
        bail!("--distinct must be at least 1");
    }

    let batcher: Batcher<u64, u64> = Batcher::with_config(
        move |keys: Vec<u64>| async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Ok::<_, Infallible>(keys.into_iter().map(|k| k + 1).collect::<Vec<_>>())
        },
        config.clone(),
    )?;

    info!(calls, distinct, ?config, "starting benchmark");
    let start = Instant::now();
    let results = try_join_all((0..calls).map(|i| batcher.call(i as u64 % distinct))).await?;
    let elapsed = start.elapsed();

    for (i, value) in results.iter().enumerate() {
        if *value != i as u64 % distinct + 1 {
            bail!("call {i} received {value}, expected {}", i as u64 % distinct + 1);
        }
    }

    let invocations = batcher.call_count();
    let report = BenchReport {
        calls,
        distinct_keys: distinct,
        invocations,
        calls_per_invocation: calls as f64 / invocations.max(1) as f64,
        elapsed_ms: elapsed.as_millis(),
        config,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Benchmark: {} calls over {} distinct keys", report.calls, report.distinct_keys);
        println!("  Invocations:       {}", report.invocations);
        println!("  Calls/invocation:  {:.1}", report.calls_per_invocation);
        println!("  Elapsed:           {}ms", report.elapsed_ms);
    }
    Ok(())
}
