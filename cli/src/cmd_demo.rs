//! `batchkit demo` — walk through the basic coalescing scenarios.

use std::convert::Infallible;

use anyhow::Result;
use batchkit_core::{sync_unit_fn, Batcher, BatcherConfig, Series};
use futures::future::{join_all, try_join_all};

/// One demo outcome: the values the callers got back and how many times
/// the underlying function ran.
#[derive(Debug)]
struct Scenario {
    label: &'static str,
    values: Vec<u32>,
    call_count: u64,
}

async fn increment(keys: Vec<u32>) -> Result<Vec<u32>, Infallible> {
    Ok(keys.into_iter().map(|k| k + 1).collect())
}

async fn scenarios() -> Result<Vec<Scenario>> {
    let mut out = Vec::new();

    // Awaiting each call closes the window before the next call arrives.
    let batcher: Batcher<u32, u32> = Batcher::new(increment);
    let two = batcher.call(1).await?;
    let three = batcher.call(2).await?;
    out.push(Scenario { label: "simple", values: vec![two, three], call_count: batcher.call_count() });

    let batcher: Batcher<u32, u32> = Batcher::new(increment);
    let values = try_join_all([batcher.call(1), batcher.call(2)]).await?;
    out.push(Scenario { label: "array", values, call_count: batcher.call_count() });

    let batcher: Batcher<u32, u32> =
        Batcher::with_config(increment, BatcherConfig::default().limit(2))?;
    let values = try_join_all([1, 2, 3, 4].map(|k| batcher.call(k))).await?;
    out.push(Scenario { label: "limit 2", values, call_count: batcher.call_count() });

    let series: Series<u32, u32> = Series::new(sync_unit_fn(|k: u32| Ok::<_, Infallible>(k + 1)));
    let values: Vec<u32> = join_all([1, 2, 3, 4].map(|k| series.call(k)))
        .await
        .into_iter()
        .collect::<Result<_, _>>()?;
    out.push(Scenario { label: "series", values, call_count: series.call_count() });

    Ok(out)
}

pub async fn run() -> Result<()> {
    println!("Scenarios:\n");
    for Scenario { label, values, call_count } in scenarios().await? {
        let values: Vec<String> = values.iter().map(u32::to_string).collect();
        println!("  {label:<10} {}  (callCount {call_count})", values.join(" "));
    }
    Ok(())
}
