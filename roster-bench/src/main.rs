// Copyright 2026 roster Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Load generator for the roster write-back cache.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use anyhow::Context as _;
use clap::Parser;
use futures_util::future::join_all;
use itertools::Itertools;
use roster::prelude::*;
use tokio::sync::broadcast;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    /// Number of distinct user ids.
    #[arg(long, default_value_t = 10_000)]
    users: u64,

    /// Number of concurrent writers.
    #[arg(short, long, default_value_t = 16)]
    writers: usize,

    /// Bench duration.
    #[arg(short, long, default_value = "30s")]
    time: humantime::Duration,

    /// Pause between two operations of one writer.
    #[arg(long, default_value = "1ms")]
    write_interval: humantime::Duration,

    /// Period of the write-back sweep.
    #[arg(long, default_value = "5s")]
    flush_interval: humantime::Duration,

    /// Period of the eviction sweep.
    #[arg(long, default_value = "1s")]
    reclaim_interval: humantime::Duration,

    /// How long an entry stays resident after its last flush.
    #[arg(long, default_value = "60s")]
    grace_period: humantime::Duration,

    /// Probability that a single store write fails.
    #[arg(long, default_value_t = 0.0)]
    failure_ratio: f64,

    /// If set, the store alternates between failing every write and `--failure-ratio` with this period.
    #[arg(long)]
    outage_period: Option<humantime::Duration>,

    /// Statistics report interval.
    #[arg(long, default_value = "2s")]
    report_interval: humantime::Duration,

    /// Run the sweepers on a dedicated runtime with this many worker threads.
    #[arg(long)]
    sweeper_threads: Option<usize>,
}

#[derive(Debug, Default)]
struct Counters {
    creates: AtomicUsize,
    updates: AtomicUsize,
    reads: AtomicUsize,
    deletes: AtomicUsize,
    errors: AtomicUsize,
}

fn init_logger() {
    use tracing_subscriber::{prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_line_number(true))
        .with(EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    #[cfg(feature = "deadlock")]
    {
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(1));
            let deadlocks = parking_lot::deadlock::check_deadlock();
            if deadlocks.is_empty() {
                continue;
            }

            println!("{} deadlocks detected", deadlocks.len());
            for (i, threads) in deadlocks.iter().enumerate() {
                println!("Deadlock #{i}");
                for t in threads {
                    println!("Thread Id {:#?}", t.thread_id());
                    println!("{:#?}", t.backtrace());
                }
            }
            std::process::abort();
        });
    }

    let args = Args::parse();
    println!("{args:#?}");
    anyhow::ensure!(args.users > 0, "\"--users\" must be greater than 0");

    let store = Arc::new(MemoryStore::new());
    store.set_failure_ratio(args.failure_ratio);

    let mut builder = CacheBuilder::new()
        .with_flush_interval(args.flush_interval.into())
        .with_reclaim_interval(args.reclaim_interval.into())
        .with_grace_period(args.grace_period.into());
    if let Some(threads) = args.sweeper_threads {
        builder = builder.with_spawner(Spawner::dedicated(threads)?);
    }
    let directory = Directory::open(builder, store.clone()).context("open directory")?;

    let counters = Arc::new(Counters::default());
    let (stop_tx, _) = broadcast::channel(16);

    let handle_monitor = tokio::spawn(monitor(
        directory.cache().clone(),
        store.clone(),
        counters.clone(),
        args.report_interval.into(),
        stop_tx.subscribe(),
    ));
    let handle_outage = args.outage_period.map(|period| {
        tokio::spawn(outage(
            store.clone(),
            args.failure_ratio,
            period.into(),
            stop_tx.subscribe(),
        ))
    });
    let handle_signal = tokio::spawn({
        let stop_tx = stop_tx.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("roster-bench is cancelled with CTRL-C");
                let _ = stop_tx.send(());
            }
        }
    });

    let start = Instant::now();
    let handles = (0..args.writers)
        .map(|_| {
            tokio::spawn(write(
                directory.clone(),
                counters.clone(),
                args.clone(),
                stop_tx.subscribe(),
            ))
        })
        .collect_vec();
    for res in join_all(handles).await {
        res.context("writer panicked")?;
    }
    let elapsed = start.elapsed();

    let _ = stop_tx.send(());
    if let Some(handle) = handle_outage {
        handle.await.context("outage task panicked")?;
    }
    // The final drain runs against the configured failure ratio, not an outage.
    store.set_failure_ratio(args.failure_ratio);
    handle_monitor.abort();
    handle_signal.abort();

    let close = Instant::now();
    directory.close().await?;
    let close = close.elapsed();

    let store_statistics = store.statistics();
    let summary = serde_json::json!({
        "elapsed": humantime::format_duration(elapsed).to_string(),
        "close": humantime::format_duration(close).to_string(),
        "creates": counters.creates.load(Ordering::Relaxed),
        "updates": counters.updates.load(Ordering::Relaxed),
        "reads": counters.reads.load(Ordering::Relaxed),
        "deletes": counters.deletes.load(Ordering::Relaxed),
        "errors": counters.errors.load(Ordering::Relaxed),
        "cache": directory.cache().statistics(),
        "unflushed": directory.cache().dirty(),
        "store": {
            "records": store.len(),
            "persisted": store_statistics.persisted,
            "rejected": store_statistics.rejected,
            "loads": store_statistics.loads,
            "removed": store_statistics.removed,
        },
    });
    println!("\nTotal:\n{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

async fn write(
    directory: Directory<MemoryStore>,
    counters: Arc<Counters>,
    args: Args,
    mut stop: broadcast::Receiver<()>,
) {
    let start = Instant::now();
    let time: Duration = args.time.into();
    let interval: Duration = args.write_interval.into();

    loop {
        match stop.try_recv() {
            Err(broadcast::error::TryRecvError::Empty) => {}
            _ => return,
        }
        if start.elapsed() >= time {
            return;
        }

        let id = rand::random_range(0..args.users);
        let res = match rand::random_range(0..32u8) {
            0 => directory.delete_user(id).await.map(|_| &counters.deletes),
            1..8 => directory.get_user(id).await.map(|_| &counters.reads),
            8..16 => directory.set_status(id, rand::random_bool(0.5)).await.map(|_| &counters.updates),
            16..24 => directory
                .add_to_group(id, rand::random_range(0..16))
                .await
                .map(|_| &counters.updates),
            _ => directory
                .remove_from_group(id, rand::random_range(0..16))
                .await
                .map(|_| &counters.updates),
        };
        let res = match res {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let user = User::new(id, format!("user-{id}")).with_email(format!("user-{id}@example.com"));
                match directory.create_user(user).await {
                    // Another writer created it first.
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(&counters.updates),
                    res => res.map(|_| &counters.creates),
                }
            }
            res => res,
        };
        match res {
            Ok(counter) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(id, "[bench]: Operation failed, err: {e}");
                counters.errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        tokio::time::sleep(interval).await;
    }
}

async fn monitor(
    cache: UserCache,
    store: Arc<MemoryStore>,
    counters: Arc<Counters>,
    interval: Duration,
    mut stop: broadcast::Receiver<()>,
) {
    let start = Instant::now();
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = stop.recv() => return,
            _ = ticker.tick() => {}
        }

        let statistics = cache.statistics();
        let operations = counters.creates.load(Ordering::Relaxed)
            + counters.updates.load(Ordering::Relaxed)
            + counters.reads.load(Ordering::Relaxed)
            + counters.deletes.load(Ordering::Relaxed);
        println!(
            "[{:>8.1}s] ops: {operations}, resident: {}, dirty: {}, flushes: {}, flush failures: {}, superseded: {}, evictions: {}, store records: {}",
            start.elapsed().as_secs_f64(),
            cache.len(),
            cache.dirty(),
            statistics.flushes,
            statistics.flush_failures,
            statistics.superseded,
            statistics.evictions,
            store.len(),
        );
    }
}

async fn outage(store: Arc<MemoryStore>, failure_ratio: f64, period: Duration, mut stop: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    let mut down = false;

    loop {
        tokio::select! {
            biased;
            _ = stop.recv() => return,
            _ = ticker.tick() => {}
        }

        down = !down;
        store.set_failure_ratio(if down { 1.0 } else { failure_ratio });
        tracing::info!(down, "[bench]: Toggle store outage.");
    }
}
