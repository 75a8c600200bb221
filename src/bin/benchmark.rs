use std::time::Instant;

use clap::Parser;
use hdrhistogram::Histogram;
use rand::Rng;
use tracing::info;

use redis_zset::{Config, Value, ZSet};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser, Clone, Debug)]
struct BenchmarkConfig {
    /// operations per test
    #[arg(short = 'n', long, default_value_t = 100000)]
    pub count: u64,
    /// members are drawn from 0..keyspace
    #[arg(short, long, default_value_t = 10000)]
    pub keyspace: u64,
    #[arg(short, long, num_args = 1..)]
    pub tests: Vec<String>,
    #[arg(short, long)]
    pub config: Option<String>,
}

fn test_is_selected(tests: &[String], name: &str) -> bool {
    tests.is_empty() || tests.iter().any(|t| t.eq_ignore_ascii_case(name))
}

fn random_member(keyspace: u64) -> Value {
    let id = rand::rng().random_range(0..keyspace.max(1));
    Value::from(format!("element:{}", id))
}

fn run_op(zset: &mut ZSet, cmd: &str, keyspace: u64) -> Result<()> {
    let mut rng = rand::rng();
    match cmd {
        "zadd" => {
            zset.add(random_member(keyspace), rng.random_range(0.0..1000.0))?;
        }
        "zincrby" => {
            zset.incr_by(random_member(keyspace), 1.0)?;
        }
        "zscore" => {
            let _ = zset.score(&random_member(keyspace));
        }
        "zrank" => {
            let _ = zset.rank(&random_member(keyspace), false)?;
        }
        "zrem" => {
            zset.remove(&random_member(keyspace))?;
        }
        "zrange" => {
            let start = rng.random_range(1..=zset.len().max(1));
            let _ = zset.range_by_rank(start, start + 9, false);
        }
        _ => {}
    }
    Ok(())
}

fn benchmark(zset: &mut ZSet, cmd: &str, config: &BenchmarkConfig) -> Result<()> {
    println!("======{}======", cmd.to_uppercase());
    let mut hist = Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3)?;
    let st = Instant::now();
    for _ in 0..config.count {
        let op = Instant::now();
        run_op(zset, cmd, config.keyspace)?;
        hist.record((op.elapsed().as_nanos() as u64).max(1))?;
    }
    let elapsed = st.elapsed().as_secs_f64();
    let req_per_sec = config.count as f64 / elapsed;
    println!(" {} operations completed in {:.3} seconds", config.count, elapsed);
    println!(" {} members in the set", zset.len());
    println!(" Summary:");
    println!("     Throughput summary: {:.2} operations per second", req_per_sec);
    println!("     Latency summary (nsec): ");
    println!("               {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}", "avg", "min", "p50", "p95", "p99", "max");
    println!(
        "               {:>8.0} {:>8} {:>8} {:>8} {:>8} {:>8}",
        hist.mean(),
        hist.min(),
        hist.value_at_quantile(0.5),
        hist.value_at_quantile(0.95),
        hist.value_at_quantile(0.99),
        hist.max()
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = BenchmarkConfig::parse();
    let zset_config = Config::new(config.config.as_deref());
    info!(?zset_config, "starting sorted set benchmark");

    let mut zset = ZSet::with_config(&zset_config);
    for cmd in ["zadd", "zincrby", "zscore", "zrank", "zrange", "zrem"] {
        if test_is_selected(&config.tests, cmd) {
            benchmark(&mut zset, cmd, &config)?;
        }
    }
    zset.check_consistency()?;
    for stats in zset.dict().stats() {
        info!("\n{}", stats);
    }
    Ok(())
}
