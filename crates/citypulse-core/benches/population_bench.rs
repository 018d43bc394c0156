use citypulse_core::{SimConfig, Simulation};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
}

fn bench_population_ticks(c: &mut Criterion) {
    let mut group = c.benchmark_group("population_tick");
    let samples: usize = env_parse("CP_BENCH_SAMPLES").filter(|v| *v > 0).unwrap_or(30);
    let warm: u64 = env_parse("CP_BENCH_WARMUP_SECS").unwrap_or(2);
    let measure: u64 = env_parse("CP_BENCH_MEASURE_SECS").unwrap_or(10);
    group.sample_size(samples);
    group.warm_up_time(Duration::from_secs(warm));
    group.measurement_time(Duration::from_secs(measure));
    // Ticks per bench iteration
    let ticks: usize = env_parse("CP_BENCH_TICKS").filter(|v| *v > 0).unwrap_or(64);
    let agents_list: Vec<usize> = std::env::var("CP_BENCH_AGENTS")
        .ok()
        .map(|s| {
            s.split(',')
                .filter_map(|t| t.trim().parse::<usize>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| vec![2000_usize, 5000, 10000]);

    for &agents in &agents_list {
        for protocol in [false, true] {
            let label = if protocol { "protocol" } else { "idle" };
            group.bench_function(format!("ticks{ticks}_agents{agents}_{label}"), |b| {
                b.iter_batched(
                    || {
                        let config = SimConfig {
                            agent_count: agents,
                            rng_seed: Some(0xBEEF),
                            ..SimConfig::default()
                        };
                        let mut sim = Simulation::new(config).expect("simulation");
                        if protocol {
                            sim.activate_protocol();
                        }
                        sim
                    },
                    |mut sim| {
                        for _ in 0..ticks {
                            sim.step();
                        }
                        sim
                    },
                    BatchSize::LargeInput,
                );
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_population_ticks);
criterion_main!(benches);
