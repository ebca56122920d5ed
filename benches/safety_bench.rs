use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ossim_rs::core::SimTime;
use ossim_rs::safety;
use ossim_rs::scenario::{PuzzleGenerator, Scenario, PUZZLE_LEVELS};
use ossim_rs::scheduler::Policy;

fn bench_analyze(c: &mut Criterion) {
    let mut generator = PuzzleGenerator::seeded(1);
    let puzzles: Vec<_> = (0..64).map(|_| generator.generate(10, 5)).collect();

    c.bench_function("analyze 10x5", |b| {
        b.iter(|| {
            for puzzle in &puzzles {
                black_box(safety::analyze(black_box(&puzzle.snapshot)).unwrap());
            }
        })
    });

    c.bench_function("generate level 5", |b| {
        b.iter(|| black_box(generator.generate_for(&PUZZLE_LEVELS[4]).unwrap()))
    });
}

fn bench_scheduling(c: &mut Criterion) {
    let scenario = Scenario {
        name: "bench".into(),
        level: 1,
        policy: Policy::RoundRobin,
        quantum: 2.0,
        tick: 1.0,
        resources: Vec::new(),
        processes: PuzzleGenerator::seeded(2).workload(20),
    };

    c.bench_function("round robin 20 processes", |b| {
        b.iter(|| {
            let mut sim = scenario.build().unwrap();
            black_box(sim.run_to_completion(SimTime::new(10_000.0)).unwrap())
        })
    });
}

criterion_group!(benches, bench_analyze, bench_scheduling);
criterion_main!(benches);
