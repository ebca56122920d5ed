use std::time::Duration as WallDuration;

use ossim_rs::prelude::*;
use ossim_rs::scenario::{Contestant, PuzzleGenerator, Showdown};
use tokio::sync::watch;
use tracing_subscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализируем логирование
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("⚙️  Состязание планировщиков");
    println!("===========================\n");

    let mut generator = PuzzleGenerator::seeded(42);
    let workload = generator.workload(5);

    for spec in &workload {
        println!(
            "  {}: прибытие {:>4.1}, работа {:>4.1}, приоритет {}",
            spec.name, spec.arrival, spec.burst, spec.priority
        );
    }
    println!();

    let policies = [Policy::Fcfs, Policy::Sjf, Policy::Priority, Policy::RoundRobin];
    let contestants: Vec<Contestant> = policies
        .iter()
        .map(|&policy| Contestant {
            name: policy.name().to_string(),
            policy,
            processes: workload.clone(),
        })
        .collect();

    // Уровень 5 разрешает любую политику
    let standings = Showdown::level(5)?.run(&contestants)?;
    println!("🏆 Таблица:");
    for (place, standing) in standings.iter().enumerate() {
        println!("   {}. {:<24} {:>7.1}", place + 1, standing.name, standing.score);
    }
    println!();

    let mut scenario = Scenario {
        name: "showdown".into(),
        level: 1,
        policy: Policy::Fcfs,
        quantum: 2.0,
        tick: 1.0,
        resources: Vec::new(),
        processes: workload,
    };

    for policy in policies {
        scenario.policy = policy;
        let mut sim = scenario.build()?;
        let Some(metrics) = sim.run_to_completion(SimTime::new(1_000.0))? else {
            println!("{}: не успели завершить", policy);
            continue;
        };

        let gantt: Vec<String> = sim
            .timeline()
            .gantt()
            .iter()
            .map(|slice| match slice.process {
                Some(p) => format!("{}[{}-{}]", p, slice.start, slice.end),
                None => format!("idle[{}-{}]", slice.start, slice.end),
            })
            .collect();

        println!("📊 {} ({})", policy.name(), policy);
        println!("   ожидание:  {:.2}", metrics.avg_waiting);
        println!("   оборот:    {:.2}", metrics.avg_turnaround);
        println!("   отклик:    {:.2}", metrics.avg_response);
        println!("   загрузка:  {:.0}%", metrics.cpu_utilization * 100.0);
        println!("   диаграмма: {}\n", gantt.join(" "));
    }

    // Анимированный прогон Round Robin с остановкой по таймеру
    scenario.policy = Policy::RoundRobin;
    let simulation = Simulation::new(scenario.build()?).with_period(WallDuration::from_millis(20));
    let (stop, cancel) = watch::channel(false);

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(WallDuration::from_millis(300)).await;
        let _ = stop.send(true);
    });

    let summary = simulation.run_until(SimTime::new(1_000.0), cancel).await?;
    stopper.await?;
    println!(
        "⏱️  Прогон остановлен: {:?} после {} тиков, время {}",
        summary.reason, summary.ticks, summary.time
    );

    Ok(())
}
