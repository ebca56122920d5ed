use ossim_rs::prelude::*;
use ossim_rs::scenario::{PuzzleGenerator, PuzzleSession, PUZZLE_LEVELS};
use ossim_rs::safety;
use tracing_subscriber;

fn main() -> anyhow::Result<()> {
    // Инициализируем логирование
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("🏦 Головоломка банкира");
    println!("======================\n");

    // Классический пример: 5 процессов, 3 ресурса
    let mut sim = Simulator::new();
    let a = sim.create_resource("A", 10)?;
    let b = sim.create_resource("B", 5)?;
    let c = sim.create_resource("C", 7)?;

    let table = [
        ("P0", [7, 5, 3], [0, 1, 0]),
        ("P1", [3, 2, 2], [2, 0, 0]),
        ("P2", [9, 0, 2], [3, 0, 2]),
        ("P3", [2, 2, 2], [2, 1, 1]),
        ("P4", [4, 3, 3], [0, 0, 2]),
    ];
    let mut ids = Vec::new();
    for (name, max, held) in table {
        let max = [(a, max[0]), (b, max[1]), (c, max[2])].into_iter().collect();
        let pid = sim.create_process(name, 0.0, 1.0, 0, max)?;
        for (resource, amount) in [(a, held[0]), (b, held[1]), (c, held[2])] {
            if amount > 0 {
                sim.allocate(pid, resource, amount)?;
            }
        }
        ids.push(pid);
    }

    println!("Безопасно: {}", sim.is_safe_state());
    println!("Последовательность: {:?}", sim.compute_safe_sequence());
    println!("Запрос P1 на 1 единицу A: {}", sim.check_request(ids[1], a, 1)?);
    println!("Запрос P0 по B на 2: {}\n", sim.check_request(ids[0], b, 2)?);

    // Случайная головоломка уровня 3
    let level = PUZZLE_LEVELS[2];
    let mut generator = PuzzleGenerator::seeded(2024);
    let puzzle = generator.generate_for(&level)?;
    println!("🧩 Уровень {}: {}", level.id, level.name);
    println!("   свободно:  {:?}", puzzle.snapshot.available);
    println!("   выделено:  {:?}", puzzle.snapshot.allocation);
    println!("   нужно:     {:?}", puzzle.snapshot.need);

    let report = safety::analyze(&puzzle.snapshot)?;
    println!("   безопасно: {}, застряли: {:?}\n", report.safe, report.stuck);

    // Решаем первый уровень жадно, как подсказывает анализатор
    let level = PUZZLE_LEVELS[0];
    let puzzle = generator.generate_for(&level)?;
    let plan = safety::analyze(&puzzle.snapshot)?;
    let mut session = PuzzleSession::new(level, puzzle)?;
    if let Some(hint) = session.hint()? {
        println!("💡 {}", hint);
    }
    for pid in plan.progress {
        session.advance(5.0);
        session.execute(pid)?;
    }
    match session.final_score() {
        Some(score) => println!("🏆 Решено: {:?}, счет {}", session.sequence(), score),
        None => println!("❌ Головоломка не решена, ходов: {}", session.moves()),
    }

    Ok(())
}
