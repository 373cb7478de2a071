/// Story Lint: checks story, agent and puzzle documents for broken links.
///
/// Usage: story_lint <data_dir> [--start <scene_id>] [--strict]
///
/// `data_dir` must contain story.json, agents.json and puzzles.json.
/// Exits non-zero on errors, or on warnings too with --strict.

use story_engine::core::integrity::IntegrityReport;
use story_engine::core::loader::StoryData;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: story_lint <data_dir> [--start <scene_id>] [--strict]");
        process::exit(0);
    }

    let data_dir = &args[1];
    let mut start_fallback = "intro".to_string();
    let mut strict = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--start" if i + 1 < args.len() => {
                i += 1;
                start_fallback = args[i].clone();
            }
            "--strict" => strict = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let data = match StoryData::load_from_dir(Path::new(data_dir), &start_fallback) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    println!(
        "Loaded {} scenes, {} agents, {} puzzle templates",
        data.story.len(),
        data.agents.len(),
        data.puzzles.len()
    );
    println!("Start scene: {}", data.story.start);

    let report = IntegrityReport::check(&data);

    println!("\n=== Story Lint Report ===\n");

    if report.issues.is_empty() {
        println!("All checks passed!");
    }

    for warning in report.warnings() {
        println!("WARNING: {}", warning);
    }

    for error in report.errors() {
        println!("ERROR: {}", error);
    }

    println!(
        "\nReachable scenes: {}/{}",
        report.reachable_count, report.scene_count
    );
    println!("Endings ({}):", report.endings.len());
    for ending in &report.endings {
        println!("  - {}", ending);
    }

    let errors = report.errors().count();
    let warnings = report.warnings().count();
    println!("\nSummary: {} errors, {} warnings", errors, warnings);

    if errors > 0 || (strict && warnings > 0) {
        process::exit(1);
    }
}
