/// Play: walks a story on the terminal, one command at a time.
///
/// Usage: play --data <dir> [--config <file.ron>] [--agent <id>] [--scene <id>]
///             [--progress-dir <dir>] [--events <file.jsonl>] [--seed <n>]
///
/// Commands:
///   <n> | choose <n>      take choice n (1-based)
///   back                  previous scene
///   reset                 back to the start
///   puzzle                open the scene's puzzle
///   select <item>         sorting: place a card
///   deselect <n>          sorting: remove the card at position n (1-based)
///   press <symbol>        pattern: enter a symbol
///   pick <n>              jigsaw: pick tile n (1-based)
///   check                 evaluate the puzzle
///   retry                 reset the puzzle
///   continue              follow a solved puzzle
///   agents | agent <id>   list agents / switch agent
///   progress              endings found by this agent
///   forget yes            erase this agent's progress
///   help                  list commands
///   quit                  exit

use std::io::{self, BufRead, Write};
use std::process;

use story_engine::core::navigator::{SceneView, StoryEngine};
use story_engine::core::notifier::JsonLinesSink;
use story_engine::core::progress::FileStore;
use story_engine::core::puzzle::{PuzzleInput, PuzzleSession, PuzzleState, Submission};
use story_engine::core::session::{Command, Dispatch, Session};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut data_dir = None;
    let mut config_path = None;
    let mut agent = None;
    let mut scene = None;
    let mut progress_dir = ".story_progress".to_string();
    let mut events_path = None;
    let mut seed = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--data" if i + 1 < args.len() => {
                i += 1;
                data_dir = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--agent" if i + 1 < args.len() => {
                i += 1;
                agent = Some(args[i].clone());
            }
            "--scene" if i + 1 < args.len() => {
                i += 1;
                scene = Some(args[i].clone());
            }
            "--progress-dir" if i + 1 < args.len() => {
                i += 1;
                progress_dir = args[i].clone();
            }
            "--events" if i + 1 < args.len() => {
                i += 1;
                events_path = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().ok();
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let Some(data_dir) = data_dir else {
        eprintln!("ERROR: --data is required");
        process::exit(1);
    };

    let mut builder = StoryEngine::builder()
        .data_dir(data_dir)
        .agent(agent.as_deref())
        .resume_scene(scene.as_deref());
    if let Some(path) = config_path {
        builder = builder.config_file(path);
    }
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    builder = match FileStore::open(&progress_dir) {
        Ok(store) => builder.with_store(store),
        Err(e) => {
            eprintln!("WARNING: progress will not be saved ({})", e);
            builder
        }
    };
    if let Some(path) = events_path {
        match std::fs::File::create(&path) {
            Ok(file) => builder = builder.with_sink(JsonLinesSink::new(io::BufWriter::new(file))),
            Err(e) => eprintln!("WARNING: cannot write events to {}: {}", path, e),
        }
    }

    let mut session = Session::loading();
    session.dispatch(Command::StartMission);
    match session.finish_loading(builder.build()) {
        Ok(replayed) => {
            for result in replayed {
                match result {
                    Ok(view) => print_view(&view),
                    Err(e) => println!("{}", e.diagnostic()),
                }
            }
        }
        Err(failure) => {
            println!("{}", failure.message);
            eprintln!("ERROR: {}", failure.detail);
            process::exit(1);
        }
    }

    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("play> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (cmd, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
            None => (line.to_lowercase(), ""),
        };

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_usage(),
            "choose" | "c" => match parse_index(rest) {
                Some(index) => navigate(&mut session, Command::Choose(index)),
                None => println!("Usage: choose <n>"),
            },
            "back" | "b" => navigate(&mut session, Command::Back),
            "reset" => navigate(&mut session, Command::Reset),
            _ => {
                if let Some(index) = parse_index(&cmd) {
                    navigate(&mut session, Command::Choose(index));
                    continue;
                }
                let Some(engine) = session.engine_mut() else {
                    break;
                };
                run_engine_command(engine, &cmd, rest);
            }
        }
    }
}

fn run_engine_command(engine: &mut StoryEngine, cmd: &str, rest: &str) {
    match cmd {
        "puzzle" | "p" => {
            if let Err(e) = engine.open_puzzle() {
                println!("ERROR: {}", e);
                return;
            }
            if let Some(puzzle) = engine.puzzle() {
                println!("\n== {} ==", engine.render_text(puzzle.title()));
                println!("{}", engine.render_text(puzzle.description()));
                if !puzzle.hint().is_empty() {
                    println!("Pista: {}", engine.render_text(puzzle.hint()));
                }
                print_puzzle(puzzle);
            }
        }
        "select" => puzzle_input(engine, PuzzleInput::Select(rest.to_string())),
        "press" => puzzle_input(engine, PuzzleInput::Press(rest.to_string())),
        "deselect" => match parse_index(rest) {
            Some(position) => puzzle_input(engine, PuzzleInput::Deselect(position)),
            None => println!("Usage: deselect <n>"),
        },
        "pick" => match parse_index(rest) {
            Some(slot) => puzzle_input(engine, PuzzleInput::Pick(slot)),
            None => println!("Usage: pick <n>"),
        },
        "check" => match engine.check_puzzle() {
            Ok(submission) => print_submission(&submission),
            Err(e) => println!("ERROR: {}", e),
        },
        "retry" => match engine.reset_puzzle() {
            Ok(()) => {
                if let Some(puzzle) = engine.puzzle() {
                    print_puzzle(puzzle);
                }
            }
            Err(e) => println!("ERROR: {}", e),
        },
        "continue" => match engine.continue_from_puzzle() {
            Ok(view) => print_view(&view),
            Err(e) => println!("{}", e.diagnostic()),
        },
        "agents" => {
            for agent in engine.data().agents.iter() {
                let marker = if &agent.id == engine.agent_id() { "*" } else { " " };
                println!(
                    " {} {} ({})",
                    marker,
                    agent.id,
                    agent.display_name().unwrap_or("sin nombre")
                );
            }
        }
        "agent" => {
            if rest.is_empty() {
                println!("Usage: agent <id>");
                return;
            }
            match engine.switch_agent(rest) {
                Ok(view) => print_view(&view),
                Err(e) => println!("ERROR: {}", e),
            }
        }
        "progress" => {
            let progress = engine.endings_progress();
            println!(
                "Finales: {}/{} ({}%)",
                progress.found, progress.total, progress.percentage
            );
            for ending in engine.found_endings() {
                println!("  - {}", ending);
            }
            if engine.progress_degraded() {
                println!("(el progreso no se está guardando)");
            }
        }
        "forget" => {
            if engine.endings_progress().found == 0 {
                println!("No hay progreso para reiniciar.");
            } else if rest == "yes" {
                engine.reset_progress();
                println!("Progreso reiniciado.");
            } else {
                println!("This erases every ending found. Type 'forget yes' to confirm.");
            }
        }
        _ => println!("Unknown command: {}. Type 'help' for commands.", cmd),
    }
}

/// 1-based index from user input.
fn parse_index(text: &str) -> Option<usize> {
    text.parse::<usize>().ok().and_then(|n| n.checked_sub(1))
}

fn navigate(session: &mut Session, command: Command) {
    match session.dispatch(command) {
        Dispatch::Done(Ok(view)) => print_view(&view),
        Dispatch::Done(Err(e)) => println!("{}", e.diagnostic()),
        Dispatch::Queued => println!("Cargando..."),
        Dispatch::Unavailable(message) => println!("{}", message),
    }
}

fn puzzle_input(engine: &mut StoryEngine, input: PuzzleInput) {
    match engine.apply_puzzle_input(input) {
        Ok(Some(submission)) => {
            print_submission(&submission);
            if !submission.is_solved() {
                if let Some(puzzle) = engine.puzzle() {
                    print_puzzle(puzzle);
                }
            }
        }
        Ok(None) => {
            if let Some(puzzle) = engine.puzzle() {
                print_puzzle(puzzle);
            }
        }
        Err(e) => println!("ERROR: {}", e),
    }
}

fn print_submission(submission: &Submission) {
    if !submission.message.is_empty() {
        println!("{}", submission.message);
    }
    if submission.is_solved() {
        println!("(type 'continue')");
    }
}

fn print_view(view: &SceneView) {
    println!();
    println!("[{}] {} · {}", view.scene_id, view.date_label, view.place_label);
    for line in &view.lines {
        println!("  {}", line);
    }
    if let Some(puzzle) = &view.puzzle {
        println!("\n  * {} (type 'puzzle')", puzzle.title);
    }
    if !view.choices.is_empty() {
        println!();
    }
    for choice in &view.choices {
        let broken = if choice.resolved { "" } else { " (?)" };
        println!("  {}. {}{}", choice.index + 1, choice.label, broken);
    }
    if view.ending {
        println!("\n  -- FIN --");
    }
    println!();
}

fn print_puzzle(puzzle: &PuzzleSession) {
    match puzzle.state() {
        PuzzleState::Sorting(sorting) => {
            let available: Vec<&str> = sorting.available().map(String::as_str).collect();
            println!("Tarjetas: {}", available.join(" | "));
            println!("Orden:    {}", sorting.selected().join(" > "));
        }
        PuzzleState::Pattern(pattern) => {
            println!("Símbolos: {}", pattern.options().join(" "));
            println!(
                "Entrada:  {} (intento {}/{})",
                pattern.input().join(" "),
                pattern.attempt(),
                pattern.max_attempts()
            );
        }
        PuzzleState::Jigsaw(jigsaw) => {
            let cols = jigsaw.cols() as usize;
            for (row, chunk) in jigsaw.tiles().chunks(cols).enumerate() {
                let cells: Vec<String> = chunk
                    .iter()
                    .enumerate()
                    .map(|(col, tile)| {
                        let slot = row * cols + col;
                        let mark = if jigsaw.pending_pick() == Some(slot) { "*" } else { " " };
                        format!("{}{:>2}", mark, tile + 1)
                    })
                    .collect();
                println!("  {}", cells.join(" "));
            }
        }
        PuzzleState::Inert(_) => {
            println!("Puzzle no interactivo aún.");
            if puzzle.continue_target().is_some() {
                println!("(type 'continue')");
            }
        }
    }
}

fn print_usage() {
    println!("Usage: play --data <dir> [--config <file.ron>] [--agent <id>] [--scene <id>]");
    println!("            [--progress-dir <dir>] [--events <file.jsonl>] [--seed <n>]");
    println!();
    println!("Commands:");
    println!("  <n> | choose <n>     take choice n");
    println!("  back                 previous scene");
    println!("  reset                back to the start");
    println!("  puzzle               open the scene's puzzle");
    println!("  select <item>        sorting: place a card");
    println!("  deselect <n>         sorting: remove the card at position n");
    println!("  press <symbol>       pattern: enter a symbol");
    println!("  pick <n>             jigsaw: pick tile n");
    println!("  check                evaluate the puzzle");
    println!("  retry                reset the puzzle");
    println!("  continue             follow a solved puzzle");
    println!("  agents | agent <id>  list agents / switch agent");
    println!("  progress             endings found by this agent");
    println!("  forget yes           erase this agent's progress");
    println!("  quit                 exit");
}
