use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use ascent::catalog::Catalog;
use ascent::config::Config;
use ascent::engine::Engine;
use ascent::history::CsvHistory;
use ascent::logging;
use ascent::service::{ManualSolve, MasteryService};
use ascent::store::{JsonStore, SolveStatus};

const USAGE: &str = "Usage: ascent <command> [args...]
Commands:
  sync <handle>                                  Pull history and rescore every topic
  submit <handle> <problem_id> [-t MINUTES]      Credit one solve from history
  stats <handle>                                 Current and peak mastery per topic
  recommend <handle> <topic> [-i INC] [-k COUNT] Problems just above the topic level
  daily <handle>                                 One problem for today
  recent <handle> [-k COUNT] [--unsolved]        Latest solved (or unsolved) problems
  graph                                          Topics and prerequisite edges";

enum Command {
    Sync { handle: String },
    Submit { handle: String, solve: ManualSolve },
    Stats { handle: String },
    Recommend { handle: String, topic: String, increment: i32, k: usize },
    Daily { handle: String },
    Recent { handle: String, k: usize, status: SolveStatus },
    Graph,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let command = parse_command(&args[1..]);

    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    logging::init_tracing(&config.log_level);

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to start runtime: {e}");
        std::process::exit(1);
    });
    match runtime.block_on(run(&config, command)) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn usage_error(message: &str) -> ! {
    eprintln!("{message}");
    eprintln!("{USAGE}");
    std::process::exit(1);
}

fn parse_command(args: &[String]) -> Command {
    let handle = || {
        args.get(1)
            .cloned()
            .unwrap_or_else(|| usage_error(&format!("Missing handle for {}", args[0])))
    };

    match args[0].as_str() {
        "sync" => Command::Sync { handle: handle() },
        "stats" => Command::Stats { handle: handle() },
        "daily" => Command::Daily { handle: handle() },
        "graph" => Command::Graph,
        "submit" => {
            let handle = handle();
            let problem_id = args
                .get(2)
                .cloned()
                .unwrap_or_else(|| usage_error("Missing problem id"));
            let mut time_spent_minutes = None;
            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "-t" if i + 1 < args.len() => {
                        time_spent_minutes = Some(parse_number(&args[i + 1], "minutes"));
                        i += 2;
                    }
                    other => usage_error(&format!("Unexpected argument: {other}")),
                }
            }
            Command::Submit {
                handle,
                solve: ManualSolve {
                    problem_id,
                    time_spent_minutes,
                },
            }
        }
        "recommend" => {
            let handle = handle();
            let topic = args
                .get(2)
                .cloned()
                .unwrap_or_else(|| usage_error("Missing topic"));
            let mut increment = 25;
            let mut k = 5;
            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "-i" if i + 1 < args.len() => {
                        increment = parse_number(&args[i + 1], "increment");
                        i += 2;
                    }
                    "-k" if i + 1 < args.len() => {
                        k = parse_number(&args[i + 1], "count");
                        i += 2;
                    }
                    other => usage_error(&format!("Unexpected argument: {other}")),
                }
            }
            Command::Recommend {
                handle,
                topic,
                increment,
                k,
            }
        }
        "recent" => {
            let handle = handle();
            let mut k = 10;
            let mut status = SolveStatus::Solved;
            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "-k" if i + 1 < args.len() => {
                        k = parse_number(&args[i + 1], "count");
                        i += 2;
                    }
                    "--unsolved" => {
                        status = SolveStatus::Unsolved;
                        i += 1;
                    }
                    other => usage_error(&format!("Unexpected argument: {other}")),
                }
            }
            Command::Recent { handle, k, status }
        }
        other => usage_error(&format!("Unknown command: {other}")),
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> T {
    raw.parse()
        .unwrap_or_else(|_| usage_error(&format!("Invalid {what}: {raw}")))
}

async fn run(config: &Config, command: Command) -> ascent::Result<String> {
    let engine = Arc::new(Engine::load(config)?);
    if let Command::Graph = command {
        return Ok(serde_json::to_string_pretty(engine.graph())?);
    }

    let catalog = Arc::new(Catalog::load_csv(&config.problems_path())?);
    let service = MasteryService::new(
        engine,
        catalog,
        JsonStore::new(config.users_dir()),
        CsvHistory::new(config.history_dir()),
    );

    let output = match command {
        Command::Sync { handle } => serde_json::to_string_pretty(&service.sync(&handle).await?)?,
        Command::Submit { handle, solve } => {
            serde_json::to_string_pretty(&service.submit(&handle, solve).await?)?
        }
        Command::Stats { handle } => serde_json::to_string_pretty(&service.stats(&handle).await?)?,
        Command::Recommend {
            handle,
            topic,
            increment,
            k,
        } => serde_json::to_string_pretty(&service.recommend(&handle, &topic, increment, k)?)?,
        Command::Daily { handle } => {
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            serde_json::to_string_pretty(&service.daily(&handle, &mut rng)?)?
        }
        Command::Recent { handle, k, status } => {
            serde_json::to_string_pretty(&service.recent(&handle, k, status)?)?
        }
        Command::Graph => serde_json::to_string_pretty(service.graph())?,
    };
    Ok(output)
}
