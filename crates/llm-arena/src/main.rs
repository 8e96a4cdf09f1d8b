use anyhow::Context;
use clap::{Parser, Subcommand};
use llm_arena::board::{diagram_from_fen, Board, Side};
use llm_arena::completion::GeminiClient;
use llm_arena::config::{ArenaConfig, Overrides};
use llm_arena::export::SvgExporter;
use llm_arena::game_runner::{GameRunner, GameSettings, Outcome};
use llm_arena::move_client::MoveClient;
use llm_arena::resolver::MoveResolver;
use llm_arena::{json_output, pgn};
use rate_governor::{RateGovernor, Usage};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "llm_arena=info,rate_governor=info";

#[derive(Parser)]
#[command(name = "llm-arena")]
#[command(about = "Chess matches between two language-model players")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "arena.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one game
    Play {
        /// Ply ceiling
        #[arg(short = 'm', long)]
        max_moves: Option<u32>,
        /// Sampling temperature for both players
        #[arg(short, long)]
        temperature: Option<f32>,
        /// Output-length cap for both players
        #[arg(long)]
        max_output_tokens: Option<u32>,
        /// Calls allowed per minute
        #[arg(long)]
        per_minute: Option<u32>,
        /// Calls allowed per day
        #[arg(long)]
        per_day: Option<u32>,
        /// Directory for board images and game records
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Starting position
        #[arg(long)]
        fen: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

impl Commands {
    fn overrides(&self) -> Overrides {
        match self {
            Self::Play {
                max_moves,
                temperature,
                max_output_tokens,
                per_minute,
                per_day,
                output,
                fen,
            } => Overrides {
                max_moves: *max_moves,
                temperature: *temperature,
                max_output_tokens: *max_output_tokens,
                per_minute: *per_minute,
                per_day: *per_day,
                output_dir: output.clone(),
                start_fen: fen.clone(),
            },
            Self::Config => Overrides::default(),
        }
    }
}

fn main() -> ExitCode {
    // A missing .env file is fine; the key may come from the environment.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = ArenaConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply(&cli.command.overrides());
    config.validate()?;

    match cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Play { .. } => play(&config),
    }
}

fn play(config: &ArenaConfig) -> anyhow::Result<ExitCode> {
    let board = match &config.game.start_fen {
        Some(fen) => Board::from_fen(fen)?,
        None => Board::new(),
    };
    let api_key = config.endpoint.api_key()?;
    let governor = Arc::new(RateGovernor::new(config.limits.rate_limits())?);
    let endpoint = GeminiClient::new(&config.endpoint, api_key)?;
    info!(url = endpoint.url(), "using completion endpoint");

    let client = MoveClient::new(
        endpoint,
        Arc::clone(&governor),
        config.game.legal_moves_in_prompt,
    );
    let resolver = MoveResolver::new(client, config.game.max_attempts);
    let settings = GameSettings {
        max_moves: config.game.max_moves,
        max_consecutive_errors: config.game.max_consecutive_errors,
    };

    let output_dir = &config.game.output_dir;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let white = config.player(Side::White);
    let black = config.player(Side::Black);
    println!(
        "Starting game: {} (white) vs {} (black), up to {} plies",
        white.name, black.name, settings.max_moves
    );

    let mut runner = GameRunner::new(resolver, white, black, settings)
        .with_board(board)
        .with_exporter(Box::new(SvgExporter::new(output_dir)));
    let outcome = runner.play_game();

    let game_id = uuid::Uuid::new_v4().to_string();
    let pgn_path = output_dir.join("game.pgn");
    if let Err(e) = pgn::write_pgn(&pgn_path, &outcome) {
        warn!("Failed to save PGN file {}: {e}", pgn_path.display());
    }
    let json_path = output_dir.join("game.json");
    if let Err(e) = json_output::write_json(&json_path, &game_id, &outcome) {
        warn!("Failed to write JSON {}: {e}", json_path.display());
    }

    print_stats(&outcome, &governor.usage());

    if outcome.termination.is_abort() {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_stats(outcome: &Outcome, usage: &Usage) {
    println!("\n{}", "=".repeat(50));
    println!("GAME OVER");
    println!("{}", "=".repeat(50));
    println!("Total moves: {}", outcome.plies);
    println!("Duration: {:.1}s", outcome.duration.as_secs_f64());
    println!("Reason: {}", outcome.termination);
    match outcome.winner {
        Some(side) => println!("Winner: {side}"),
        None => println!("Winner: none ({})", outcome.result.as_pgn()),
    }

    let history: Vec<String> = outcome
        .moves
        .iter()
        .map(|m| match m.attempts {
            1 => m.san.clone(),
            n => format!("{}({n})", m.san),
        })
        .collect();
    println!("Move history: {}", history.join(" "));

    println!("\nFinal position: {}", outcome.final_fen);
    println!("{}", diagram_from_fen(&outcome.final_fen));
    println!(
        "\nAPI usage: {}/{} calls today ({} remaining), {}/{} this minute",
        usage.calls_today,
        usage.per_day,
        usage.remaining_today(),
        usage.calls_this_minute,
        usage.per_minute
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses_play_with_overrides() {
        let cli = Cli::try_parse_from([
            "llm-arena",
            "play",
            "-m",
            "40",
            "--temperature",
            "0.5",
            "--per-minute",
            "4",
            "--fen",
            "7k/8/8/8/8/8/8/K6R w - - 0 1",
        ])
        .expect("should parse");

        assert_eq!(cli.config, PathBuf::from("arena.toml"));
        let overrides = cli.command.overrides();
        assert_eq!(overrides.max_moves, Some(40));
        assert_eq!(overrides.temperature, Some(0.5));
        assert_eq!(overrides.per_minute, Some(4));
        assert_eq!(overrides.per_day, None);
        assert_eq!(
            overrides.start_fen.as_deref(),
            Some("7k/8/8/8/8/8/8/K6R w - - 0 1")
        );
    }

    #[test]
    fn test_cli_parses_global_config_path() {
        let cli = Cli::try_parse_from(["llm-arena", "play", "--config", "custom.toml"])
            .expect("should parse");
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert_eq!(cli.command.overrides(), Overrides::default());
    }

    #[test]
    fn test_cli_parses_config_command() {
        let cli = Cli::try_parse_from(["llm-arena", "config"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["llm-arena"]).is_err());
    }

    #[test]
    fn test_cli_rejects_non_numeric_limits() {
        assert!(Cli::try_parse_from(["llm-arena", "play", "--per-day", "many"]).is_err());
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}
