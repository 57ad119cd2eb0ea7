use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use opening_trainer::config::TrainerConfig;
use opening_trainer::store::JsonFileStore;
use opening_trainer::tree::{leaf_lines, node_count};
use opening_trainer::{
    app, parse_pgn_to_tree, Difficulty, Error, LineDescriptor, LineKind, Mode, RepertoireIndex,
    Result, Side, TrainingSession,
};

#[derive(Parser)]
#[command(name = "opening-trainer")]
#[command(version, about = "Drill chess opening lines move by move", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "OPENING_TRAINER_CONFIG")]
    config: Option<PathBuf>,

    /// Custom line storage, overriding the configured path
    #[arg(long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every line, grouped by first move
    List,

    /// Find lines by name
    Search { query: String },

    /// Parse movetext and print the lines it contains
    Check { movetext: String },

    /// Save a custom line
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(short, long, value_enum)]
        side: SideArg,
        #[arg(short, long, value_enum, default_value = "medium")]
        difficulty: DifficultyArg,
        #[arg(short, long, value_enum, default_value = "opening")]
        kind: KindArg,
        #[arg(long, default_value = "")]
        description: String,
        movetext: String,
    },

    /// Delete a custom line
    Remove { id: String },

    /// Train one line
    Train {
        id: String,
        #[arg(short, long, value_enum, default_value = "trainer")]
        mode: ModeArg,
    },

    /// Play a hidden line picked among all lines for one side
    Blind {
        #[arg(short, long, value_enum)]
        side: SideArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    White,
    Black,
}

impl From<SideArg> for Side {
    fn from(arg: SideArg) -> Self {
        match arg {
            SideArg::White => Side::White,
            SideArg::Black => Side::Black,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DifficultyArg {
    Easy,
    Medium,
    Hard,
}

impl From<DifficultyArg> for Difficulty {
    fn from(arg: DifficultyArg) -> Self {
        match arg {
            DifficultyArg::Easy => Difficulty::Easy,
            DifficultyArg::Medium => Difficulty::Medium,
            DifficultyArg::Hard => Difficulty::Hard,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Trap,
    Gambit,
    Opening,
}

impl From<KindArg> for LineKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Trap => LineKind::Trap,
            KindArg::Gambit => LineKind::Gambit,
            KindArg::Opening => LineKind::Opening,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Trainer,
    Explorer,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Trainer => Mode::Trainer,
            ModeArg::Explorer => Mode::Explorer,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = TrainerConfig::load(cli.config.as_deref())?;
    let store = JsonFileStore::new(cli.store.unwrap_or_else(|| config.store_path.clone()));
    let mut index = RepertoireIndex::load(&store)?;
    info!("{} lines available", index.len());

    match cli.command {
        Commands::List => {
            for category in index.categorized() {
                println!("{}", category.name);
                for group in category.groups {
                    println!("  {}", group.name);
                    for line in group.lines {
                        let origin = if line.builtin { "" } else { " (custom)" };
                        println!(
                            "    {:<28} {} [{}, {:?}, {:?}]{}",
                            line.id, line.name, line.side, line.difficulty, line.kind, origin
                        );
                    }
                }
            }
        }
        Commands::Search { query } => {
            let found = index.search(&query);
            if found.is_empty() {
                println!("No line matches '{}'", query);
            }
            for line in found {
                println!("{:<28} {}", line.id, line.name);
            }
        }
        Commands::Check { movetext } => {
            let forest = parse_pgn_to_tree(&movetext);
            if forest.is_empty() {
                return Err(Error::InvalidMovetext);
            }
            println!("{} moves in {} lines", node_count(&forest), leaf_lines(&forest).len());
            for line in leaf_lines(&forest) {
                println!("  {}", line.join(" "));
            }
        }
        Commands::Add {
            name,
            side,
            difficulty,
            kind,
            description,
            movetext,
        } => {
            let descriptor = LineDescriptor {
                name,
                movetext,
                side: side.into(),
                difficulty: difficulty.into(),
                kind: kind.into(),
                description,
            };
            let line = index.add_custom(descriptor, &store)?;
            println!("Saved {} as {}", line.name, line.id);
        }
        Commands::Remove { id } => {
            index.remove_custom(&id, &store)?;
            println!("Removed {}", id);
        }
        Commands::Train { id, mode } => {
            let line = index
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::NoOpeningFound(id.clone()))?;
            let session = TrainingSession::single(line, mode.into(), StdRng::from_entropy());
            app::run(session, config).await?;
        }
        Commands::Blind { side } => {
            let session =
                TrainingSession::blind(index.lines().to_vec(), side.into(), StdRng::from_entropy());
            if session.candidates_remaining() == Some(0) {
                println!("No lines for {}", Side::from(side));
                return Ok(());
            }
            app::run(session, config).await?;
        }
    }
    Ok(())
}
