mod config;
mod persistence;
mod plugins;
mod simulation;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bevy::log::LogPlugin;
use bevy::{dev_tools::fps_overlay::FpsOverlayPlugin, prelude::*};
use clap::{Parser, Subcommand};

use crate::config::GameConfig;
use crate::persistence::{FileStore, PatternId, PatternStore, SessionLog, UserContext};
use crate::plugins::controls::ControlsPlugin;
use crate::plugins::persistence::{PersistencePlugin, StartupLoad};
use crate::plugins::pointer_gesture::PointerGesturePlugin;
use crate::plugins::stats_boards::StatsBoardPlugin;
use crate::simulation::SimulationPlugin;
use crate::simulation::coords::Cell;
use crate::simulation::grid::LifeGrid;

#[derive(Parser, Debug)]
#[command(name = "conway_sessions", version, about = "Conway's Game of Life on an unbounded grid")]
struct Cli {
    /// Player to log in as. Created on first use.
    #[arg(long, short, env = "LIFE_USER", default_value = "player", global = true)]
    user: String,

    /// Where saved games, patterns and sessions are kept.
    #[arg(long, env = "LIFE_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// TOML file overriding the default tunables.
    #[arg(long, env = "LIFE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the game window (default).
    Play {
        /// Start from a saved pattern instead of the saved game.
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Manage saved patterns.
    Patterns {
        #[command(subcommand)]
        action: PatternAction,
    },
    /// Print totals and records for the player.
    Stats,
}

#[derive(Subcommand, Debug)]
enum PatternAction {
    List,
    Show { id: u64 },
    Delete { id: u64 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("no data directory on this platform, pass --data-dir")?
            .join("conway_sessions"),
    };
    let store = FileStore::open(&data_dir)
        .with_context(|| format!("failed to open store in {}", data_dir.display()))?;
    let user = store.login(&cli.user).context("login failed")?;

    match cli.command.unwrap_or(Command::Play { pattern: None }) {
        Command::Play { pattern } => {
            let config = GameConfig::load(cli.config.as_deref())?;
            let startup = pattern.map_or(StartupLoad::Snapshot, StartupLoad::Pattern);
            play(config, Arc::new(store), user, startup);
        }
        Command::Patterns { action } => patterns(&store, &user, action)?,
        Command::Stats => {
            let stats = store.user_stats(&user)?;
            println!("Player:          {}", stats.username);
            println!("Games played:    {}", stats.total_games);
            println!("Patterns saved:  {}", stats.total_patterns);
            println!("Best generation: {}", stats.best_generation);
            println!("Best population: {}", stats.best_population);
        }
    }
    Ok(())
}

fn play(config: GameConfig, store: Arc<FileStore>, user: UserContext, startup: StartupLoad) {
    let mut app = App::new();

    app.add_plugins(
        DefaultPlugins
            .set(WindowPlugin {
                primary_window: Some(Window {
                    title: format!("Game of Life - {}", user.username),
                    present_mode: bevy::window::PresentMode::AutoNoVsync,
                    ..default()
                }),
                ..default()
            })
            .set(LogPlugin {
                filter: "wgpu=error,naga=warn,conway_sessions=debug".to_string(),
                ..default()
            }),
    );
    app.add_plugins(FpsOverlayPlugin::default());

    // Plugins read these while building.
    app.insert_resource(config);
    app.insert_resource(user);

    app.add_plugins(SimulationPlugin);
    app.add_plugins(StatsBoardPlugin);
    app.add_plugins(PointerGesturePlugin);
    app.add_plugins(ControlsPlugin);
    app.add_plugins(PersistencePlugin {
        backend: store,
        startup,
    });

    app.add_systems(Startup, spawn_camera);

    app.run();
}

fn spawn_camera(mut commands: Commands) {
    commands.spawn((Camera2d, Transform::default()));
}

fn patterns(store: &FileStore, user: &UserContext, action: PatternAction) -> Result<()> {
    match action {
        PatternAction::List => {
            let patterns = store.list_patterns(user)?;
            if patterns.is_empty() {
                println!("No saved patterns.");
            }
            for pattern in patterns {
                println!("{:>4}  {}", pattern.id, pattern.name);
            }
        }
        PatternAction::Show { id } => {
            let record = store.get_pattern(user, PatternId(id))?;
            let grid = LifeGrid::from_cells(record.cells);
            println!("{} ({} cells)", record.name, grid.population());
            print!("{}", ascii_art(&grid));
        }
        PatternAction::Delete { id } => {
            store.delete_pattern(user, PatternId(id))?;
            println!("Deleted pattern {}.", id);
        }
    }
    Ok(())
}

/// Bounding box of the live cells, one text line per row.
fn ascii_art(grid: &LifeGrid) -> String {
    let Some((min, max)) = grid.bounds() else {
        return String::new();
    };
    let mut out = String::new();
    for row in min.row..=max.row {
        for col in min.col..=max.col {
            let alive = grid.is_alive(Cell::new(row, col));
            out.push(if alive { 'O' } else { '.' });
        }
        out.push('\n');
    }
    out
}
