//! `huddle` binary.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand, ValueEnum};
use huddle_cli::{Session, SessionError};
use huddle_client::{ClientConfig, http::HttpService};
use huddle_core::{CardError, Environment, IdentityStore, RedbStore, SystemEnv, cards};
use huddle_proto::{CardConfig, CardPreset};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Planning poker from the terminal.
#[derive(Parser, Debug)]
#[command(name = "huddle", version, about)]
struct Cli {
    /// Server base URL.
    #[arg(long, default_value = "http://localhost:8080")]
    server: String,

    /// Identity database.
    #[arg(long, default_value = "huddle.redb")]
    store: PathBuf,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Show the local identity and recently visited rooms.
    Identity {
        /// Set a display name. An empty name restores the generated one.
        #[arg(long)]
        name: Option<String>,
    },

    /// List deck presets, or check a custom deck.
    Cards {
        /// Comma separated card values.
        #[arg(long)]
        custom: Option<String>,
    },

    /// Create a room and enter it as host.
    Create {
        /// Display name in the room.
        #[arg(long)]
        name: Option<String>,

        /// Deck preset.
        #[arg(long, value_enum, default_value_t = Preset::Fibonacci)]
        preset: Preset,

        /// Comma separated custom deck; overrides the preset.
        #[arg(long)]
        custom: Option<String>,
    },

    /// Enter a room, reclaiming a remembered seat when no name is given.
    Join {
        /// Room name.
        room: String,

        /// Display name in the room.
        #[arg(long)]
        name: Option<String>,

        /// Watch without voting.
        #[arg(long)]
        spectator: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Preset {
    Fibonacci,
    ModifiedFibonacci,
    Tshirt,
    PowersOfTwo,
    Linear,
}

impl From<Preset> for CardPreset {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Fibonacci => Self::Fibonacci,
            Preset::ModifiedFibonacci => Self::ModifiedFibonacci,
            Preset::Tshirt => Self::TShirt,
            Preset::PowersOfTwo => Self::PowersOfTwo,
            Preset::Linear => Self::Linear,
        }
    }
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Cards(#[from] CardError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "huddle failed");
            ExitCode::FAILURE
        },
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let env: Arc<dyn Environment> = Arc::new(SystemEnv);
    let identity = Arc::new(open_identity(&cli.store, Arc::clone(&env)));
    let service = Arc::new(HttpService::new(cli.server));
    let config = ClientConfig::default();

    let mut session = match cli.command {
        Action::Identity { name } => {
            show_identity(&identity, name.as_deref());
            return Ok(());
        },
        Action::Cards { custom } => return show_cards(custom.as_deref()),
        Action::Create { name, preset, custom } => {
            let deck = deck(preset, custom.as_deref())?;
            Session::create(service, identity, env, config, name.as_deref(), deck).await?
        },
        Action::Join { room, name, spectator } => {
            Session::join(service, identity, env, config, &room, name.as_deref(), spectator).await?
        },
    };

    info!("type a card value to vote, /show for the room, /q to quit");
    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let result = session.run(input).await;
    session.shutdown().await;
    result.map_err(CliError::from)
}

fn open_identity(path: &Path, env: Arc<dyn Environment>) -> IdentityStore {
    match RedbStore::open(path) {
        Ok(store) => IdentityStore::new(store, env),
        Err(err) => {
            warn!(%err, path = %path.display(), "identity store unavailable, nothing will persist");
            IdentityStore::in_memory(env)
        },
    }
}

fn show_identity(identity: &IdentityStore, name: Option<&str>) {
    let current = match name {
        Some(name) => identity.set_custom_name(name),
        None => identity.get_or_create_identity(),
    };
    info!(name = %current.display_name(), generated = %current.generated_name, "identity");
    for (room, visited_at) in identity.recent_rooms() {
        info!(%room, visited_at, "recent room");
    }
}

fn show_cards(custom: Option<&str>) -> Result<(), CliError> {
    if let Some(input) = custom {
        let deck = cards::custom_config(cards::parse_custom_cards(input)?);
        log_deck(&deck);
        return Ok(());
    }
    for preset in cards::PRESETS {
        log_deck(&cards::preset_config(preset));
    }
    Ok(())
}

fn log_deck(deck: &CardConfig) {
    let values: Vec<&str> = deck.cards.iter().map(|card| card.value.as_str()).collect();
    info!(deck = cards::preset_name(deck.preset), cards = %values.join(" "), "deck");
}

fn deck(preset: Preset, custom: Option<&str>) -> Result<CardConfig, CardError> {
    match custom {
        Some(input) => Ok(cards::custom_config(cards::parse_custom_cards(input)?)),
        None => Ok(cards::preset_config(preset.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["huddle", "join", "brave-otter"]).unwrap();
        assert_eq!(cli.server, "http://localhost:8080");
        assert_eq!(cli.store, PathBuf::from("huddle.redb"));
        assert!(!cli.verbose);
        assert!(matches!(
            cli.command,
            Action::Join { room, name: None, spectator: false } if room == "brave-otter"
        ));
    }

    #[test]
    fn create_with_preset() {
        let cli = Cli::try_parse_from(["huddle", "-v", "create", "--preset", "tshirt"]).unwrap();
        assert!(cli.verbose);
        let Action::Create { preset, custom, .. } = cli.command else {
            unreachable!("parsed create");
        };
        assert_eq!(preset, Preset::Tshirt);
        assert_eq!(deck(preset, custom.as_deref()).unwrap().preset, CardPreset::TShirt);
    }

    #[test]
    fn custom_deck_overrides_preset() {
        let deck = deck(Preset::Linear, Some("1, 2, 3, ?")).unwrap();
        assert_eq!(deck.preset, CardPreset::Custom);
        assert_eq!(deck.cards.len(), 4);
    }

    #[test]
    fn bad_custom_deck_is_reported() {
        let err = deck(Preset::Fibonacci, Some("5")).unwrap_err();
        assert_eq!(err.to_string(), "At least 2 cards are required");
    }
}
