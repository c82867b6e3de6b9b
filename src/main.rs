use std::{error::Error, io, process};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use url::Url;

use tunelink::{
    config::{Config, Settings},
    events::Event,
    session::Session,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file
    ///
    /// Optional TOML file providing the token endpoint, device name and
    /// return path. Command line arguments take precedence.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("settings.toml"))]
    settings_file: String,

    /// Token endpoint URL
    ///
    /// Trusted endpoint that issues bearer tokens for this client, e.g.
    /// http://localhost:3000/spotify
    #[arg(short, long, value_name = "URL", value_hint = ValueHint::Url)]
    endpoint: Option<Url>,

    /// Player's name
    ///
    /// Set the player's name as it appears to other Spotify clients.
    ///
    /// [default: system hostname]
    #[arg(short, long, value_hint = ValueHint::Hostname)]
    name: Option<String>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Loads the settings file, tolerating its absence when the endpoint is
/// given on the command line.
fn load_settings(args: &Args) -> io::Result<Settings> {
    match Settings::from_file(&args.settings_file) {
        Ok(settings) => Ok(settings),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if args.endpoint.is_none() {
                info!(
                    "create {} or pass --endpoint to configure the token endpoint",
                    args.settings_file
                );
            }
            Ok(Settings::default())
        }
        Err(e) => Err(e),
    }
}

/// Main application loop.
///
/// Brings the session up and mirrors its notifications to the log until
/// interrupted.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let settings = load_settings(&args)?;

    let endpoint = args
        .endpoint
        .or(settings.token_endpoint)
        .ok_or("no token endpoint configured")?;

    let mut config = Config::with_token_endpoint(endpoint);
    if let Some(name) = args.name.or(settings.device_name) {
        config.device_name = name;
    }
    if let Some(return_path) = settings.return_path {
        config.return_path = return_path;
    }

    let session = Session::with_web_api_player(config)?;
    let mut events = session.events().ok_or("event stream already taken")?;
    session.start()?;

    loop {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down gracefully");
                session.stop();
                break Ok(());
            }

            event = events.recv() => match event {
                Some(Event::AuthorizationRequired(url)) => {
                    warn!("authorization required; open the following URL to grant access:");
                    warn!("{url}");
                }
                Some(event) => info!("{event}"),
                None => {
                    info!("session ended");
                    break Ok(());
                }
            }
        }
    }
}

/// Main entry point of the application.
///
/// Initializes the logger facade, parses the command line arguments, and
/// starts the main application loop.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
