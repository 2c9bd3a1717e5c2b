//! podterm
//!
//! Interactive terminal sessions into cluster containers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use podterm::config::{default_config_path, Config, LoggingConfig};
use podterm::escape::{EscapeCommand, EscapeParser, KeyAction};
use podterm::terminal::{RawModeGuard, StdoutTerminal, WindowChanges};
use protocol::SessionTarget;
use session_client::{
    Advisory, ConnectionState, PathEndpointBuilder, SessionEvent, SessionManager,
    TerminalEmulator, WebSocketConnector,
};
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast::error::RecvError;
use tracing_appender::non_blocking::WorkerGuard;

const HELP: &str = "Ctrl-] then: q quit, r reconnect, d toggle debug container, s next shell, ? help; Ctrl-] twice sends Ctrl-]";

/// podterm - interactive terminal sessions into cluster containers.
#[derive(Parser, Debug)]
#[command(name = "podterm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Attach an interactive terminal to a container
    Attach(AttachArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Arguments for `attach`.
#[derive(Args, Debug, Clone)]
pub struct AttachArgs {
    /// Pod to attach to
    pub pod: String,

    /// Namespace of the pod
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Container within the pod
    #[arg(short = 'c', long)]
    pub container: String,

    /// Shell to start (added to the configured shells if missing)
    #[arg(long)]
    pub shell: Option<String>,

    /// Attach through an ephemeral debug container
    #[arg(long)]
    pub debug: bool,

    /// Image for the debug container
    #[arg(long, value_name = "IMAGE")]
    pub debug_image: Option<String>,

    /// Dashboard server URL
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Exit when the session ends or fails instead of waiting for a command
    #[arg(long)]
    pub exit_on_end: bool,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },

    /// Print the configuration file path
    Path,
}

/// Whether the attach loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;

    // Apply environment variable overrides
    config.apply_env_overrides();

    match cli.command {
        Commands::Attach(args) => {
            apply_attach_overrides(&mut config, &args);
            config.validate()?;

            let log_guard = init_file_logging(&config.logging, cli.verbose)?;
            tracing::info!("Using config file: {:?}", config_path);

            let result = attach(&config, &args).await;
            if let Err(ref e) = result {
                tracing::error!("Attach failed: {:#}", e);
            }
            drop(log_guard);

            // A pending blocking read on stdin would keep the runtime alive.
            match result {
                Ok(()) => std::process::exit(0),
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Config(command) => {
            let filter = if cli.verbose { "debug" } else { "warn" };
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            run_config_command(command, &config, &config_path)?;
        }
    }

    Ok(())
}

/// Command-line flags take precedence over the file and environment.
fn apply_attach_overrides(config: &mut Config, args: &AttachArgs) {
    if let Some(ref server) = args.server {
        config.server.base_url = server.clone();
    }
    if let Some(ref shell) = args.shell {
        if !config.session.shells.contains(shell) {
            config.session.shells.insert(0, shell.clone());
        }
        config.session.default_shell = shell.clone();
    }
    if let Some(ref image) = args.debug_image {
        config.session.debug_image = image.clone();
    }
}

/// Installs the tracing subscriber, writing to a daily log file.
fn init_file_logging(config: &LoggingConfig, verbose: bool) -> Result<WorkerGuard> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.level.to_lowercase()
    };

    std::fs::create_dir_all(&config.log_dir).with_context(|| {
        format!("Failed to create log directory: {}", config.log_dir.display())
    })?;
    let appender = tracing_appender::rolling::daily(&config.log_dir, "podterm.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(level.as_str())
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

fn run_config_command(command: ConfigCommands, config: &Config, path: &Path) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let mut shown = config.clone();
            if shown.server.auth_token.is_some() {
                shown.server.auth_token = Some("<redacted>".to_string());
            }
            print!("{}", shown.to_toml()?);
            if let Err(e) = config.validate() {
                eprintln!("Warning: configuration is invalid: {}", e);
            }
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigCommands::Path => println!("{}", path.display()),
    }
    Ok(())
}

async fn attach(config: &Config, args: &AttachArgs) -> Result<()> {
    let builder =
        PathEndpointBuilder::new(&config.server.base_url).context("Invalid server URL")?;
    let mut connector =
        WebSocketConnector::new(Arc::new(builder)).with_connect_timeout(config.connect_timeout());
    if let Some(ref token) = config.server.auth_token {
        connector = connector.with_auth_token(token.clone());
    }

    let mut options = config.session_options();
    options.debug_mode = args.debug;
    let target = SessionTarget::new(&args.namespace, &args.pod, &args.container);

    let _raw_mode = RawModeGuard::enable().context("Failed to enable raw terminal mode")?;
    let mut session =
        SessionManager::new(target, options, Arc::new(connector), StdoutTerminal::new())?;
    let mut events = session.subscribe();
    let mut window_changes = WindowChanges::new().context("Failed to watch terminal size")?;

    let banner = format!("attaching to {} ({})", session.target(), HELP);
    session.terminal_mut().notice(&banner);
    if let Err(e) = session.connect() {
        tracing::warn!(error = %e, "Initial connect failed");
    }

    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 4096];
    let mut escape = EscapeParser::new();

    loop {
        let flow = tokio::select! {
            alive = session.next() => {
                if alive { Flow::Continue } else { Flow::Quit }
            }
            read = stdin.read(&mut buf) => {
                let n = read.context("Failed to read stdin")?;
                if n == 0 {
                    tracing::info!("stdin closed");
                    Flow::Quit
                } else {
                    handle_keys(&mut session, escape.feed(&buf[..n]))
                }
            }
            _ = window_changes.recv() => {
                let size = session.terminal().size();
                session.resize(size.cols, size.rows);
                Flow::Continue
            }
            event = events.recv() => match event {
                Ok(event) => report_event(&mut session, event, args.exit_on_end),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session events lagged");
                    Flow::Continue
                }
                Err(RecvError::Closed) => Flow::Quit,
            },
        };

        if flow == Flow::Quit {
            break;
        }
    }

    session.shutdown();
    tracing::info!("Detached");
    Ok(())
}

fn handle_keys(session: &mut SessionManager<StdoutTerminal>, actions: Vec<KeyAction>) -> Flow {
    for action in actions {
        match action {
            KeyAction::Forward(bytes) => {
                session.send_input(&bytes);
            }
            KeyAction::Command(command) => {
                if run_escape_command(session, command) == Flow::Quit {
                    return Flow::Quit;
                }
            }
        }
    }
    Flow::Continue
}

fn run_escape_command(session: &mut SessionManager<StdoutTerminal>, command: EscapeCommand) -> Flow {
    tracing::debug!(?command, "Escape command");
    let result = match command {
        EscapeCommand::Quit => return Flow::Quit,
        EscapeCommand::Help => {
            session.terminal_mut().notice(HELP);
            Ok(())
        }
        EscapeCommand::Reconnect => {
            if matches!(
                session.state(),
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                session.disconnect();
            }
            session.retry()
        }
        EscapeCommand::ToggleDebug => {
            let enable = !session.is_debug_mode();
            session.set_debug_mode(enable, None)
        }
        EscapeCommand::CycleShell => {
            let shells = session.shells();
            let current = shells.iter().position(|s| s == session.shell()).unwrap_or(0);
            let next = shells[(current + 1) % shells.len()].clone();
            if next == session.shell() {
                session.terminal_mut().notice("only one shell is configured");
                Ok(())
            } else {
                session.set_shell(&next)
            }
        }
    };

    if let Err(e) = result {
        session.terminal_mut().notice(&e.to_string());
    }
    Flow::Continue
}

fn report_event(
    session: &mut SessionManager<StdoutTerminal>,
    event: SessionEvent,
    exit_on_end: bool,
) -> Flow {
    match event {
        SessionEvent::StateChanged(ConnectionState::Connected) => {
            let via = if session.is_debug_mode() {
                format!("debug container {}", session.debug_image())
            } else {
                session.shell().to_string()
            };
            let message = format!("connected to {} via {}", session.target(), via);
            session.terminal_mut().notice(&message);
        }
        SessionEvent::StateChanged(_) => {}
        SessionEvent::Reconnecting { reason } => {
            session.terminal_mut().notice(&format!("reconnecting: {}", reason));
        }
        SessionEvent::SessionEnded { message } => {
            session.terminal_mut().notice(&message);
            if exit_on_end {
                return Flow::Quit;
            }
            session.terminal_mut().notice("Ctrl-] r to reconnect, Ctrl-] q to quit");
        }
        SessionEvent::Error { message } => {
            session.terminal_mut().notice(&format!("error: {}", message));
            if exit_on_end {
                return Flow::Quit;
            }
            session.terminal_mut().notice("Ctrl-] r to reconnect, Ctrl-] s to try another shell, Ctrl-] q to quit");
        }
        SessionEvent::Advisory(Advisory::ShellUnavailable { failed_shells }) => {
            session.terminal_mut().notice(&format!(
                "no usable shell found (tried {}); the image may be distroless. Ctrl-] d attaches through a debug container",
                failed_shells.join(", ")
            ));
        }
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_attach() {
        let cli = Cli::parse_from([
            "podterm", "attach", "web-0", "-n", "prod", "-c", "app", "--shell", "/bin/ash",
            "--debug-image", "alpine:3.20",
        ]);
        match cli.command {
            Commands::Attach(args) => {
                assert_eq!(args.pod, "web-0");
                assert_eq!(args.namespace, "prod");
                assert_eq!(args.container, "app");
                assert!(!args.debug);

                let mut config = Config::default();
                apply_attach_overrides(&mut config, &args);
                assert_eq!(config.session.default_shell, "/bin/ash");
                assert_eq!(config.session.shells[0], "/bin/ash");
                assert_eq!(config.session.debug_image, "alpine:3.20");
                assert!(config.validate().is_ok());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_attach_default_namespace() {
        let cli = Cli::parse_from(["podterm", "attach", "web-0", "-c", "app"]);
        match cli.command {
            Commands::Attach(args) => assert_eq!(args.namespace, "default"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_container() {
        assert!(Cli::try_parse_from(["podterm", "attach", "web-0"]).is_err());
    }

    #[test]
    fn test_cli_config_init() {
        let cli = Cli::parse_from(["podterm", "--config", "/tmp/p.toml", "config", "init", "-f"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommands::Init { force: true })
        ));
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let config = Config::default();

        run_config_command(ConfigCommands::Init { force: false }, &config, &path).unwrap();
        assert!(path.exists());
        assert!(run_config_command(ConfigCommands::Init { force: false }, &config, &path).is_err());
        assert!(run_config_command(ConfigCommands::Init { force: true }, &config, &path).is_ok());
    }
}
