//! CLI command definitions and argument parsing

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{ArgGroup, Args, Parser, Subcommand};

use shroud_core::directory::PublishOutcome;
use shroud_core::fanout::GroupDelivery;
use shroud_core::keys::export_public_key;
use shroud_core::PeerId;

use crate::config::Config;
use crate::node::{self, NodeError};
use crate::output::{OutputFormat, OutputFormatter};
use crate::ExitCode;

/// Shroud - end-to-end encryption over an untrusted chat transport
#[derive(Parser, Debug)]
#[command(name = "shroud")]
#[command(version, about = "End-to-end encryption over an untrusted chat transport")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json or quiet
    #[arg(long, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Public-key directory base URL
    #[arg(long = "directory-url", global = true)]
    pub directory_url: Option<String>,

    /// This node's numeric id
    #[arg(long = "own-id", global = true)]
    pub own_id: Option<u64>,

    /// Directory for identity keys and the session database
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Local identity key management
    Identity(IdentityArgs),
    /// Publish the identity public key to the directory if it changed
    Publish,
    /// Encrypt a message for a peer or a set of group members
    Encrypt(EncryptArgs),
    /// Decrypt a message received from a peer
    Decrypt(DecryptArgs),
    /// Cached session keys
    Sessions(SessionsArgs),
    /// Configuration file management
    Config(ConfigArgs),
}

impl Cli {
    /// Execute the command against an already-resolved configuration.
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let formatter = OutputFormatter::new(self.output, self.verbose);
        let config_path = self.config.clone().or_else(Config::default_path);

        match self.command {
            Commands::Identity(args) => Ok(args.execute(&config, &formatter)),
            Commands::Publish => Ok(publish(&config, &formatter).await),
            Commands::Encrypt(args) => args.execute(&config, &formatter).await,
            Commands::Decrypt(args) => args.execute(&config, &formatter).await,
            Commands::Sessions(args) => Ok(args.execute(&config, &formatter).await),
            Commands::Config(args) => args.execute(&config, config_path.as_deref(), &formatter),
        }
    }
}

fn emit(text: String) {
    if !text.is_empty() {
        println!("{text}");
    }
}

fn fail(formatter: &OutputFormatter, error: &NodeError) -> ExitCode {
    let code = error.exit_code();
    formatter.error(&error.to_string(), code);
    code
}

/// Read the positional argument, or all of stdin when it is absent or "-".
fn input_or_stdin(value: Option<String>) -> std::io::Result<String> {
    match value {
        Some(v) if v != "-" => Ok(v),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

// ============================================================================
// identity
// ============================================================================

#[derive(Args, Debug)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub action: IdentityAction,
}

#[derive(Subcommand, Debug)]
pub enum IdentityAction {
    /// Show the identity fingerprint, generating a key pair on first run
    Show,
    /// Write the public key as PEM to a file
    Export {
        /// Destination path
        path: PathBuf,
    },
}

impl IdentityArgs {
    pub fn execute(self, config: &Config, formatter: &OutputFormatter) -> ExitCode {
        let identity = match node::load_identity(config) {
            Ok(identity) => identity,
            Err(e) => return fail(formatter, &e),
        };

        match self.action {
            IdentityAction::Show => match node::identity_info(config, &identity) {
                Ok(info) => {
                    emit(formatter.format_identity(&info));
                    ExitCode::Success
                }
                Err(e) => fail(formatter, &e),
            },
            IdentityAction::Export { path } => match export_public_key(&identity, &path) {
                Ok(()) => {
                    formatter.success(&format!("Public key written to {}", path.display()));
                    ExitCode::Success
                }
                Err(e) => fail(formatter, &NodeError::Core(e)),
            },
        }
    }
}

// ============================================================================
// publish
// ============================================================================

async fn publish(config: &Config, formatter: &OutputFormatter) -> ExitCode {
    let context = match node::open(config) {
        Ok(context) => context,
        Err(e) => return fail(formatter, &e),
    };

    formatter.progress(&format!("Checking {}", config.directory.url));
    match context.publish_identity().await {
        Ok(outcome) => {
            emit(formatter.format_publish(context.own_id().0, outcome));
            if outcome == PublishOutcome::Published {
                tracing::info!(own_id = %context.own_id(), "Identity published");
            }
            ExitCode::Success
        }
        Err(e) => fail(formatter, &NodeError::Core(e)),
    }
}

// ============================================================================
// encrypt / decrypt
// ============================================================================

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("recipient").required(true).args(["to", "group"])))]
pub struct EncryptArgs {
    /// Recipient peer id
    #[arg(long)]
    pub to: Option<u64>,

    /// Group member ids, comma separated; our own id is skipped
    #[arg(long, value_delimiter = ',')]
    pub group: Option<Vec<u64>>,

    /// Message text; read from stdin when omitted or "-"
    pub message: Option<String>,
}

impl EncryptArgs {
    pub async fn execute(self, config: &Config, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let message = input_or_stdin(self.message)?;
        let context = match node::open(config) {
            Ok(context) => context,
            Err(e) => return Ok(fail(formatter, &e)),
        };

        if let Some(peer) = self.to {
            return Ok(match context.encrypt_for(PeerId(peer), message.as_bytes()).await {
                Ok(text) => {
                    emit(formatter.format_envelope(peer, &text));
                    ExitCode::Success
                }
                Err(e) => fail(formatter, &NodeError::Core(e)),
            });
        }

        let members: Vec<PeerId> = self.group.unwrap_or_default().into_iter().map(PeerId).collect();
        let deliveries = context.encrypt_for_group(&members, message.as_bytes()).await;
        emit(formatter.format_group(&deliveries));

        let mut first_failure = None;
        let mut delivered = 0usize;
        for d in deliveries {
            match d {
                GroupDelivery::Envelope { .. } => delivered += 1,
                GroupDelivery::Skipped { recipient, reason } => {
                    formatter.warning(&format!("No envelope for {recipient}: {reason}"));
                    first_failure.get_or_insert(reason);
                }
            }
        }

        Ok(match first_failure {
            Some(reason) if delivered == 0 => ExitCode::from_core_error(&reason),
            _ if delivered == 0 => ExitCode::InvalidInput,
            _ => ExitCode::Success,
        })
    }
}

#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Sender peer id
    #[arg(long)]
    pub from: u64,

    /// The message arrived in a group chat and carries a recipient suffix
    #[arg(long)]
    pub group: bool,

    /// Base64 message text; read from stdin when omitted or "-"
    pub text: Option<String>,
}

impl DecryptArgs {
    pub async fn execute(self, config: &Config, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        let text = input_or_stdin(self.text)?;
        let context = match node::open(config) {
            Ok(context) => context,
            Err(e) => return Ok(fail(formatter, &e)),
        };

        Ok(match context.decrypt_from(PeerId(self.from), &text, self.group).await {
            Ok(inbound) => {
                emit(formatter.format_inbound(&inbound));
                ExitCode::Success
            }
            Err(e) => fail(formatter, &NodeError::Core(e)),
        })
    }
}

// ============================================================================
// sessions
// ============================================================================

#[derive(Args, Debug)]
pub struct SessionsArgs {
    #[command(subcommand)]
    pub action: SessionsAction,
}

#[derive(Subcommand, Debug)]
pub enum SessionsAction {
    /// List cached session keys by fingerprint
    List,
    /// Drop the cached key for a peer; it is re-derived on next use
    Forget {
        peer_id: u64,
    },
}

impl SessionsArgs {
    pub async fn execute(self, config: &Config, formatter: &OutputFormatter) -> ExitCode {
        let context = match node::open(config) {
            Ok(context) => context,
            Err(e) => return fail(formatter, &e),
        };

        match self.action {
            SessionsAction::List => match context.sessions().list().await {
                Ok(sessions) => {
                    emit(formatter.format_sessions(&sessions));
                    ExitCode::Success
                }
                Err(e) => fail(formatter, &NodeError::Core(e)),
            },
            SessionsAction::Forget { peer_id } => match context.sessions().forget(PeerId(peer_id)).await {
                Ok(true) => {
                    formatter.success(&format!("Forgot session key for {peer_id}"));
                    ExitCode::Success
                }
                Ok(false) => {
                    formatter.warning(&format!("No cached session key for {peer_id}"));
                    ExitCode::Success
                }
                Err(e) => fail(formatter, &NodeError::Core(e)),
            },
        }
    }
}

// ============================================================================
// config
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented sample config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved configuration
    Show,
    /// Print the config file location
    Path,
}

impl ConfigArgs {
    pub fn execute(
        self,
        config: &Config,
        path: Option<&Path>,
        formatter: &OutputFormatter,
    ) -> anyhow::Result<ExitCode> {
        match self.action {
            ConfigAction::Init { force } => {
                let Some(path) = path else {
                    formatter.error("No config location available on this platform", ExitCode::GeneralError);
                    return Ok(ExitCode::GeneralError);
                };
                if force && path.exists() {
                    std::fs::remove_file(path)?;
                }
                if Config::create_default_if_missing(path)? {
                    formatter.success(&format!("Wrote {}", path.display()));
                } else {
                    formatter.warning(&format!("{} already exists (use --force)", path.display()));
                }
                Ok(ExitCode::Success)
            }
            ConfigAction::Show => {
                if formatter.format() != OutputFormat::Quiet {
                    println!("{}", toml::to_string_pretty(config)?);
                }
                Ok(ExitCode::Success)
            }
            ConfigAction::Path => {
                match path {
                    Some(path) => println!("{}", path.display()),
                    None => println!("-"),
                }
                Ok(ExitCode::Success)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_group_encrypt() {
        let cli = Cli::try_parse_from(["shroud", "encrypt", "--group", "42,43", "hello"]).unwrap();
        match cli.command {
            Commands::Encrypt(args) => {
                assert_eq!(args.group, Some(vec![42, 43]));
                assert_eq!(args.to, None);
                assert_eq!(args.message.as_deref(), Some("hello"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_encrypt_requires_a_recipient() {
        assert!(Cli::try_parse_from(["shroud", "encrypt", "hello"]).is_err());
        assert!(Cli::try_parse_from(["shroud", "encrypt", "--to", "1", "--group", "2", "hi"]).is_err());
    }

    #[test]
    fn test_global_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "shroud",
            "decrypt",
            "--from",
            "10",
            "--group",
            "QUJD",
            "--own-id",
            "43",
            "--output",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.own_id, Some(43));
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Decrypt(args) => {
                assert_eq!(args.from, 10);
                assert!(args.group);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
