use crate::infra::{
    ApiClient, ApiError, ConfigError, ConfigFile, LoadConfigError, SaveConfigError, config_path,
    load_config_file, resolve_settings, save_config_file,
};
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

/// Connection flags accepted before any subcommand. They win over the environment and the
/// config file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GlobalFlags {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub user_id: Option<String>,
}

impl GlobalFlags {
    /// Looks up a settings key, preferring the flag over `env`.
    pub fn lookup(&self, key: &str, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        let flag = match key {
            "CARDCHAT_API_URL" => self.api_url.clone(),
            "CARDCHAT_WS_URL" => self.ws_url.clone(),
            "CARDCHAT_USER_ID" => self.user_id.clone(),
            _ => None,
        };
        flag.or_else(|| env(key))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Chat {
        flags: GlobalFlags,
        conversation: Option<String>,
    },
    Command {
        flags: GlobalFlags,
        command: CliCommand,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliCommand {
    Conversations,
    Init {
        user_id: String,
        token: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum CliParseError {
    #[error("unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("missing value for flag: {0}")]
    MissingFlagValue(String),

    #[error("missing required flag: {0}")]
    MissingRequiredFlag(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliInvocation::PrintHelp);
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        return Ok(CliInvocation::PrintVersion);
    }

    let mut iter = args.iter().skip(1).peekable();
    let mut flags = GlobalFlags::default();
    let mut conversation: Option<String> = None;
    while let Some(arg) = iter.peek() {
        let slot = match arg.as_str() {
            "--api" => &mut flags.api_url,
            "--ws" => &mut flags.ws_url,
            "--user" | "-u" => &mut flags.user_id,
            "--conversation" | "-c" => &mut conversation,
            "--" => {
                let _ = iter.next();
                break;
            }
            _ if arg.starts_with('-') => {
                return Err(CliParseError::UnknownFlag(arg.to_string()));
            }
            _ => break,
        };
        let flag = iter.next().map(String::as_str).unwrap_or_default();
        let value = iter
            .next()
            .ok_or_else(|| CliParseError::MissingFlagValue(flag.to_string()))?;
        *slot = Some(value.to_string());
    }

    let Some(subcommand) = iter.next() else {
        return Ok(CliInvocation::Chat {
            flags,
            conversation,
        });
    };
    if let Some(conversation) = conversation {
        return Err(CliParseError::UnexpectedArgument(format!(
            "--conversation {conversation}"
        )));
    }

    match subcommand.as_str() {
        "conversations" => {
            if let Some(arg) = iter.next() {
                return Err(unexpected(arg));
            }
            Ok(CliInvocation::Command {
                flags,
                command: CliCommand::Conversations,
            })
        }
        "init" => {
            let mut user_id = flags.user_id.clone();
            let mut token: Option<String> = None;
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--user" | "-u" => {
                        let value = iter.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--user".to_string())
                        })?;
                        user_id = Some(value.to_string());
                    }
                    "--token" | "-t" => {
                        let value = iter.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--token".to_string())
                        })?;
                        token = Some(value.to_string());
                    }
                    _ => return Err(unexpected(arg)),
                }
            }
            let Some(user_id) = user_id else {
                return Err(CliParseError::MissingRequiredFlag("--user".to_string()));
            };
            Ok(CliInvocation::Command {
                flags,
                command: CliCommand::Init { user_id, token },
            })
        }
        other => Err(CliParseError::UnknownSubcommand(other.to_string())),
    }
}

fn unexpected(arg: &str) -> CliParseError {
    if arg.starts_with('-') {
        CliParseError::UnknownFlag(arg.to_string())
    } else {
        CliParseError::UnexpectedArgument(arg.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error(transparent)]
    LoadConfig(#[from] LoadConfigError),

    #[error(transparent)]
    SaveConfig(#[from] SaveConfigError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

pub fn run(command: CliCommand, flags: &GlobalFlags, state_dir: &Path) -> Result<(), CliRunError> {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    run_with_output(command, flags, state_dir, |key| std::env::var(key).ok(), &mut out)?;
    out.flush()?;
    Ok(())
}

fn run_with_output(
    command: CliCommand,
    flags: &GlobalFlags,
    state_dir: &Path,
    env: impl Fn(&str) -> Option<String>,
    out: &mut impl Write,
) -> Result<(), CliRunError> {
    match command {
        CliCommand::Conversations => {
            let file = load_config_file(state_dir)?;
            let settings = resolve_settings(state_dir, file, |key| flags.lookup(key, &env))?;
            let client = ApiClient::new(
                settings.api_url.clone(),
                settings.token.clone(),
                settings.request_timeout,
            )?;
            for conversation in client.list_conversations()? {
                let line = format!(
                    "{}\t{}\t{}",
                    conversation.id,
                    conversation.title(),
                    conversation.unread
                );
                if !write_line(out, &line)? {
                    break;
                }
            }
        }
        CliCommand::Init { user_id, token } => {
            let existing = load_config_file(state_dir)?;
            let file = ConfigFile {
                api_url: flags.api_url.clone().or(existing.api_url),
                ws_url: flags.ws_url.clone().or(existing.ws_url),
                token: token.or(existing.token),
                user_id: Some(user_id),
                ..existing
            };
            // Validate before writing so a bad URL never lands on disk.
            resolve_settings(state_dir, file.clone(), |_| None)?;
            save_config_file(state_dir, &file)?;
            write_line(out, &format!("Wrote {}", config_path(state_dir).display()))?;
        }
    }
    Ok(())
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<bool> {
    match writeln!(out, "{line}") {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(error) => Err(error),
    }
}

pub fn help_text() -> String {
    format!(
        "{name} - terminal chat client\n\n\
         USAGE:\n  \
         {name} [FLAGS] [--conversation ID]   Open the chat view\n  \
         {name} [FLAGS] conversations          List conversations (id<TAB>title<TAB>unread)\n  \
         {name} [FLAGS] init --user ID [--token TOKEN]  Write the config file\n  \
         {name} --help | --version\n\n\
         FLAGS:\n  \
         --api URL      REST base URL (default: http://localhost:8080/api)\n  \
         --ws URL       WebSocket URL (default: ws://localhost:8080/ws)\n  \
         --user ID      Your user id\n\n\
         ENV:\n  \
         CARDCHAT_STATE_DIR  Config and log directory (default: ~/.cardchat)\n  \
         CARDCHAT_API_URL, CARDCHAT_WS_URL, CARDCHAT_TOKEN, CARDCHAT_USER_ID\n  \
         CARDCHAT_LOG        Log filter (default: info)\n",
        name = env!("CARGO_PKG_NAME")
    )
}
