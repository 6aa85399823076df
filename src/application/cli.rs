#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::configuration::Config;
use crate::configuration::ConfigKey;

/// Work that needs the council backend, handed back to `main` once the
/// configuration is loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    List,
    New,
    Show { id: String },
    Ask { id: Option<String>, prompt: String, stream: bool },
}

pub fn log_dir() -> path::PathBuf {
    if let Ok(dir) = std::env::var("COUNCIL_LOG_DIR") {
        return path::PathBuf::from(dir);
    }

    return dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("council");
}

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

fn arg_id(required: bool) -> Arg {
    return Arg::new("id")
        .short('i')
        .long("id")
        .help("Conversation ID")
        .num_args(1)
        .required(required);
}

fn arg_config(key: ConfigKey, env: &str, help: &str) -> Arg {
    let mut help = help.to_string();
    let default = Config::default(key);
    if !default.is_empty() {
        help = format!("{help} [default: {default}]");
    }

    return Arg::new(key.to_string())
        .long(key.to_string())
        .env(env.to_string())
        .num_args(1)
        .help(help)
        .global(true);
}

fn subcommand_ask() -> Command {
    return Command::new("ask")
        .about("Ask the council a question. Starts a new conversation unless --id is given.")
        .arg(arg_id(false))
        .arg(
            Arg::new("no-stream")
                .long("no-stream")
                .help("Wait for the full council instead of streaming stage progress.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("prompt")
                .help("Question to put to the council.")
                .num_args(1..)
                .required(true),
        );
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_debug() -> Command {
    return Command::new("debug")
        .about("Debug helpers for Council")
        .hide(true)
        .subcommand(
            Command::new("log-path").about("Output path to debug log file generated when running Council with environment variable RUST_LOG=council")
        )
        .subcommand(
            Command::new("enum-config").about("List all config keys as strings.")
        );
}

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );

    return Command::new("council")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .subcommand(Command::new("list").about("List all conversations, newest first."))
        .subcommand(Command::new("new").about("Start a new, empty conversation."))
        .subcommand(
            Command::new("show")
                .about("Print a conversation with every stage of each reply.")
                .arg(arg_id(true)),
        )
        .subcommand(subcommand_ask())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(subcommand_debug())
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("COUNCIL_CONFIG_FILE")
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default(ConfigKey::ConfigFile)))
                .global(true)
        )
        .arg(arg_config(
            ConfigKey::ApiURL,
            "COUNCIL_API_URL",
            "Base URL of the LLM Council backend.",
        ))
        .arg(arg_config(
            ConfigKey::RequestTimeout,
            "COUNCIL_REQUEST_TIMEOUT",
            "Time to wait in milliseconds before timing out conversation reads and creation.",
        ))
        .arg(arg_config(
            ConfigKey::RetryBaseDelay,
            "COUNCIL_RETRY_BASE_DELAY",
            "Delay in milliseconds before the first retry of a failed read. Doubles on every attempt.",
        ))
        .arg(arg_config(
            ConfigKey::RetryMaxAttempts,
            "COUNCIL_RETRY_MAX_ATTEMPTS",
            "How many times a failed read is retried before giving up.",
        ))
        .arg(arg_config(
            ConfigKey::RetryMaxDelay,
            "COUNCIL_RETRY_MAX_DELAY",
            "Upper bound in milliseconds for the delay between retries.",
        ))
        .arg(arg_config(
            ConfigKey::Username,
            "COUNCIL_USERNAME",
            "Your user name displayed in printed transcripts.",
        ));
}

fn request_from(name: &str, matches: &ArgMatches) -> Result<Request> {
    match name {
        "list" => return Ok(Request::List),
        "new" => return Ok(Request::New),
        "show" => {
            let id = matches
                .get_one::<String>("id")
                .map(|id| return id.to_string())
                .unwrap_or_default();
            return Ok(Request::Show { id });
        }
        "ask" => {
            let prompt = matches
                .get_many::<String>("prompt")
                .map(|words| return words.cloned().collect::<Vec<String>>().join(" "))
                .unwrap_or_default();
            if prompt.trim().is_empty() {
                bail!("The prompt must not be empty.");
            }

            return Ok(Request::Ask {
                id: matches.get_one::<String>("id").cloned(),
                prompt,
                stream: !matches.get_flag("no-stream"),
            });
        }
        _ => bail!(format!("Unknown command '{name}'")),
    }
}

/// Parses the command line. Commands that don't need the backend run right
/// away and yield `None`. Everything else loads the configuration and comes
/// back as a [`Request`].
pub async fn parse() -> Result<Option<Request>> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("debug", debug_matches)) => {
            match debug_matches.subcommand() {
                Some(("log-path", _)) => {
                    let log_path = log_dir().join("debug.log");
                    println!("{}", log_path.to_string_lossy());
                }
                Some(("enum-config", _)) => {
                    let res = ConfigKey::VARIANTS.join("\n");
                    println!("{}", res);
                }
                _ => {
                    subcommand_debug().print_long_help()?;
                }
            }

            return Ok(None);
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }

            return Ok(None);
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(None);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(None);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(None);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(None);
            }
        },
        Some((name, subcmd_matches)) => {
            Config::load(vec![&matches, subcmd_matches]).await?;
            return Ok(Some(request_from(name, subcmd_matches)?));
        }
        None => {
            build().print_long_help()?;
            return Ok(None);
        }
    }
}
