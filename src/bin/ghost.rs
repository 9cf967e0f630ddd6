use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ghost::app::ask::{self, AskRequest, OutputFormat};
use ghost::app::{self, health, threads};
use ghost::api::{ChatBackend, OllamaClient};
use ghost::config::{Config, ConfigOverrides};
use ghost::error::{exit_code, GhostError};
use ghost::logging::{self, LogTarget};
use ghost::store::ThreadStore;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "ghost", version, about = "Terminal assistant for an Ollama-compatible chat server")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Config file (default: <config dir>/ghost/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chat server URL
    #[arg(long, global = true)]
    host: Option<String>,

    #[arg(long, global = true)]
    model: Option<String>,

    #[arg(long, global = true)]
    vision_model: Option<String>,

    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Ask the model to surface its reasoning
    #[arg(long, global = true, overrides_with = "no_think")]
    think: bool,

    #[arg(long, global = true)]
    no_think: bool,
}

impl GlobalArgs {
    fn overrides(&self) -> ConfigOverrides {
        let think = match (self.think, self.no_think) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        ConfigOverrides {
            config_path: self.config.clone(),
            host: self.host.clone(),
            model: self.model.clone(),
            vision_model: self.vision_model.clone(),
            data_dir: self.data_dir.clone(),
            think,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask one question and print the answer
    Ask(AskArgs),
    /// Interactive chat (default)
    Chat {
        /// Continue a stored thread
        #[arg(long)]
        thread: Option<String>,
    },
    /// Check configuration, storage, server and models
    Health,
    /// List stored threads
    Threads {
        #[command(subcommand)]
        action: Option<ThreadsAction>,
    },
}

#[derive(Args, Debug)]
struct AskArgs {
    query: Vec<String>,

    /// Attach an image (repeatable)
    #[arg(long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
    format: OutputFormat,

    /// Pass <think> blocks through unfiltered
    #[arg(long)]
    no_think_filter: bool,
}

#[derive(Subcommand, Debug)]
enum ThreadsAction {
    /// Delete a thread
    Rm { id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return if error.use_stderr() {
                exit(exit_code::USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli).await {
        Ok(code) => exit(code),
        Err(error) => {
            eprintln!("ghost: {error:#}");
            exit(
                error
                    .downcast_ref::<GhostError>()
                    .map(GhostError::exit_code)
                    .unwrap_or(exit_code::SOFTWARE),
            )
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = Config::load(cli.global.overrides());

    match cli.command.unwrap_or(Command::Chat { thread: None }) {
        Command::Health => {
            logging::init(&LogTarget::Stderr)?;
            let mut stdout = std::io::stdout().lock();
            Ok(health::run_health(config, &mut stdout).await?)
        }
        Command::Chat { thread } => {
            let config = validated(config)?;
            logging::init(&LogTarget::file_in(&config.data_dir))?;
            app::run_chat(config, thread).await?;
            Ok(exit_code::OK)
        }
        Command::Ask(args) => {
            let config = validated(config)?;
            logging::init(&LogTarget::Stderr)?;
            run_ask(config, args).await?;
            Ok(exit_code::OK)
        }
        Command::Threads { action } => {
            let config = validated(config)?;
            logging::init(&LogTarget::Stderr)?;
            let store = ThreadStore::open(&config.data_dir)?;
            let mut stdout = std::io::stdout().lock();
            match action {
                None => threads::list(&store, &mut stdout)?,
                Some(ThreadsAction::Rm { id }) => threads::remove(&store, &id, &mut stdout)?,
            }
            Ok(exit_code::OK)
        }
    }
}

fn validated(config: ghost::error::Result<Config>) -> ghost::error::Result<Config> {
    let config = config?;
    config.validate()?;
    Ok(config)
}

async fn run_ask(config: Config, args: AskArgs) -> anyhow::Result<()> {
    let context = ask::read_piped_stdin()?;
    let backend: Arc<dyn ChatBackend> = Arc::new(OllamaClient::new(&config)?);
    let mut manager = app::build_manager(&config, backend).context("preparing conversation")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let request = AskRequest {
        query: args.query.join(" "),
        images: args.images,
        format: args.format,
        filter_think: !args.no_think_filter,
        context,
    };
    let mut stdout = std::io::stdout();
    ask::run_ask(&mut manager, request, &mut stdout, cancel).await?;
    Ok(())
}
