//! aibot - stream answers from a local Ollama server into the terminal.
//!
//! Sends a prompt (argument or piped stdin) to Ollama and renders the answer
//! as it streams in: live Markdown, raw text, or word by word. `--chat` keeps
//! a multi-turn conversation going until Ctrl-C.

mod client;
mod config;
mod error;
mod input;
mod protocol;
mod render;
mod session;

use std::io::{Read, Write};

use anyhow::Result;
use clap::Parser;
use client::OllamaClient;
use config::{Config, RenderMode, MODEL_ENV};
use crossterm::style::Stylize;
use protocol::{Endpoint, GenerateRequest, Options};
use render::{Answer, Renderer};
use session::{ChatSession, SessionEnd};
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aibot")]
#[command(author, version, about = "Stream answers from a local Ollama server")]
#[command(long_about = "Stream answers from a local Ollama server.\n\nThe prompt is taken from the PROMPT argument or, if absent, piped in via stdin.")]
struct Cli {
    /// Prompt to send to the model (can also be piped via stdin)
    #[arg(value_name = "PROMPT")]
    prompt: Option<String>,

    /// List all models available on the server
    #[arg(short = 'l', long)]
    list: bool,

    /// Choose a model (falls back to $OLLAMA_MODEL, then the first listed model)
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// System prompt sent before the user prompt
    #[arg(short = 's', long, value_name = "TEXT")]
    system: Option<String>,

    /// Token context size for the model
    #[arg(long = "num-ctx", alias = "num_ctx", value_name = "TOKENS")]
    num_ctx: Option<u32>,

    /// Sampling temperature
    #[arg(long)]
    temp: Option<f32>,

    /// Sample only from the k most likely tokens
    #[arg(long = "top-k", alias = "top_k", value_name = "K")]
    top_k: Option<u32>,

    /// Sample from the smallest token set whose cumulative probability reaches p
    #[arg(long = "top-p", alias = "top_p", value_name = "P")]
    top_p: Option<f32>,

    /// Drop tokens whose probability is below this threshold
    #[arg(long = "min-p", alias = "min_p", value_name = "P")]
    min_p: Option<f32>,

    /// Disable Markdown rendering (raw output, no redraw delay)
    #[arg(long = "no-md", alias = "no_md", conflicts_with = "words")]
    no_md: bool,

    /// Print the answer one whole word at a time
    #[arg(long)]
    words: bool,

    /// Keep a multi-turn conversation going (Ctrl-C to quit)
    #[arg(short = 'c', long)]
    chat: bool,

    /// Text appended after a piped-in prompt
    #[arg(
        short = 'p',
        long = "append",
        alias = "append_p",
        value_name = "TEXT",
        conflicts_with = "chat"
    )]
    append: Option<String>,

    /// Ollama server URL (overrides the config file)
    #[arg(long, value_name = "URL")]
    host: Option<String>,

    /// Write the default config file and exit
    #[arg(long)]
    init_config: bool,

    /// Debug logging on stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

/// Everything a request needs, after merging the config file and flags.
struct Settings {
    model: Option<String>,
    env_model: Option<String>,
    system: String,
    options: Options,
}

impl Settings {
    fn resolve(cli: &Cli, config: &mut Config) -> Self {
        if let Some(host) = &cli.host {
            config.host = host.clone();
        }

        let options = &mut config.options;
        if let Some(temperature) = cli.temp {
            options.temperature = temperature;
        }
        if let Some(num_ctx) = cli.num_ctx {
            options.num_ctx = num_ctx;
        }
        if let Some(top_k) = cli.top_k {
            options.top_k = top_k;
        }
        if let Some(top_p) = cli.top_p {
            options.top_p = top_p;
        }
        if let Some(min_p) = cli.min_p {
            options.min_p = min_p;
        }

        if cli.no_md {
            config.display.mode = RenderMode::Raw;
        } else if cli.words {
            config.display.mode = RenderMode::Words;
        }

        Self {
            model: cli.model.clone(),
            env_model: std::env::var(MODEL_ENV).ok(),
            system: cli.system.clone().unwrap_or_else(|| config.system_prompt.clone()),
            options: config.options,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.init_config {
        return handle_init_config();
    }

    let mut config = Config::load()?;
    let settings = Settings::resolve(&cli, &mut config);
    let client = OllamaClient::new(&config.client())?;
    debug!("Using Ollama at {}", client.host());

    let terminal = atty::is(atty::Stream::Stdout);
    let renderer = Renderer::new(
        std::io::stdout(),
        config.display.mode,
        terminal,
        config.display.refresh_interval(),
    );
    debug!("Rendering as {:?}", renderer.mode());

    let outcome = if cli.list {
        handle_list(&client, &mut std::io::stdout()).await
    } else if cli.chat {
        handle_chat(&client, settings, cli.prompt, renderer).await
    } else {
        if cli.prompt.is_none() && atty::is(atty::Stream::Stdin) {
            eprintln!("Reading prompt from stdin, finish with Ctrl-D");
        }
        let mut renderer = renderer;
        handle_prompt(
            &client,
            settings,
            cli.prompt,
            cli.append.as_deref(),
            std::io::stdin().lock(),
            &mut renderer,
        )
        .await
        .map(|_| ())
    };

    if let Err(e) = outcome {
        let hint = e.is_connectivity();
        eprintln!("{} {:#}", "Error:".red().bold(), anyhow::Error::from(e));
        if hint {
            eprintln!("Is Ollama running at {}?", client.host());
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Log to stderr so answers on stdout stay clean.
fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "aibot=debug,reqwest=warn"
    } else {
        "aibot=warn,reqwest=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Handle `--init-config`.
fn handle_init_config() -> Result<()> {
    let path = Config::default().save()?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

/// Print one model name per line.
async fn handle_list<W: Write>(client: &OllamaClient, out: &mut W) -> error::Result<()> {
    for name in client.list_models().await? {
        writeln!(out, "{}", name)?;
    }
    Ok(())
}

/// Single-shot mode: one prompt, one streamed answer.
///
/// The prompt is resolved before anything goes over the network, so a missing
/// prompt never reaches the server.
async fn handle_prompt<R: Read, W: Write>(
    client: &OllamaClient,
    settings: Settings,
    prompt: Option<String>,
    append: Option<&str>,
    stdin: R,
    renderer: &mut Renderer<W>,
) -> error::Result<Answer> {
    let prompt = input::resolve_prompt(prompt, stdin, append)?;
    let model = client
        .pick_model(settings.model.as_deref(), settings.env_model.as_deref())
        .await?;
    info!("Sending {} characters to {}", prompt.len(), model);

    renderer.header(&model, &prompt)?;
    let request = GenerateRequest {
        model,
        prompt,
        stream: true,
        options: settings.options,
        system: Some(settings.system),
    };
    let records = client.generate(&request).await?;
    renderer.render(records, Endpoint::Generate).await
}

/// Chat mode: loop until Ctrl-C or end of input. Both end with success.
async fn handle_chat<W: Write>(
    client: &OllamaClient,
    settings: Settings,
    prompt: Option<String>,
    renderer: Renderer<W>,
) -> error::Result<()> {
    let model = client
        .pick_model(settings.model.as_deref(), settings.env_model.as_deref())
        .await?;

    let mut chat = ChatSession::new(client, model, settings.options, settings.system, renderer);
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let end = chat.run(prompt, &mut lines, interrupt).await?;

    let exchanges = chat.history().exchanges();
    match end {
        SessionEnd::Interrupted => {
            info!("Chat interrupted after {} exchanges", exchanges);
            // The stdin reader sits on a blocking thread that runtime shutdown
            // would wait on until the next line arrives.
            std::io::stdout().flush()?;
            std::process::exit(0);
        }
        SessionEnd::EndOfInput => info!("Input closed after {} exchanges", exchanges),
    }
    Ok(())
}
