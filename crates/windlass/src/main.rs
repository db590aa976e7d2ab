//! Run the agent loop against an OpenAI-compatible endpoint.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # One-shot task
//! windlass --task "Summarize the tradeoffs of mmap vs read for large files"
//!
//! # Interactive session with a custom model
//! windlass --model openai/gpt-4o --system "You are a terse reviewer."
//!
//! # Custom endpoint
//! windlass --url http://localhost:8080/v1/chat/completions --model local-model
//! ```
//!
//! Ctrl-C interrupts the current turn; the session survives and the next
//! prompt continues it. `/usage` prints the session snapshot, `/clear`
//! resets the conversation, `/quit` exits.

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::process;
use std::time::Duration;
use windlass::prelude::*;

/// Run the agent loop against an OpenAI-compatible endpoint.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "windlass")]
struct Cli {
    /// Model to use
    #[arg(long, default_value = "anthropic/claude-sonnet-4")]
    model: String,

    /// System prompt to set the assistant's behavior
    #[arg(long, default_value = "You are a helpful assistant.")]
    system: String,

    /// One-shot task; omit for an interactive session
    #[arg(long)]
    task: Option<String>,

    /// Chat-completions endpoint URL (defaults to OpenRouter)
    #[arg(long)]
    url: Option<String>,

    /// Maximum model round-trips per turn
    #[arg(long, default_value_t = 100)]
    max_iterations: u32,

    /// Timeout for each model call, in seconds
    #[arg(long, default_value_t = 300)]
    llm_timeout: u64,

    /// Per-response output token limit
    #[arg(long, default_value_t = 4096)]
    max_tokens: u32,

    /// Verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let api_key =
        std::env::var("OPENROUTER_KEY").map_err(|_| "OPENROUTER_KEY not set".to_string())?;

    let client = match &cli.url {
        Some(url) => ChatClient::with_url(api_key, &cli.model, url)?,
        None => ChatClient::new(api_key, &cli.model)?,
    }
    .with_max_tokens(cli.max_tokens);

    let tools = ToolRegistry::new().with_arg_validation(true);
    let gate = AllowAll;
    let handler = LoggingHandler;
    let config = RunnerConfig::default()
        .with_max_iterations(cli.max_iterations)
        .with_llm_timeout(Duration::from_secs(cli.llm_timeout));

    let mut session = Session::new(&cli.model, &cli.system);

    if let Some(ref task) = cli.task {
        run_turn(&client, &tools, &gate, &handler, &config, &mut session, task).await?;
        eprintln!("{}", session.usage_snapshot().to_log_string());
        return Ok(());
    }

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| e.to_string())?;
        if read == 0 {
            break;
        }

        let input = line.trim();
        match input {
            "" => continue,
            "/quit" => break,
            "/usage" => {
                println!("{}", session.usage_snapshot().to_log_string());
                continue;
            }
            "/clear" => {
                session.clear();
                println!("(conversation cleared)");
                continue;
            }
            _ => {}
        }

        // A failed turn shouldn't kill the session.
        if let Err(e) = run_turn(&client, &tools, &gate, &handler, &config, &mut session, input).await
        {
            eprintln!("turn failed: {e}");
        }
    }

    eprintln!("{}", session.usage_snapshot().to_log_string());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_turn(
    client: &ChatClient,
    tools: &ToolRegistry,
    gate: &AllowAll,
    handler: &LoggingHandler,
    config: &RunnerConfig,
    session: &mut Session,
    input: &str,
) -> Result<(), String> {
    let token = CancelToken::new();
    let mut runner = Runner::new(client, tools, gate, config.clone())
        .with_event_handler(handler)
        .with_cancel_token(token.clone());

    // Ctrl-C interrupts the turn, not the process. The watcher is torn
    // down once the turn finishes so waiters don't pile up across a
    // long interactive session.
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let outcome = runner.run(session, input).await;
    watcher.abort();

    match outcome.map_err(|e| e.to_string())? {
        TurnOutcome::Completed(answer) => println!("{answer}"),
        TurnOutcome::IterationLimit(hint) => println!("{hint}"),
        TurnOutcome::Interrupted => println!("(interrupted)"),
    }
    Ok(())
}
