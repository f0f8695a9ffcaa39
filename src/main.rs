use clap::Parser;
use knowhub::renderer::outline;
use knowhub::{ApiClient, ChatSession, ClientConfig, DropPosition, MemberLevel, MoveOutcome, Phase, Workspace};
use log::{info, warn};
use std::env;
use std::process::ExitCode;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Parser)]
#[command(name = "knowhub", about = "Browse, reorder and chat with a KnowHub knowledge base")]
struct Cli {
    /// Server base URL (overrides KNOWHUB_URL)
    #[arg(long)]
    url: Option<String>,

    /// Act as administrator (overrides KNOWHUB_ADMIN)
    #[arg(long)]
    admin: bool,

    /// Move NODE relative to TARGET: `--move NODE TARGET before|after|inside`
    #[arg(long = "move", num_args = 3, value_names = ["NODE", "TARGET", "POSITION"])]
    move_args: Option<Vec<String>>,

    /// Node whose document body is sent as chat context
    #[arg(long)]
    doc: Option<String>,

    /// Prompt to send to the AI assistant
    #[arg(long)]
    chat: Option<String>,
}

fn parse_position(value: &str) -> Option<DropPosition> {
    match value {
        "before" => Some(DropPosition::Before),
        "after" => Some(DropPosition::After),
        "inside" => Some(DropPosition::Inside),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Default to `info`; override with RUST_LOG, e.g. `RUST_LOG=debug knowhub`.
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(url) = cli.url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    config.admin |= cli.admin;

    let api = match ApiClient::new(&config) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Connecting to {}", api.base_url());

    let mut workspace = Workspace::new(api.clone(), config.admin);
    if let Err(e) = workspace.reload().await {
        eprintln!("Failed to load tree: {}", e.user_message());
        return ExitCode::FAILURE;
    }

    if let Some(args) = cli.move_args.as_deref() {
        let Some(position) = parse_position(&args[2]) else {
            eprintln!("Position must be one of before, after, inside");
            return ExitCode::FAILURE;
        };
        match workspace.move_node(&args[0], &args[1], position).await {
            MoveOutcome::Moved(_) => println!("✓ Moved"),
            MoveOutcome::MovedStale(_, reason) => {
                eprintln!("Moved, but the tree could not be refreshed: {}", reason);
                return ExitCode::FAILURE;
            }
            MoveOutcome::Ignored => {}
            MoveOutcome::Rejected(reason) => {
                eprintln!("{}", reason);
                return ExitCode::FAILURE;
            }
            MoveOutcome::Failed(reason) => {
                eprintln!("Move failed: {}", reason);
                return ExitCode::FAILURE;
            }
        }
    }

    let mut chat = ChatSession::new(api.clone(), MemberLevel::parse(config.member_level.as_deref()));
    if let Some(doc) = cli.doc.as_deref() {
        if workspace.select(doc) {
            match api.fetch_document(doc).await {
                Ok(document) => chat.set_document(document.name.clone(), document.context()),
                Err(e) => {
                    eprintln!("Failed to load document: {}", e.user_message());
                    return ExitCode::FAILURE;
                }
            }
        } else {
            warn!("Document '{}' not found in tree", doc);
        }
    }

    print!("{}", outline(&workspace.render()));

    if let Some(prompt) = cli.chat.as_deref() {
        return stream_reply(&chat, prompt).await;
    }
    ExitCode::SUCCESS
}

async fn stream_reply(chat: &ChatSession, prompt: &str) -> ExitCode {
    let handle = match chat.submit_message(prompt) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut rx = handle.subscribe();
    let mut stdout = tokio::io::stdout();
    let mut shown = String::new();
    loop {
        let snapshot = rx.borrow_and_update().clone();
        let delta = match snapshot.visible.strip_prefix(shown.as_str()) {
            Some(rest) => rest.to_string(),
            None => format!("\n{}", snapshot.visible),
        };
        if let Err(e) = write_delta(&mut stdout, delta.as_bytes()).await {
            warn!("Stopped streaming reply {}: {}", handle.id(), e);
            return ExitCode::FAILURE;
        }
        shown = snapshot.visible;
        if snapshot.phase.is_terminal() {
            if write_delta(&mut stdout, b"\n").await.is_err() {
                return ExitCode::FAILURE;
            }
            return if snapshot.phase == Phase::Errored {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
        if rx.changed().await.is_err() {
            return ExitCode::FAILURE;
        }
    }
}

async fn write_delta(stdout: &mut tokio::io::Stdout, bytes: &[u8]) -> std::io::Result<()> {
    stdout.write_all(bytes).await?;
    stdout.flush().await
}
