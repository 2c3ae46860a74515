use clap::{Parser, Subcommand};

mod commands;
mod util;

use commands::keygen::KeygenArgs;
use commands::rpc::{RawArgs, RpcTarget, ToolsCommands};
use commands::stream::{StreamArgs, SubmitArgs};
use util::require_key;

#[derive(Parser)]
#[command(
    name = "switchboard",
    version,
    about = "Switchboard CLI: call agent tools over JSON-RPC and manage sessions"
)]
struct Cli {
    /// Server base URL
    #[arg(long, env = "SWITCHBOARD_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// API key (sb_sk_...)
    #[arg(long, env = "SWITCHBOARD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Session id to resume on /rpc
    #[arg(long, env = "SWITCHBOARD_SESSION_ID")]
    session: Option<String>,

    /// Skip pretty-printing (raw JSON for piping)
    #[arg(long, global = true)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health
    Health,
    /// Mint an API key and print its credential-file entry
    Keygen(KeygenArgs),
    /// Perform the handshake and print the session id
    Init,
    /// Round-trip a ping
    Ping,
    /// Tool discovery and invocation
    Tools {
        #[command(subcommand)]
        command: ToolsCommands,
    },
    /// Send an arbitrary JSON-RPC method
    Rpc(RawArgs),
    /// Session management
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Open a push stream and print events as JSON lines
    Stream(StreamArgs),
    /// Submit a payload to a push-stream session
    Submit(SubmitArgs),
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Close a request/response session
    End {
        /// Session id (defaults to --session)
        session_id: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SWITCHBOARD_LOG")
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api_url = cli.api_url.trim_end_matches('/').to_string();

    let code = match cli.command {
        Commands::Health => commands::health::run(&api_url, cli.raw).await,
        Commands::Keygen(args) => commands::keygen::run(args, cli.raw),
        Commands::Init => {
            let target = rpc_target(&api_url, cli.api_key.as_deref(), None, cli.raw);
            commands::rpc::initialize(&target).await
        }
        Commands::Ping => {
            let target = rpc_target(&api_url, cli.api_key.as_deref(), cli.session.as_deref(), cli.raw);
            commands::rpc::ping(&target).await
        }
        Commands::Tools { command } => {
            let target = rpc_target(&api_url, cli.api_key.as_deref(), cli.session.as_deref(), cli.raw);
            commands::rpc::tools(&target, command).await
        }
        Commands::Rpc(args) => {
            let target = rpc_target(&api_url, cli.api_key.as_deref(), cli.session.as_deref(), cli.raw);
            commands::rpc::raw(&target, args).await
        }
        Commands::Session { command } => match command {
            SessionCommands::End { session_id } => {
                let api_key = require_key(cli.api_key.as_deref());
                let Some(session) = session_id.or(cli.session) else {
                    util::exit_error(
                        "A session id is required.",
                        Some("Pass it as an argument or via --session / SWITCHBOARD_SESSION_ID"),
                    );
                };
                commands::rpc::end_session(&api_url, api_key, &session, cli.raw).await
            }
        },
        Commands::Stream(args) => {
            let api_key = require_key(cli.api_key.as_deref());
            commands::stream::run(&api_url, api_key, args).await
        }
        Commands::Submit(args) => {
            let api_key = require_key(cli.api_key.as_deref());
            commands::stream::submit(&api_url, api_key, args, cli.raw).await
        }
    };

    std::process::exit(code);
}

fn rpc_target<'a>(
    api_url: &'a str,
    api_key: Option<&'a str>,
    session: Option<&'a str>,
    raw: bool,
) -> RpcTarget<'a> {
    RpcTarget {
        api_url,
        api_key: require_key(api_key),
        session,
        raw,
    }
}
