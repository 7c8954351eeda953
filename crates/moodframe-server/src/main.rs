use std::net::SocketAddr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use moodframe_server::api_server;
use moodframe_server::config::{AppConfig, DEFAULT_BIND};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "moodframe", version, about = "Image and speech-emotion HTTP service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Validate environment configuration and exit.
    CheckConfig,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, default_value = DEFAULT_BIND)]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let code = match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("moodframe error: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::CheckConfig => run_check_config(),
    }
}

async fn run_serve(args: ServeArgs) -> Result<i32> {
    let config = AppConfig::from_env()?;
    for (name, value) in config.summary() {
        tracing::info!(setting = name, value = %value, "config");
    }
    let state = api_server::build_state(&config)?;
    let app = api_server::router(state, config.max_body_bytes);
    api_server::serve(args.bind, app).await?;
    Ok(0)
}

fn run_check_config() -> Result<i32> {
    let config = AppConfig::from_env()?;
    for (name, value) in config.summary() {
        println!("{name} = {value}");
    }
    println!("configuration ok");
    Ok(0)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodframe=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults_to_port_3000() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["moodframe", "serve"])?;
        match cli.command {
            Command::Serve(args) => assert_eq!(args.bind, "0.0.0.0:3000".parse::<SocketAddr>()?),
            other => panic!("unexpected command: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn bind_address_is_validated() {
        assert!(Cli::try_parse_from(["moodframe", "serve", "--bind", "nowhere"]).is_err());
        assert!(Cli::try_parse_from(["moodframe", "check-config"]).is_ok());
    }
}
