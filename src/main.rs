use anyhow::{Context, Result};
use clap::Parser;
use spool::cli::{Cli, Command, ServeOpts, TransferOpts};
use spool::client::TransferClient;
use spool::config::Config;
use spool::server::{Server, ServerConfig};
use spool::streaming::TransferStats;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("spool={}", cli.log_level()).into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve(opts) => serve(&config, opts).await,
        Command::Send(opts) => {
            let client = client_for(&config, &opts)?;
            let stats = client
                .send(&opts.source, &opts.destination)
                .await
                .with_context(|| format!("Failed to send {}", opts.source.display()))?;
            report("sent", &stats);
            Ok(())
        }
        Command::Request(opts) => {
            let client = client_for(&config, &opts)?;
            let stats = client
                .request(&opts.source, &opts.destination)
                .await
                .with_context(|| format!("Failed to request {}", opts.source.display()))?;
            report("received", &stats);
            Ok(())
        }
    }
}

async fn serve(config: &Config, opts: ServeOpts) -> Result<()> {
    let server_config = ServerConfig {
        bind: opts.bind.unwrap_or_else(|| config.server.bind.clone()),
        persistent: config.server.persistent && !opts.once,
    };

    let server = Server::bind(&server_config)
        .await
        .with_context(|| format!("Failed to bind {}", server_config.bind))?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

fn client_for(config: &Config, opts: &TransferOpts) -> Result<TransferClient> {
    let server = opts
        .server
        .clone()
        .unwrap_or_else(|| config.client.server.clone());
    let buf_size = opts.buffer_size.unwrap_or(config.client.buffer_size);

    Ok(TransferClient::new(server).with_buffer_size(buf_size)?)
}

fn report(verb: &str, stats: &TransferStats) {
    if stats.truncated > 0 {
        eprintln!(
            "{} {} files, {} bytes ({} truncated)",
            verb, stats.files, stats.bytes, stats.truncated
        );
    } else {
        eprintln!("{} {} files, {} bytes", verb, stats.files, stats.bytes);
    }
}
