//! ctmon - watch the kernel connection tracking table.
//!
//! Flushes the conntrack table once, then polls it at a fixed interval
//! and prints each tracked flow, one line per connection.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ctflow::{Family, Result, Session, Table};

#[derive(Parser)]
#[command(name = "ctmon", version, about = "Conntrack table monitor")]
struct Cli {
    /// Poll interval in milliseconds.
    #[arg(long, default_value_t = 50)]
    interval_ms: u64,

    /// Dump IPv6 flows instead of IPv4.
    #[arg(short = '6', long)]
    ipv6: bool,

    /// Keep existing entries instead of flushing the table first.
    #[arg(long)]
    no_flush: bool,

    /// Network namespace path (e.g. /var/run/netns/myns).
    #[arg(long)]
    netns: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let session = match &cli.netns {
        Some(path) => Session::connect_in_namespace_path(path)?,
        None => Session::connect()?,
    };

    if !cli.no_flush {
        session.flush(Table::Conntrack).await?;
    }

    let family = if cli.ipv6 { Family::Ipv6 } else { Family::Ipv4 };
    let interval = Duration::from_millis(cli.interval_ms);

    loop {
        match session.list(Table::Conntrack, family).await {
            Ok(flows) => {
                for flow in &flows {
                    println!("{flow}");
                }
            }
            // A failed poll is worth a warning, not a shutdown.
            Err(err) => tracing::warn!("conntrack dump failed: {err}"),
        }

        tokio::time::sleep(interval).await;
    }
}
