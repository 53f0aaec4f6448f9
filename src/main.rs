//! XJP Hostctl
//!
//! Usage:
//! - `xjp-hostctl init`
//! - `xjp-hostctl deploy`
//! - `xjp-hostctl --env staging logs`
//! - `xjp-hostctl monitor --json`

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xjp_hostctl::cli::{self, Cli};
use xjp_hostctl::error::ErrorReport;

#[tokio::main]
async fn main() {
    // 诊断日志走 stderr，操作进度走 stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xjp_hostctl=info,russh=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = cli::run(cli).await {
        eprintln!("{}", ErrorReport::from_anyhow(&e));
        std::process::exit(1);
    }
}
