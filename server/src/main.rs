use anyhow::Result;
use axum::Router;
use clap::Parser;
use lexis_core::tokenizer::{Analyzer, SpanishAnalyzer};
use lexis_server::build_app;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Disable Spanish stemming (must match the setting used to build the index)
    #[arg(long, default_value_t = false)]
    no_stem: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let analyzer: Arc<dyn Analyzer> = if args.no_stem {
        Arc::new(SpanishAnalyzer::without_stemming())
    } else {
        Arc::new(SpanishAnalyzer::new())
    };
    let app: Router = build_app(args.index.clone(), analyzer)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
