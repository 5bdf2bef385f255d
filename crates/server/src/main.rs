use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use brisadb_common::{DEFAULT_HOST, DEFAULT_PORT, MAX_CONNECTIONS};
use brisadb_storage::Db;

#[derive(Parser, Debug)]
#[command(name = "brisadb-server", about = "BrisaDB: in-memory key-value server")]
struct Args {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, short, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long, default_value_t = MAX_CONNECTIONS)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brisadb_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let listener = TcpListener::bind(&addr).await?;
    info!("BrisaDB escutando em {addr}");

    brisadb_server::run(listener, Db::new(), args.max_connections, signal::ctrl_c()).await
}
