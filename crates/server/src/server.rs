use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tracing::{error, info};

use brisadb_storage::Db;

use crate::{Connection, handle_connection};

/// Aceita conexões até `shutdown` completar, uma task por conexão.
///
/// No shutdown as conexões abertas são avisadas pelo canal broadcast e
/// encerram após o request corrente; BLPOPs pendentes são descartados.
pub async fn run(
    listener: TcpListener,
    db: Db,
    max_connections: usize,
    shutdown: impl Future,
) -> anyhow::Result<()> {
    let semaphore = Arc::new(Semaphore::new(max_connections));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => permit?,
            _ = shutdown.as_mut() => {
                info!("shutdown signal recebido");
                break;
            }
        };

        let (socket, addr) = tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok(v) => v,
                    Err(e) => {
                        error!("erro ao aceitar conexão: {e}");
                        continue;
                    }
                }
            }
            _ = shutdown.as_mut() => {
                info!("shutdown signal recebido");
                break;
            }
        };

        info!("nova conexão: {addr}");
        let db = db.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            let conn = Connection::new(socket);
            if let Err(e) = handle_connection(conn, db, &mut shutdown_rx).await {
                error!("erro na conexão {addr}: {e}");
            }
            info!("conexão encerrada: {addr}");
            drop(permit);
        });
    }

    // Fechar o canal acorda todas as conexões
    drop(shutdown_tx);

    Ok(())
}
