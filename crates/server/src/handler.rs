use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use brisadb_common::{BrisaResult, CommandError, ConnectionError, StorageError};
use brisadb_protocol::{Command, Frame};
use brisadb_storage::Db;

use crate::Connection;

/// Loop principal de uma conexão: lê um request, executa, responde.
///
/// Termina com Ok no EOF ou no shutdown. Erros de framing geram uma
/// resposta de erro (se possível) e encerram a conexão.
pub async fn handle_connection(
    mut conn: Connection,
    db: Db,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    loop {
        let frame = tokio::select! {
            result = conn.read_frame() => result,
            _ = shutdown.recv() => {
                return Ok(());
            }
        };

        let frame = match frame {
            Ok(Some(f)) => f,
            Ok(None) => return Ok(()), // EOF
            Err(ConnectionError::Protocol(e)) => {
                warn!("erro de framing: {e}");
                let _ = conn.write_frame(&Frame::error(&e)).await;
                return Err(e.into());
            }
            Err(e) => return Err(e),
        };

        let response = match Command::from_frame(frame) {
            Ok(cmd) => {
                debug!("comando recebido: {cmd:?}");
                // BLPOP pode suspender; o shutdown descarta o future e o
                // waiter sai da fila
                tokio::select! {
                    response = execute_command(cmd, &db) => response,
                    _ = shutdown.recv() => {
                        return Ok(());
                    }
                }
            }
            Err(e) => Frame::error(e),
        };

        conn.write_frame(&response).await?;
    }
}

/// Executa um comando e retorna o Frame de resposta.
pub async fn execute_command(cmd: Command, db: &Db) -> Frame {
    match dispatch(cmd, db).await {
        Ok(frame) => frame,
        Err(e) => Frame::error(e),
    }
}

async fn dispatch(cmd: Command, db: &Db) -> BrisaResult<Frame> {
    let frame = match cmd {
        Command::Ping(None) => Frame::Simple("PONG".into()),
        Command::Ping(Some(msg)) => Frame::Bulk(msg),
        Command::Echo(msg) => Frame::Bulk(msg),
        Command::Get(key) => match db.get(&key) {
            Ok(value) => Frame::Bulk(value),
            Err(StorageError::KeyNotFound) => Frame::Null,
            Err(e) => return Err(e.into()),
        },
        Command::Set { key, value, expire } => {
            db.set(key, value, expire);
            Frame::Simple("OK".into())
        }
        Command::Del(keys) => {
            let count = keys.iter().filter(|key| db.del(key)).count();
            Frame::Integer(count as i64)
        }
        Command::Type(key) => Frame::Simple(db.key_type(&key).into()),
        Command::LPush { key, values } => Frame::Integer(db.lpush(&key, &values)? as i64),
        Command::RPush { key, values } => Frame::Integer(db.rpush(&key, &values)? as i64),
        Command::LRange { key, start, stop } => {
            Frame::array_from_bytes(db.lrange(&key, start, stop)?)
        }
        Command::LLen(key) => Frame::Integer(db.llen(&key)? as i64),
        Command::LPop { key, count: None } => match db.lpop(&key, 1)?.pop() {
            Some(value) => Frame::Bulk(value),
            None => Frame::Null,
        },
        Command::LPop {
            key,
            count: Some(count),
        } => {
            let items = db.lpop(&key, count)?;
            if items.is_empty() {
                Frame::NullArray
            } else {
                Frame::array_from_bytes(items)
            }
        }
        Command::BLPop { key, timeout } => match db.blpop(&key, timeout).await {
            Ok((key, value)) => Frame::Array(vec![Frame::Bulk(Bytes::from(key)), Frame::Bulk(value)]),
            Err(StorageError::Cancelled) => Frame::NullArray,
            Err(e) => return Err(e.into()),
        },
        Command::Unknown(name) => return Err(CommandError::Unknown(name).into()),
    };

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn run(db: &Db, args: &[&str]) -> Frame {
        match Command::from_frame(Frame::array_from_strs(args)) {
            Ok(cmd) => execute_command(cmd, db).await,
            Err(e) => Frame::error(e),
        }
    }

    #[tokio::test]
    async fn get_missing_is_null_bulk() {
        let db = Db::new();
        assert_eq!(run(&db, &["GET", "nope"]).await, Frame::Null);
    }

    #[tokio::test]
    async fn wrong_type_is_error_reply() {
        let db = Db::new();
        run(&db, &["SET", "k", "v"]).await;
        let reply = run(&db, &["RPUSH", "k", "x"]).await;
        assert_eq!(
            reply.error_message(),
            Some("operation against a key holding the wrong kind of value")
        );
        assert_eq!(run(&db, &["GET", "k"]).await, Frame::bulk("v"));
    }

    #[tokio::test]
    async fn lpop_reply_shapes() {
        let db = Db::new();
        assert_eq!(run(&db, &["LPOP", "l"]).await, Frame::Null);
        assert_eq!(run(&db, &["LPOP", "l", "2"]).await, Frame::NullArray);

        run(&db, &["RPUSH", "l", "a", "b", "c"]).await;
        assert_eq!(run(&db, &["LPOP", "l"]).await, Frame::bulk("a"));
        assert_eq!(
            run(&db, &["LPOP", "l", "5"]).await,
            Frame::array_from_strs(&["b", "c"])
        );
    }

    #[tokio::test]
    async fn lrange_empty_is_empty_array() {
        let db = Db::new();
        assert_eq!(run(&db, &["LRANGE", "l", "0", "-1"]).await, Frame::Array(vec![]));
    }

    #[tokio::test]
    async fn del_counts_removed_keys() {
        let db = Db::new();
        run(&db, &["SET", "a", "1"]).await;
        run(&db, &["RPUSH", "b", "x"]).await;
        assert_eq!(run(&db, &["DEL", "a", "b", "c"]).await, Frame::Integer(2));
        assert_eq!(run(&db, &["TYPE", "b"]).await, Frame::Simple("none".into()));
    }

    #[tokio::test]
    async fn blpop_timeout_is_null_array() {
        let db = Db::new();
        let reply = run(&db, &["BLPOP", "q", "0.02"]).await;
        assert_eq!(reply, Frame::NullArray);
        assert_eq!(db.waiting("q"), 0);
    }

    #[tokio::test]
    async fn blpop_served_by_later_push() {
        let db = Db::new();
        let waiter = tokio::spawn({
            let db = db.clone();
            async move { run(&db, &["BLPOP", "q", "0"]).await }
        });
        while db.waiting("q") == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(run(&db, &["RPUSH", "q", "job"]).await, Frame::Integer(0));
        assert_eq!(waiter.await.unwrap(), Frame::array_from_strs(&["q", "job"]));
    }

    #[tokio::test]
    async fn unknown_command_and_arity_errors() {
        let db = Db::new();
        assert_eq!(
            run(&db, &["FOOBAR"]).await.error_message(),
            Some("unknown command 'FOOBAR'")
        );
        assert_eq!(
            run(&db, &["GET"]).await.error_message(),
            Some("wrong number of arguments for 'get'")
        );
        assert!(run(&db, &["SET", "k", "v", "PX", "abc"])
            .await
            .error_message()
            .unwrap()
            .starts_with("invalid TTL"));
    }
}
