use std::time::Duration;

use bytes::Bytes;
use brisadb_common::CommandError;

use crate::{Frame, Parse};

/// Enum com todos os comandos suportados.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping(Option<Bytes>),
    Echo(Bytes),
    Get(String),
    Set {
        key: String,
        value: Bytes,
        /// TTL explícito; `None` remove qualquer expiração anterior.
        expire: Option<Duration>,
    },
    Del(Vec<String>),
    Type(String),
    LPush {
        key: String,
        values: Vec<Bytes>,
    },
    RPush {
        key: String,
        values: Vec<Bytes>,
    },
    LRange {
        key: String,
        start: i64,
        stop: i64,
    },
    LLen(String),
    LPop {
        key: String,
        count: Option<i64>,
    },
    BLPop {
        key: String,
        /// `None` bloqueia indefinidamente (timeout 0 no protocolo).
        timeout: Option<Duration>,
    },
    Unknown(String),
}

impl Command {
    /// Faz o parse de um Frame em um Command.
    pub fn from_frame(frame: Frame) -> Result<Command, CommandError> {
        let mut parse = Parse::new(frame)?;
        let cmd_name = parse.command()?;

        let cmd = match cmd_name.as_str() {
            "PING" => {
                let msg = if parse.has_remaining() {
                    Some(parse.next_bytes()?)
                } else {
                    None
                };
                parse.finish()?;
                Command::Ping(msg)
            }
            "ECHO" => {
                let msg = parse.next_bytes()?;
                parse.finish()?;
                Command::Echo(msg)
            }
            "GET" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::Get(key)
            }
            "SET" => parse_set(&mut parse)?,
            "DEL" => {
                if !parse.has_remaining() {
                    return Err(parse.wrong_arity());
                }
                let mut keys = Vec::new();
                while parse.has_remaining() {
                    keys.push(parse.next_string()?);
                }
                Command::Del(keys)
            }
            "TYPE" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::Type(key)
            }
            "LPUSH" | "RPUSH" => {
                let key = parse.next_string()?;
                if !parse.has_remaining() {
                    return Err(parse.wrong_arity());
                }
                let values = parse.rest_bytes()?;
                if cmd_name == "LPUSH" {
                    Command::LPush { key, values }
                } else {
                    Command::RPush { key, values }
                }
            }
            "LRANGE" => {
                let key = parse.next_string()?;
                let start = parse.next_int()?;
                let stop = parse.next_int()?;
                parse.finish()?;
                Command::LRange { key, start, stop }
            }
            "LLEN" => {
                let key = parse.next_string()?;
                parse.finish()?;
                Command::LLen(key)
            }
            "LPOP" => {
                let key = parse.next_string()?;
                let count = if parse.has_remaining() {
                    Some(parse.next_int()?)
                } else {
                    None
                };
                parse.finish()?;
                Command::LPop { key, count }
            }
            "BLPOP" => {
                let key = parse.next_string()?;
                let secs = parse.next_float()?;
                parse.finish()?;
                if secs < 0.0 {
                    return Err(CommandError::InvalidArgument(
                        "timeout is negative".into(),
                    ));
                }
                let timeout = if secs > 0.0 {
                    let limit = Duration::try_from_secs_f64(secs).map_err(|_| {
                        CommandError::InvalidArgument("timeout is out of range".into())
                    })?;
                    Some(limit)
                } else {
                    None
                };
                Command::BLPop { key, timeout }
            }
            _ => Command::Unknown(cmd_name),
        };

        Ok(cmd)
    }

    /// Encoda o comando como request (array de bulk strings).
    pub fn to_frame(&self) -> Frame {
        match self {
            Command::Ping(None) => Frame::Array(vec![Frame::bulk("PING")]),
            Command::Ping(Some(msg)) => {
                Frame::Array(vec![Frame::bulk("PING"), Frame::Bulk(msg.clone())])
            }
            Command::Echo(msg) => Frame::Array(vec![Frame::bulk("ECHO"), Frame::Bulk(msg.clone())]),
            Command::Get(key) => Frame::Array(vec![Frame::bulk("GET"), Frame::bulk(key)]),
            Command::Set { key, value, expire } => {
                let mut parts = vec![
                    Frame::bulk("SET"),
                    Frame::bulk(key),
                    Frame::Bulk(value.clone()),
                ];
                if let Some(ttl) = expire {
                    parts.push(Frame::bulk("PX"));
                    parts.push(Frame::bulk(&ttl.as_millis().to_string()));
                }
                Frame::Array(parts)
            }
            Command::Del(keys) => {
                let mut parts = vec![Frame::bulk("DEL")];
                parts.extend(keys.iter().map(|k| Frame::bulk(k)));
                Frame::Array(parts)
            }
            Command::Type(key) => Frame::Array(vec![Frame::bulk("TYPE"), Frame::bulk(key)]),
            Command::LPush { key, values } => push_frame("LPUSH", key, values),
            Command::RPush { key, values } => push_frame("RPUSH", key, values),
            Command::LRange { key, start, stop } => Frame::Array(vec![
                Frame::bulk("LRANGE"),
                Frame::bulk(key),
                Frame::bulk(&start.to_string()),
                Frame::bulk(&stop.to_string()),
            ]),
            Command::LLen(key) => Frame::Array(vec![Frame::bulk("LLEN"), Frame::bulk(key)]),
            Command::LPop { key, count } => {
                let mut parts = vec![Frame::bulk("LPOP"), Frame::bulk(key)];
                if let Some(c) = count {
                    parts.push(Frame::bulk(&c.to_string()));
                }
                Frame::Array(parts)
            }
            Command::BLPop { key, timeout } => {
                let secs = timeout.map(|t| t.as_secs_f64()).unwrap_or(0.0);
                Frame::Array(vec![
                    Frame::bulk("BLPOP"),
                    Frame::bulk(key),
                    Frame::bulk(&secs.to_string()),
                ])
            }
            Command::Unknown(name) => Frame::Array(vec![Frame::bulk(name)]),
        }
    }
}

fn push_frame(name: &str, key: &str, values: &[Bytes]) -> Frame {
    let mut parts = vec![Frame::bulk(name), Frame::bulk(key)];
    parts.extend(values.iter().map(|v| Frame::Bulk(v.clone())));
    Frame::Array(parts)
}

fn parse_set(parse: &mut Parse) -> Result<Command, CommandError> {
    let key = parse.next_string()?;
    let value = parse.next_bytes()?;
    let mut expire = None;

    while parse.has_remaining() {
        let opt = parse.next_string()?.to_uppercase();
        let scale = match opt.as_str() {
            "EX" => 1000,
            "PX" => 1,
            other => {
                return Err(CommandError::InvalidArgument(format!(
                    "unsupported SET option '{other}'"
                )));
            }
        };
        let raw = parse.next_string()?;
        let ms = match raw.parse::<i64>() {
            Ok(n) if n > 0 => (n as u64).checked_mul(scale),
            _ => None,
        };
        let ms = ms.ok_or_else(|| CommandError::InvalidTtl(format!("'{raw}' for {opt}")))?;
        expire = Some(Duration::from_millis(ms));
    }

    Ok(Command::Set { key, value, expire })
}
