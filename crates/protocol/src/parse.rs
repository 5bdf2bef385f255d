use bytes::Bytes;
use brisadb_common::CommandError;

use crate::Frame;

/// Cursor sobre um Frame::Array para extrair argumentos sequencialmente.
///
/// Falta ou sobra de argumentos vira `CommandError::WrongArity` com o nome
/// do comando lido por `command()`.
pub struct Parse {
    parts: Vec<Frame>,
    pos: usize,
    command: String,
}

impl Parse {
    /// Cria um Parse a partir de um Frame. O frame deve ser Array.
    pub fn new(frame: Frame) -> Result<Parse, CommandError> {
        match frame {
            Frame::Array(parts) => Ok(Parse {
                parts,
                pos: 0,
                command: String::new(),
            }),
            _ => Err(CommandError::InvalidArgument("expected array".into())),
        }
    }

    /// Lê o nome do comando (primeiro elemento), normalizado em maiúsculas.
    pub fn command(&mut self) -> Result<String, CommandError> {
        if !self.has_remaining() {
            return Err(CommandError::InvalidArgument("empty command".into()));
        }
        let name = self.next_string()?.to_uppercase();
        self.command = name.to_lowercase();
        Ok(name)
    }

    /// Retorna o próximo elemento como String UTF-8.
    pub fn next_string(&mut self) -> Result<String, CommandError> {
        match self.next()? {
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(data) => String::from_utf8(data.to_vec())
                .map_err(|_| CommandError::InvalidArgument("invalid UTF-8 string".into())),
            _ => Err(CommandError::InvalidArgument("expected bulk string".into())),
        }
    }

    /// Retorna o próximo elemento como Bytes, sem exigir UTF-8.
    pub fn next_bytes(&mut self) -> Result<Bytes, CommandError> {
        match self.next()? {
            Frame::Bulk(data) => Ok(data),
            Frame::Simple(s) => Ok(Bytes::from(s)),
            _ => Err(CommandError::InvalidArgument("expected bulk string".into())),
        }
    }

    /// Retorna o próximo elemento como i64.
    pub fn next_int(&mut self) -> Result<i64, CommandError> {
        match self.next()? {
            Frame::Integer(n) => Ok(n),
            Frame::Bulk(data) => {
                let s = std::str::from_utf8(&data)
                    .map_err(|_| CommandError::InvalidArgument("invalid integer".into()))?;
                s.parse::<i64>()
                    .map_err(|_| CommandError::InvalidArgument(format!("'{s}' is not an integer")))
            }
            Frame::Simple(s) => s
                .parse::<i64>()
                .map_err(|_| CommandError::InvalidArgument(format!("'{s}' is not an integer"))),
            _ => Err(CommandError::InvalidArgument("expected integer".into())),
        }
    }

    /// Retorna o próximo elemento como f64 (timeouts em segundos).
    pub fn next_float(&mut self) -> Result<f64, CommandError> {
        let s = self.next_string()?;
        match s.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(CommandError::InvalidArgument(format!("'{s}' is not a number"))),
        }
    }

    /// Consome todos os argumentos restantes como Bytes.
    pub fn rest_bytes(&mut self) -> Result<Vec<Bytes>, CommandError> {
        let mut values = Vec::with_capacity(self.remaining());
        while self.has_remaining() {
            values.push(self.next_bytes()?);
        }
        Ok(values)
    }

    /// Verifica se todos os argumentos foram consumidos.
    pub fn finish(&self) -> Result<(), CommandError> {
        if self.has_remaining() {
            Err(self.wrong_arity())
        } else {
            Ok(())
        }
    }

    /// Verifica se ainda há argumentos restantes.
    pub fn has_remaining(&self) -> bool {
        self.pos < self.parts.len()
    }

    /// Retorna o número de argumentos restantes.
    pub fn remaining(&self) -> usize {
        self.parts.len() - self.pos
    }

    pub fn wrong_arity(&self) -> CommandError {
        CommandError::WrongArity(self.command.clone())
    }

    fn next(&mut self) -> Result<Frame, CommandError> {
        if self.pos >= self.parts.len() {
            return Err(self.wrong_arity());
        }
        let frame = std::mem::replace(&mut self.parts[self.pos], Frame::Null);
        self.pos += 1;
        Ok(frame)
    }
}
