use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;
use brisadb_common::{MAX_FRAME_SIZE, ProtocolError};

/// Prefixo fixo de toda resposta de erro.
const ERROR_PREFIX: &str = "ERROR ";

/// Menor bulk possível no fio: `$0\r\n\r\n`.
const MIN_BULK_SIZE: usize = 6;

/// Representação de um frame do protocolo.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    /// Linha de erro completa, já com o prefixo `ERROR `. Use `Frame::error`.
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    /// Null bulk: `$-1\r\n`.
    Null,
    /// Null array: `*-1\r\n`.
    NullArray,
    Array(Vec<Frame>),
}

impl Frame {
    /// Verifica se um request completo (array de bulk strings) está no buffer.
    /// Retorna Ok(()) se completo, Err(Incomplete) se precisa mais dados e
    /// qualquer outro erro se o framing for inválido.
    pub fn check_request(src: &mut Cursor<&[u8]>) -> Result<(), ProtocolError> {
        let byte = get_u8(src)?;
        if byte != b'*' {
            return Err(ProtocolError::InvalidFrameType(byte));
        }
        let count = get_decimal(src)?;
        if count < 0 {
            return Err(ProtocolError::InvalidArrayLength(count));
        }
        if count as usize > MAX_FRAME_SIZE / MIN_BULK_SIZE {
            let declared = (count as usize).saturating_mul(MIN_BULK_SIZE);
            return Err(ProtocolError::FrameTooLarge(declared));
        }
        for _ in 0..count {
            let byte = get_u8(src)?;
            if byte != b'$' {
                return Err(ProtocolError::ExpectedBulk(byte));
            }
            let len = get_decimal(src)?;
            if len < 0 {
                return Err(ProtocolError::InvalidBulkLength(len));
            }
            skip_bulk_data(src, len as usize)?;
        }
        Ok(())
    }

    /// Verifica se um frame completo de qualquer tipo está disponível no
    /// buffer sem alocar.
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<(), ProtocolError> {
        match get_u8(src)? {
            b'+' | b'-' | b':' => {
                get_line(src)?;
                Ok(())
            }
            b'$' => {
                let len = get_decimal(src)?;
                if len == -1 {
                    return Ok(());
                }
                if len < 0 {
                    return Err(ProtocolError::InvalidBulkLength(len));
                }
                skip_bulk_data(src, len as usize)
            }
            b'*' => {
                let count = get_decimal(src)?;
                if count == -1 {
                    return Ok(());
                }
                if count < 0 {
                    return Err(ProtocolError::InvalidArrayLength(count));
                }
                for _ in 0..count {
                    Frame::check(src)?;
                }
                Ok(())
            }
            byte => Err(ProtocolError::InvalidFrameType(byte)),
        }
    }

    /// Faz o parse de um frame completo a partir do cursor.
    /// Deve ser chamado apenas após `check()` ou `check_request()` retornar Ok.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, ProtocolError> {
        match get_u8(src)? {
            b'+' => {
                let line = get_line(src)?;
                let s = String::from_utf8(line.to_vec())
                    .map_err(|e| ProtocolError::InvalidEncoding(e.to_string()))?;
                Ok(Frame::Simple(s))
            }
            b'-' => {
                let line = get_line(src)?;
                let s = String::from_utf8(line.to_vec())
                    .map_err(|e| ProtocolError::InvalidEncoding(e.to_string()))?;
                Ok(Frame::Error(s))
            }
            b':' => Ok(Frame::Integer(get_decimal(src)?)),
            b'$' => {
                let len = get_decimal(src)?;
                if len == -1 {
                    return Ok(Frame::Null);
                }
                if len < 0 {
                    return Err(ProtocolError::InvalidBulkLength(len));
                }
                let len = len as usize;
                if src.remaining() < len + 2 {
                    return Err(ProtocolError::Incomplete);
                }
                let start = src.position() as usize;
                let data = Bytes::copy_from_slice(&src.get_ref()[start..start + len]);
                src.set_position((start + len + 2) as u64);
                Ok(Frame::Bulk(data))
            }
            b'*' => {
                let count = get_decimal(src)?;
                if count == -1 {
                    return Ok(Frame::NullArray);
                }
                if count < 0 {
                    return Err(ProtocolError::InvalidArrayLength(count));
                }
                let mut frames = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    frames.push(Frame::parse(src)?);
                }
                Ok(Frame::Array(frames))
            }
            byte => Err(ProtocolError::InvalidFrameType(byte)),
        }
    }

    /// Encoda o frame no buffer de saída.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(s) => {
                dst.put_u8(b'+');
                dst.put(s.as_bytes());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Error(s) => {
                dst.put_u8(b'-');
                dst.put(s.as_bytes());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Integer(n) => {
                dst.put_u8(b':');
                dst.put(n.to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Bulk(data) => {
                dst.put_u8(b'$');
                dst.put(data.len().to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
                dst.put(data.as_ref());
                dst.put(&b"\r\n"[..]);
            }
            Frame::Null => dst.put(&b"$-1\r\n"[..]),
            Frame::NullArray => dst.put(&b"*-1\r\n"[..]),
            Frame::Array(frames) => {
                dst.put_u8(b'*');
                dst.put(frames.len().to_string().as_bytes());
                dst.put(&b"\r\n"[..]);
                for frame in frames {
                    frame.encode(dst);
                }
            }
        }
    }

    /// Cria uma resposta de erro `-ERROR <mensagem>`.
    pub fn error(message: impl std::fmt::Display) -> Frame {
        Frame::Error(format!("{ERROR_PREFIX}{message}"))
    }

    /// Mensagem de um `Frame::Error` sem o prefixo `ERROR `.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Frame::Error(line) => Some(line.strip_prefix(ERROR_PREFIX).unwrap_or(line)),
            _ => None,
        }
    }

    /// Helper: cria um Frame::Bulk a partir de &str.
    pub fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::from(s.to_string()))
    }

    /// Helper: cria um Array de Bulk strings a partir de &[&str].
    pub fn array_from_strs(strs: &[&str]) -> Frame {
        Frame::Array(strs.iter().map(|s| Frame::bulk(s)).collect())
    }

    /// Helper: cria um Array de Bulk strings a partir de valores binários.
    pub fn array_from_bytes(items: Vec<Bytes>) -> Frame {
        Frame::Array(items.into_iter().map(Frame::Bulk).collect())
    }
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, ProtocolError> {
    if !src.has_remaining() {
        return Err(ProtocolError::Incomplete);
    }
    Ok(src.get_u8())
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    for i in start..buf.len().saturating_sub(1) {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            src.set_position((i + 2) as u64);
            return Ok(&buf[start..i]);
        }
    }

    Err(ProtocolError::Incomplete)
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, ProtocolError> {
    let line = get_line(src)?;
    let s = std::str::from_utf8(line).map_err(|e| ProtocolError::InvalidInteger(e.to_string()))?;
    s.parse::<i64>()
        .map_err(|_| ProtocolError::InvalidInteger(s.to_string()))
}

/// Pula `len` bytes de dados mais o CRLF final, validando o terminador.
///
/// O limite vale para o frame inteiro: tudo o que já foi consumido mais
/// este bulk.
fn skip_bulk_data(src: &mut Cursor<&[u8]>, len: usize) -> Result<(), ProtocolError> {
    let end = (src.position() as usize).saturating_add(len);
    if end > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(end));
    }
    if src.remaining() < len + 2 {
        return Err(ProtocolError::Incomplete);
    }
    if &src.get_ref()[end..end + 2] != b"\r\n" {
        return Err(ProtocolError::MissingTerminator);
    }
    src.set_position((end + 2) as u64);
    Ok(())
}
