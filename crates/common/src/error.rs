/// Erros de framing do protocolo. Todos são fatais para a conexão.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("incomplete frame")]
    Incomplete,
    #[error("stream ended in the middle of a frame")]
    Truncated,
    #[error("invalid frame type byte: {0:#x}")]
    InvalidFrameType(u8),
    #[error("expected bulk string, got byte {0:#x}")]
    ExpectedBulk(u8),
    #[error("invalid integer: {0}")]
    InvalidInteger(String),
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),
    #[error("invalid bulk length: {0}")]
    InvalidBulkLength(i64),
    #[error("bulk string not terminated by CRLF")]
    MissingTerminator,
    #[error("frame exceeds maximum size ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}

/// Erros do engine de armazenamento.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("key not found")]
    KeyNotFound,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("blocking operation cancelled")]
    Cancelled,
}

/// Erros de conexão TCP.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Erros de parsing/validação de comandos.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("wrong number of arguments for '{0}'")]
    WrongArity(String),
    #[error("invalid TTL: {0}")]
    InvalidTtl(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Erro top-level do BrisaDB.
#[derive(Debug, thiserror::Error)]
pub enum BrisaError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Result type alias.
pub type BrisaResult<T> = Result<T, BrisaError>;

// io::Error → BrisaError passa por ConnectionError
impl From<std::io::Error> for BrisaError {
    fn from(e: std::io::Error) -> Self {
        BrisaError::Connection(ConnectionError::Io(e))
    }
}
