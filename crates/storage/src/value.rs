use bytes::Bytes;
use std::collections::VecDeque;

/// Tipo do valor armazenado. Uma chave guarda exatamente uma variante.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
}

impl Value {
    /// Nome do tipo como reportado pelo comando TYPE.
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
        }
    }
}
