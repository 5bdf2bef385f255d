use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};

use brisadb_common::StorageError;

use crate::value::Value;
use crate::waiters::{WaiterId, Waiters};

/// Estado protegido pelo lock único do engine.
#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Value>,
    /// Instante absoluto de expiração; ausência significa "sem TTL".
    expirations: HashMap<String, Instant>,
    waiters: Waiters,
}

/// Lado da lista onde os valores não entregues são inseridos.
#[derive(Debug, Clone, Copy)]
enum End {
    Front,
    Back,
}

/// Handle para o banco de dados in-memory.
///
/// Todas as operações adquirem o mesmo lock exclusivo durante toda a sua
/// execução; apenas `blpop` suspende, e sempre depois de soltá-lo.
#[derive(Clone, Default)]
pub struct Db {
    shared: Arc<Mutex<State>>,
}

impl Db {
    pub fn new() -> Self {
        Self::default()
    }

    // --- String operations ---

    /// Lê uma string. Chave expirada é removida e reportada como ausente.
    pub fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let mut state = self.shared.lock();
        state.evict_if_expired(key);
        match state.entries.get(key) {
            Some(Value::String(data)) => Ok(data.clone()),
            Some(Value::List(_)) => Err(StorageError::WrongType),
            None => Err(StorageError::KeyNotFound),
        }
    }

    /// Substitui o valor da chave por uma string, trocando ou limpando o TTL.
    pub fn set(&self, key: String, value: Bytes, expire: Option<Duration>) {
        let mut state = self.shared.lock();
        match expire {
            Some(ttl) => {
                state.expirations.insert(key.clone(), Instant::now() + ttl);
            }
            None => {
                state.expirations.remove(&key);
            }
        }
        state.entries.insert(key, Value::String(value));
    }

    /// Remove valor e TTL. Retorna se havia valor.
    pub fn del(&self, key: &str) -> bool {
        let mut state = self.shared.lock();
        state.expirations.remove(key);
        state.entries.remove(key).is_some()
    }

    /// "string", "list" ou "none". Não consulta o TTL.
    pub fn key_type(&self, key: &str) -> &'static str {
        let state = self.shared.lock();
        state.entries.get(key).map_or("none", Value::type_name)
    }

    /// Número de chaves armazenadas, incluindo as expiradas ainda não removidas.
    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- List operations ---

    pub fn lpush(&self, key: &str, values: &[Bytes]) -> Result<usize, StorageError> {
        self.push(key, values, End::Front)
    }

    pub fn rpush(&self, key: &str, values: &[Bytes]) -> Result<usize, StorageError> {
        self.push(key, values, End::Back)
    }

    /// Cada valor vai primeiro para o waiter mais antigo da chave; só os
    /// restantes são gravados na lista.
    fn push(&self, key: &str, values: &[Bytes], end: End) -> Result<usize, StorageError> {
        let mut state = self.shared.lock();
        let state = &mut *state;

        if let Some(Value::String(_)) = state.entries.get(key) {
            return Err(StorageError::WrongType);
        }

        let undelivered: Vec<Bytes> = values
            .iter()
            .filter_map(|v| state.waiters.deliver(key, v.clone()))
            .collect();

        if undelivered.is_empty() {
            return match state.entries.get(key) {
                Some(Value::List(list)) => Ok(list.len()),
                _ => Ok(0),
            };
        }

        let entry = state
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::List(VecDeque::new()));
        match entry {
            Value::List(list) => {
                for v in undelivered {
                    match end {
                        End::Front => list.push_front(v),
                        End::Back => list.push_back(v),
                    }
                }
                Ok(list.len())
            }
            Value::String(_) => Err(StorageError::WrongType),
        }
    }

    /// Remove até `count` elementos do início (`count <= 0` vale 1).
    pub fn lpop(&self, key: &str, count: i64) -> Result<Vec<Bytes>, StorageError> {
        self.shared.lock().lpop(key, count)
    }

    /// Intervalo inclusivo com índices negativos contados a partir do fim.
    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Bytes>, StorageError> {
        let mut state = self.shared.lock();
        state.evict_if_expired(key);

        let list = match state.entries.get(key) {
            Some(Value::List(list)) => list,
            Some(Value::String(_)) => return Err(StorageError::WrongType),
            None => return Ok(vec![]),
        };

        let len = list.len() as i64;
        let start = if start < 0 { len + start } else { start }.max(0);
        let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);

        if start > stop || start >= len {
            return Ok(vec![]);
        }

        Ok(list.range(start as usize..=stop as usize).cloned().collect())
    }

    /// Tamanho da lista; 0 se a chave não existe. Não consulta o TTL.
    pub fn llen(&self, key: &str) -> Result<usize, StorageError> {
        let state = self.shared.lock();
        match state.entries.get(key) {
            Some(Value::List(list)) => Ok(list.len()),
            Some(Value::String(_)) => Err(StorageError::WrongType),
            None => Ok(0),
        }
    }

    // --- Blocking pop ---

    /// Pop bloqueante do início da lista.
    ///
    /// Se a lista tem dados, retorna imediatamente. Senão registra um waiter
    /// no fim da fila FIFO da chave e aguarda uma entrega de `lpush`/`rpush`.
    /// Com `timeout`, retorna `StorageError::Cancelled` se ele vencer antes
    /// de uma entrega; um valor entregue durante a corrida com o timeout é
    /// sempre retornado. Se o future for descartado, o waiter é removido e
    /// um valor já entregue volta para a chave.
    pub async fn blpop(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<(String, Bytes), StorageError> {
        let mut pending = {
            let mut state = self.shared.lock();
            if let Some(value) = state.lpop(key, 1)?.pop() {
                return Ok((key.to_string(), value));
            }
            let (id, rx) = state.waiters.register(key);
            PendingPop {
                db: self,
                key,
                id,
                rx,
                settled: false,
            }
        };

        let value = pending.wait(timeout).await?;
        Ok((key.to_string(), value))
    }

    /// Número de waiters bloqueados na chave.
    pub fn waiting(&self, key: &str) -> usize {
        self.shared.lock().waiters.len(key)
    }
}

impl State {
    /// Remove a chave das duas tabelas se o prazo já passou.
    fn evict_if_expired(&mut self, key: &str) {
        if let Some(&deadline) = self.expirations.get(key)
            && Instant::now() >= deadline
        {
            self.expirations.remove(key);
            self.entries.remove(key);
        }
    }

    fn lpop(&mut self, key: &str, count: i64) -> Result<Vec<Bytes>, StorageError> {
        let list = match self.entries.get_mut(key) {
            Some(Value::List(list)) => list,
            Some(Value::String(_)) => return Err(StorageError::WrongType),
            None => return Ok(vec![]),
        };

        let n = if count <= 0 { 1 } else { count as usize }.min(list.len());
        let popped: Vec<Bytes> = list.drain(..n).collect();

        // Lista vazia não fica no store
        if list.is_empty() {
            self.entries.remove(key);
            self.expirations.remove(key);
        }
        Ok(popped)
    }

    /// Devolve um valor que chegou a um BLPOP descartado: vai para o próximo
    /// waiter ou para o início da lista. Se a chave virou string nesse meio
    /// tempo não há onde guardá-lo.
    fn restore(&mut self, key: &str, value: Bytes) {
        let Some(value) = self.waiters.deliver(key, value) else {
            return;
        };
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::List(VecDeque::new()));
        if let Value::List(list) = entry {
            list.push_front(value);
        }
    }
}

/// Um BLPOP registrado aguardando entrega.
struct PendingPop<'a> {
    db: &'a Db,
    key: &'a str,
    id: WaiterId,
    rx: oneshot::Receiver<Bytes>,
    settled: bool,
}

impl PendingPop<'_> {
    async fn wait(&mut self, timeout: Option<Duration>) -> Result<Bytes, StorageError> {
        let received = match timeout {
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, &mut self.rx).await;
                match outcome {
                    Ok(received) => received,
                    Err(_) => return self.cancel(),
                }
            }
            None => (&mut self.rx).await,
        };
        self.settled = true;
        received.map_err(|_| StorageError::Cancelled)
    }

    /// Sai da fila após o timeout. Se o waiter já foi retirado, o produtor
    /// preencheu o slot com o lock adquirido, então o valor já está lá.
    fn cancel(&mut self) -> Result<Bytes, StorageError> {
        let mut state = self.db.shared.lock();
        self.settled = true;
        if state.waiters.remove(self.key, self.id) {
            return Err(StorageError::Cancelled);
        }
        self.rx.try_recv().map_err(|_| StorageError::Cancelled)
    }
}

impl Drop for PendingPop<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.db.shared.lock();
        if state.waiters.remove(self.key, self.id) {
            return;
        }
        if let Ok(value) = self.rx.try_recv() {
            state.restore(self.key, value);
        }
    }
}
