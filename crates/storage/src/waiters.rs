use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

/// Identificador de um waiter, único dentro de um `Db`.
pub(crate) type WaiterId = u64;

/// Um BLPOP bloqueado: slot de capacidade 1 para receber o valor.
#[derive(Debug)]
struct Waiter {
    id: WaiterId,
    tx: oneshot::Sender<Bytes>,
}

/// Filas FIFO de waiters por chave.
///
/// Só é acessado com o lock do `Db` adquirido. A entrega nunca bloqueia:
/// `oneshot::Sender::send` apenas preenche o slot.
#[derive(Debug, Default)]
pub(crate) struct Waiters {
    queues: HashMap<String, VecDeque<Waiter>>,
    next_id: WaiterId,
}

impl Waiters {
    /// Registra um waiter no fim da fila da chave.
    pub(crate) fn register(&mut self, key: &str) -> (WaiterId, oneshot::Receiver<Bytes>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        self.queues
            .entry(key.to_string())
            .or_default()
            .push_back(Waiter { id, tx });
        (id, rx)
    }

    /// Entrega o valor ao waiter mais antigo da chave, retirando-o da fila.
    /// Retorna o valor de volta se nenhum waiter vivo o aceitou.
    pub(crate) fn deliver(&mut self, key: &str, mut value: Bytes) -> Option<Bytes> {
        let Some(queue) = self.queues.get_mut(key) else {
            return Some(value);
        };
        let mut undelivered = None;

        loop {
            let Some(waiter) = queue.pop_front() else {
                undelivered = Some(value);
                break;
            };
            // Receiver descartado: tenta o próximo da fila
            match waiter.tx.send(value) {
                Ok(()) => break,
                Err(returned) => value = returned,
            }
        }

        if queue.is_empty() {
            self.queues.remove(key);
        }
        undelivered
    }

    /// Remove um waiter se ele ainda estiver na fila.
    /// Retorna false se ele já foi retirado por uma entrega.
    pub(crate) fn remove(&mut self, key: &str, id: WaiterId) -> bool {
        let Some(queue) = self.queues.get_mut(key) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|w| w.id == id) else {
            return false;
        };
        queue.remove(pos);
        if queue.is_empty() {
            self.queues.remove(key);
        }
        true
    }

    /// Número de waiters na fila da chave.
    pub(crate) fn len(&self, key: &str) -> usize {
        self.queues.get(key).map_or(0, VecDeque::len)
    }
}
