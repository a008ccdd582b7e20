use bytes::Bytes;
use num_traits::CheckedAdd;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ops::Deref;
use std::str::{self, FromStr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error as ThisError;
use tokio::sync::{oneshot, Notify};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

use crate::replication::Role;

#[derive(Debug, ThisError, PartialEq)]
pub enum StoreError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("ERR value is not an integer or out of range")]
    NotInteger,
}

/// The Store is responsible for managing key-value pairs, with optional time-to-live settings for
/// each key. Expired keys are removed lazily when they are next accessed, and a background task
/// removes them when their TTLs elapse. The store also keeps, per key, the queue of clients
/// blocked waiting for a list element.
///
/// The store is designed to be thread-safe, allowing it to be shared and cloned cheaply using
/// reference counting.
#[derive(Clone)]
pub struct Store {
    inner: Arc<InnerStore>,
}

impl Store {
    pub fn new() -> Store {
        Store::with_role(Role::master())
    }

    pub fn with_role(role: Role) -> Store {
        let state = State {
            keys: HashMap::new(),
            ttls: BTreeSet::new(),
            waiters: HashMap::new(),
            next_waiter_id: 0,
        };

        let waker = Notify::new();
        let inner = Arc::new(InnerStore {
            state: Mutex::new(state),
            waker,
            role,
        });

        tokio::spawn({
            let inner = inner.clone();
            async move { remove_expired_keys(inner).await }
        });

        Self { inner }
    }

    /// Pops the first element of the list at `key`, waiting for one to be pushed if the list is
    /// empty. `None` as timeout waits forever.
    ///
    /// Exactly one of two things happens: the element is handed over by a push and returned, or
    /// the timeout elapses and the waiter is removed before `Ok(None)` is returned.
    pub async fn blocking_pop(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>, StoreError> {
        let (id, receiver) = {
            let mut store = self.lock();
            if let Some(value) = store.lpop(key, 1)?.pop() {
                return Ok(Some(value));
            }
            store.register_waiter(key)
        };

        let pending = PendingPop {
            store: &self.inner,
            key,
            id,
            receiver,
            settled: false,
        };

        Ok(pending.wait(timeout).await)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InnerStore {
    state: Mutex<State>,
    waker: Notify,
    role: Role,
}

pub struct InnerStoreLocked<'a> {
    state: MutexGuard<'a, State>,
    waker: &'a Notify,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Side {
    Left,
    Right,
}

impl<'a> InnerStoreLocked<'a> {
    pub fn set(&mut self, key: String, data: Bytes) {
        let value = Value {
            data: Data::String(data),
            expires_at: None,
        };
        self.state.keys.insert(key, value);
    }

    pub fn set_with_ttl(&mut self, key: Key, data: Bytes, ttl: Duration) {
        // A TTL too far in the future to be represented never expires in practice.
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            return self.set(key, data);
        };

        let value = Value {
            data: Data::String(data),
            expires_at: Some(expires_at),
        };

        self.state.keys.insert(key.clone(), value);
        self.state.ttls.insert((expires_at, key.clone()));

        let next_to_expire = self.state.ttls.iter().next().map(|(_, key)| key);
        let expires_next = next_to_expire == Some(&key);
        if expires_next {
            self.waker.notify_one();
        }
    }

    /// Returns the string stored at `key`.
    pub fn get(&mut self, key: &str) -> Result<Option<Bytes>, StoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(Value {
                data: Data::String(data),
                ..
            }) => Ok(Some(data.clone())),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    pub fn type_of(&mut self, key: &str) -> Option<&'static str> {
        self.live(key).map(|value| value.data.type_name())
    }

    pub fn exists(&mut self, key: &str) -> bool {
        self.live(key).is_some()
    }

    /// Number of stored keys, including expired ones that were not removed yet.
    pub fn size(&self) -> usize {
        self.state.keys.len()
    }

    pub fn incr_by<T>(&mut self, key: &str, increment: T) -> Result<T, StoreError>
    where
        T: FromStr + ToString + CheckedAdd + Default,
    {
        let current = match self.live(key) {
            None => T::default(),
            Some(Value {
                data: Data::String(data),
                ..
            }) => parse_integer::<T>(data)?,
            Some(_) => return Err(StoreError::WrongType),
        };

        let value = current
            .checked_add(&increment)
            .ok_or(StoreError::NotInteger)?;
        let data = Data::String(value.to_string().into());

        // Incrementing keeps the TTL of the key.
        match self.live(key) {
            Some(existing) => existing.data = data,
            None => {
                self.state.keys.insert(
                    key.to_string(),
                    Value {
                        data,
                        expires_at: None,
                    },
                );
            }
        }

        Ok(value)
    }

    /// Pushes `values` to the list at `key`, creating it if needed, then hands elements from
    /// the head of the list to blocked clients in the order they started waiting.
    ///
    /// Returns the length of the list right after the push, counting the elements that were
    /// handed over to waiters.
    pub fn push(&mut self, key: &str, values: Vec<Bytes>, side: Side) -> Result<usize, StoreError> {
        let State { keys, waiters, .. } = &mut *self.state;

        match live_entry(keys, key) {
            Some(Value {
                data: Data::List(_),
                ..
            })
            | None => {}
            Some(_) => return Err(StoreError::WrongType),
        }

        let value = keys
            .entry(key.to_string())
            .or_insert_with(Value::empty_list);
        let Data::List(list) = &mut value.data else {
            return Err(StoreError::WrongType);
        };

        match side {
            Side::Left => values.into_iter().for_each(|value| list.push_front(value)),
            Side::Right => list.extend(values),
        }
        let length = list.len();

        let served = serve_waiters(key, list, waiters);
        if served > 0 {
            debug!(key, served, "handed pushed elements to blocked clients");
        }

        if list.is_empty() {
            keys.remove(key);
        }

        Ok(length)
    }

    pub fn lrange(&mut self, key: &str, start: i64, end: i64) -> Result<Vec<Bytes>, StoreError> {
        let list = match self.live(key) {
            None => return Ok(Vec::new()),
            Some(Value {
                data: Data::List(list),
                ..
            }) => list,
            Some(_) => return Err(StoreError::WrongType),
        };

        let len = list.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let end = if end < 0 { len + end } else { end.min(len - 1) };

        if start >= len || start > end {
            return Ok(Vec::new());
        }

        Ok(list
            .range(start as usize..=end as usize)
            .cloned()
            .collect())
    }

    /// Length of the list at `key`. Keys that do not hold a list have length 0.
    pub fn llen(&mut self, key: &str) -> usize {
        match self.live(key) {
            Some(Value {
                data: Data::List(list),
                ..
            }) => list.len(),
            _ => 0,
        }
    }

    pub fn lpop(&mut self, key: &str, count: usize) -> Result<Vec<Bytes>, StoreError> {
        let list = match self.live(key) {
            None => return Ok(Vec::new()),
            Some(Value {
                data: Data::List(list),
                ..
            }) => list,
            Some(_) => return Err(StoreError::WrongType),
        };

        let count = count.min(list.len());
        let popped = list.drain(..count).collect();

        if list.is_empty() {
            self.state.keys.remove(key);
        }

        Ok(popped)
    }

    /// Number of clients blocked on `key`.
    pub fn waiting(&self, key: &str) -> usize {
        self.state.waiters.get(key).map_or(0, VecDeque::len)
    }

    fn register_waiter(&mut self, key: &str) -> (u64, oneshot::Receiver<Bytes>) {
        let (sender, receiver) = oneshot::channel();
        let id = self.state.next_waiter_id;
        self.state.next_waiter_id += 1;

        self.state
            .waiters
            .entry(key.to_string())
            .or_default()
            .push_back(Waiter { id, sender });

        (id, receiver)
    }

    fn remove_waiter(&mut self, key: &str, id: u64) {
        if let Some(queue) = self.state.waiters.get_mut(key) {
            queue.retain(|waiter| waiter.id != id);
            if queue.is_empty() {
                self.state.waiters.remove(key);
            }
        }
    }

    /// Puts back an element that was handed to a client which went away before reading it.
    fn give_back(&mut self, key: &str, value: Bytes) {
        if self.push(key, vec![value], Side::Left).is_err() {
            debug!(key, "dropping element of an abandoned pop, key no longer holds a list");
        }
    }

    pub fn remove_expired_keys(&mut self) -> Option<Instant> {
        let now = Instant::now();

        let expired_keys: Vec<(Instant, String)> = self
            .state
            .ttls
            .iter()
            .take_while(|(expires_at, _)| expires_at <= &now)
            .cloned()
            .collect();

        for (when, key) in expired_keys {
            // The key may have been overwritten since this TTL was recorded.
            let still_expiring = self
                .state
                .keys
                .get(&key)
                .is_some_and(|value| value.expires_at == Some(when));
            if still_expiring {
                self.state.keys.remove(&key);
            }
            self.state.ttls.remove(&(when, key));
        }

        self.state
            .ttls
            .iter()
            .next()
            .map(|&(expires_at, _)| expires_at)
    }

    fn live(&mut self, key: &str) -> Option<&mut Value> {
        live_entry(&mut self.state.keys, key)
    }
}

impl Deref for Store {
    type Target = InnerStore;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl InnerStore {
    pub fn lock(&self) -> InnerStoreLocked<'_> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        InnerStoreLocked {
            state,
            waker: &self.waker,
        }
    }

    pub fn role(&self) -> &Role {
        &self.role
    }
}

type Key = String;

#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    String(Bytes),
    List(VecDeque<Bytes>),
}

impl Data {
    pub fn type_name(&self) -> &'static str {
        match self {
            Data::String(_) => "string",
            Data::List(_) => "list",
        }
    }
}

pub struct Value {
    pub data: Data,
    pub expires_at: Option<Instant>,
}

impl Value {
    fn empty_list() -> Value {
        Value {
            data: Data::List(VecDeque::new()),
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

struct Waiter {
    id: u64,
    sender: oneshot::Sender<Bytes>,
}

pub struct State {
    keys: HashMap<Key, Value>,
    ttls: BTreeSet<(Instant, Key)>,
    waiters: HashMap<Key, VecDeque<Waiter>>,
    next_waiter_id: u64,
}

/// Looks `key` up, deleting it first if it has expired.
fn live_entry<'a>(keys: &'a mut HashMap<Key, Value>, key: &str) -> Option<&'a mut Value> {
    let expired = keys
        .get(key)
        .is_some_and(|value| value.is_expired(Instant::now()));
    if expired {
        keys.remove(key);
        return None;
    }
    keys.get_mut(key)
}

fn parse_integer<T: FromStr>(data: &[u8]) -> Result<T, StoreError> {
    str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .ok_or(StoreError::NotInteger)
}

/// Hands elements from the head of `list` to the clients waiting on `key`, oldest first.
fn serve_waiters(
    key: &str,
    list: &mut VecDeque<Bytes>,
    waiters: &mut HashMap<Key, VecDeque<Waiter>>,
) -> usize {
    let Some(queue) = waiters.get_mut(key) else {
        return 0;
    };

    let mut served = 0;
    while let Some(value) = list.pop_front() {
        let Some(waiter) = queue.pop_front() else {
            list.push_front(value);
            break;
        };
        match waiter.sender.send(value) {
            Ok(()) => served += 1,
            // The waiting client is gone, the element goes to the next one.
            Err(value) => list.push_front(value),
        }
    }

    if queue.is_empty() {
        waiters.remove(key);
    }

    served
}

/// A blocked pop registered in the store. Dropping it before it settled (e.g. because the
/// connection closed) unregisters it and puts back any element already handed to it.
struct PendingPop<'a> {
    store: &'a InnerStore,
    key: &'a str,
    id: u64,
    receiver: oneshot::Receiver<Bytes>,
    settled: bool,
}

impl PendingPop<'_> {
    async fn wait(mut self, timeout: Option<Duration>) -> Option<Bytes> {
        let received = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, &mut self.receiver)
                .await
                .ok(),
            None => Some((&mut self.receiver).await),
        };

        match received {
            Some(Ok(value)) => {
                self.settled = true;
                Some(value)
            }
            _ => self.cancel(),
        }
    }

    fn cancel(&mut self) -> Option<Bytes> {
        let mut store = self.store.lock();
        store.remove_waiter(self.key, self.id);
        self.settled = true;

        // Pushes hand elements over while holding the lock, so after closing the receiver here
        // it either holds the element of a push that won the race, or nothing at all.
        self.receiver.close();
        self.receiver.try_recv().ok()
    }
}

impl Drop for PendingPop<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let mut store = self.store.lock();
        store.remove_waiter(self.key, self.id);
        self.receiver.close();
        if let Ok(value) = self.receiver.try_recv() {
            store.give_back(self.key, value);
        }
    }
}

async fn remove_expired_keys(store: Arc<InnerStore>) {
    loop {
        let next_expiration = store.lock().remove_expired_keys();

        if let Some(next_expiration) = next_expiration {
            tokio::select! {
                _ = sleep_until(next_expiration) => {}
                _ = store.waker.notified() => {}
            }
        } else {
            store.waker.notified().await;
        }
    }
}
