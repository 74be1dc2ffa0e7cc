//! In-memory capability implementations used by the test suites of the daemon crates.

use crate::{
    ChainClient, ChainError, EventSource, NewBlockHeader, ShareSource, ShareSourceError, TxEvent,
};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::{BoxStream, StreamExt};
use keyshare_types::{ActivePubKeys, KeyShare, Message, TxHash, TxResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct MockShareSource {
    share: Mutex<KeyShare>,
    last_share: Mutex<Option<KeyShare>>,
    master_public_key: String,
    failing: AtomicBool,
    get_share_calls: AtomicUsize,
    setup_calls: Mutex<Vec<(u64, u64, Vec<String>)>>,
}

impl MockShareSource {
    pub fn new(share: KeyShare) -> Self {
        Self {
            share: Mutex::new(share),
            last_share: Mutex::new(None),
            // base64 of [0xde, 0xad, 0xbe, 0xef]
            master_public_key: "3q2+7w==".to_string(),
            failing: AtomicBool::new(false),
            get_share_calls: AtomicUsize::new(0),
            setup_calls: Mutex::new(vec![]),
        }
    }

    pub fn with_last_share(self, share: KeyShare) -> Self {
        *self.last_share.lock() = Some(share);
        self
    }

    /// Replace the share returned for the latest epoch.
    pub fn set_share(&self, share: KeyShare) {
        *self.share.lock() = share;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get_share_calls(&self) -> usize {
        self.get_share_calls.load(Ordering::SeqCst)
    }

    pub fn setup_calls(&self) -> Vec<(u64, u64, Vec<String>)> {
        self.setup_calls.lock().clone()
    }

    fn check_failing(&self) -> Result<(), ShareSourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ShareSourceError::Request("share service unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ShareSource for MockShareSource {
    async fn get_share(&self, _nonce: &str) -> Result<KeyShare, ShareSourceError> {
        self.get_share_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        Ok(self.share.lock().clone())
    }

    async fn get_last_share(&self, _nonce: &str) -> Result<Option<KeyShare>, ShareSourceError> {
        self.check_failing()?;
        Ok(self.last_share.lock().clone())
    }

    async fn get_master_public_key(&self) -> Result<String, ShareSourceError> {
        self.check_failing()?;
        Ok(self.master_public_key.clone())
    }

    async fn setup(
        &self,
        total_validators: u64,
        threshold: u64,
        public_keys: Vec<String>,
    ) -> Result<String, ShareSourceError> {
        self.check_failing()?;
        self.setup_calls
            .lock()
            .push((total_validators, threshold, public_keys));
        Ok(self.master_public_key.clone())
    }
}

pub struct MockChainClient {
    address: String,
    balance: u128,
    pub_keys: Mutex<ActivePubKeys>,
    messages: Mutex<Vec<Message>>,
    failing_heights: Mutex<HashSet<u64>>,
    register_error: Mutex<Option<String>>,
    result_code: AtomicU32,
    never_confirm: AtomicBool,
    confirmed: AtomicUsize,
}

impl MockChainClient {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            balance: 1_000_000,
            pub_keys: Mutex::new(ActivePubKeys::default()),
            messages: Mutex::new(vec![]),
            failing_heights: Mutex::new(HashSet::new()),
            register_error: Mutex::new(None),
            result_code: AtomicU32::new(0),
            never_confirm: AtomicBool::new(false),
            confirmed: AtomicUsize::new(0),
        }
    }

    pub fn with_pub_keys(self, pub_keys: ActivePubKeys) -> Self {
        *self.pub_keys.lock() = pub_keys;
        self
    }

    /// Broadcasting a keyshare for `height` fails.
    pub fn fail_height(&self, height: u64) {
        self.failing_heights.lock().insert(height);
    }

    pub fn set_register_error(&self, error: &str) {
        *self.register_error.lock() = Some(error.to_string());
    }

    pub fn set_result_code(&self, code: u32) {
        self.result_code.store(code, Ordering::SeqCst);
    }

    /// Transactions are broadcast but never show up as included.
    pub fn set_never_confirm(&self, never_confirm: bool) {
        self.never_confirm.store(never_confirm, Ordering::SeqCst);
    }

    /// Every message that was accepted for broadcast.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Heights for which a keyshare was broadcast successfully, in broadcast order.
    pub fn submitted_heights(&self) -> Vec<u64> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                Message::SendKeyshare { block_height, .. } => Some(*block_height),
                _ => None,
            })
            .collect()
    }

    pub fn confirmed(&self) -> usize {
        self.confirmed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn balance(&self, _denom: &str) -> Result<u128, ChainError> {
        Ok(self.balance)
    }

    async fn active_pub_key(&self) -> Result<ActivePubKeys, ChainError> {
        Ok(self.pub_keys.lock().clone())
    }

    async fn broadcast_tx(
        &self,
        message: Message,
        _wait_for_inclusion: bool,
    ) -> Result<TxHash, ChainError> {
        match &message {
            Message::SendKeyshare { block_height, .. }
                if self.failing_heights.lock().contains(block_height) =>
            {
                return Err(ChainError::BroadcastError(format!(
                    "injected failure at height {block_height}"
                )));
            }
            Message::RegisterValidator { .. } => {
                if let Some(error) = self.register_error.lock().clone() {
                    return Err(ChainError::BroadcastError(error));
                }
            }
            _ => {}
        }
        let mut messages = self.messages.lock();
        messages.push(message);
        Ok(TxHash(format!("{:064x}", messages.len())))
    }

    async fn wait_for_tx(
        &self,
        _tx_hash: &TxHash,
        _poll_interval: Duration,
    ) -> Result<TxResult, ChainError> {
        if self.never_confirm.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let code = self.result_code.load(Ordering::SeqCst);
        if code == 0 {
            self.confirmed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(TxResult {
            code,
            raw_log: if code == 0 {
                String::new()
            } else {
                "keyshare rejected".to_string()
            },
        })
    }
}

type Subscriber<T> = Arc<Mutex<Option<UnboundedSender<T>>>>;

/// Publishes events to whoever is subscribed to the paired [`MockEventSource`]. Like a live
/// subscription, events published while nobody is subscribed are lost.
#[derive(Clone)]
pub struct MockEventSender {
    blocks: Subscriber<NewBlockHeader>,
    txs: Subscriber<TxEvent>,
}

impl MockEventSender {
    pub fn new_block(&self, height: u64) {
        publish(&self.blocks, NewBlockHeader { height });
    }

    pub fn tx(&self, event: TxEvent) {
        publish(&self.txs, event);
    }
}

fn publish<T>(subscriber: &Subscriber<T>, event: T) {
    if let Some(tx) = subscriber.lock().as_ref() {
        let _ = tx.unbounded_send(event);
    }
}

fn subscribe<T: Send + 'static>(
    subscriber: &Subscriber<T>,
) -> Result<BoxStream<'static, T>, ChainError> {
    let mut subscriber = subscriber.lock();
    if subscriber.is_some() {
        return Err(ChainError::SubscriptionError("already subscribed".into()));
    }
    let (tx, rx) = unbounded();
    *subscriber = Some(tx);
    Ok(rx.boxed())
}

/// Event source whose streams can each be subscribed to once.
pub struct MockEventSource {
    blocks: Subscriber<NewBlockHeader>,
    txs: Subscriber<TxEvent>,
}

impl MockEventSource {
    pub fn new() -> (Self, MockEventSender) {
        let blocks: Subscriber<NewBlockHeader> = Arc::default();
        let txs: Subscriber<TxEvent> = Arc::default();
        (
            Self {
                blocks: blocks.clone(),
                txs: txs.clone(),
            },
            MockEventSender { blocks, txs },
        )
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn subscribe_new_blocks(&self) -> Result<BoxStream<'static, NewBlockHeader>, ChainError> {
        subscribe(&self.blocks)
    }

    async fn subscribe_txs(&self) -> Result<BoxStream<'static, TxEvent>, ChainError> {
        subscribe(&self.txs)
    }
}
