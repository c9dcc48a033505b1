//! Scripted in-memory chain
//!
//! Drives the coordinator and anything built on it without network I/O.
//! Enabled for dependents through the `test-util` feature.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Semaphore;

use oracle_core::{ChainError, ChainResult, FeeBid, PriceSample, PublishedPrice};

use crate::chain::{ChainClient, Receipt, TxHandle};

/// Broadcast recorded by the scripted chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub value: U256,
    pub decimals: u8,
    pub fee: FeeBid,
    pub nonce: u64,
}

/// `ChainClient` whose responses are scripted by the test.
///
/// Confirming a broadcast writes its value to the published price, so a
/// confirmed update reads back on the next `get_price`.
pub struct ScriptedChain {
    price: Mutex<PublishedPrice>,
    balance: U256,
    owner: Address,
    /// Results handed out by `submit_update`, in order. Empty means accept.
    submit_results: Mutex<VecDeque<ChainResult<()>>>,
    price_failures: Mutex<VecDeque<ChainError>>,
    nonce: AtomicU64,
    nonce_fetches: AtomicUsize,
    submissions: Mutex<Vec<RecordedSubmission>>,
    /// When set, confirmations wait for a permit
    gate: Option<Semaphore>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fee_estimate: Mutex<Option<FeeBid>>,
}

impl ScriptedChain {
    pub fn new(published: u64, decimals: u8) -> Self {
        Self {
            price: Mutex::new(PublishedPrice::new(U256::from(published), decimals)),
            balance: U256::from(10u64).pow(U256::from(18u8)),
            owner: Address::repeat_byte(0x22),
            submit_results: Mutex::new(VecDeque::new()),
            price_failures: Mutex::new(VecDeque::new()),
            nonce: AtomicU64::new(0),
            nonce_fetches: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            gate: None,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            fee_estimate: Mutex::new(None),
        }
    }

    pub fn with_balance(mut self, balance: U256) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_owner(mut self, owner: Address) -> Self {
        self.owner = owner;
        self
    }

    /// Hold every confirmation until `release` is called
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn script_submit(&self, results: impl IntoIterator<Item = ChainResult<()>>) {
        self.submit_results.lock().extend(results);
    }

    pub fn fail_price_read(&self, error: ChainError) {
        self.price_failures.lock().push_back(error);
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.nonce.store(nonce, Ordering::SeqCst);
    }

    pub fn set_fee_estimate(&self, bid: FeeBid) {
        *self.fee_estimate.lock() = Some(bid);
    }

    pub fn published(&self) -> PublishedPrice {
        self.price.lock().clone()
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.lock().clone()
    }

    pub fn nonce_fetches(&self) -> usize {
        self.nonce_fetches.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

fn hash_for(index: usize) -> B256 {
    B256::with_last_byte(index as u8 + 1)
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn get_price(&self) -> ChainResult<PublishedPrice> {
        if let Some(error) = self.price_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.price.lock().clone())
    }

    async fn submit_update(
        &self,
        candidate: &PriceSample,
        fee: &FeeBid,
        nonce: u64,
    ) -> ChainResult<TxHandle> {
        let index = {
            let mut submissions = self.submissions.lock();
            submissions.push(RecordedSubmission {
                value: candidate.value,
                decimals: candidate.decimals,
                fee: *fee,
                nonce,
            });
            submissions.len() - 1
        };

        if let Some(Err(error)) = self.submit_results.lock().pop_front() {
            return Err(error);
        }

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(TxHandle {
            hash: hash_for(index),
            nonce,
            fee: *fee,
        })
    }

    async fn wait_for_confirmation(&self, handle: &TxHandle) -> ChainResult<Receipt> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.nonce.fetch_max(handle.nonce + 1, Ordering::SeqCst);

        let index = handle.hash[31] as usize - 1;
        if let Some(mined) = self.submissions.lock().get(index) {
            *self.price.lock() = PublishedPrice::new(mined.value, mined.decimals);
        }

        Ok(Receipt {
            tx_hash: handle.hash,
            block_number: 100 + handle.nonce,
            gas_used: Some(30_000),
        })
    }

    async fn latest_nonce(&self, _address: Address) -> ChainResult<u64> {
        self.nonce_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.nonce.load(Ordering::SeqCst))
    }

    async fn fee_estimate(&self) -> ChainResult<FeeBid> {
        (*self.fee_estimate.lock())
            .ok_or_else(|| ChainError::Other("no fee estimate scripted".to_string()))
    }

    async fn balance(&self, _address: Address) -> ChainResult<U256> {
        Ok(self.balance)
    }

    async fn owner(&self) -> ChainResult<Address> {
        Ok(self.owner)
    }

    async fn chain_id(&self) -> ChainResult<u64> {
        Ok(31337)
    }
}
