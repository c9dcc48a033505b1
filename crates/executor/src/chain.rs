//! Chain access boundary used by the coordinator

use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use oracle_core::{ChainResult, FeeBid, PriceSample, PublishedPrice, TxHash};

/// Broadcast transaction awaiting confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: TxHash,
    pub nonce: u64,
    pub fee: FeeBid,
}

/// Confirmed, successful transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: Option<u64>,
}

/// Operations the bot needs from the chain.
///
/// Failures are tagged with a `ChainError` variant so the retry policy
/// can act on them without inspecting messages.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Currently published oracle price
    async fn get_price(&self) -> ChainResult<PublishedPrice>;

    /// Broadcast an `updatePrice` transaction
    async fn submit_update(
        &self,
        candidate: &PriceSample,
        fee: &FeeBid,
        nonce: u64,
    ) -> ChainResult<TxHandle>;

    /// Suspend until the transaction is mined. Reverts are errors.
    async fn wait_for_confirmation(&self, handle: &TxHandle) -> ChainResult<Receipt>;

    async fn latest_nonce(&self, address: Address) -> ChainResult<u64>;

    /// Node's current fee suggestion
    async fn fee_estimate(&self) -> ChainResult<FeeBid>;

    async fn balance(&self, address: Address) -> ChainResult<U256>;

    /// Owner of the oracle contract
    async fn owner(&self) -> ChainResult<Address>;

    async fn chain_id(&self) -> ChainResult<u64>;
}
