//! In-process transaction signing
//!
//! Update transactions are signed with the bot key and handed to the node
//! as raw EIP-2718 bytes, so any hosted endpoint can relay them.

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_signer_local::PrivateKeySigner;
use std::fmt;

use oracle_core::{ChainError, ChainResult, FeeBid};

use crate::builder::UpdateTransaction;

/// Signs update transactions with the bot wallet key
#[derive(Clone)]
pub struct LocalTxSigner {
    signer: PrivateKeySigner,
}

impl LocalTxSigner {
    /// Parse a hex private key, with or without `0x`
    pub fn from_hex(key: &str) -> ChainResult<Self> {
        let signer = key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| ChainError::Other(format!("invalid private key: {}", e)))?;
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign `tx` for `chain_id` and return the raw transaction bytes
    pub fn sign(&self, tx: &UpdateTransaction, chain_id: u64) -> ChainResult<Bytes> {
        let envelope = match tx.fee {
            FeeBid::Legacy { gas_price } => {
                let mut unsigned = TxLegacy {
                    chain_id: Some(chain_id),
                    nonce: tx.nonce,
                    gas_price: per_gas(gas_price, "gas price")?,
                    gas_limit: tx.gas_limit.into(),
                    to: TxKind::Call(tx.to),
                    input: tx.data.clone(),
                    ..Default::default()
                };
                let signature = self
                    .signer
                    .sign_transaction_sync(&mut unsigned)
                    .map_err(|e| ChainError::Other(format!("signing failed: {}", e)))?;
                TxEnvelope::from(unsigned.into_signed(signature))
            }
            FeeBid::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let mut unsigned = TxEip1559 {
                    chain_id,
                    nonce: tx.nonce,
                    gas_limit: tx.gas_limit.into(),
                    max_fee_per_gas: per_gas(max_fee_per_gas, "max fee")?,
                    max_priority_fee_per_gas: per_gas(max_priority_fee_per_gas, "priority fee")?,
                    to: TxKind::Call(tx.to),
                    input: tx.data.clone(),
                    ..Default::default()
                };
                let signature = self
                    .signer
                    .sign_transaction_sync(&mut unsigned)
                    .map_err(|e| ChainError::Other(format!("signing failed: {}", e)))?;
                TxEnvelope::from(unsigned.into_signed(signature))
            }
        };

        let mut raw = Vec::new();
        envelope.encode_2718(&mut raw);
        Ok(Bytes::from(raw))
    }
}

fn per_gas(value: U256, what: &str) -> ChainResult<u128> {
    u128::try_from(value).map_err(|_| ChainError::Other(format!("{} {} does not fit in 128 bits", what, value)))
}

impl fmt::Debug for LocalTxSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTxSigner")
            .field("address", &self.address())
            .finish()
    }
}
