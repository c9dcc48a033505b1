//! JSON-RPC chain client
//!
//! With a wallet key configured, updates are signed in-process and sent
//! through `eth_sendRawTransaction`. Without one they go out through
//! `eth_sendTransaction` and the node signs.

use alloy_primitives::{hex, Address, U256};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use oracle_core::{
    BotConfig, ChainError, ChainResult, FeeBid, FeeMode, PriceSample, PublishedPrice, TxHash,
};

use crate::builder::TransactionBuilder;
use crate::chain::{ChainClient, Receipt, TxHandle};
use crate::signer::LocalTxSigner;

/// JSON-RPC method-not-found
const METHOD_NOT_FOUND: i64 = -32601;

/// Client configuration
#[derive(Clone)]
pub struct RpcClientConfig {
    pub url: String,
    pub contract: Address,
    pub from: Address,
    /// Hex key for in-process signing
    pub private_key: Option<String>,
    /// Chain id for signing; read from the node when unset
    pub chain_id: Option<u64>,
    pub price_decimals: u8,
    pub gas_limit: u64,
    pub fee_mode: FeeMode,
    pub request_timeout: Duration,
    pub confirmation_poll: Duration,
    pub confirmation_timeout: Duration,
}

impl RpcClientConfig {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            url: config.rpc.http_url.clone(),
            contract: config.contract.address,
            from: config.wallet.address,
            private_key: config
                .wallet
                .signs_locally()
                .then(|| config.wallet.private_key.clone())
                .flatten(),
            chain_id: config.rpc.chain_id,
            price_decimals: config.token.decimals,
            gas_limit: config.fees.gas_limit,
            fee_mode: config.fees.mode,
            request_timeout: Duration::from_millis(config.rpc.request_timeout_ms),
            confirmation_poll: Duration::from_millis(config.execution.confirmation_poll_ms),
            confirmation_timeout: Duration::from_millis(config.execution.confirmation_timeout_ms),
        }
    }
}

impl std::fmt::Debug for RpcClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClientConfig")
            .field("url", &self.url)
            .field("contract", &self.contract)
            .field("from", &self.from)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("chain_id", &self.chain_id)
            .field("fee_mode", &self.fee_mode)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
    gas_used: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    base_fee_per_gas: Option<String>,
}

/// Map a JSON-RPC error object onto a tagged chain error
fn classify_rpc_error(method: &str, error: RpcErrorObject) -> ChainError {
    let fee_method = matches!(method, "eth_maxPriorityFeePerGas" | "eth_feeHistory");
    if error.code == METHOD_NOT_FOUND && fee_method {
        return ChainError::UnsupportedFeeField(format!("{}: {}", method, error.message));
    }

    let message = match error.data {
        Some(Value::String(data)) => format!("{} ({})", error.message, data),
        _ => error.message,
    };
    ChainError::classify(message)
}

fn strip_hex(text: &str) -> &str {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
}

pub(crate) fn parse_quantity(text: &str) -> ChainResult<U256> {
    let digits = strip_hex(text);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Other(format!("invalid quantity {:?}: {}", text, e)))
}

pub(crate) fn parse_quantity_u64(text: &str) -> ChainResult<u64> {
    let digits = strip_hex(text);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Other(format!("invalid quantity {:?}: {}", text, e)))
}

fn parse_data(text: &str) -> ChainResult<Vec<u8>> {
    hex::decode(text).map_err(|e| ChainError::Other(format!("invalid hex data: {}", e)))
}

fn parse_hash(text: &str) -> ChainResult<TxHash> {
    text.parse::<TxHash>()
        .map_err(|e| ChainError::Other(format!("invalid transaction hash {:?}: {}", text, e)))
}

/// Chain client speaking plain Ethereum JSON-RPC over HTTP
pub struct JsonRpcChainClient {
    http: reqwest::Client,
    config: RpcClientConfig,
    builder: TransactionBuilder,
    signer: Option<LocalTxSigner>,
    signing_chain_id: OnceCell<u64>,
    next_id: AtomicU64,
}

impl JsonRpcChainClient {
    pub fn new(config: RpcClientConfig) -> ChainResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChainError::Other(format!("failed to build HTTP client: {}", e)))?;

        let builder = TransactionBuilder::new(config.contract, config.from, config.gas_limit);

        let signer = match config.private_key.as_deref() {
            Some(key) => {
                let signer = LocalTxSigner::from_hex(key)?;
                if signer.address() != config.from {
                    return Err(ChainError::Other(format!(
                        "private key belongs to {}, not the configured wallet {}",
                        signer.address(),
                        config.from
                    )));
                }
                info!("Signing transactions locally as {}", signer.address());
                Some(signer)
            }
            None => {
                info!("No wallet key configured, the node signs transactions");
                None
            }
        };

        let signing_chain_id = match config.chain_id {
            Some(id) => OnceCell::new_with(Some(id)),
            None => OnceCell::new(),
        };

        Ok(Self {
            http,
            config,
            builder,
            signer,
            signing_chain_id,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn signs_locally(&self) -> bool {
        self.signer.is_some()
    }

    /// Chain id baked into signed transactions, read once
    async fn signing_chain_id(&self) -> ChainResult<u64> {
        self.signing_chain_id
            .get_or_try_init(|| self.chain_id())
            .await
            .copied()
    }

    /// Call a method whose result may legitimately be `null`
    async fn request_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> ChainResult<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("RPC {} id={}", method, id);

        let response = self
            .http
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Other(format!("{} request failed: {}", method, e)))?;

        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::Other(format!("{} returned malformed response: {}", method, e)))?;

        if let Some(error) = envelope.error {
            return Err(classify_rpc_error(method, error));
        }

        Ok(envelope.result)
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<T> {
        self.request_optional(method, params)
            .await?
            .ok_or_else(|| ChainError::Other(format!("{} returned no result", method)))
    }

    async fn eth_call(&self, call: Value) -> ChainResult<Vec<u8>> {
        let output: String = self.request("eth_call", json!([call, "latest"])).await?;
        parse_data(&output)
    }

    async fn receipt(&self, hash: TxHash) -> ChainResult<Option<RpcReceipt>> {
        self.request_optional("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await
    }

    fn into_receipt(receipt: RpcReceipt) -> ChainResult<Receipt> {
        let tx_hash = parse_hash(&receipt.transaction_hash)?;

        if let Some(status) = &receipt.status {
            if parse_quantity_u64(status)? == 0 {
                return Err(ChainError::Other(format!("transaction {} reverted", tx_hash)));
            }
        }

        let block_number = match &receipt.block_number {
            Some(number) => parse_quantity_u64(number)?,
            None => 0,
        };
        let gas_used = match &receipt.gas_used {
            Some(gas) => Some(parse_quantity_u64(gas)?),
            None => None,
        };

        Ok(Receipt {
            tx_hash,
            block_number,
            gas_used,
        })
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn get_price(&self) -> ChainResult<PublishedPrice> {
        let output = self.eth_call(self.builder.get_price_call()).await?;
        let value = TransactionBuilder::decode_price(&output)?;
        Ok(PublishedPrice::new(value, self.config.price_decimals))
    }

    async fn submit_update(
        &self,
        candidate: &PriceSample,
        fee: &FeeBid,
        nonce: u64,
    ) -> ChainResult<TxHandle> {
        let tx = self.builder.build_update(candidate, fee, nonce);
        let hash: String = match &self.signer {
            Some(signer) => {
                let raw = signer.sign(&tx, self.signing_chain_id().await?)?;
                self.request("eth_sendRawTransaction", json!([hex::encode_prefixed(&raw)]))
                    .await?
            }
            None => {
                self.request("eth_sendTransaction", json!([tx.to_rpc_object()]))
                    .await?
            }
        };

        Ok(TxHandle {
            hash: parse_hash(&hash)?,
            nonce,
            fee: *fee,
        })
    }

    async fn wait_for_confirmation(&self, handle: &TxHandle) -> ChainResult<Receipt> {
        let poll = async {
            let mut interval = tokio::time::interval(self.config.confirmation_poll);
            loop {
                interval.tick().await;
                match self.receipt(handle.hash).await {
                    Ok(Some(receipt)) => return Self::into_receipt(receipt),
                    Ok(None) => debug!("Transaction {} still pending", handle.hash),
                    Err(e) => warn!("Receipt lookup for {} failed: {}", handle.hash, e),
                }
            }
        };

        match tokio::time::timeout(self.config.confirmation_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Other(format!(
                "transaction {} not confirmed within {:?}",
                handle.hash, self.config.confirmation_timeout
            ))),
        }
    }

    async fn latest_nonce(&self, address: Address) -> ChainResult<u64> {
        let count: String = self
            .request(
                "eth_getTransactionCount",
                json!([address.to_string(), "latest"]),
            )
            .await?;
        parse_quantity_u64(&count)
    }

    async fn fee_estimate(&self) -> ChainResult<FeeBid> {
        match self.config.fee_mode {
            FeeMode::Legacy => {
                let price: String = self.request("eth_gasPrice", json!([])).await?;
                Ok(FeeBid::legacy(parse_quantity(&price)?))
            }
            FeeMode::Eip1559 => {
                let tip: String = self.request("eth_maxPriorityFeePerGas", json!([])).await?;
                let tip = parse_quantity(&tip)?;

                let block: RpcBlock = self
                    .request("eth_getBlockByNumber", json!(["latest", false]))
                    .await?;
                let base_fee = block.base_fee_per_gas.ok_or_else(|| {
                    ChainError::UnsupportedFeeField("latest block has no base fee".to_string())
                })?;
                let base_fee = parse_quantity(&base_fee)?;

                let max_fee = base_fee
                    .saturating_mul(U256::from(2u8))
                    .saturating_add(tip);
                Ok(FeeBid::eip1559(max_fee, tip))
            }
        }
    }

    async fn balance(&self, address: Address) -> ChainResult<U256> {
        let balance: String = self
            .request("eth_getBalance", json!([address.to_string(), "latest"]))
            .await?;
        parse_quantity(&balance)
    }

    async fn owner(&self) -> ChainResult<Address> {
        let output = self.eth_call(self.builder.owner_call()).await?;
        TransactionBuilder::decode_owner(&output)
    }

    async fn chain_id(&self) -> ChainResult<u64> {
        let id: String = self.request("eth_chainId", json!([])).await?;
        parse_quantity_u64(&id)
    }
}

impl std::fmt::Debug for JsonRpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcChainClient")
            .field("url", &self.config.url)
            .field("contract", &self.config.contract)
            .field("from", &self.config.from)
            .field("signs_locally", &self.signs_locally())
            .field("next_request_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
