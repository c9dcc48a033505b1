//! Transaction builder for oracle price updates

use alloy_primitives::{hex, Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use serde_json::{json, Value};

use oracle_core::{ChainError, ChainResult, FeeBid, PriceSample};

sol! {
    interface IPriceOracle {
        function updatePrice(uint256 newPrice) external;
        function getPrice() external view returns (uint256);
        function owner() external view returns (address);
    }
}

/// Built transaction ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTransaction {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: u64,
    pub fee: FeeBid,
    pub nonce: u64,
}

impl UpdateTransaction {
    /// JSON-RPC transaction object for `eth_sendTransaction`
    pub fn to_rpc_object(&self) -> Value {
        let mut tx = json!({
            "from": self.from.to_string(),
            "to": self.to.to_string(),
            "data": hex::encode_prefixed(&self.data),
            "gas": quantity_u64(self.gas_limit),
            "nonce": quantity_u64(self.nonce),
        });

        match self.fee {
            FeeBid::Legacy { gas_price } => {
                tx["type"] = json!("0x0");
                tx["gasPrice"] = json!(quantity(gas_price));
            }
            FeeBid::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                tx["type"] = json!("0x2");
                tx["maxFeePerGas"] = json!(quantity(max_fee_per_gas));
                tx["maxPriorityFeePerGas"] = json!(quantity(max_priority_fee_per_gas));
            }
        }

        tx
    }
}

/// Hex quantity encoding
pub(crate) fn quantity(value: U256) -> String {
    format!("0x{:x}", value)
}

pub(crate) fn quantity_u64(value: u64) -> String {
    format!("0x{:x}", value)
}

/// Transaction builder
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    contract: Address,
    from: Address,
    gas_limit: u64,
}

impl TransactionBuilder {
    pub fn new(contract: Address, from: Address, gas_limit: u64) -> Self {
        Self {
            contract,
            from,
            gas_limit,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Build `updatePrice(candidate)` with the given fee and nonce
    pub fn build_update(&self, candidate: &PriceSample, fee: &FeeBid, nonce: u64) -> UpdateTransaction {
        let call = IPriceOracle::updatePriceCall {
            newPrice: candidate.value,
        };

        UpdateTransaction {
            from: self.from,
            to: self.contract,
            data: Bytes::from(call.abi_encode()),
            gas_limit: self.gas_limit,
            fee: *fee,
            nonce,
        }
    }

    /// `eth_call` object reading the published price
    pub fn get_price_call(&self) -> Value {
        self.view_call(IPriceOracle::getPriceCall {}.abi_encode())
    }

    /// `eth_call` object reading the contract owner
    pub fn owner_call(&self) -> Value {
        self.view_call(IPriceOracle::ownerCall {}.abi_encode())
    }

    fn view_call(&self, data: Vec<u8>) -> Value {
        json!({
            "to": self.contract.to_string(),
            "data": hex::encode_prefixed(data),
        })
    }

    pub fn decode_price(output: &[u8]) -> ChainResult<U256> {
        IPriceOracle::getPriceCall::abi_decode_returns(output, true)
            .map(|ret| ret._0)
            .map_err(|e| ChainError::Other(format!("getPrice returned malformed data: {}", e)))
    }

    pub fn decode_owner(output: &[u8]) -> ChainResult<Address> {
        IPriceOracle::ownerCall::abi_decode_returns(output, true)
            .map(|ret| ret._0)
            .map_err(|e| ChainError::Other(format!("owner returned malformed data: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> TransactionBuilder {
        TransactionBuilder::new(Address::repeat_byte(0xaa), Address::repeat_byte(0xbb), 50_000)
    }

    #[test]
    fn test_update_calldata_encoding() {
        let sample = PriceSample::new(U256::from(101_01000000u64), 8);
        let tx = builder().build_update(&sample, &FeeBid::legacy(U256::from(1u8)), 3);

        // updatePrice(uint256) selector followed by one word
        assert_eq!(tx.data.len(), 4 + 32);
        assert_eq!(&tx.data[..4], &IPriceOracle::updatePriceCall::SELECTOR);
        assert_eq!(U256::from_be_slice(&tx.data[4..]), sample.value);
    }

    #[test]
    fn test_legacy_rpc_object() {
        let sample = PriceSample::new(U256::from(1u8), 8);
        let fee = FeeBid::legacy(U256::from(10_000_000_000u64));
        let tx = builder().build_update(&sample, &fee, 7).to_rpc_object();

        assert_eq!(tx["type"], "0x0");
        assert_eq!(tx["gasPrice"], "0x2540be400");
        assert_eq!(tx["nonce"], "0x7");
        assert_eq!(tx["gas"], "0xc350");
        assert!(tx.get("maxFeePerGas").is_none());
    }

    #[test]
    fn test_eip1559_rpc_object() {
        let sample = PriceSample::new(U256::from(1u8), 8);
        let fee = FeeBid::eip1559(U256::from(30u8), U256::from(2u8));
        let tx = builder().build_update(&sample, &fee, 0).to_rpc_object();

        assert_eq!(tx["type"], "0x2");
        assert_eq!(tx["maxFeePerGas"], "0x1e");
        assert_eq!(tx["maxPriorityFeePerGas"], "0x2");
        assert!(tx.get("gasPrice").is_none());
    }

    #[test]
    fn test_decode_price_word() {
        let word = U256::from(2650_12345678u64).to_be_bytes::<32>();
        assert_eq!(
            TransactionBuilder::decode_price(&word).unwrap(),
            U256::from(2650_12345678u64)
        );
        assert!(TransactionBuilder::decode_price(&[1, 2, 3]).is_err());
    }
}
