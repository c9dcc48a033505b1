//! Config fixtures for bot tests

use alloy_primitives::Address;

use oracle_core::{BotConfig, ContractConfig, RpcConfig, WalletConfig};

pub fn wallet() -> Address {
    Address::repeat_byte(0x22)
}

pub fn test_config() -> BotConfig {
    BotConfig {
        rpc: RpcConfig {
            http_url: "http://localhost:8545".to_string(),
            ..Default::default()
        },
        contract: ContractConfig {
            address: Address::repeat_byte(0x11),
        },
        wallet: WalletConfig {
            address: wallet(),
            ..Default::default()
        },
        ..Default::default()
    }
}
