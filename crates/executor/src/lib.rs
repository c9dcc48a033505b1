//! Price update submission and confirmation
//!
//! Features:
//! - Single-flight update coordinator with explicit state machine
//! - Bounded retry with fee escalation and nonce refresh
//! - JSON-RPC chain client with node error classification
//! - In-process signing with the bot wallet key
//! - ABI encoding of the oracle contract calls

pub mod chain;
pub mod builder;
pub mod rpc;
pub mod signer;
pub mod fees;
pub mod coordinator;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use chain::{ChainClient, Receipt, TxHandle};
pub use builder::{TransactionBuilder, UpdateTransaction};
pub use rpc::{JsonRpcChainClient, RpcClientConfig};
pub use signer::LocalTxSigner;
pub use fees::{EscalationConfig, FeeEscalationStrategy, GiveUpReason, RetryDecision};
pub use coordinator::{
    CoordinatorConfig, CoordinatorPhase, CycleOutcome, CycleReport, UpdateCoordinator,
};
