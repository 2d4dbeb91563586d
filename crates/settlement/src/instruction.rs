//! Call builders for the pool settlement contract.
//!
//! Each function produces a [`LedgerCall`]: target contract, entry point
//! name and calldata, ready to be submitted or evaluated by a ledger client.

use stakepool_core::{Felt, PoolKey};

/// Contract entry points used by the distributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// `set_merkle_root(day, period, root)`, invoke.
    SetMerkleRoot,
    /// `get_merkle_root(day, period) -> root`, view.
    GetMerkleRoot,
}

impl EntryPoint {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetMerkleRoot => "set_merkle_root",
            Self::GetMerkleRoot => "get_merkle_root",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerCall {
    pub contract_address: Felt,
    pub entry_point: EntryPoint,
    pub calldata: Vec<Felt>,
}

impl LedgerCall {
    pub fn description(&self) -> String {
        format!(
            "{}({})",
            self.entry_point.name(),
            self.calldata
                .iter()
                .map(stakepool_core::numeric::felt_to_hex)
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

fn pool_key_calldata(key: &PoolKey) -> [Felt; 2] {
    [Felt::from(key.day), Felt::from(key.period as u64)]
}

pub fn set_merkle_root(contract_address: Felt, key: &PoolKey, root: Felt) -> LedgerCall {
    let [day, period] = pool_key_calldata(key);
    LedgerCall {
        contract_address,
        entry_point: EntryPoint::SetMerkleRoot,
        calldata: vec![day, period, root],
    }
}

pub fn get_merkle_root(contract_address: Felt, key: &PoolKey) -> LedgerCall {
    LedgerCall {
        contract_address,
        entry_point: EntryPoint::GetMerkleRoot,
        calldata: pool_key_calldata(key).to_vec(),
    }
}
