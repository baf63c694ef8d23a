//! Read-only query API over snapshots and the system contracts.

use crate::snapshot::Snapshot;
use crate::{Dpos, DposError, DIFF_IN_TURN};
use dpos_core::{CallOpts, EpochInfo, ExecutionError, StateDb};
use dpos_types::{Address, Hash, Header, U256};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Number of recent blocks covered by [`DposApi::status`].
pub const STATUS_WINDOW: u64 = 64;

/// Sealing activity over recent blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Share of blocks sealed in-turn, in percent.
    pub inturn_percent: f64,
    /// Blocks sealed per validator. Every current validator is listed.
    pub sealer_activity: BTreeMap<Address, u64>,
    pub num_blocks: u64,
}

/// A namespaced API service exposed to the node's RPC layer.
pub struct ApiDescriptor {
    pub namespace: &'static str,
    pub version: &'static str,
    pub public: bool,
    pub service: DposApi,
}

/// Queries answered from snapshots and contract state.
#[derive(Clone)]
pub struct DposApi {
    engine: Arc<Dpos>,
}

impl Dpos {
    /// API services offered by the engine.
    pub fn apis(self: &Arc<Self>) -> Vec<ApiDescriptor> {
        vec![ApiDescriptor {
            namespace: "dpos",
            version: "1.0",
            public: false,
            service: DposApi::new(Arc::clone(self)),
        }]
    }
}

impl DposApi {
    pub fn new(engine: Arc<Dpos>) -> Self {
        Self { engine }
    }

    /// Header at `number`, or the current head when `None`.
    fn header_at(&self, number: Option<u64>) -> Result<Header, DposError> {
        let header = match number {
            Some(number) => self.engine.chain.get_header_by_number(number),
            None => self.engine.chain.current_header(),
        };
        header.ok_or(DposError::UnknownBlock)
    }

    fn header_by_hash(&self, hash: &Hash) -> Result<Header, DposError> {
        self.engine
            .chain
            .get_header_by_hash(hash)
            .ok_or(DposError::UnknownBlock)
    }

    fn state_at(&self, header: &Header) -> Result<Box<dyn StateDb + Send>, DposError> {
        let state_fn = self
            .engine
            .state_fn
            .read()
            .clone()
            .ok_or(ExecutionError::StateUnavailable(header.root))?;
        Ok(state_fn(&header.root)?)
    }

    pub fn get_snapshot(&self, number: Option<u64>) -> Result<Snapshot, DposError> {
        let header = self.header_at(number)?;
        self.engine.snapshot(header.number, header.hash(), &[])
    }

    pub fn get_snapshot_at_hash(&self, hash: &Hash) -> Result<Snapshot, DposError> {
        let header = self.header_by_hash(hash)?;
        self.engine.snapshot(header.number, header.hash(), &[])
    }

    pub fn get_validators(&self, number: Option<u64>) -> Result<Vec<Address>, DposError> {
        Ok(self.get_snapshot(number)?.validators())
    }

    pub fn get_validators_at_hash(&self, hash: &Hash) -> Result<Vec<Address>, DposError> {
        Ok(self.get_snapshot_at_hash(hash)?.validators())
    }

    /// Validator set recorded by the Validators contract at `number`.
    pub fn get_current_epoch_validators(
        &self,
        number: Option<u64>,
    ) -> Result<Vec<Address>, DposError> {
        let header = self.header_at(number)?;
        let mut state = self.state_at(&header)?;
        Ok(self.engine.contracts.get_cur_epoch_validators(
            state.as_mut(),
            &header,
            CallOpts::view(header.coinbase),
        )?)
    }

    /// Reward parameters of `epoch`, read at `number`.
    pub fn get_epoch_info(&self, epoch: u64, number: Option<u64>) -> Result<EpochInfo, DposError> {
        let header = self.header_at(number)?;
        let mut state = self.state_at(&header)?;
        Ok(self.engine.contracts.epoch_info(
            state.as_mut(),
            &header,
            CallOpts::view(header.coinbase),
            epoch,
        )?)
    }

    /// In-turn ratio and per-validator sealing counts over the last
    /// [`STATUS_WINDOW`] blocks.
    pub fn status(&self) -> Result<Status, DposError> {
        let header = self.header_at(None)?;
        let snap = self.engine.snapshot(header.number, header.hash(), &[])?;

        let end = header.number;
        let (start, num_blocks) = if STATUS_WINDOW > end {
            (1, end.saturating_sub(1))
        } else {
            (end - STATUS_WINDOW, STATUS_WINDOW)
        };

        let mut sealer_activity: BTreeMap<Address, u64> =
            snap.validators().into_iter().map(|v| (v, 0)).collect();
        let mut optimals = 0u64;
        for number in start..end {
            let header = self
                .engine
                .chain
                .get_header_by_number(number)
                .ok_or(DposError::UnknownBlock)?;
            if header.difficulty == U256::from(DIFF_IN_TURN) {
                optimals += 1;
            }
            *sealer_activity.entry(self.engine.author(&header)?).or_default() += 1;
        }

        let inturn_percent = if num_blocks == 0 {
            0.0
        } else {
            (100 * optimals) as f64 / num_blocks as f64
        };
        Ok(Status {
            inturn_percent,
            sealer_activity,
            num_blocks,
        })
    }
}
