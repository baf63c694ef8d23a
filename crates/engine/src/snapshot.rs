//! Authorization snapshots: the validator set and recent signers as of a
//! block.

use crate::signer::SignatureCache;
use crate::{extra::extra_validators, DposError, MAX_VALIDATORS};
use dpos_core::KeyValueStore;
use dpos_types::{Address, Hash, Header};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const SNAPSHOT_KEY_PREFIX: &[u8] = b"dpos-";

/// State of the authorization voting at a given block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Block number where the snapshot was created.
    pub number: u64,
    /// Block hash where the snapshot was created.
    pub hash: Hash,
    /// Authorized validators at this moment.
    pub validators: BTreeSet<Address>,
    /// Recent signers for spam protection, block number to signer.
    pub recents: BTreeMap<u64, Address>,
}

fn snapshot_key(hash: &Hash) -> Vec<u8> {
    let mut key = SNAPSHOT_KEY_PREFIX.to_vec();
    key.extend_from_slice(hash.as_bytes());
    key
}

impl Snapshot {
    /// Snapshot with the given validators and no recent signers. Used for
    /// genesis and trusted checkpoints.
    pub fn new(number: u64, hash: Hash, validators: impl IntoIterator<Item = Address>) -> Self {
        Self {
            number,
            hash,
            validators: validators.into_iter().collect(),
            recents: BTreeMap::new(),
        }
    }

    /// Load a checkpoint from the store.
    pub fn load(db: &dyn KeyValueStore, hash: &Hash) -> Result<Option<Self>, DposError> {
        match db.get(&snapshot_key(hash))? {
            Some(blob) => Ok(Some(serde_json::from_slice(&blob)?)),
            None => Ok(None),
        }
    }

    /// Persist this snapshot as a checkpoint.
    pub fn store(&self, db: &dyn KeyValueStore) -> Result<(), DposError> {
        let blob = serde_json::to_vec(self)?;
        db.put(&snapshot_key(&self.hash), &blob)?;
        Ok(())
    }

    /// Validators in ascending order. A validator's position is its turn index.
    pub fn validators(&self) -> Vec<Address> {
        self.validators.iter().copied().collect()
    }

    /// Whether `validator` is in-turn to sign block `number`.
    pub fn inturn(&self, number: u64, validator: &Address) -> bool {
        let len = self.validators.len() as u64;
        if len == 0 {
            return false;
        }
        self.validators
            .iter()
            .position(|v| v == validator)
            .map_or(false, |offset| number % len == offset as u64)
    }

    /// Number of consecutive blocks within which a validator may sign once.
    pub fn signer_limit(&self) -> u64 {
        self.validators.len() as u64 / 2 + 1
    }

    /// Whether a block `number` sealed by `signer` falls inside the signer's
    /// anti-spam window. Blocks below the window size are never rejected.
    pub fn recently_signed(&self, number: u64, signer: &Address) -> bool {
        let Some(floor) = number.checked_sub(self.signer_limit()) else {
            return false;
        };
        self.recents
            .iter()
            .any(|(&seen, recent)| recent == signer && seen > floor)
    }

    /// Apply `headers` on top of this snapshot, producing the snapshot at the
    /// last header. `headers` must continue directly from `self.number`.
    pub fn apply(
        &self,
        headers: &[Header],
        epoch: u64,
        signatures: &SignatureCache,
    ) -> Result<Snapshot, DposError> {
        let Some(first) = headers.first() else {
            return Ok(self.clone());
        };
        for pair in headers.windows(2) {
            if pair[1].number != pair[0].number + 1 {
                return Err(DposError::InvalidVotingChain);
            }
        }
        if first.number != self.number + 1 {
            return Err(DposError::InvalidVotingChain);
        }

        let mut snap = self.clone();
        for header in headers {
            let number = header.number;
            let limit = snap.signer_limit();
            if number >= limit {
                snap.recents.remove(&(number - limit));
            }

            let signer = signatures.recover(header)?;
            if !snap.validators.contains(&signer) {
                return Err(DposError::UnauthorizedValidator);
            }
            if snap.recents.values().any(|recent| *recent == signer) {
                return Err(DposError::RecentlySigned);
            }
            snap.recents.insert(number, signer);

            if number > 0 && number % epoch == 0 {
                let validators = extra_validators(&header.extra);
                if validators.len() > MAX_VALIDATORS {
                    return Err(DposError::InvalidValidatorsLength(validators.len()));
                }
                if !validators.is_empty() {
                    let old_limit = snap.signer_limit();
                    snap.validators = validators.into_iter().collect();
                    let new_limit = snap.signer_limit();
                    for i in 0..old_limit.saturating_sub(new_limit) {
                        if let Some(stale) = number.checked_sub(new_limit + i) {
                            snap.recents.remove(&stale);
                        }
                    }
                }
            }
        }

        if let Some(last) = headers.last() {
            snap.number = last.number;
            snap.hash = last.hash();
        }
        Ok(snap)
    }
}
