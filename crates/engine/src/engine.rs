//! The engine struct and snapshot resolution.

use crate::blacklist::{Blacklist, EventCheckRules, PolicyCache};
use crate::signer::{cache_size, SignTxFn, SignatureCache, SignerFn};
use crate::snapshot::Snapshot;
use crate::{
    extra::extra_validators, DposConfig, DposError, CHECKPOINT_INTERVAL,
    FULL_IMMUTABILITY_THRESHOLD, INMEMORY_BLACKLIST, INMEMORY_SIGNATURES, INMEMORY_SNAPSHOTS,
};
use dpos_core::{
    ChainConfig, ChainHeaderReader, KeyValueStore, StateFn, SystemContracts, TransactionExecutor,
};
use dpos_types::{Address, Hash, Header};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// The local validator identity and its signing hooks.
#[derive(Clone, Default)]
pub(crate) struct LocalSigner {
    pub(crate) validator: Address,
    pub(crate) sign_fn: Option<SignerFn>,
    pub(crate) sign_tx_fn: Option<SignTxFn>,
}

/// Delegated proof-of-stake consensus engine.
///
/// Owns the bounded caches (snapshots, recovered signers, blacklists, event
/// rules) and the local validator identity. Everything else (the chain, the
/// state, the system contracts, the executor) is injected.
///
/// # Block lifecycle
///
/// 1. **Import**: `verify_header(s)` then `finalize` on every node
/// 2. **Produce**: `prepare`, then `finalize_and_assemble`, then `seal`
/// 3. **Epoch**: every `epoch` blocks the validator set is re-elected through
///    the system contracts and written into `Header.extra`
pub struct Dpos {
    // ═══════════════════════════════════════════════════════════════════════
    // Configuration and collaborators
    // ═══════════════════════════════════════════════════════════════════════
    pub(crate) config: DposConfig,
    pub(crate) db: Arc<dyn KeyValueStore>,
    pub(crate) chain: Arc<dyn ChainHeaderReader>,
    pub(crate) contracts: Arc<dyn SystemContracts>,
    pub(crate) executor: Arc<dyn TransactionExecutor>,
    pub(crate) state_fn: RwLock<Option<StateFn>>,

    // ═══════════════════════════════════════════════════════════════════════
    // Caches
    // ═══════════════════════════════════════════════════════════════════════
    /// Recent snapshots, by block hash.
    pub(crate) recents: Mutex<LruCache<Hash, Snapshot>>,
    pub(crate) signatures: SignatureCache,
    pub(crate) blacklists: PolicyCache<Blacklist>,
    pub(crate) event_check_rules: PolicyCache<EventCheckRules>,

    // ═══════════════════════════════════════════════════════════════════════
    // Identity
    // ═══════════════════════════════════════════════════════════════════════
    pub(crate) signer: RwLock<LocalSigner>,

    /// Skip the difficulty check in seal verification. Testing only.
    pub(crate) fake_diff: bool,
}

impl Dpos {
    pub fn new(
        config: DposConfig,
        db: Arc<dyn KeyValueStore>,
        chain: Arc<dyn ChainHeaderReader>,
        contracts: Arc<dyn SystemContracts>,
        executor: Arc<dyn TransactionExecutor>,
    ) -> Self {
        Self {
            config: config.normalized(),
            db,
            chain,
            contracts,
            executor,
            state_fn: RwLock::new(None),
            recents: Mutex::new(LruCache::new(cache_size(INMEMORY_SNAPSHOTS))),
            signatures: SignatureCache::new(INMEMORY_SIGNATURES),
            blacklists: PolicyCache::new(INMEMORY_BLACKLIST),
            event_check_rules: PolicyCache::new(INMEMORY_BLACKLIST),
            signer: RwLock::new(LocalSigner::default()),
            fake_diff: false,
        }
    }

    /// Accept any difficulty during seal verification.
    pub fn with_fake_diff(mut self) -> Self {
        self.fake_diff = true;
        self
    }

    pub fn config(&self) -> &DposConfig {
        &self.config
    }

    pub fn chain_config(&self) -> &ChainConfig {
        self.chain.config()
    }

    /// Install the accessor used to open state by root.
    pub fn set_state_fn(&self, state_fn: StateFn) {
        *self.state_fn.write() = Some(state_fn);
    }

    /// Set the local validator and its signing hooks.
    pub fn authorize(&self, validator: Address, sign_fn: SignerFn, sign_tx_fn: SignTxFn) {
        let mut signer = self.signer.write();
        signer.validator = validator;
        signer.sign_fn = Some(sign_fn);
        signer.sign_tx_fn = Some(sign_tx_fn);
    }

    /// Address currently authorized to seal, zero if none.
    pub fn validator(&self) -> Address {
        self.signer.read().validator
    }

    /// Release background resources. The engine has none.
    pub fn close(&self) -> Result<(), DposError> {
        Ok(())
    }

    /// Resolve the snapshot after the block `(number, hash)`.
    ///
    /// Walks backwards from the block until a cached, persisted, or trusted
    /// checkpoint snapshot is found, then replays the collected headers.
    /// `parents` supplies headers not yet in the chain, oldest first.
    pub fn snapshot(
        &self,
        mut number: u64,
        mut hash: Hash,
        parents: &[Header],
    ) -> Result<Snapshot, DposError> {
        let mut headers: Vec<Header> = Vec::new();
        let mut parents = parents;
        let epoch = self.config.epoch;

        let snap = loop {
            if let Some(snap) = self.recents.lock().get(&hash) {
                trace!(number, "Snapshot cache hit");
                break snap.clone();
            }

            if number % CHECKPOINT_INTERVAL == 0 {
                if let Some(snap) = Snapshot::load(self.db.as_ref(), &hash)? {
                    trace!(number, ?hash, "Loaded snapshot from disk");
                    break snap;
                }
            }

            if number == 0
                || (number % epoch == 0
                    && (headers.len() > FULL_IMMUTABILITY_THRESHOLD
                        || self.chain.get_header_by_number(number - 1).is_none()))
            {
                if let Some(checkpoint) = self.chain.get_header_by_number(number) {
                    let checkpoint_hash = checkpoint.hash();
                    let validators = extra_validators(&checkpoint.extra);
                    let snap = Snapshot::new(number, checkpoint_hash, validators);
                    snap.store(self.db.as_ref())?;
                    info!(number, hash = ?checkpoint_hash, "Stored checkpoint snapshot to disk");
                    break snap;
                }
            }
            if number == 0 {
                return Err(DposError::UnknownAncestor);
            }

            let header = match parents.split_last() {
                Some((last, rest)) => {
                    if last.hash() != hash || last.number != number {
                        return Err(DposError::UnknownAncestor);
                    }
                    parents = rest;
                    last.clone()
                }
                None => self
                    .chain
                    .get_header(&hash, number)
                    .ok_or(DposError::UnknownAncestor)?,
            };
            hash = header.parent_hash;
            number -= 1;
            headers.push(header);
        };

        headers.reverse();
        let snap = snap.apply(&headers, epoch, &self.signatures)?;
        if !headers.is_empty() {
            debug!(number = snap.number, replayed = headers.len(), "Reconstructed snapshot");
        }
        self.recents.lock().put(snap.hash, snap.clone());

        if snap.number % CHECKPOINT_INTERVAL == 0 && !headers.is_empty() {
            snap.store(self.db.as_ref())?;
            trace!(number = snap.number, hash = ?snap.hash, "Stored snapshot to disk");
        }
        Ok(snap)
    }

    /// Snapshot as of the parent of `header`, using `parents` for headers not
    /// yet imported.
    pub(crate) fn parent_snapshot(
        &self,
        header: &Header,
        parents: &[Header],
    ) -> Result<Snapshot, DposError> {
        let number = header.number.checked_sub(1).ok_or(DposError::UnknownBlock)?;
        self.snapshot(number, header.parent_hash, parents)
    }
}
