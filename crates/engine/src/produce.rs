//! Block production: preparing a header for execution and sealing the
//! finished block.

use crate::extra::vanity_prefix;
use crate::signer::seal_hash;
use crate::snapshot::Snapshot;
use crate::{signer::dpos_rlp, Dpos, DposError, DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_SEAL, WIGGLE_TIME};
use crossbeam_channel::{after, select, Receiver, Sender, TrySendError};
use dpos_types::{Address, Block, Hash, Header, H256, H64, U256};
use rand::Rng;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace, warn};

/// Current wall-clock time in seconds since the Unix epoch.
pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn difficulty_for(snap: &Snapshot, validator: &Address) -> U256 {
    if snap.inturn(snap.number + 1, validator) {
        U256::from(DIFF_IN_TURN)
    } else {
        U256::from(DIFF_NO_TURN)
    }
}

impl Dpos {
    /// Fill in the consensus fields of `header` so transactions can be
    /// executed on top of it.
    pub fn prepare(&self, header: &mut Header) -> Result<(), DposError> {
        let validator = self.validator();
        header.coinbase = validator;
        header.nonce = H64::zero();

        let number = header.number;
        let snap = self.snapshot(
            number.checked_sub(1).ok_or(DposError::UnknownBlock)?,
            header.parent_hash,
            &[],
        )?;
        debug!(
            number,
            snap_number = snap.number,
            coinbase = ?header.coinbase,
            validators = snap.validators.len(),
            "Preparing header"
        );

        header.difficulty = difficulty_for(&snap, &validator);
        if !snap.validators.contains(&header.coinbase) {
            return Err(DposError::UnauthorizedValidator);
        }

        header.extra = vanity_prefix(&header.extra);
        header.mix_digest = H256::zero();

        let parent = self
            .chain
            .get_header(&header.parent_hash, number - 1)
            .ok_or(DposError::UnknownAncestor)?;
        header.time = parent.time.saturating_add(self.config.period).max(now_unix());
        Ok(())
    }

    /// Sign `block` and deliver it on `results` once its slot arrives.
    ///
    /// Returns `Ok(())` without sealing when the local validator signed too
    /// recently or when an empty block would be sealed on a zero-period
    /// chain. Delivery happens on a background thread and is abandoned if
    /// `stop` fires first; a full `results` channel drops the block.
    pub fn seal(
        &self,
        block: &Block,
        results: Sender<Block>,
        stop: Receiver<()>,
    ) -> Result<(), DposError> {
        let mut header = block.header.clone();
        let number = header.number;
        if number == 0 {
            return Err(DposError::UnknownBlock);
        }
        if self.config.period == 0 && block.transactions.is_empty() {
            info!("Sealing paused, waiting for transactions");
            return Ok(());
        }

        let (validator, sign_fn) = {
            let signer = self.signer.read();
            (signer.validator, signer.sign_fn.clone())
        };

        let snap = self.snapshot(number - 1, header.parent_hash, &[])?;
        if !snap.validators.contains(&validator) {
            return Err(DposError::UnauthorizedValidator);
        }
        let limit = snap.signer_limit();
        let signed_recently = snap
            .recents
            .iter()
            .any(|(&seen, recent)| *recent == validator && (number < limit || seen > number - limit));
        if signed_recently {
            info!(number, "Signed recently, must wait for others");
            return Ok(());
        }

        let slot = UNIX_EPOCH + Duration::from_secs(header.time);
        let mut delay = slot
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        if header.difficulty == U256::from(DIFF_NO_TURN) {
            let wiggle = WIGGLE_TIME * (snap.validators.len() as u32 / 2 + 1);
            delay += rand::thread_rng().gen_range(Duration::ZERO..wiggle);
            trace!(?wiggle, "Out-of-turn signing requested");
        }

        let sign_fn = sign_fn.ok_or(DposError::SignFnNotSet)?;
        let signature = sign_fn(validator, &dpos_rlp(&header)?)?;
        if signature.len() != EXTRA_SEAL {
            return Err(DposError::InvalidSealLength(signature.len()));
        }
        let seal_start = header
            .extra
            .len()
            .checked_sub(EXTRA_SEAL)
            .ok_or(DposError::MissingSignature)?;
        header.extra[seal_start..].copy_from_slice(&signature);

        let sealed = block.with_seal(header);
        debug!(number, ?delay, "Waiting for slot to sign and propagate");
        thread::spawn(move || {
            select! {
                recv(stop) -> _ => return,
                recv(after(delay)) -> _ => {}
            }
            if let Err(TrySendError::Full(block) | TrySendError::Disconnected(block)) =
                results.try_send(sealed)
            {
                warn!(
                    sealhash = ?seal_hash(&block.header).unwrap_or_default(),
                    "Sealing result is not read by miner"
                );
            }
        });
        Ok(())
    }

    /// Difficulty the local validator would use for the child of `parent`.
    pub fn calc_difficulty(&self, parent: &Header) -> Result<U256, DposError> {
        let snap = self.snapshot(parent.number, parent.hash(), &[])?;
        Ok(difficulty_for(&snap, &self.validator()))
    }

    /// Block author. Trusts the coinbase rather than recovering the seal; see
    /// [`Dpos::verify_seal`] for the authoritative signer check.
    pub fn author(&self, header: &Header) -> Result<Address, DposError> {
        Ok(header.coinbase)
    }

    /// Hash of `header` prior to sealing.
    pub fn seal_hash(&self, header: &Header) -> Result<Hash, DposError> {
        seal_hash(header)
    }
}
