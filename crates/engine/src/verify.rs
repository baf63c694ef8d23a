//! Header verification: standalone checks, cascading checks against the
//! parent, and seal verification against the parent snapshot.

use crate::extra::validators_section_len;
use crate::fork::{verify_eip1559_header, verify_gas_limit};
use crate::produce::now_unix;
use crate::{Dpos, DposError, DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_VANITY, MAX_GAS_LIMIT};
use crossbeam_channel::{bounded, Receiver, Sender};
use dpos_types::{Block, Header, ADDRESS_LENGTH, EMPTY_UNCLE_HASH, H256, U256};
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// Stops delivery of batch verification results. Only an explicit
/// [`AbortHandle::abort`] stops the worker; dropping the handle lets the
/// batch run to completion. The header being verified when the signal
/// arrives is still verified and reported.
#[must_use = "dropping the handle leaves no way to stop the batch"]
pub struct AbortHandle {
    abort: Sender<()>,
}

impl AbortHandle {
    pub fn abort(self) {
        let _ = self.abort.try_send(());
    }
}

impl Dpos {
    /// Verify a single header against the chain.
    pub fn verify_header(&self, header: &Header) -> Result<(), DposError> {
        self.verify_header_with_parents(header, &[])
    }

    /// Verify a batch of headers in order on a background thread. Each result
    /// is sent on the returned channel in input order; header `i` may use
    /// headers `0..i` as its ancestry.
    #[must_use]
    pub fn verify_headers(
        self: &Arc<Self>,
        headers: Vec<Header>,
    ) -> (AbortHandle, Receiver<Result<(), DposError>>) {
        let (abort_tx, abort_rx) = bounded::<()>(1);
        let (results_tx, results_rx) = bounded(headers.len().max(1));
        let engine = Arc::clone(self);

        thread::spawn(move || engine.run_batch(&headers, &abort_rx, &results_tx));

        (AbortHandle { abort: abort_tx }, results_rx)
    }

    /// Worker loop behind [`Dpos::verify_headers`]. The results channel holds
    /// the whole batch, so sends only fail once the receiver is gone.
    fn run_batch(
        &self,
        headers: &[Header],
        abort: &Receiver<()>,
        results: &Sender<Result<(), DposError>>,
    ) {
        for i in 0..headers.len() {
            // A dropped handle disconnects without a message and is not an abort.
            if abort.try_recv().is_ok() {
                debug!(verified = i, total = headers.len(), "Batch verification aborted");
                return;
            }
            let result = self.verify_header_with_parents(&headers[i], &headers[..i]);
            if results.send(result).is_err() {
                return;
            }
        }
    }

    /// Blocks produced by this engine never carry uncles.
    pub fn verify_uncles(&self, block: &Block) -> Result<(), DposError> {
        if !block.uncles.is_empty() {
            return Err(DposError::UnclesNotAllowed);
        }
        Ok(())
    }

    /// Verify the seal of `header` against the snapshot at its parent.
    pub fn verify_seal(&self, header: &Header) -> Result<(), DposError> {
        self.verify_seal_with_parents(header, &[])
    }

    fn verify_header_with_parents(
        &self,
        header: &Header,
        parents: &[Header],
    ) -> Result<(), DposError> {
        let number = header.number;
        if header.time > now_unix() {
            return Err(DposError::FutureBlock);
        }
        if header.extra.len() < EXTRA_VANITY {
            return Err(DposError::MissingVanity);
        }
        let validators_len =
            validators_section_len(&header.extra).ok_or(DposError::MissingSignature)?;
        // Kickout blocks may carry validators too, so only epoch blocks are
        // checked for alignment.
        if number % self.config.epoch == 0 && validators_len % ADDRESS_LENGTH != 0 {
            return Err(DposError::ExtraValidators);
        }
        if header.mix_digest != H256::zero() {
            return Err(DposError::InvalidMixDigest);
        }
        if header.uncle_hash != EMPTY_UNCLE_HASH {
            return Err(DposError::InvalidUncleHash);
        }
        if number > 0 && header.difficulty.is_zero() {
            return Err(DposError::InvalidDifficulty);
        }
        if header.gas_limit > MAX_GAS_LIMIT {
            return Err(DposError::InvalidGasLimit {
                have: header.gas_limit,
                max: MAX_GAS_LIMIT,
            });
        }
        self.verify_cascading_fields(header, parents)
    }

    fn verify_cascading_fields(
        &self,
        header: &Header,
        parents: &[Header],
    ) -> Result<(), DposError> {
        let number = header.number;
        if number == 0 {
            return Ok(());
        }

        let parent = match parents.last() {
            Some(parent) => Some(parent.clone()),
            None => self.chain.get_header(&header.parent_hash, number - 1),
        };
        let parent = match parent {
            Some(p) if p.number == number - 1 && p.hash() == header.parent_hash => p,
            _ => return Err(DposError::UnknownAncestor),
        };

        if parent.time.saturating_add(self.config.period) > header.time {
            return Err(DposError::InvalidTimestamp);
        }
        if header.gas_used > header.gas_limit {
            return Err(DposError::InvalidGasUsed {
                have: header.gas_used,
                limit: header.gas_limit,
            });
        }

        let chain_config = self.chain.config();
        if !chain_config.is_london(number) {
            if let Some(base_fee) = header.base_fee {
                return Err(DposError::InvalidBaseFee(format!(
                    "invalid baseFee before fork: have {base_fee}, want <nil>"
                )));
            }
            verify_gas_limit(parent.gas_limit, header.gas_limit)?;
        } else {
            verify_eip1559_header(chain_config, &parent, header)?;
        }

        self.verify_seal_with_parents(header, parents)
    }

    fn verify_seal_with_parents(
        &self,
        header: &Header,
        parents: &[Header],
    ) -> Result<(), DposError> {
        let number = header.number;
        if number == 0 {
            return Err(DposError::UnknownBlock);
        }
        let snap = self.snapshot(number - 1, header.parent_hash, parents)?;

        let signer = self.signatures.recover(header)?;
        if signer != header.coinbase {
            return Err(DposError::InvalidCoinbase);
        }
        if !snap.validators.contains(&signer) {
            return Err(DposError::UnauthorizedValidator);
        }
        if snap.recently_signed(number, &signer) {
            return Err(DposError::RecentlySigned);
        }

        if !self.fake_diff {
            let expected = if snap.inturn(number, &signer) {
                DIFF_IN_TURN
            } else {
                DIFF_NO_TURN
            };
            if header.difficulty != U256::from(expected) {
                return Err(DposError::WrongDifficulty);
            }
        }
        debug!(number, ?signer, "Verified seal");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHarness;
    use crate::EXTRA_SEAL;

    fn sealed_batch(harness: &mut TestHarness, len: u64) -> Vec<Header> {
        (1..=len)
            .map(|number| harness.seal_next((number % 3) as usize))
            .collect()
    }

    #[test]
    fn test_run_batch_stops_on_pending_abort() {
        let mut harness = TestHarness::new(3);
        let headers = sealed_batch(&mut harness, 6);

        let (abort_tx, abort_rx) = bounded(1);
        let (results_tx, results_rx) = bounded(headers.len());
        abort_tx.send(()).unwrap();
        drop(abort_tx);

        harness.engine().run_batch(&headers, &abort_rx, &results_tx);
        drop(results_tx);
        assert_eq!(results_rx.iter().count(), 0);
    }

    #[test]
    fn test_run_batch_ignores_dropped_abort_handle() {
        let mut harness = TestHarness::new(3);
        let headers = sealed_batch(&mut harness, 6);

        let (abort_tx, abort_rx) = bounded::<()>(1);
        let (results_tx, results_rx) = bounded(headers.len());
        drop(abort_tx);

        harness.engine().run_batch(&headers, &abort_rx, &results_tx);
        drop(results_tx);
        let results: Vec<_> = results_rx.iter().collect();
        assert_eq!(results.len(), headers.len());
        assert!(results.iter().all(Result::is_ok));
    }

    #[test]
    fn test_verify_accepts_sealed_chain() {
        let mut harness = TestHarness::new(3);
        let one = harness.seal_next(1);
        let two = harness.seal_next(2);
        let engine = harness.engine();

        assert!(engine.verify_header(&one).is_ok());
        assert!(engine.verify_header(&two).is_ok());
        assert!(engine.verify_seal(&two).is_ok());
    }

    #[test]
    fn test_verify_rejects_missing_vanity() {
        let mut harness = TestHarness::new(3);
        let mut header = harness.build_next(1);
        header.extra = vec![0u8; EXTRA_VANITY - 1];
        let err = harness.engine().verify_header(&header).unwrap_err();
        assert!(matches!(err, DposError::MissingVanity));
    }

    #[test]
    fn test_verify_rejects_missing_seal() {
        let mut harness = TestHarness::new(3);
        let mut header = harness.build_next(1);
        header.extra = vec![0u8; EXTRA_VANITY + EXTRA_SEAL - 1];
        let err = harness.engine().verify_header(&header).unwrap_err();
        assert!(matches!(err, DposError::MissingSignature));
    }

    #[test]
    fn test_verify_rejects_future_block() {
        let mut harness = TestHarness::new(3);
        let mut header = harness.build_next(1);
        header.time = now_unix() + 3600;
        let err = harness.engine().verify_header(&header).unwrap_err();
        assert!(matches!(err, DposError::FutureBlock));
    }

    #[test]
    fn test_verify_rejects_mix_digest_and_uncles() {
        let mut harness = TestHarness::new(3);
        let mut header = harness.build_next(1);
        header.mix_digest = H256::repeat_byte(1);
        let engine = harness.engine();
        assert!(matches!(
            engine.verify_header(&header),
            Err(DposError::InvalidMixDigest)
        ));

        header.mix_digest = H256::zero();
        header.uncle_hash = H256::repeat_byte(2);
        assert!(matches!(
            engine.verify_header(&header),
            Err(DposError::InvalidUncleHash)
        ));
    }

    #[test]
    fn test_verify_rejects_gas_overflow() {
        let mut harness = TestHarness::new(3);
        let mut header = harness.build_next(1);
        header.gas_limit = MAX_GAS_LIMIT + 1;
        assert!(matches!(
            harness.engine().verify_header(&header),
            Err(DposError::InvalidGasLimit { .. })
        ));

        header.gas_limit = 8_000_000;
        header.gas_used = 8_000_001;
        assert!(matches!(
            harness.engine().verify_header(&header),
            Err(DposError::InvalidGasUsed { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_early_timestamp() {
        let mut harness = TestHarness::new(3);
        let mut header = harness.build_next(1);
        header.time = harness.genesis().time;
        assert!(matches!(
            harness.engine().verify_header(&header),
            Err(DposError::InvalidTimestamp)
        ));
    }

    #[test]
    fn test_verify_rejects_unknown_parent() {
        let mut harness = TestHarness::new(3);
        let mut header = harness.build_next(1);
        header.parent_hash = H256::repeat_byte(9);
        assert!(matches!(
            harness.engine().verify_header(&header),
            Err(DposError::UnknownAncestor)
        ));
    }

    #[test]
    fn test_verify_uncles() {
        let mut harness = TestHarness::new(1);
        let header = harness.seal_next(0);
        let engine = harness.engine();
        let mut block = Block::new(header.clone(), vec![], &[]);
        assert!(engine.verify_uncles(&block).is_ok());
        block.uncles.push(header);
        assert!(matches!(
            engine.verify_uncles(&block),
            Err(DposError::UnclesNotAllowed)
        ));
    }

    #[test]
    fn test_verify_seal_genesis_unsupported() {
        let harness = TestHarness::new(1);
        let err = harness.engine().verify_seal(&harness.genesis()).unwrap_err();
        assert!(matches!(err, DposError::UnknownBlock));
    }
}
