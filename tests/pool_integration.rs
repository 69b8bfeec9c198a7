//! End-to-end pool scenarios
//!
//! Drives the pool through the in-memory capability:
//! - Scenario A: contribute, close, decrypt, replay
//! - Scenario B: submission cooldown
//! - Scenario C: owner-only operations
//! - Scenario D: pause
//! - Tampering between request and callback

use cipherpool::pool::{
    Address, CallContext, ConfidentialCompute, ConfidentialPool, ErrorCategory, MockCompute,
    PoolConfig, PoolError, PoolEvent, RateLimitedAction,
};
use cipherpool::fhe::{encode_cleartext_word, OracleSigner};

const OWNER: Address = Address::from_bytes([0x01; 32]);
const PROVIDER: Address = Address::from_bytes([0x02; 32]);
const OUTSIDER: Address = Address::from_bytes([0x03; 32]);
const IDENTITY: Address = Address::from_bytes([0xee; 32]);
const COOLDOWN: u64 = 30;

fn new_pool() -> ConfidentialPool<MockCompute> {
    let config = PoolConfig::new(OWNER, IDENTITY)
        .with_provider(PROVIDER)
        .with_cooldown(COOLDOWN);
    ConfidentialPool::new(config, MockCompute::new()).unwrap()
}

fn submit(pool: &mut ConfidentialPool<MockCompute>, caller: Address, at: u64, value: u64) -> Result<u64, PoolError> {
    let amount = pool.backend().encrypt(value);
    pool.submit_contribution(&CallContext::new(caller, at), amount)
}

fn event_names(pool: &ConfidentialPool<MockCompute>, since: u64) -> Vec<&'static str> {
    pool.events_since(since).iter().map(|r| r.event.name()).collect()
}

// =============================================================================
// SCENARIO A
// =============================================================================

mod scenario_a {
    use super::*;

    #[test]
    fn test_contribute_close_decrypt() {
        let mut pool = new_pool();
        let cursor = pool.events().len() as u64;

        submit(&mut pool, PROVIDER, 1_000, 10).unwrap();
        submit(&mut pool, PROVIDER, 1_000 + COOLDOWN, 15).unwrap();
        pool.close_current_batch(&CallContext::new(OWNER, 1_100)).unwrap();

        let request_id = pool
            .request_decryption(&CallContext::new(PROVIDER, 1_200), 1)
            .unwrap();
        let job = pool.backend_mut().take_pending_jobs().pop().unwrap();
        assert_eq!(job.request_id, request_id);

        let response = pool.backend().oracle().fulfil(&job).unwrap();
        assert_eq!(pool.handle_callback(request_id, &response.cleartext, &response.proof), Ok(25));

        assert_eq!(
            event_names(&pool, cursor),
            vec![
                "contribution_submitted",
                "contribution_submitted",
                "batch_closed",
                "decryption_requested",
                "decryption_completed",
            ]
        );
        assert_eq!(
            pool.events().last().map(|r| r.event.clone()),
            Some(PoolEvent::DecryptionCompleted {
                request_id,
                batch_id: 1,
                total: 25
            })
        );

        // duplicate delivery
        let events_before = pool.events().len();
        let replay = pool.handle_callback(request_id, &response.cleartext, &response.proof);
        assert_eq!(replay, Err(PoolError::Replay(request_id)));
        assert_eq!(replay.unwrap_err().category(), ErrorCategory::Replay);
        assert_eq!(pool.events().len(), events_before);
        assert!(pool.decryption_context(request_id).unwrap().processed);
    }

    #[test]
    fn test_contributions_after_close_rejected() {
        let mut pool = new_pool();
        submit(&mut pool, PROVIDER, 0, 10).unwrap();
        pool.close_current_batch(&CallContext::new(OWNER, 1)).unwrap();
        let before = pool.batch(1).unwrap().unwrap();

        assert_eq!(
            submit(&mut pool, PROVIDER, 1_000, 99),
            Err(PoolError::BatchClosedOrInvalid(1))
        );
        assert_eq!(pool.batch(1).unwrap().unwrap(), before);

        // closing is idempotent-error
        assert_eq!(
            pool.close_current_batch(&CallContext::new(OWNER, 2)),
            Err(PoolError::BatchClosedOrInvalid(1))
        );
    }

    #[test]
    fn test_next_batch_accumulates_separately() {
        let mut pool = new_pool();
        submit(&mut pool, PROVIDER, 0, 10).unwrap();
        pool.close_current_batch(&CallContext::new(OWNER, 1)).unwrap();
        assert_eq!(pool.open_new_batch(&CallContext::new(OWNER, 2)).unwrap(), 2);

        assert_eq!(submit(&mut pool, PROVIDER, 100, 7), Ok(2));
        pool.close_current_batch(&CallContext::new(OWNER, 101)).unwrap();

        let oracle = pool.backend().oracle();
        let mut totals = Vec::new();
        for (batch_id, at) in [(1, 200), (2, 300)] {
            let id = pool
                .request_decryption(&CallContext::new(PROVIDER, at), batch_id)
                .unwrap();
            let job = pool.backend_mut().take_pending_jobs().pop().unwrap();
            let response = oracle.fulfil(&job).unwrap();
            totals.push(pool.handle_callback(id, &response.cleartext, &response.proof).unwrap());
        }
        assert_eq!(totals, vec![10, 7]);
    }
}

// =============================================================================
// SCENARIO B
// =============================================================================

mod scenario_b {
    use super::*;

    #[test]
    fn test_submission_cooldown() {
        let mut pool = new_pool();
        submit(&mut pool, PROVIDER, 500, 1).unwrap();

        let err = submit(&mut pool, PROVIDER, 500 + COOLDOWN - 1, 1).unwrap_err();
        assert_eq!(
            err,
            PoolError::CooldownActive {
                action: RateLimitedAction::Submission,
                remaining_secs: 1
            }
        );
        assert!(err.is_retryable());
        assert_eq!(pool.last_submission(&PROVIDER), Some(500));

        assert!(submit(&mut pool, PROVIDER, 500 + COOLDOWN, 1).is_ok());
        assert_eq!(pool.last_submission(&PROVIDER), Some(500 + COOLDOWN));
        assert_eq!(pool.batch(1).unwrap().unwrap().contribution_count, 2);
    }

    #[test]
    fn test_decryption_cooldown_is_independent() {
        let mut pool = new_pool();
        submit(&mut pool, PROVIDER, 10, 1).unwrap();
        pool.close_current_batch(&CallContext::new(OWNER, 11)).unwrap();

        // right after a submission, a decryption request is still allowed
        pool.request_decryption(&CallContext::new(PROVIDER, 12), 1).unwrap();
        assert!(matches!(
            pool.request_decryption(&CallContext::new(PROVIDER, 13), 1),
            Err(PoolError::CooldownActive {
                action: RateLimitedAction::DecryptionRequest,
                ..
            })
        ));
        assert_eq!(pool.last_decryption_request(&PROVIDER), Some(12));
    }
}

// =============================================================================
// SCENARIO C
// =============================================================================

mod scenario_c {
    use super::*;

    #[test]
    fn test_non_owner_rejected() {
        let mut pool = new_pool();
        let events_before = pool.events().len();

        for caller in [PROVIDER, OUTSIDER] {
            let ctx = CallContext::new(caller, 0);
            assert_eq!(pool.open_new_batch(&ctx), Err(PoolError::NotOwner(caller)));
            assert_eq!(pool.set_paused(&ctx, true), Err(PoolError::NotOwner(caller)));
            assert_eq!(
                pool.open_new_batch(&ctx).unwrap_err().category(),
                ErrorCategory::Authorization
            );
        }

        assert_eq!(pool.current_batch_id(), 1);
        assert!(!pool.is_paused());
        assert_eq!(pool.events().len(), events_before);
    }

    #[test]
    fn test_outsider_cannot_submit_or_request() {
        let mut pool = new_pool();
        assert_eq!(
            submit(&mut pool, OUTSIDER, 0, 1),
            Err(PoolError::NotAuthorizedProvider(OUTSIDER))
        );
        assert_eq!(
            pool.request_decryption(&CallContext::new(OUTSIDER, 0), 1),
            Err(PoolError::NotAuthorizedProvider(OUTSIDER))
        );
    }
}

// =============================================================================
// SCENARIO D
// =============================================================================

mod scenario_d {
    use super::*;

    #[test]
    fn test_pause_blocks_submission() {
        let mut pool = new_pool();
        pool.set_paused(&CallContext::new(OWNER, 0), true).unwrap();

        let err = submit(&mut pool, PROVIDER, 0, 1).unwrap_err();
        assert_eq!(err, PoolError::Paused);
        assert_eq!(err.category(), ErrorCategory::Availability);
        assert_eq!(pool.last_submission(&PROVIDER), None);

        pool.set_paused(&CallContext::new(OWNER, 1), false).unwrap();
        assert!(submit(&mut pool, PROVIDER, 2, 1).is_ok());
    }

    #[test]
    fn test_callbacks_still_land_while_paused() {
        let mut pool = new_pool();
        submit(&mut pool, PROVIDER, 0, 4).unwrap();
        pool.close_current_batch(&CallContext::new(OWNER, 1)).unwrap();
        let id = pool.request_decryption(&CallContext::new(PROVIDER, 2), 1).unwrap();
        pool.set_paused(&CallContext::new(OWNER, 3), true).unwrap();

        let job = pool.backend_mut().take_pending_jobs().pop().unwrap();
        let response = pool.backend().oracle().fulfil(&job).unwrap();
        assert_eq!(pool.handle_callback(id, &response.cleartext, &response.proof), Ok(4));
    }
}

// =============================================================================
// TAMPERING
// =============================================================================

mod tampering {
    use super::*;

    fn pending_request(pool: &mut ConfidentialPool<MockCompute>) -> cipherpool::pool::RequestId {
        submit(pool, PROVIDER, 0, 10).unwrap();
        pool.close_current_batch(&CallContext::new(OWNER, 1)).unwrap();
        pool.request_decryption(&CallContext::new(PROVIDER, 2), 1).unwrap()
    }

    #[test]
    fn test_state_drift_rejected_with_valid_proof() {
        let mut pool = new_pool();
        let id = pending_request(&mut pool);
        let job = pool.backend_mut().take_pending_jobs().pop().unwrap();
        let response = pool.backend().oracle().fulfil(&job).unwrap();

        let total = pool.ledger().batch(1).unwrap().accumulated().unwrap().clone();
        pool.backend().remap_handle(&total);

        let err = pool
            .handle_callback(id, &response.cleartext, &response.proof)
            .unwrap_err();
        assert_eq!(err, PoolError::StateMismatch(id));
        assert_eq!(err.category(), ErrorCategory::Integrity);
        assert!(!pool.decryption_context(id).unwrap().processed);
    }

    #[test]
    fn test_forged_proof_rejected() {
        let mut pool = new_pool();
        let id = pending_request(&mut pool);

        let cleartext = encode_cleartext_word(1_000_000);
        let forged = OracleSigner::from_seed([0x77; 32]).sign(id.value(), &cleartext);
        let err = pool.handle_callback(id, &cleartext, &forged).unwrap_err();
        assert_eq!(err, PoolError::InvalidSignature(id));
        assert_eq!(err.category(), ErrorCategory::Authenticity);
    }

    #[test]
    fn test_proof_for_other_request_rejected() {
        let mut pool = new_pool();
        let id = pending_request(&mut pool);
        let oracle = pool.backend().oracle();

        let cleartext = encode_cleartext_word(10);
        let wrong_id = oracle.attest(cipherpool::pool::RequestId::new(id.value() + 1), &cleartext);
        assert_eq!(
            pool.handle_callback(id, &cleartext, &wrong_id),
            Err(PoolError::InvalidSignature(id))
        );

        let right = oracle.attest(id, &cleartext);
        assert_eq!(pool.handle_callback(id, &cleartext, &right), Ok(10));
    }

    #[test]
    fn test_unavailable_backend_blocks_request() {
        let mut pool = new_pool();
        submit(&mut pool, PROVIDER, 0, 10).unwrap();
        pool.close_current_batch(&CallContext::new(OWNER, 1)).unwrap();
        pool.backend_mut().set_available(false);
        assert!(!pool.backend().is_ready());

        assert!(matches!(
            pool.request_decryption(&CallContext::new(PROVIDER, 2), 1),
            Err(PoolError::EncryptionUnavailable(_))
        ));
        assert_eq!(pool.last_decryption_request(&PROVIDER), None);
    }
}
