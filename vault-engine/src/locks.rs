//! Local double-spend protection: one build per vault address at a time, and
//! UTxOs held back from later builds until their transaction settles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use vault_types::{OutputRef, TxHash, VaultError, VaultResult};

#[derive(Default)]
pub struct InFlight {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl InFlight {
    /// Fails immediately instead of queueing behind the running build.
    pub fn try_acquire(&self, address: &str) -> VaultResult<OwnedMutexGuard<()>> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            // A slot only the map points at has no guard outstanding.
            slots.retain(|a, s| a == address || Arc::strong_count(s) > 1);
            slots.entry(address.to_string()).or_default().clone()
        };
        slot.try_lock_owned()
            .map_err(|_| VaultError::AlreadyInFlight(address.to_string()))
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub struct Reservations {
    ttl: Duration,
    /// `None` deadline: held until released.
    held: Mutex<HashMap<OutputRef, (TxHash, Option<Instant>)>>,
}

impl Reservations {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn reserve(&self, tx_id: TxHash, inputs: &[OutputRef]) {
        let until = Instant::now().checked_add(self.ttl);
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        for input in inputs {
            held.insert(*input, (tx_id, until));
        }
    }

    pub fn is_reserved(&self, out_ref: &OutputRef) -> bool {
        let now = Instant::now();
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.retain(|r, (tx, until)| {
            let live = until.map_or(true, |t| t > now);
            if !live {
                debug!(utxo = %r, tx = %tx, "reservation expired");
            }
            live
        });
        held.contains_key(out_ref)
    }

    /// Drop every reservation taken by `tx_id`. Returns how many were held.
    pub fn release(&self, tx_id: &TxHash) -> usize {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        let before = held.len();
        held.retain(|_, (tx, _)| *tx != *tx_id);
        before - held.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let inflight = InFlight::default();
        let guard = inflight.try_acquire("addr_a").unwrap();
        assert!(matches!(
            inflight.try_acquire("addr_a"),
            Err(VaultError::AlreadyInFlight(_))
        ));
        assert!(inflight.try_acquire("addr_b").is_ok());
        drop(guard);
        assert!(inflight.try_acquire("addr_a").is_ok());
    }

    #[tokio::test]
    async fn idle_slots_are_pruned() {
        let inflight = InFlight::default();
        for i in 0..100 {
            drop(inflight.try_acquire(&format!("addr_{i}")).unwrap());
        }
        assert_eq!(inflight.tracked(), 1);

        let held = inflight.try_acquire("addr_held").unwrap();
        drop(inflight.try_acquire("addr_other").unwrap());
        assert_eq!(inflight.tracked(), 2);
        assert!(inflight.try_acquire("addr_held").is_err());
        drop(held);
    }

    #[test]
    fn reservations_release_and_expire() {
        let tx = TxHash([1; 32]);
        let utxo = OutputRef::new(TxHash([2; 32]), 0);

        let reservations = Reservations::new(Duration::from_secs(60));
        reservations.reserve(tx, &[utxo]);
        assert!(reservations.is_reserved(&utxo));
        assert_eq!(reservations.release(&tx), 1);
        assert!(!reservations.is_reserved(&utxo));

        let expiring = Reservations::new(Duration::ZERO);
        expiring.reserve(tx, &[utxo]);
        assert!(!expiring.is_reserved(&utxo));
    }

    #[test]
    fn unrepresentable_ttl_holds_until_release() {
        let tx = TxHash([3; 32]);
        let utxo = OutputRef::new(TxHash([4; 32]), 1);
        let reservations = Reservations::new(Duration::MAX);
        reservations.reserve(tx, &[utxo]);
        assert!(reservations.is_reserved(&utxo));
        assert_eq!(reservations.release(&tx), 1);
        assert!(!reservations.is_reserved(&utxo));
    }
}
