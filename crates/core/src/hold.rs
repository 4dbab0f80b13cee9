use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::model::{PageRef, Slot};

/// Process-wide gate guaranteeing at most one held seeker reservation.
///
/// Cloning shares the same flag. A [`HoldPermit`] is the only way to set it and
/// dropping the permit is the only way to clear it.
#[derive(Clone, Debug, Default)]
pub struct HoldGate {
    held: Arc<AtomicBool>,
}

impl HoldGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the gate if it is free.
    pub fn try_acquire(&self) -> Option<HoldPermit> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| HoldPermit {
                held: Arc::clone(&self.held),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Exclusive right to book a seeker slot. Releases the gate on drop.
#[derive(Debug)]
pub struct HoldPermit {
    held: Arc<AtomicBool>,
}

impl HoldPermit {
    /// Attaches the reservation that was just made under this permit.
    pub fn bind(self, slot: Slot, page: PageRef, section: impl Into<String>) -> HeldReservation {
        HeldReservation {
            slot,
            page,
            section: section.into(),
            _permit: self,
        }
    }
}

impl Drop for HoldPermit {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
        debug!("hold gate released");
    }
}

/// The single in-flight seeker reservation awaiting relocation.
///
/// Owned by the transfer task; dropping it clears the gate so searching can
/// resume. The physical reservation on the server is unaffected.
#[derive(Debug)]
pub struct HeldReservation {
    pub slot: Slot,
    pub page: PageRef,
    pub section: String,
    _permit: HoldPermit,
}
