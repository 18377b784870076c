use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Money;

/// Scatter-triggered bonus state.
///
/// Every mutation bumps `lock_version`; stores reject writes made against a stale version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSpinsSession {
    pub id: Uuid,
    pub player_id: Uuid,
    pub game_session_id: Uuid,
    pub pf_session_id: Uuid,
    pub total_awarded: u32,
    pub completed: u32,
    pub remaining: u32,
    pub locked_bet: Money,
    pub total_won: Money,
    pub lock_version: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl FreeSpinsSession {
    pub fn new(
        player_id: Uuid,
        game_session_id: Uuid,
        pf_session_id: Uuid,
        awarded: u32,
        locked_bet: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            player_id,
            game_session_id,
            pf_session_id,
            total_awarded: awarded,
            completed: 0,
            remaining: awarded,
            locked_bet,
            total_won: Money::ZERO,
            lock_version: 0,
            is_active: awarded > 0,
            created_at,
        }
    }

    /// Claim one spin. Returns the next state, or `None` when nothing remains.
    pub fn claim_spin(&self) -> Option<Self> {
        if !self.is_active || self.remaining == 0 {
            return None;
        }
        let mut next = self.clone();
        next.remaining -= 1;
        next.completed += 1;
        next.lock_version += 1;
        Some(next)
    }

    /// Undo a claim made by [`Self::claim_spin`] after the spin failed.
    pub fn release_spin(&self) -> Self {
        let mut next = self.clone();
        next.remaining += 1;
        next.completed = next.completed.saturating_sub(1);
        next.is_active = true;
        next.lock_version += 1;
        next
    }

    /// Record the win of a completed spin and any retriggered spins.
    pub fn settle_spin(&self, won: Money, retriggered: u32) -> Option<Self> {
        let mut next = self.clone();
        next.total_won = next.total_won.checked_add(won)?;
        next.total_awarded = next.total_awarded.checked_add(retriggered)?;
        next.remaining = next.remaining.checked_add(retriggered)?;
        next.is_active = next.remaining > 0;
        next.lock_version += 1;
        Some(next)
    }
}
