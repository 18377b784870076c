//! Replaying spins against a server seed.
//!
//! The pure functions here need nothing but the revealed payload (and, for reel positions,
//! the strip sets), so a player can run them without trusting the operator. The
//! [`SessionManager`] methods do the same checks server-side with the sealed seed, without
//! revealing it.

use fairreel_types::{
    pf::{PayloadSpin, ServerSeed, SpinCheck, VerificationPayload, VerificationReport},
    slot::{GameMode, ReelStripError, ReelStripSet, REEL_COUNT},
};
use std::collections::{HashMap, HashSet};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    engine::ReelGridGenerator,
    error::{Error, Result},
    hash_chain::{
        generate_initial_prev_spin_hash, generate_spin_hash, nonce_at, verify_commitment,
        verify_theta,
    },
    rng::HkdfStreamRng,
    session::SessionManager,
    state::{FastCache, PfStore, ReelStripRepository},
};

/// Check that `spin.spin_hash` follows from its recorded `prev_spin_hash`.
pub fn verify_spin(seed: &ServerSeed, spin: &PayloadSpin) -> SpinCheck {
    check_spin(seed, spin, &spin.prev_spin_hash, None)
}

/// [`verify_spin`], and also re-derive the reel stops from `strips`.
pub fn verify_spin_with_reel(
    seed: &ServerSeed,
    spin: &PayloadSpin,
    strips: &ReelStripSet,
) -> Result<SpinCheck, ReelStripError> {
    strips.verify()?;
    Ok(check_spin(seed, spin, &spin.prev_spin_hash, Some(strips)))
}

/// Recompute the stops a spin must have landed on.
///
/// `None` if the recorded inputs cannot seed the RNG at all (e.g. a malformed prev hash).
pub fn expected_positions(
    seed: &ServerSeed,
    spin: &PayloadSpin,
    prev_spin_hash: &str,
    strips: &ReelStripSet,
) -> Option<[usize; REEL_COUNT]> {
    let mut rng = HkdfStreamRng::new(seed, &spin.client_seed, spin.nonce, prev_spin_hash).ok()?;
    // Rows do not affect the stop draws.
    ReelGridGenerator::new(strips, 1)
        .draw_positions(&mut rng)
        .ok()
}

fn check_spin(
    seed: &ServerSeed,
    spin: &PayloadSpin,
    prev_spin_hash: &str,
    strips: Option<&ReelStripSet>,
) -> SpinCheck {
    // A voided spin paid nothing, so only its place in the chain is checked.
    let strips = strips.filter(|_| !spin.voided);
    let expected_spin_hash = generate_spin_hash(prev_spin_hash, seed, &spin.client_seed, spin.nonce);
    let hash_valid = expected_spin_hash.eq_ignore_ascii_case(&spin.spin_hash)
        && prev_spin_hash.eq_ignore_ascii_case(&spin.prev_spin_hash);
    let expected_reel_positions =
        strips.and_then(|strips| expected_positions(seed, spin, prev_spin_hash, strips));
    let positions_valid = strips.map(|_| expected_reel_positions == Some(spin.reel_positions));
    SpinCheck {
        spin_index: spin.spin_index,
        nonce: spin.nonce,
        hash_valid,
        positions_valid,
        expected_spin_hash,
        expected_reel_positions,
    }
}

/// Verify a complete revealed session.
///
/// The chain is replayed from its start, so a tampered spin is reported at its own index
/// even though every later recorded hash still links to it. Reel positions are checked for
/// every spin whose `(game_mode, reel_strip_config_id)` is found in `strips`.
pub fn verify_payload(payload: &VerificationPayload, strips: &[ReelStripSet]) -> VerificationReport {
    let mut report = VerificationReport::default();
    let seed = match ServerSeed::parse(&payload.server_seed) {
        Ok(seed) => seed,
        Err(err) => {
            report.commitment_valid = Some(false);
            report.diagnostic(format!("server seed: {err}"));
            return report.finish();
        }
    };
    let commitment_valid = verify_commitment(&seed, &payload.server_seed_hash);
    report.commitment_valid = Some(commitment_valid);
    if !commitment_valid {
        report.diagnostic("server seed does not hash to server_seed_hash");
    }

    let theta_commitment = payload
        .theta_commitment
        .as_deref()
        .filter(|commitment| !commitment.is_empty());
    match (theta_commitment, payload.theta_seed.as_deref()) {
        (Some(commitment), Some(theta)) => {
            let valid = verify_theta(theta, commitment);
            report.theta_valid = Some(valid);
            if !valid {
                report.diagnostic("theta seed does not hash to theta_commitment");
            }
        }
        (Some(_), None) if !payload.spins.is_empty() => {
            report.theta_valid = Some(false);
            report.diagnostic("theta commitment present but theta seed was never revealed");
        }
        _ => {}
    }

    let mut usable = HashMap::new();
    for set in strips {
        match set.verify() {
            Ok(()) => {
                usable.insert((set.game_mode, set.config_id.as_str()), set);
            }
            Err(err) => {
                report.diagnostic(format!("reel strips {}: {err}", set.config_id));
            }
        }
    }

    let mut prev = generate_initial_prev_spin_hash(&payload.server_seed_hash, theta_commitment);
    for (index, spin) in payload.spins.iter().enumerate() {
        let expected_nonce = nonce_at(index);
        if spin.nonce != expected_nonce || spin.spin_index != index as u64 {
            report.diagnostic(format!(
                "spin {index}: recorded as index {} nonce {}, expected nonce {expected_nonce}",
                spin.spin_index, spin.nonce
            ));
        }
        let set = usable
            .get(&(spin.game_mode, spin.reel_strip_config_id.as_str()))
            .copied();
        let mut check = check_spin(&seed, spin, &prev, set);
        // Report the position in the log, whatever index the record claims.
        check.spin_index = index as u64;
        prev = check.expected_spin_hash.clone();
        report.spins.push(check);
    }
    report.finish()
}

impl<S, C> SessionManager<S, C>
where
    S: PfStore + ReelStripRepository,
    C: FastCache,
{
    async fn verified_strips(&self, mode: GameMode, config_id: &str) -> Result<Option<ReelStripSet>> {
        let Some(set) = self
            .store()
            .strips(mode, config_id)
            .await
            .map_err(Error::Store)?
        else {
            return Ok(None);
        };
        if let Err(err) = set.verify() {
            error!(%mode, config_id, %err, "reel strip integrity check failed");
            return Err(err.into());
        }
        Ok(Some(set))
    }

    /// Check one recorded spin of a live session without revealing its seed.
    pub async fn verify_active_spin(&self, session_id: Uuid, spin_index: u64) -> Result<SpinCheck> {
        let record = self
            .store()
            .load_session(session_id)
            .await
            .map_err(Error::Store)?
            .ok_or(Error::SessionNotFound(session_id))?;
        let state = self.recover(record)?;
        let spin = self
            .store()
            .spin(session_id, spin_index)
            .await
            .map_err(Error::Store)?
            .ok_or(Error::SpinNotFound {
                session_id,
                spin_index,
            })?;
        let spin = PayloadSpin::from(&spin);
        let strips = self
            .verified_strips(spin.game_mode, &spin.reel_strip_config_id)
            .await?;
        let check = check_spin(&state.server_seed, &spin, &spin.prev_spin_hash, strips.as_ref());
        if !check.is_valid() {
            error!(pf_session = %session_id, spin_index, "recorded spin failed verification");
        }
        Ok(check)
    }

    /// Replay a session's whole chain server-side.
    pub async fn verify_session(&self, session_id: Uuid) -> Result<VerificationReport> {
        let record = self
            .store()
            .load_session(session_id)
            .await
            .map_err(Error::Store)?
            .ok_or(Error::SessionNotFound(session_id))?;
        let state = self.recover(record)?;
        let spins = self.store().spins(session_id).await.map_err(Error::Store)?;

        let mut strips = Vec::new();
        let mut seen = HashSet::new();
        for spin in &spins {
            if !seen.insert((spin.game_mode, spin.reel_strip_config_id.clone())) {
                continue;
            }
            match self
                .verified_strips(spin.game_mode, &spin.reel_strip_config_id)
                .await?
            {
                Some(set) => strips.push(set),
                None => warn!(
                    pf_session = %session_id,
                    config_id = %spin.reel_strip_config_id,
                    "reel strips missing, positions not checked"
                ),
            }
        }

        let session = &state.session;
        let payload = VerificationPayload {
            session_id,
            server_seed: state.server_seed.to_hex(),
            server_seed_hash: session.server_seed_hash.clone(),
            theta_commitment: session.theta_commitment.clone(),
            theta_seed: session.theta_seed.clone(),
            spins: spins.iter().map(PayloadSpin::from).collect(),
        };
        let mut report = verify_payload(&payload, &strips);
        let recorded = spins.len() as u64;
        if recorded != session.total_spins() {
            report.diagnostic(format!(
                "session advanced {} nonces but {recorded} spins are logged",
                session.total_spins()
            ));
        }
        if let Some(last) = spins.last() {
            if !last.spin_hash.eq_ignore_ascii_case(&session.last_spin_hash) {
                report.diagnostic("session head does not match the last logged spin");
            }
        }
        let report = report.finish();

        if report.valid {
            info!(pf_session = %session_id, spins = recorded, "session verified");
        } else {
            error!(
                pf_session = %session_id,
                first_invalid_spin = ?report.first_invalid_spin,
                diagnostics = ?report.diagnostics,
                "session failed verification"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hash_chain::hash_server_seed, mocks::fixture_strips};
    use fairreel_types::pf::ClientSeedSource;

    fn seed() -> ServerSeed {
        ServerSeed::from_bytes([9u8; 32])
    }

    fn spin_at(seed: &ServerSeed, prev: &str, index: u64, strips: &ReelStripSet) -> PayloadSpin {
        let nonce = index + 1;
        let client_seed = format!("client-{index}");
        let mut spin = PayloadSpin {
            spin_index: index,
            nonce,
            client_seed: client_seed.clone(),
            client_seed_source: ClientSeedSource::Player,
            spin_hash: generate_spin_hash(prev, seed, &client_seed, nonce),
            prev_spin_hash: prev.to_string(),
            reel_positions: [0; 5],
            reel_strip_config_id: strips.config_id.clone(),
            game_mode: strips.game_mode,
            is_free_spin: false,
            voided: false,
        };
        spin.reel_positions = expected_positions(seed, &spin, prev, strips).unwrap();
        spin
    }

    fn payload(len: u64) -> (VerificationPayload, ReelStripSet) {
        let seed = seed();
        let strips = fixture_strips(GameMode::Base);
        let hash = hash_server_seed(&seed);
        let mut prev = hash.clone();
        let mut spins = Vec::new();
        for index in 0..len {
            let spin = spin_at(&seed, &prev, index, &strips);
            prev = spin.spin_hash.clone();
            spins.push(spin);
        }
        let payload = VerificationPayload {
            session_id: Uuid::new_v4(),
            server_seed: seed.to_hex(),
            server_seed_hash: hash,
            theta_commitment: None,
            theta_seed: None,
            spins,
        };
        (payload, strips)
    }

    #[test]
    fn test_valid_payload() {
        let (payload, strips) = payload(4);
        let report = verify_payload(&payload, std::slice::from_ref(&strips));
        assert!(report.valid, "{report:?}");
        assert_eq!(report.commitment_valid, Some(true));
        assert_eq!(report.theta_valid, None);
        assert!(report
            .spins
            .iter()
            .all(|check| check.positions_valid == Some(true)));
    }

    #[test]
    fn test_positions_unchecked_without_strips() {
        let (payload, _) = payload(2);
        let report = verify_payload(&payload, &[]);
        assert!(report.valid);
        assert!(report.spins.iter().all(|check| check.positions_valid.is_none()));
    }

    #[test]
    fn test_wrong_seed_is_reported_not_raised() {
        let (mut payload, strips) = payload(2);
        payload.server_seed = hex::encode([1u8; 32]);
        let report = verify_payload(&payload, &[strips]);
        assert!(!report.valid);
        assert_eq!(report.commitment_valid, Some(false));

        payload.server_seed = "not hex".into();
        let report = verify_payload(&payload, &[]);
        assert!(!report.valid);
        assert!(report.spins.is_empty());
    }

    #[test]
    fn test_moved_reel_position_is_caught() {
        let (mut payload, strips) = payload(3);
        let moved = &mut payload.spins[1].reel_positions[2];
        *moved = (*moved + 1) % strips.strip(2).len();
        let report = verify_payload(&payload, &[strips]);
        assert!(!report.valid);
        assert_eq!(report.first_invalid_spin, Some(1));
        assert!(report.spins[1].hash_valid);
        assert_eq!(report.spins[1].positions_valid, Some(false));
    }

    #[test]
    fn test_voided_spin_keeps_chain_without_positions() {
        let (mut payload, strips) = payload(3);
        payload.spins[1].voided = true;
        payload.spins[1].reel_positions = [0; 5];
        let report = verify_payload(&payload, std::slice::from_ref(&strips));
        assert!(report.valid, "{report:?}");
        assert!(report.spins[1].hash_valid);
        assert_eq!(report.spins[1].positions_valid, None);
        assert_eq!(report.spins[2].positions_valid, Some(true));

        // The flag does not excuse a broken link.
        payload.spins[1].client_seed = "forged".into();
        let report = verify_payload(&payload, &[strips]);
        assert_eq!(report.first_invalid_spin, Some(1));
    }

    #[test]
    fn test_tampered_strips_are_diagnosed() {
        let (payload, mut strips) = payload(1);
        strips.strips[0].swap(0, 1);
        let report = verify_payload(&payload, &[strips]);
        assert!(!report.valid);
        assert_eq!(report.diagnostics.len(), 1);
        // Positions could not be checked against a tampered set.
        assert_eq!(report.spins[0].positions_valid, None);
    }

    #[test]
    fn test_nonce_gap_is_diagnosed() {
        let (mut payload, strips) = payload(3);
        payload.spins.remove(1);
        let report = verify_payload(&payload, &[strips]);
        assert!(!report.valid);
        assert_eq!(report.first_invalid_spin, Some(1));
        assert!(!report.diagnostics.is_empty());
    }

    #[test]
    fn test_missing_theta_reveal() {
        let (mut payload, strips) = payload(0);
        payload.theta_commitment = Some(hex::encode([4u8; 32]));
        // No spins: nothing depended on theta yet.
        assert!(verify_payload(&payload, std::slice::from_ref(&strips)).valid);
    }

    #[test]
    fn test_single_spin_checks() {
        let seed = seed();
        let strips = fixture_strips(GameMode::Base);
        let spin = spin_at(&seed, &hash_server_seed(&seed), 0, &strips);
        assert!(verify_spin(&seed, &spin).is_valid());
        assert!(verify_spin_with_reel(&seed, &spin, &strips).unwrap().is_valid());

        let mut forged = spin.clone();
        forged.client_seed = "other".into();
        let check = verify_spin(&seed, &forged);
        assert!(!check.hash_valid);
        assert_eq!(check.expected_spin_hash.len(), 64);

        let mut tampered = strips.clone();
        tampered.strips[4].reverse();
        assert!(verify_spin_with_reel(&seed, &spin, &tampered).is_err());
    }
}
