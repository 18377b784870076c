//! End-to-end verification scenarios.
//!
//! Sessions are played through the orchestrator, revealed, and then checked the way a
//! player would check them: from the exported JSON payload and the published reel strips
//! alone.

#[cfg(test)]
mod tests {
    use crate::{
        config::ValidatedGameConfig,
        engine::CascadeEngine,
        error::{Error, ErrorClass},
        hash_chain::{generate_spin_hash, hash_server_seed, hash_theta_seed},
        mocks::{fixture_strips, test_game_config, Harness},
        rng::HkdfStreamRng,
        verify::{expected_positions, verify_payload, verify_spin},
    };
    use fairreel_types::{
        pf::{ClientSeedSource, PayloadSpin, ServerSeed, VerificationPayload},
        slot::{GameMode, ReelStripSet},
        Money,
    };
    use proptest::prelude::*;
    use uuid::Uuid;

    const THETA: &str = "verification theta";

    fn published_strips() -> Vec<ReelStripSet> {
        vec![
            fixture_strips(GameMode::Base),
            fixture_strips(GameMode::BonusBuy),
        ]
    }

    /// Plays `spins` paid spins (every third one a bonus buy) in a theta session.
    async fn played_session(spins: u64) -> (Harness, Uuid) {
        let harness = Harness::new(Money::from_minor(10_000_000));
        let session = harness
            .start_session(Some(&hash_theta_seed(THETA)))
            .await;
        for index in 0..spins {
            let mode = if index % 3 == 2 {
                GameMode::BonusBuy
            } else {
                GameMode::Base
            };
            let mut request = harness.spin(100, mode);
            request.client_seed = Some(format!("seed-{index}"));
            if index == 0 {
                request.theta_seed = Some(THETA.to_string());
            }
            harness
                .orchestrator
                .execute_base_spin(request)
                .await
                .unwrap();
        }
        (harness, session.id)
    }

    #[tokio::test]
    async fn test_revealed_session_verifies() {
        let (harness, session_id) = played_session(6).await;
        let sessions = harness.orchestrator.sessions();

        assert!(matches!(
            sessions.verification_payload(session_id).await,
            Err(Error::SeedNotRevealed(_))
        ));
        assert!(matches!(
            sessions.verification_payload(Uuid::new_v4()).await,
            Err(Error::SessionNotFound(_))
        ));

        let audit = harness.orchestrator.end_session(session_id).await.unwrap();
        assert_eq!(audit.total_spins, 6);
        assert_eq!(audit.theta_seed.as_deref(), Some(THETA));

        let payload = sessions.verification_payload(session_id).await.unwrap();
        assert_eq!(payload.spins.len(), 6);
        assert_eq!(payload.server_seed, audit.server_seed.to_hex());

        // What the player downloads.
        let json = serde_json::to_string(&payload).unwrap();
        let downloaded: VerificationPayload = serde_json::from_str(&json).unwrap();
        let report = verify_payload(&downloaded, &published_strips());
        assert!(report.valid, "{report:?}");
        assert_eq!(report.commitment_valid, Some(true));
        assert_eq!(report.theta_valid, Some(true));
        assert_eq!(report.first_invalid_spin, None);
        assert!(report
            .spins
            .iter()
            .all(|check| check.hash_valid && check.positions_valid == Some(true)));
    }

    #[tokio::test]
    async fn test_outcome_hashes_match_revealed_seed() {
        let (harness, session_id) = played_session(1).await;
        let outcome = harness.store.history().pop().unwrap();
        let audit = harness.orchestrator.end_session(session_id).await.unwrap();
        assert_eq!(
            generate_spin_hash(
                &outcome.prev_spin_hash,
                &audit.server_seed,
                &outcome.client_seed,
                outcome.nonce
            ),
            outcome.spin_hash
        );
        assert_eq!(hash_server_seed(&audit.server_seed), audit.server_seed_hash);
    }

    #[tokio::test]
    async fn test_tampered_spin_is_located() {
        let (harness, session_id) = played_session(5).await;
        harness.orchestrator.end_session(session_id).await.unwrap();
        harness.store.tamper_spin(session_id, 2, |spin| {
            spin.client_seed = "forged".to_string();
        });

        let payload = harness
            .orchestrator
            .sessions()
            .verification_payload(session_id)
            .await
            .unwrap();
        let report = verify_payload(&payload, &published_strips());
        assert!(!report.valid);
        assert_eq!(report.commitment_valid, Some(true));
        assert_eq!(report.first_invalid_spin, Some(2));
        assert!(report.spins[..2].iter().all(|check| check.is_valid()));
        assert!(!report.spins[2].hash_valid);
    }

    #[tokio::test]
    async fn test_wrong_theta_reveal_is_reported() {
        let (harness, session_id) = played_session(2).await;
        harness.orchestrator.end_session(session_id).await.unwrap();
        let mut payload = harness
            .orchestrator
            .sessions()
            .verification_payload(session_id)
            .await
            .unwrap();
        payload.theta_seed = Some("something else".to_string());
        let report = verify_payload(&payload, &published_strips());
        assert!(!report.valid);
        assert_eq!(report.theta_valid, Some(false));
        // The chain itself is intact.
        assert_eq!(report.first_invalid_spin, None);
    }

    #[tokio::test]
    async fn test_server_side_verification_of_live_session() {
        let (harness, session_id) = played_session(4).await;
        let sessions = harness.orchestrator.sessions();

        let report = sessions.verify_session(session_id).await.unwrap();
        assert!(report.valid, "{report:?}");
        assert_eq!(report.spins.len(), 4);

        let check = sessions.verify_active_spin(session_id, 3).await.unwrap();
        assert!(check.is_valid());
        assert_eq!(check.positions_valid, Some(true));
        assert!(matches!(
            sessions.verify_active_spin(session_id, 99).await,
            Err(Error::SpinNotFound { spin_index: 99, .. })
        ));

        harness.store.tamper_spin(session_id, 1, |spin| {
            spin.reel_positions[0] += 1;
        });
        let report = sessions.verify_session(session_id).await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_invalid_spin, Some(1));
        assert_eq!(report.spins[1].positions_valid, Some(false));
        assert!(!sessions
            .verify_active_spin(session_id, 1)
            .await
            .unwrap()
            .is_valid());
    }

    #[tokio::test]
    async fn test_tampered_strips_are_an_integrity_error() {
        let (harness, session_id) = played_session(1).await;
        let config_id = fixture_strips(GameMode::Base).config_id;
        harness
            .store
            .tamper_strips(GameMode::Base, &config_id, |set| set.strips[0].swap(0, 1));

        let err = harness
            .orchestrator
            .sessions()
            .verify_session(session_id)
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Integrity);

        let err = harness
            .orchestrator
            .execute_base_spin(harness.spin(100, GameMode::Base))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReelStrip(_)));
        assert_eq!(harness.store.spin_count(session_id), 1);
    }

    #[tokio::test]
    async fn test_server_client_seed_spins_verify() {
        let harness = Harness::new(Money::from_minor(10_000));
        let session = harness.start_session(None).await;
        let mut request = harness.spin(100, GameMode::Base);
        request.client_seed = None;
        harness
            .orchestrator
            .execute_base_spin(request)
            .await
            .unwrap();
        harness.orchestrator.end_session(session.id).await.unwrap();

        let payload = harness
            .orchestrator
            .sessions()
            .verification_payload(session.id)
            .await
            .unwrap();
        assert_eq!(payload.spins[0].client_seed_source, ClientSeedSource::Server);
        assert!(verify_payload(&payload, &published_strips()).valid);
    }

    fn replay(
        config: &ValidatedGameConfig,
        strips: &ReelStripSet,
        seed: &ServerSeed,
        client_seed: &str,
        nonce: u64,
    ) -> fairreel_types::slot::CascadeOutcome {
        let prev = hash_server_seed(seed);
        let mut rng = HkdfStreamRng::new(seed, client_seed, nonce, &prev).unwrap();
        CascadeEngine::new(config, strips, strips.game_mode)
            .run(&mut rng, Money::from_minor(100))
            .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn replayed_inputs_reproduce_the_spin(
            seed in any::<[u8; 32]>(),
            client_seed in "[a-z0-9]{1,24}",
            nonce in 1u64..10_000,
        ) {
            let config = test_game_config();
            let strips = fixture_strips(GameMode::Base);
            let seed = ServerSeed::from_bytes(seed);

            let first = replay(&config, &strips, &seed, &client_seed, nonce);
            let second = replay(&config, &strips, &seed, &client_seed, nonce);
            prop_assert_eq!(&first, &second);

            let prev = hash_server_seed(&seed);
            let spin = PayloadSpin {
                spin_index: nonce - 1,
                nonce,
                client_seed: client_seed.clone(),
                client_seed_source: ClientSeedSource::Player,
                spin_hash: generate_spin_hash(&prev, &seed, &client_seed, nonce),
                prev_spin_hash: prev.clone(),
                reel_positions: first.reel_positions,
                reel_strip_config_id: strips.config_id.clone(),
                game_mode: GameMode::Base,
                is_free_spin: false,
                voided: false,
            };
            prop_assert!(verify_spin(&seed, &spin).is_valid());
            prop_assert_eq!(
                expected_positions(&seed, &spin, &prev, &strips),
                Some(first.reel_positions)
            );
        }
    }
}
