//! End-to-end registration scenarios against a real SQLite file

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use clancore::{
    AdminError, AdminService, ClanRepository, Decision, Effect, NewPendingRegistration, NewPlayer, PlayerStatus,
    RegistrationFlow, RegistrationState, RepositoryError, Reply, ReviewOutcome,
};
use common::{applicant, register, temp_repository, LEADER_ID};
use pretty_assertions::assert_eq;

#[test]
fn test_application_is_approved_and_listed() {
    let (_dir, repo) = temp_repository();
    let flow = RegistrationFlow::new(repo.clone());
    let admin = AdminService::new(repo.clone(), LEADER_ID);

    let submitted = register(&flow, &applicant(100, "dragon"), "DragonSlayer");
    assert_eq!(
        submitted.reply,
        Reply::Submitted {
            nickname: "DragonSlayer".to_string()
        }
    );
    let pending = match submitted.effect {
        Some(Effect::NotifyAdmin(pending)) => pending,
        other => panic!("expected an admin notification, got {:?}", other),
    };

    let report = admin.pending_report(LEADER_ID).expect("pending report");
    assert!(report.contains("Pending applications (1)"));
    assert!(report.contains("DragonSlayer"));

    let outcome = admin
        .review(pending.id, LEADER_ID, Decision::Approve)
        .expect("approval");
    let player = match &outcome {
        ReviewOutcome::Approved(player) => player.clone(),
        other => panic!("expected approval, got {:?}", other),
    };
    assert_eq!(player.nickname, "DragonSlayer");
    assert_eq!(player.status, PlayerStatus::Active);
    assert_eq!(
        outcome.submitter_state(),
        RegistrationState::Approved {
            nickname: "DragonSlayer".to_string()
        }
    );

    let active = repo.list_players(Some(PlayerStatus::Active)).expect("list");
    assert_eq!(active, vec![player]);
    assert!(admin.list_report(LEADER_ID, "").expect("list report").contains("DragonSlayer"));
    assert!(admin.pending_report(LEADER_ID).expect("pending report").contains("No pending"));
}

#[test]
fn test_same_nickname_from_another_user_is_refused() {
    let (_dir, repo) = temp_repository();
    let flow = RegistrationFlow::new(repo.clone());

    register(&flow, &applicant(100, "first"), "DragonSlayer");
    let second = register(&flow, &applicant(200, "second"), "dragonslayer");

    // Refused at the nickname step, so the last event (the photo) only re-prompts.
    assert_eq!(second.next, RegistrationState::AwaitingNickname);
    assert_eq!(second.effect, None);
    assert_eq!(repo.list_pending().expect("list").len(), 1);
    assert!(repo.pending_for_user(200).expect("lookup").is_none());
}

#[test]
fn test_second_approval_is_refused() {
    let (_dir, repo) = temp_repository();
    let flow = RegistrationFlow::new(repo.clone());
    let admin = AdminService::new(repo.clone(), LEADER_ID);

    let pending_id = match register(&flow, &applicant(100, "dragon"), "DragonSlayer").next {
        RegistrationState::PendingReview { pending_id, .. } => pending_id,
        other => panic!("unexpected state {:?}", other),
    };

    admin.review(pending_id, LEADER_ID, Decision::Approve).expect("first approval");
    let err = admin.review(pending_id, LEADER_ID, Decision::Approve).unwrap_err();
    assert!(matches!(
        err,
        AdminError::Repository(RepositoryError::AlreadyResolved { .. })
    ));
    assert_eq!(repo.list_players(None).expect("list").len(), 1);
}

#[test]
fn test_exclusion_is_recorded_once() {
    let (_dir, repo) = temp_repository();
    let flow = RegistrationFlow::new(repo.clone());
    let admin = AdminService::new(repo.clone(), LEADER_ID);

    let pending = repo.list_pending().expect("list");
    assert!(pending.is_empty());
    register(&flow, &applicant(100, "dragon"), "DragonSlayer");
    let pending = repo.list_pending().expect("list");
    admin.review(pending[0].id, LEADER_ID, Decision::Approve).expect("approval");

    let excluded = admin
        .exclude(LEADER_ID, "DragonSlayer \"inactive\"")
        .expect("exclusion");
    assert_eq!(excluded.status, PlayerStatus::Excluded);
    assert_eq!(excluded.exclusion_reason.as_deref(), Some("inactive"));
    assert_eq!(excluded.excluded_by, Some(LEADER_ID));

    let listed = repo.list_players(Some(PlayerStatus::Excluded)).expect("list");
    assert_eq!(listed, vec![excluded]);

    let again = admin.exclude(LEADER_ID, "DragonSlayer \"inactive\"").unwrap_err();
    assert!(matches!(
        again,
        AdminError::Repository(RepositoryError::AlreadyExcluded { .. })
    ));

    // The excluded user can come back, but not under the old nickname.
    let retry = register(&flow, &applicant(100, "dragon"), "DragonSlayer");
    assert_eq!(retry.next, RegistrationState::AwaitingNickname);
    let retry = register(&flow, &applicant(100, "dragon"), "DragonReborn");
    assert!(matches!(retry.next, RegistrationState::PendingReview { .. }));
}

#[test]
fn test_rejected_applicant_may_apply_again() {
    let (_dir, repo) = temp_repository();
    let flow = RegistrationFlow::new(repo.clone());
    let admin = AdminService::new(repo.clone(), LEADER_ID);
    let who = applicant(100, "dragon");

    let first = register(&flow, &who, "DragonSlayer");
    let pending_id = match first.next {
        RegistrationState::PendingReview { pending_id, .. } => pending_id,
        other => panic!("unexpected state {:?}", other),
    };
    let outcome = admin.review(pending_id, LEADER_ID, Decision::Reject).expect("rejection");
    assert!(repo.list_players(None).expect("list").is_empty());

    let t = flow.handle(&outcome.submitter_state(), &who, clancore::RegistrationEvent::Register);
    assert_eq!(t.next, RegistrationState::AwaitingNickname);

    let second = register(&flow, &who, "DragonSlayer");
    assert!(matches!(second.effect, Some(Effect::NotifyAdmin(_))));
}

#[test]
fn test_concurrent_applications_leave_one_pending_entry() {
    const THREADS: usize = 8;

    let (_dir, repo) = temp_repository();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let repo = repo.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                repo.create_pending(NewPendingRegistration {
                    external_id: 100,
                    handle: "@dragon".to_string(),
                    nickname: format!("Dragon{}", i),
                    screenshot_ref: format!("shot-{}", i),
                })
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();

    let created = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(RepositoryError::DuplicatePending { external_id: 100 })))
        .count();
    assert_eq!(created, 1);
    assert_eq!(duplicates, THREADS - 1);
    assert_eq!(repo.list_pending().expect("list").len(), 1);
}

#[test]
fn test_concurrent_same_nickname_from_different_users() {
    const THREADS: usize = 6;

    let (_dir, repo) = temp_repository();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let repo = repo.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                repo.create_pending(NewPendingRegistration {
                    external_id: 1000 + i as i64,
                    handle: format!("@user{}", i),
                    nickname: "DragonSlayer".to_string(),
                    screenshot_ref: format!("shot-{}", i),
                })
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(RepositoryError::NicknameTaken { .. }))));
}

#[test]
fn test_concurrent_reviews_resolve_once() {
    const THREADS: usize = 6;
    const ROUNDS: i64 = 5;

    let (_dir, repo) = temp_repository();

    for round in 0..ROUNDS {
        let pending = repo
            .create_pending(NewPendingRegistration {
                external_id: 500 + round,
                handle: format!("@racer{}", round),
                nickname: format!("Racer{}", round),
                screenshot_ref: format!("shot-{}", round),
            })
            .expect("create pending");
        let id = pending.id;
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let repo = repo.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    if i % 2 == 0 {
                        repo.approve_pending(id, LEADER_ID).map(|_| ())
                    } else {
                        repo.reject_pending(id, LEADER_ID).map(|_| ())
                    }
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "round {}", round);
        assert!(
            results
                .iter()
                .filter(|r| r.is_err())
                .all(|r| matches!(r, Err(RepositoryError::AlreadyResolved { pending_id, .. }) if *pending_id == id)),
            "round {}: {:?}",
            round,
            results
        );
        let players = repo
            .get_player(&clancore::PlayerKey::ExternalId(500 + round))
            .expect("player lookup");
        let resolved = repo.get_pending(id).expect("pending lookup").expect("pending row");
        assert_eq!(players.is_some(), resolved.status == clancore::ReviewStatus::Approved);
    }

    assert!(repo.list_pending().expect("list").is_empty());
    assert!(repo.list_players(None).expect("list").len() <= ROUNDS as usize);
}

#[test]
fn test_concurrent_exclusions_succeed_once() {
    const THREADS: usize = 6;

    let (_dir, repo) = temp_repository();
    repo.add_player(NewPlayer {
        external_id: 100,
        handle: "@dragon".to_string(),
        nickname: "DragonSlayer".to_string(),
        screenshot_ref: None,
        added_by: LEADER_ID,
    })
    .expect("add player");
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let repo = repo.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                repo.exclude_player("DragonSlayer", &format!("reason {}", i), LEADER_ID)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(RepositoryError::AlreadyExcluded { .. }))));
    let excluded = repo.list_players(Some(PlayerStatus::Excluded)).expect("list");
    assert_eq!(excluded.len(), 1);
    assert!(repo.list_players(Some(PlayerStatus::Active)).expect("list").is_empty());
}
