//! Integration tests for the intake flow on a file-backed database
//!
//! Each test opens its own SQLite file in a temp directory so the
//! persistence layer is exercised exactly as the CLI uses it.

use siteintake_core::db::Database;
use siteintake_core::intake::{IntakeService, PhaseStatus, TrackerPhase, TransitionError};
use siteintake_core::types::{FailureKind, IntakeSession, IntakeStep, SessionStatus};
use siteintake_core::{Error, LocalDeployer, SessionFilter, SiteGenerator, TemplateSiteGenerator};
use std::path::PathBuf;
use tempfile::TempDir;

const ANSWERS: [(IntakeStep, &str); 6] = [
    (IntakeStep::Greeting, "We need a site that brings in calls"),
    (IntakeStep::BusinessName, "Acme Plumbing"),
    (IntakeStep::Industry, "Plumbing"),
    (IntakeStep::Services, "Drain cleaning, water heaters, leak repair"),
    (IntakeStep::Branding, "Navy and orange"),
    (IntakeStep::Content, "Family owned since 1990. Call 555-123-4567."),
];

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("data.db")
}

fn open_service(dir: &TempDir) -> IntakeService {
    siteintake_core::logging::init_test();
    let db = Database::open(&db_path(dir)).expect("open database");
    db.migrate().expect("migrate");
    IntakeService::new(db)
}

fn answer_all(service: &IntakeService, id: &str) {
    for (step, answer) in ANSWERS {
        service
            .record_response(id, step, &format!("{}?", step.display_name()), answer)
            .expect("in-order answer is accepted");
    }
}

// ============================================
// Lifecycle scenarios
// ============================================

#[test]
fn test_in_order_answers_reach_review_then_generating() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let id = service.create_session().unwrap().id;

    answer_all(&service, &id);

    let session = service.get_session(&id).unwrap();
    assert_eq!(session.current_step, IntakeStep::Review);
    assert_eq!(session.responses.len(), ANSWERS.len());
    let recorded: Vec<_> = session
        .responses
        .iter()
        .map(|r| (r.step, r.answer.as_str()))
        .collect();
    assert_eq!(recorded, ANSWERS.to_vec());

    let session = service.complete_intake(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Generating);
    assert_eq!(session.current_step, IntakeStep::Generating);

    // A second completion is refused and changes nothing
    assert!(service.complete_intake(&id).is_err());
    assert_eq!(service.get_session(&id).unwrap(), session);
}

#[test]
fn test_out_of_sequence_answer_is_rejected() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let id = service.create_session().unwrap().id;
    let before = service.get_session(&id).unwrap();

    let err = service
        .record_response(&id, IntakeStep::Industry, "Industry?", "Plumbing")
        .unwrap_err();

    match err {
        Error::Transition(TransitionError::OutOfSequence { expected, actual }) => {
            assert_eq!(expected, IntakeStep::Greeting);
            assert_eq!(actual, IntakeStep::Industry);
        }
        other => panic!("expected out of sequence error, got {:?}", other),
    }
    assert_eq!(service.get_session(&id).unwrap(), before);
}

#[test]
fn test_mark_deployed_before_generated_is_rejected() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let id = service.create_session().unwrap().id;
    answer_all(&service, &id);
    service.complete_intake(&id).unwrap();

    let err = service
        .mark_deployed(&id, "https://acme.example.com")
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Transition(TransitionError::InvalidTransition { .. })
    ));
    assert_eq!(
        service.get_session(&id).unwrap().status,
        SessionStatus::Generating
    );
}

#[test]
fn test_terminal_sessions_reject_answers() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let id = service.create_session().unwrap().id;
    service
        .mark_error(&id, FailureKind::Other, "chat closed")
        .unwrap();

    assert!(service.send(&id, "hello again").is_err());
    assert!(service.advance_phase(&id).is_err());
    assert!(service.get_session(&id).unwrap().responses.is_empty());
}

#[test]
fn test_generate_and_deploy_end_to_end() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let id = service.create_session().unwrap().id;
    answer_all(&service, &id);
    service.advance_phase(&id).unwrap();

    let generator = TemplateSiteGenerator::default();
    assert_eq!(generator.name(), "template");
    let session = service.generate(&id, &generator).unwrap();
    let site = session.generated_site.as_ref().unwrap();
    assert_eq!(site.template_id, "trades");
    assert_eq!(site.content.services.len(), 3);

    let session = service
        .deploy(&id, &LocalDeployer::new("sites.example.com"))
        .unwrap();
    assert_eq!(session.status, SessionStatus::Deployed);

    let business = service.get_business(&id).unwrap().unwrap();
    assert_eq!(business.name, "Acme Plumbing");
    assert_eq!(business.industry, "Plumbing");

    let snapshot = service.snapshot(&id).unwrap();
    assert_eq!(snapshot.current_phase, TrackerPhase::Close);
    assert_eq!(
        snapshot.phase_progress[&TrackerPhase::Close].status,
        PhaseStatus::Completed
    );
}

// ============================================
// Persistence
// ============================================

#[test]
fn test_session_survives_reopen_exactly() {
    let dir = TempDir::new().unwrap();
    let (id, original, transcript) = {
        let service = open_service(&dir);
        let id = service.create_session().unwrap().id;
        answer_all(&service, &id);
        service.complete_intake(&id).unwrap();
        service
            .generate(&id, &TemplateSiteGenerator::default())
            .unwrap();
        (
            id.clone(),
            service.get_session(&id).unwrap(),
            service.transcript(&id).unwrap(),
        )
    };

    let service = open_service(&dir);
    let reloaded = service.get_session(&id).unwrap();
    assert_eq!(reloaded, original);
    for (a, b) in reloaded.responses.iter().zip(&original.responses) {
        assert_eq!(a.timestamp, b.timestamp);
    }
    assert_eq!(reloaded.step_history, original.step_history);
    assert_eq!(service.transcript(&id).unwrap(), transcript);
}

#[test]
fn test_json_round_trip_from_store() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let id = service.create_session().unwrap().id;
    answer_all(&service, &id);

    let session = service.get_session(&id).unwrap();
    let json = serde_json::to_string(&session).unwrap();
    let back: IntakeSession = serde_json::from_str(&json).unwrap();
    assert_eq!(back, session);
}

#[test]
fn test_failure_preserves_transcript() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let id = service.create_session().unwrap().id;
    answer_all(&service, &id);
    service.complete_intake(&id).unwrap();

    struct Down;
    impl SiteGenerator for Down {
        fn name(&self) -> &str {
            "down"
        }
        fn generate(
            &self,
            _session: &IntakeSession,
        ) -> siteintake_core::Result<siteintake_core::GeneratedSiteConfig> {
            Err(Error::GenerationFailure("timed out".to_string()))
        }
    }

    assert!(service.generate(&id, &Down).is_err());

    let session = service.get_session(&id).unwrap();
    assert_eq!(session.status, SessionStatus::Error);
    assert_eq!(session.responses.len(), ANSWERS.len());
    assert_eq!(service.transcript(&id).unwrap().len(), ANSWERS.len() * 2);

    let errored = service
        .list_sessions(&SessionFilter {
            status: Some(SessionStatus::Error),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].business_name.as_deref(), Some("Acme Plumbing"));
}

// ============================================
// Concurrency
// ============================================

#[test]
fn test_sessions_progress_independently_across_threads() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let ids: Vec<String> = (0..4)
        .map(|_| service.create_session().unwrap().id)
        .collect();

    std::thread::scope(|scope| {
        for id in &ids {
            let service = &service;
            scope.spawn(move || answer_all(service, id));
        }
    });

    for id in &ids {
        let session = service.get_session(id).unwrap();
        assert_eq!(session.current_step, IntakeStep::Review);
        let steps: Vec<_> = session.responses.iter().map(|r| r.step).collect();
        assert_eq!(steps, IntakeStep::REQUIRED.to_vec());
    }
}

#[test]
fn test_racing_answers_never_interleave() {
    let dir = TempDir::new().unwrap();
    let service = open_service(&dir);
    let id = service.create_session().unwrap().id;

    // Every thread walks the whole script; each step is accepted exactly once
    let accepted: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = &service;
                let id = &id;
                scope.spawn(move || {
                    ANSWERS
                        .iter()
                        .filter(|(step, answer)| {
                            service.record_response(id, *step, "q", answer).is_ok()
                        })
                        .count()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    let session = service.get_session(&id).unwrap();
    assert_eq!(accepted, session.responses.len());
    let steps: Vec<_> = session.responses.iter().map(|r| r.step).collect();
    // Whatever got in is a prefix of the script, in order, without repeats
    assert_eq!(steps, IntakeStep::REQUIRED[..steps.len()].to_vec());
    assert_eq!(
        service.transcript(&id).unwrap().len(),
        session.responses.len() * 2
    );
}
