//! Behavior every `NoteStore` backend must share.
//!
//! Each test runs against the SQLite backend and the document backend.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use secrecy::SecretString;
use tempfile::TempDir;

use smsnote_core::security::{session_claims, CLAIM_KIND, KIND_RESET};
use smsnote_core::{
    CallContext, DocumentNoteStore, HashCost, ManualClock, NoteStore, Security, SmsNoteError,
    SqliteStore, StandardSecurity, User, UserUpdate,
};

const ALICE_PHONE: &str = "+12015550123";
const BOB_PHONE: &str = "+16502530000";

struct Backend {
    name: &'static str,
    store: Box<dyn NoteStore>,
    clock: Arc<ManualClock>,
    security: Arc<dyn Security>,
    _dir: Option<TempDir>,
}

fn security() -> Arc<dyn Security> {
    Arc::new(
        StandardSecurity::with_cost(
            SecretString::from("contract-secret".to_string()),
            HashCost::minimal(),
        )
        .expect("security should build"),
    )
}

fn backends() -> Vec<Backend> {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let sqlite_clock = Arc::new(ManualClock::new(start));
    let sqlite_security = security();
    let sqlite = SqliteStore::open_in_memory(sqlite_security.clone())
        .expect("sqlite should open")
        .with_clock(sqlite_clock.clone());

    let dir = tempfile::tempdir().expect("tempdir should be created");
    let doc_clock = Arc::new(ManualClock::new(start));
    let doc_security = security();
    let document = DocumentNoteStore::open(dir.path().join("docs"), doc_security.clone())
        .expect("document store should open")
        .with_clock(doc_clock.clone());

    vec![
        Backend {
            name: "sqlite",
            store: Box::new(sqlite),
            clock: sqlite_clock,
            security: sqlite_security,
            _dir: None,
        },
        Backend {
            name: "document",
            store: Box::new(document),
            clock: doc_clock,
            security: doc_security,
            _dir: Some(dir),
        },
    ]
}

fn alice(backend: &Backend) -> User {
    backend
        .store
        .user_create(&CallContext::background(), "alice", "hunter2", ALICE_PHONE)
        .expect("alice should register")
}

#[test]
fn test_created_user_token_resolves_to_user() {
    for backend in backends() {
        let ctx = CallContext::background();
        let created = alice(&backend);
        let token = created.token().expect("created user should carry a token");

        let fetched = backend.store.user_get(&ctx, token).expect("token should resolve");
        assert_eq!(fetched.id, created.id, "{}", backend.name);
        assert_eq!(fetched.username, "alice", "{}", backend.name);
        assert_eq!(fetched.phone, ALICE_PHONE, "{}", backend.name);
        assert_ne!(fetched.password_hash(), "hunter2", "{}", backend.name);
        assert!(!fetched.password_hash().is_empty(), "{}", backend.name);
    }
}

#[test]
fn test_duplicate_username_or_phone_conflicts() {
    for backend in backends() {
        let ctx = CallContext::background();
        alice(&backend);

        let err = backend
            .store
            .user_create(&ctx, "alice", "pw", BOB_PHONE)
            .unwrap_err();
        assert!(matches!(err, SmsNoteError::Conflict(_)), "{}: {:?}", backend.name, err);

        let err = backend
            .store
            .user_create(&ctx, "bob", "pw", ALICE_PHONE)
            .unwrap_err();
        assert!(matches!(err, SmsNoteError::Conflict(_)), "{}: {:?}", backend.name, err);

        // The failed attempts did not claim bob's values.
        backend
            .store
            .user_create(&ctx, "bob", "pw", BOB_PHONE)
            .expect("bob should register");
    }
}

#[test]
fn test_login_distinguishes_unknown_user_and_bad_password() {
    for backend in backends() {
        let ctx = CallContext::background();
        let created = alice(&backend);

        assert!(matches!(
            backend.store.user_login(&ctx, "nobody", "hunter2"),
            Err(SmsNoteError::NotFound(_))
        ));
        assert!(matches!(
            backend.store.user_login(&ctx, "alice", "wrongpass"),
            Err(SmsNoteError::Credentials)
        ));

        let logged_in = backend
            .store
            .user_login(&ctx, "alice", "hunter2")
            .expect("login should succeed");
        assert_eq!(logged_in.id, created.id, "{}", backend.name);
        assert!(logged_in.token().is_some());
    }
}

#[test]
fn test_user_get_rejects_bad_and_non_session_tokens() {
    for backend in backends() {
        let ctx = CallContext::background();
        let created = alice(&backend);

        assert!(matches!(
            backend.store.user_get(&ctx, "not-a-token"),
            Err(SmsNoteError::Token)
        ));

        let mut claims = session_claims(&created.id);
        claims.insert(CLAIM_KIND.to_string(), KIND_RESET.into());
        let reset = backend.security.issue_token(&claims).expect("token should sign");
        assert!(matches!(
            backend.store.user_get(&ctx, &reset),
            Err(SmsNoteError::Token)
        ));
    }
}

#[test]
fn test_lookup_by_number_and_username() {
    for backend in backends() {
        let ctx = CallContext::background();
        let created = alice(&backend);

        let by_number = backend
            .store
            .user_get_by_number(&ctx, ALICE_PHONE)
            .expect("lookup by number should succeed");
        assert_eq!(by_number.id, created.id);
        let by_name = backend
            .store
            .user_get_by_username(&ctx, "alice")
            .expect("lookup by username should succeed");
        assert_eq!(by_name.id, created.id);

        assert!(matches!(
            backend.store.user_get_by_number(&ctx, BOB_PHONE),
            Err(SmsNoteError::NotFound(_))
        ));
        assert!(matches!(
            backend.store.user_get_by_username(&ctx, "bob"),
            Err(SmsNoteError::NotFound(_))
        ));
    }
}

#[test]
fn test_save_changes_only_supplied_fields() {
    for backend in backends() {
        let ctx = CallContext::background();
        let created = alice(&backend);
        let old_hash = created.password_hash().to_string();

        let update = UserUpdate::new()
            .set_phone("650 253 0000")
            .expect("phone should validate");
        let saved = backend
            .store
            .user_save(&ctx, &created, &update)
            .expect("save should succeed");
        assert_eq!(saved.phone, BOB_PHONE, "{}", backend.name);
        assert_eq!(saved.username, "alice");
        assert_eq!(saved.password_hash(), old_hash);

        let unchanged = backend
            .store
            .user_save(&ctx, &saved, &UserUpdate::new())
            .expect("empty save should succeed");
        assert_eq!(unchanged.phone, BOB_PHONE);

        // The old number is free again.
        backend
            .store
            .user_create(&ctx, "carol", "pw", ALICE_PHONE)
            .expect("carol should take the old number");
    }
}

#[test]
fn test_save_enforces_uniqueness() {
    for backend in backends() {
        let ctx = CallContext::background();
        let created = alice(&backend);
        backend
            .store
            .user_create(&ctx, "bob", "pw", BOB_PHONE)
            .expect("bob should register");

        let update = UserUpdate::new().set_username("bob").expect("valid username");
        let err = backend.store.user_save(&ctx, &created, &update).unwrap_err();
        assert!(matches!(err, SmsNoteError::Conflict(_)), "{}: {:?}", backend.name, err);

        let stored = backend
            .store
            .user_get_by_username(&ctx, "alice")
            .expect("alice should be unchanged");
        assert_eq!(stored.id, created.id);
    }
}

#[test]
fn test_password_change_takes_effect() {
    for backend in backends() {
        let ctx = CallContext::background();
        let created = alice(&backend);

        let update = UserUpdate::new()
            .set_password(backend.security.as_ref(), "correct horse")
            .expect("password should hash");
        backend
            .store
            .user_save(&ctx, &created, &update)
            .expect("save should succeed");

        assert!(matches!(
            backend.store.user_login(&ctx, "alice", "hunter2"),
            Err(SmsNoteError::Credentials)
        ));
        backend
            .store
            .user_login(&ctx, "alice", "correct horse")
            .expect("new password should work");
    }
}

#[test]
fn test_pages_cover_every_note_once_newest_first() {
    for backend in backends() {
        let ctx = CallContext::background();
        let user = alice(&backend);
        let total = 7;
        for i in 0..total {
            backend
                .store
                .note_create(&ctx, &user, &format!("note {}", i))
                .expect("note should be created");
            backend.clock.advance(Duration::seconds(1));
        }

        let page_size = 3;
        let mut seen = Vec::new();
        let mut page = 0;
        loop {
            let result = backend
                .store
                .note_list(&ctx, &user, page, page_size)
                .expect("page should load");
            assert!(result.notes.len() <= page_size);
            seen.extend(result.notes);
            if !result.has_more {
                break;
            }
            page += 1;
        }

        assert_eq!(page, 2, "{}", backend.name);
        assert_eq!(seen.len(), total, "{}", backend.name);
        let ids: HashSet<_> = seen.iter().map(|note| note.id.clone()).collect();
        assert_eq!(ids.len(), total, "{}", backend.name);
        let texts: Vec<_> = seen.iter().map(|note| note.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["note 6", "note 5", "note 4", "note 3", "note 2", "note 1", "note 0"],
            "{}",
            backend.name
        );

        let past_end = backend
            .store
            .note_list(&ctx, &user, 5, page_size)
            .expect("page past the end should load");
        assert!(past_end.notes.is_empty());
        assert!(!past_end.has_more);
    }
}

#[test]
fn test_exact_multiple_has_no_empty_trailing_page() {
    for backend in backends() {
        let ctx = CallContext::background();
        let user = alice(&backend);
        for i in 0..4 {
            backend
                .store
                .note_create(&ctx, &user, &i.to_string())
                .expect("note should be created");
            backend.clock.advance(Duration::seconds(1));
        }
        let first = backend.store.note_list(&ctx, &user, 0, 2).unwrap();
        let second = backend.store.note_list(&ctx, &user, 1, 2).unwrap();
        assert!(first.has_more, "{}", backend.name);
        assert!(!second.has_more, "{}", backend.name);
        assert_eq!(second.notes.len(), 2);
    }
}

#[test]
fn test_notes_with_equal_timestamps_keep_insertion_order() {
    for backend in backends() {
        let ctx = CallContext::background();
        let user = alice(&backend);
        for i in 0..8 {
            backend
                .store
                .note_create(&ctx, &user, &format!("note {}", i))
                .expect("note should be created");
        }

        let first = backend.store.note_list(&ctx, &user, 0, 5).unwrap();
        let second = backend.store.note_list(&ctx, &user, 1, 5).unwrap();
        let listed: Vec<_> = first
            .notes
            .iter()
            .chain(second.notes.iter())
            .map(|note| note.text.clone())
            .collect();
        let newest_first: Vec<_> = (0..8).rev().map(|i| format!("note {}", i)).collect();
        assert_eq!(listed, newest_first, "{}", backend.name);

        let latest = backend
            .store
            .note_latest(&ctx, &user)
            .unwrap()
            .expect("latest note should exist");
        assert_eq!(latest.text, "note 7", "{}", backend.name);

        let exported: Vec<_> = backend
            .store
            .user_export_all(&ctx, &user)
            .unwrap()
            .into_iter()
            .map(|note| note.text)
            .collect();
        let oldest_first: Vec<_> = (0..8).map(|i| format!("note {}", i)).collect();
        assert_eq!(exported, oldest_first, "{}", backend.name);
    }
}

#[test]
fn test_zero_page_size_is_rejected() {
    for backend in backends() {
        let ctx = CallContext::background();
        let user = alice(&backend);
        assert!(matches!(
            backend.store.note_list(&ctx, &user, 0, 0),
            Err(SmsNoteError::Validation(_))
        ));
    }
}

#[test]
fn test_notes_are_isolated_per_user() {
    for backend in backends() {
        let ctx = CallContext::background();
        let alice = alice(&backend);
        let bob = backend
            .store
            .user_create(&ctx, "bob", "pw", BOB_PHONE)
            .expect("bob should register");
        backend.store.note_create(&ctx, &alice, "for alice").unwrap();
        backend.store.note_create(&ctx, &bob, "for bob").unwrap();

        let page = backend.store.note_list(&ctx, &bob, 0, 10).unwrap();
        assert_eq!(page.notes.len(), 1, "{}", backend.name);
        assert_eq!(page.notes[0].text, "for bob");
        assert_eq!(page.notes[0].user_id, bob.id);
    }
}

#[test]
fn test_latest_note() {
    for backend in backends() {
        let ctx = CallContext::background();
        let user = alice(&backend);
        assert!(backend.store.note_latest(&ctx, &user).unwrap().is_none());

        backend.store.note_create(&ctx, &user, "first").unwrap();
        backend.clock.advance(Duration::seconds(10));
        backend.store.note_create(&ctx, &user, "second").unwrap();

        let latest = backend
            .store
            .note_latest(&ctx, &user)
            .expect("latest should load")
            .expect("a note should exist");
        assert_eq!(latest.text, "second", "{}", backend.name);
    }
}

#[test]
fn test_latest_within_includes_the_boundary() {
    for backend in backends() {
        let ctx = CallContext::background();
        let user = alice(&backend);
        let window = Duration::minutes(5);

        backend.store.note_create(&ctx, &user, "recent").unwrap();

        backend.clock.advance(window);
        let at_boundary = backend
            .store
            .note_latest_within(&ctx, &user, window)
            .expect("query should succeed");
        assert_eq!(
            at_boundary.map(|note| note.text),
            Some("recent".to_string()),
            "{}",
            backend.name
        );

        backend.clock.advance(Duration::seconds(1));
        let expired = backend
            .store
            .note_latest_within(&ctx, &user, window)
            .expect("query should succeed");
        assert!(expired.is_none(), "{}", backend.name);
    }
}

#[test]
fn test_export_is_oldest_first_and_erase_removes_everything() {
    for backend in backends() {
        let ctx = CallContext::background();
        let user = alice(&backend);
        for text in ["one", "two", "three"] {
            backend.store.note_create(&ctx, &user, text).unwrap();
            backend.clock.advance(Duration::seconds(1));
        }

        let exported = backend.store.user_export_all(&ctx, &user).unwrap();
        let texts: Vec<_> = exported.iter().map(|note| note.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"], "{}", backend.name);

        backend
            .store
            .user_erase_all(&ctx, &user)
            .expect("erase should succeed");

        assert!(matches!(
            backend.store.user_get_by_username(&ctx, "alice"),
            Err(SmsNoteError::NotFound(_))
        ));
        let token = user.token().expect("token should exist");
        assert!(matches!(
            backend.store.user_get(&ctx, token),
            Err(SmsNoteError::NotFound(_))
        ));
        assert!(backend.store.user_export_all(&ctx, &user).unwrap().is_empty());

        // Erasing again reports the missing user.
        assert!(backend.store.user_erase_all(&ctx, &user).is_err());

        // Username and phone can be registered again.
        alice(&backend);
    }
}

#[test]
fn test_cancelled_context_stops_every_operation() {
    for backend in backends() {
        let user = alice(&backend);
        let ctx = CallContext::background();
        ctx.cancel_handle().cancel();

        assert!(matches!(
            backend.store.note_create(&ctx, &user, "x"),
            Err(SmsNoteError::Cancelled)
        ));
        assert!(matches!(
            backend.store.user_login(&ctx, "alice", "hunter2"),
            Err(SmsNoteError::Cancelled)
        ));
        assert!(matches!(
            backend.store.user_erase_all(&ctx, &user),
            Err(SmsNoteError::Cancelled)
        ));

        let fresh = CallContext::background();
        assert!(backend.store.note_latest(&fresh, &user).unwrap().is_none());
        backend
            .store
            .user_get_by_username(&fresh, "alice")
            .expect("alice should still exist");
    }
}

#[test]
fn test_expired_deadline_is_reported() {
    for backend in backends() {
        let ctx = CallContext::background().with_deadline(std::time::Instant::now());
        assert!(matches!(
            backend.store.user_get_by_username(&ctx, "alice"),
            Err(SmsNoteError::DeadlineExceeded)
        ));
    }
}
