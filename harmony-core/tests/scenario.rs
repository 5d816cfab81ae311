//! Register, create, invite, join, leave through the core API

use harmony_core::auth::{Claims, ClaimsVerifier, Guard};
use harmony_core::clock::Clock;
use harmony_core::error::{Classify, ErrorKind};
use harmony_core::test_utils::{registry_fixture, Fixture};
use harmony_core::Role;
use std::time::Duration;

#[tokio::test]
async fn test_alice_and_bob() {
    let Fixture { identity, registry, invites, verifier, clock, .. } = registry_fixture();

    let alice = identity.register("alice", "alice@example.com").await.unwrap();
    let bob = identity.register("bob", "bob@example.com").await.unwrap();
    assert!(alice.handle.to_string().starts_with("alice:"));
    assert_eq!(alice.handle.to_string().len(), "alice:".len() + 4);

    let test = registry.create_community("Test", &alice.handle, None).await.unwrap();
    assert!(test.handle.to_string().starts_with("Test:"));

    // Alice re-authenticates to pick up her new role
    let alice = identity.account(&alice.id).await.unwrap();
    let token = verifier
        .sign(&Claims::for_account(&alice, clock.now(), Duration::from_secs(3600)))
        .unwrap();
    let alice_claims = verifier.verify(&token).unwrap();
    assert!(Guard::has_at_least(&alice_claims, &test.handle, Role::Owner));

    let link = invites.issue(&test.id, Some(&alice_claims)).await.unwrap();
    let t = link.expires_at.as_millis().to_string();

    invites.validate_for_join(&test.id, Some(&t)).unwrap();
    registry.join(&test.id, &bob.handle).await.unwrap();

    let bob_now = identity.account(&bob.id).await.unwrap();
    assert_eq!(bob_now.memberships.get(&test.handle), Some(Role::Member));

    // Bob may invite but not administer
    let bob_claims = Claims::for_account(&bob_now, clock.now(), Duration::from_secs(3600));
    assert!(invites.issue(&test.id, Some(&bob_claims)).await.is_ok());
    let err = Guard::require(Some(&bob_claims), &test.handle, Role::Admin).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    // Second join with a still-valid link
    let err = registry.join(&test.id, &bob.handle).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Link expires after five minutes
    clock.advance(Duration::from_secs(5 * 60));
    let err = invites.validate_for_join(&test.id, Some(&t)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Expired);

    let err = registry.leave(&test.id, &alice.handle).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    registry.leave(&test.id, &bob.handle).await.unwrap();
    assert!(identity.account(&bob.id).await.unwrap().memberships.is_empty());
    assert!(!registry.community(&test.id).await.unwrap().is_member(&bob.handle));
}

