#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{Game, GameTags, Realm, Tag, User, Vote, game, realm, setup, tag, user};
use relational_storage::{Criteria, StorageError, connection};

fn stored_realm(registry: &relational_storage::Registry, conn: &relational_storage::rusqlite::Connection) -> Realm {
    let mut r1 = realm("plaid-posse");
    registry.model::<Realm>(conn).unwrap().store(&mut r1).unwrap();
    r1
}

#[test]
fn membership_is_a_set() {
    let (registry, conn) = setup();
    let r1 = stored_realm(&registry, &conn);

    let mut alice = user("alice", &r1);
    let mut chess = game("BGA", "Chess");
    registry.model::<User>(&conn).unwrap().store(&mut alice).unwrap();
    registry.model::<Game>(&conn).unwrap().store(&mut chess).unwrap();

    let votes = registry.association::<Vote>(&conn).unwrap();
    votes.store(&alice, &chess).unwrap();
    votes.store(&alice, &chess).unwrap();

    assert_eq!(votes.ids_for_left(&alice).unwrap(), vec![chess.game_id.unwrap()]);
}

#[test]
fn traversal_hydrates_both_directions() {
    let (registry, conn) = setup();
    let r1 = stored_realm(&registry, &conn);

    let users = registry.model::<User>(&conn).unwrap();
    let games = registry.model::<Game>(&conn).unwrap();

    let mut alice = user("alice", &r1);
    let mut bob = user("bob", &r1);
    users.store(&mut alice).unwrap();
    users.store(&mut bob).unwrap();

    let mut chess = game("BGA", "Chess");
    let mut hanabi = game("BGA", "Hanabi");
    games.store(&mut chess).unwrap();
    games.store(&mut hanabi).unwrap();

    let votes = registry.association::<Vote>(&conn).unwrap();
    votes.store(&alice, &chess).unwrap();
    votes.store(&alice, &hanabi).unwrap();
    votes.store(&bob, &chess).unwrap();

    let alices_games = votes.of_left(&alice).unwrap();
    assert_eq!(alices_games, vec![chess.clone(), hanabi.clone()]);

    let chess_voters = votes.of_right(&chess).unwrap();
    assert_eq!(chess_voters, vec![alice.clone(), bob.clone()]);

    assert_eq!(
        votes.ids_for_right(&hanabi).unwrap(),
        vec![alice.user_id.unwrap()]
    );
}

#[test]
fn from_left_joins_through_anchor_predicates() {
    let (registry, conn) = setup();
    let r1 = stored_realm(&registry, &conn);

    let users = registry.model::<User>(&conn).unwrap();
    let games = registry.model::<Game>(&conn).unwrap();

    let mut alice = user("alice", &r1);
    let mut bob = user("bob", &r1);
    users.store(&mut alice).unwrap();
    users.store(&mut bob).unwrap();

    let mut chess = game("BGA", "Chess");
    let mut hanabi = game("BGA", "Hanabi");
    games.store(&mut chess).unwrap();
    games.store(&mut hanabi).unwrap();

    let votes = registry.association::<Vote>(&conn).unwrap();
    votes.store(&alice, &chess).unwrap();
    votes.store(&alice, &hanabi).unwrap();
    votes.store(&bob, &chess).unwrap();

    // Games voted for by users named alice.
    let voted = votes
        .from_left(&Criteria::new().eq("username", "alice"))
        .unwrap();
    assert_eq!(voted, vec![chess.clone(), hanabi.clone()]);

    // Users who voted for BGA games - the anchor here is the right side.
    let mut voters = votes
        .from_right(&Criteria::new().eq("platform", "BGA"))
        .unwrap();
    voters.sort_by_key(|u| u.user_id);
    assert_eq!(voters, vec![alice.clone(), bob.clone()]);

    // Anchor predicates are validated against the anchor's fields.
    let result = votes.from_left(&Criteria::new().eq("platform", "BGA"));
    assert!(matches!(result, Err(StorageError::Usage(_))));

    // Related-record predicates work through the anchor as well.
    let by_realm = votes
        .from_left(&Criteria::new().related("realm", &r1))
        .unwrap();
    assert_eq!(by_realm, vec![chess, hanabi]);
}

#[test]
fn clear_left_removes_only_the_anchor_rows() {
    let (registry, conn) = setup();
    let r1 = stored_realm(&registry, &conn);

    let users = registry.model::<User>(&conn).unwrap();
    let games = registry.model::<Game>(&conn).unwrap();

    let mut alice = user("alice", &r1);
    let mut bob = user("bob", &r1);
    users.store(&mut alice).unwrap();
    users.store(&mut bob).unwrap();

    let mut chess = game("BGA", "Chess");
    games.store(&mut chess).unwrap();

    let votes = registry.association::<Vote>(&conn).unwrap();
    votes.store(&alice, &chess).unwrap();
    votes.store(&bob, &chess).unwrap();

    votes.clear_left(&alice).unwrap();

    assert!(votes.ids_for_left(&alice).unwrap().is_empty());
    assert_eq!(votes.ids_for_left(&bob).unwrap(), vec![chess.game_id.unwrap()]);
}

#[test]
fn replace_left_swaps_the_membership_set() {
    let (registry, conn) = setup();
    let r1 = stored_realm(&registry, &conn);

    let users = registry.model::<User>(&conn).unwrap();
    let games = registry.model::<Game>(&conn).unwrap();

    let mut alice = user("alice", &r1);
    users.store(&mut alice).unwrap();

    let mut chess = game("BGA", "Chess");
    let mut hanabi = game("BGA", "Hanabi");
    let mut go = game("BGA", "Go");
    games.store(&mut chess).unwrap();
    games.store(&mut hanabi).unwrap();
    games.store(&mut go).unwrap();

    let votes = registry.association::<Vote>(&conn).unwrap();
    votes.store(&alice, &chess).unwrap();
    votes.store(&alice, &hanabi).unwrap();

    votes
        .replace_left(&alice, &[hanabi.clone(), go.clone()])
        .unwrap();

    let mut ids = votes.ids_for_left(&alice).unwrap();
    ids.sort_unstable();
    let mut expected = vec![hanabi.game_id.unwrap(), go.game_id.unwrap()];
    expected.sort_unstable();
    assert_eq!(ids, expected);

    votes.replace_left(&alice, &[]).unwrap();
    assert!(votes.ids_for_left(&alice).unwrap().is_empty());
}

#[test]
fn storing_an_unsaved_pair_is_a_no_op() {
    let (registry, conn) = setup();
    let r1 = stored_realm(&registry, &conn);

    let mut alice = user("alice", &r1);
    registry.model::<User>(&conn).unwrap().store(&mut alice).unwrap();

    let unsaved = game("BGA", "Chess");
    let votes = registry.association::<Vote>(&conn).unwrap();

    // The composite key's NOT NULL constraint drops the row silently
    // (insert-or-ignore), mirroring an unsaved record's NULL identity.
    votes.store(&alice, &unsaved).unwrap();
    assert!(votes.ids_for_left(&alice).unwrap().is_empty());
}

#[test]
fn association_create_table_creates_participant_tables() {
    let registry = common::registry();
    let conn = connection::open_in_memory().unwrap();

    registry
        .association::<GameTags>(&conn)
        .unwrap()
        .create_table()
        .unwrap();

    let mut chess = game("BGA", "Chess");
    let mut coop = tag("coop");
    registry.model::<Game>(&conn).unwrap().store(&mut chess).unwrap();
    registry.model::<Tag>(&conn).unwrap().store(&mut coop).unwrap();

    let tags = registry.association::<GameTags>(&conn).unwrap();
    tags.store(&chess, &coop).unwrap();
    assert_eq!(tags.of_left(&chess).unwrap(), vec![coop]);
}
