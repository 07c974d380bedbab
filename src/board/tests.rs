use std::sync::Arc;
use std::time::Duration;

use super::*;

fn five_by_five() -> Board {
    let mut tokens = vec!["A".to_string(), "B".to_string(), "A".to_string(), "C".to_string(), "A".to_string()];
    for _ in 0..20 {
        tokens.push("Z".to_string());
    }
    Board::new(5, 5, tokens).expect("valid construction")
}

#[tokio::test]
async fn construction_rejects_wrong_token_count() {
    let err = Board::new(2, 2, vec!["a".into(), "b".into()]).unwrap_err();
    assert_eq!(
        err,
        BoardError::BadArgument("expected 4 tokens for a 2x2 board, got 2".into())
    );
}

#[tokio::test]
async fn construction_rejects_whitespace_tokens() {
    let err = Board::new(1, 1, vec!["bad token".into()]).unwrap_err();
    assert!(matches!(err, BoardError::BadArgument(_)));
}

#[tokio::test]
async fn view_rejects_blank_viewer() {
    let board = five_by_five();
    let err = board.view("  ").await.unwrap_err();
    assert_eq!(
        err,
        BoardError::BadArgument("viewer id must not be blank".into())
    );
}

#[tokio::test]
async fn view_has_exactly_rows_times_cols_plus_one_lines() {
    let board = five_by_five();
    let rendering = board.view("alice").await.unwrap();
    assert_eq!(rendering.lines().count(), 26);
}

// Scenario 1 (spec §8): rule 1-B.
#[tokio::test]
async fn scenario_rule_1b_first_flip_is_visible_to_others_as_up() {
    let board = five_by_five();
    board.flip("alice", 0, 0).await.unwrap();

    let alice_view = board.view("alice").await.unwrap();
    let bob_view = board.view("bob").await.unwrap();
    assert!(alice_view.lines().nth(1).unwrap() == "my A");
    assert!(bob_view.lines().nth(1).unwrap() == "up A");
}

// Scenario 2 (spec §8): rule 1-D wait releases the waiter once the
// controller moves on to a non-matching second card.
#[tokio::test]
async fn scenario_rule_1d_wait_resolves_on_release() {
    let board = Arc::new(five_by_five());
    board.flip("alice", 0, 0).await.unwrap();

    let contended = board.wait_for_contention(Position::new(0, 0)).await;
    let bob_board = Arc::clone(&board);
    let bob_task = tokio::spawn(async move { bob_board.flip("bob", 0, 0).await });

    // Wait until bob's flip has actually enqueued as a waiter on (0,0)
    // rather than sleeping and hoping the scheduler got there first.
    contended.await.unwrap();

    // Alice's second flip is a non-match; it relinquishes (0,0).
    let second = board.flip("alice", 0, 1).await;
    assert!(second.is_err(), "B at (0,1) does not match A at (0,0)");

    bob_task.await.unwrap().unwrap();

    let bob_view = board.view("bob").await.unwrap();
    let alice_view = board.view("alice").await.unwrap();
    assert_eq!(bob_view.lines().nth(1).unwrap(), "my A");
    assert_eq!(alice_view.lines().nth(1).unwrap(), "up A");
}

// Scenario 3 (spec §8): rule 2-D match followed by 3-A removal.
#[tokio::test]
async fn scenario_match_then_removal() {
    let board = five_by_five();
    board.flip("alice", 0, 0).await.unwrap();
    board.flip("alice", 0, 2).await.unwrap();

    let alice_view = board.view("alice").await.unwrap();
    assert_eq!(alice_view.lines().nth(1).unwrap(), "my A");
    assert_eq!(alice_view.lines().nth(3).unwrap(), "my A");

    // Next first-card flip triggers stage A cleanup: matched pair removed.
    board.flip("alice", 0, 1).await.unwrap();

    let alice_view = board.view("alice").await.unwrap();
    assert_eq!(alice_view.lines().nth(1).unwrap(), "none");
    assert_eq!(alice_view.lines().nth(3).unwrap(), "none");
    assert_eq!(alice_view.lines().nth(2).unwrap(), "my B");
}

// Scenario 4 (spec §8): rule 3-B preserves a card another player now
// controls.
#[tokio::test]
async fn scenario_nonmatch_cleanup_preserves_controlled_card() {
    let board = five_by_five();
    board.flip("alice", 0, 0).await.unwrap();
    let _ = board.flip("alice", 0, 1).await; // non-match: A vs B

    board.flip("bob", 0, 0).await.unwrap(); // bob takes control of (0,0)

    board.flip("alice", 0, 2).await.unwrap(); // stage A cleanup runs here

    let alice_view = board.view("alice").await.unwrap();
    assert_eq!(alice_view.lines().nth(1).unwrap(), "up A"); // still face-up, bob controls it
    assert_eq!(alice_view.lines().nth(2).unwrap(), "down"); // (0,1) turned back down
}

// Scenario 5 (spec §8): watcher resolves exactly once for a face-up
// transition, not again for a subsequent control-only release.
#[tokio::test]
async fn scenario_watcher_sees_face_change_not_control_only_change() {
    let board = Arc::new(five_by_five());
    let registered = board.wait_for_watcher_registration().await;
    let watch_board = Arc::clone(&board);
    let watcher = tokio::spawn(async move { watch_board.watch("charlie").await });

    registered.await.unwrap();

    board.flip("alice", 0, 0).await.unwrap(); // visible: face-down -> face-up
    let rendering = tokio::time::timeout(Duration::from_millis(200), watcher)
        .await
        .expect("watcher should resolve")
        .unwrap()
        .unwrap();
    assert_eq!(rendering.lines().nth(1).unwrap(), "up A");

    // Second flip at the same spot is 2-B (self-control release): no face
    // change, so a freshly registered watcher must NOT resolve from this.
    let second_registered = board.wait_for_watcher_registration().await;
    let second_watch = Arc::clone(&board);
    let mut second_watcher = tokio::spawn(async move { second_watch.watch("charlie").await });
    second_registered.await.unwrap();

    let err = board.flip("alice", 0, 0).await.unwrap_err();
    assert_eq!(err, BoardError::CardAlreadyControlled);

    tokio::select! {
        _ = &mut second_watcher => panic!("watcher must not resolve on a control-only change"),
        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
    }
    second_watcher.abort();
}

// Scenario 6 (spec §8): map applies atomically per token group.
#[tokio::test]
async fn scenario_map_atomicity() {
    let board = five_by_five();
    board.flip("alice", 0, 0).await.unwrap();

    board
        .map(|t| async move {
            if t == "A" {
                Some("X".to_string())
            } else {
                Some(t)
            }
        })
        .await
        .unwrap();

    let alice_view = board.view("alice").await.unwrap();
    let at_0_0 = alice_view.lines().nth(1).unwrap();
    let at_0_4 = alice_view.lines().nth(5).unwrap();
    assert!(at_0_0 == "my X" || at_0_0 == "my A");
    // every cell that held "A" moved to "X" together
    assert_eq!(at_0_0 == "my X", at_0_4 == "up X" || at_0_4 == "down");
}

#[tokio::test]
async fn map_identity_is_a_no_op_and_does_not_wake_watchers() {
    let board = Arc::new(five_by_five());
    let registered = board.wait_for_watcher_registration().await;
    let watch_board = Arc::clone(&board);
    let mut watcher = tokio::spawn(async move { watch_board.watch("dana").await });
    registered.await.unwrap();

    board.map(|t| async move { Some(t) }).await.unwrap();

    tokio::select! {
        _ = &mut watcher => panic!("identity map must not be a visible change"),
        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
    }
    watcher.abort();
}

#[tokio::test]
async fn reset_twice_is_equivalent_to_reset_once() {
    let board = five_by_five();
    board.flip("alice", 0, 0).await.unwrap();
    board.reset().await;
    let after_one = board.view("alice").await.unwrap();
    board.reset().await;
    let after_two = board.view("alice").await.unwrap();
    assert_eq!(after_one, after_two);
}

#[tokio::test]
async fn reset_cancels_a_waiter_blocked_on_rule_1d() {
    let board = Arc::new(five_by_five());
    board.flip("alice", 0, 0).await.unwrap();

    let contended = board.wait_for_contention(Position::new(0, 0)).await;
    let bob_board = Arc::clone(&board);
    let bob_task = tokio::spawn(async move { bob_board.flip("bob", 0, 0).await });
    contended.await.unwrap();

    board.reset().await;

    let result = bob_task.await.unwrap();
    assert_eq!(result.unwrap_err(), BoardError::Cancelled);
}

#[tokio::test]
async fn one_by_one_board_second_flip_is_already_controlled() {
    let board = Board::new(1, 1, vec!["Z".into()]).unwrap();
    board.flip("alice", 0, 0).await.unwrap();
    let err = board.flip("alice", 0, 0).await.unwrap_err();
    assert_eq!(err, BoardError::CardAlreadyControlled);

    let view = board.view("bob").await.unwrap();
    assert_eq!(view.lines().nth(1).unwrap(), "up Z");
}

#[tokio::test]
async fn flip_out_of_bounds_is_bad_argument() {
    let board = five_by_five();
    let err = board.flip("alice", 10, 10).await.unwrap_err();
    assert!(matches!(err, BoardError::BadArgument(_)));
}

#[tokio::test]
async fn flip_blank_player_id_is_bad_argument() {
    let board = five_by_five();
    let err = board.flip("   ", 0, 0).await.unwrap_err();
    assert!(matches!(err, BoardError::BadArgument(_)));
}

#[tokio::test]
async fn flip_cancellable_removes_its_own_waiter_entry_on_cancel() {
    let board = Arc::new(five_by_five());
    board.flip("alice", 0, 0).await.unwrap();

    let contended = board.wait_for_contention(Position::new(0, 0)).await;
    let token = CancellationToken::new();
    let child = token.clone();
    let bob_board = Arc::clone(&board);
    let bob_task =
        tokio::spawn(async move { bob_board.flip_cancellable("bob", 0, 0, child).await });

    contended.await.unwrap();
    token.cancel();

    let result = bob_task.await.unwrap();
    assert_eq!(result.unwrap_err(), BoardError::Cancelled);

    // Releasing control now must not panic or hang even though bob's
    // waiter entry is gone (tolerated as a no-op per the design notes).
    let _ = board.flip("alice", 0, 1).await;
}
