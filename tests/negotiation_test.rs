//! Integration tests for draw, takeback and rematch offers, including the
//! evaluation stream's view of a takeback.

mod common;

use std::time::Duration;

use common::*;
use serde_json::{json, Value};
use server::config::Config;

async fn eval_observer(srv: &TestServer, match_id: &str) -> (Ws, Value) {
    let mut ws = srv.connect("/ws/eval").await;
    send(
        &mut ws,
        json!({
            "type": "eval-handshake",
            "gameId": match_id,
            "variant": "standard",
            "boardWidth": 5,
            "boardHeight": 5,
        }),
    )
    .await;
    let accepted = next_json(&mut ws).await.unwrap();
    assert_eq!(accepted["type"], "eval-handshake-accepted");
    let history = recv_type(&mut ws, "eval-history").await;
    (ws, history)
}

fn plies(history: &Value) -> Vec<u64> {
    history["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["ply"].as_u64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_draw_offer_and_accept() {
    let srv = TestServer::start().await;
    let (match_id, t1, t2) = srv.two_player_match().await;
    let mut p1 = srv.seat(&match_id, Some(&t1)).await;
    let mut p2 = srv.seat(&match_id, Some(&t2)).await;

    send(&mut p1, json!({ "type": "draw-offer" })).await;
    let offer = recv_type(&mut p2, "draw-offer").await;
    assert_eq!(offer["offer"]["kind"], "draw");
    assert_eq!(offer["offer"]["actor"], 1);

    // A second offer while one is pending is refused.
    send(&mut p2, json!({ "type": "draw-offer" })).await;
    let err = recv_type(&mut p2, "error").await;
    assert_eq!(err["message"], "A draw offer is already pending");

    send(&mut p2, json!({ "type": "draw-accept" })).await;
    let done = recv_until(&mut p1, |m| m["type"] == "state" && m["state"]["status"] == "finished").await;
    assert_eq!(done["state"]["result"]["winner"], Value::Null);
    assert_eq!(done["state"]["result"]["reason"], "draw-agreement");
}

#[tokio::test]
async fn test_offer_cannot_be_withdrawn_during_grace() {
    let srv = TestServer::start().await;
    let (match_id, t1, _) = srv.two_player_match().await;
    let mut p1 = srv.seat(&match_id, Some(&t1)).await;

    send(&mut p1, json!({ "type": "draw-offer" })).await;
    recv_type(&mut p1, "draw-offer").await;
    send(&mut p1, json!({ "type": "draw-reject" })).await;
    let err = recv_type(&mut p1, "error").await;
    assert!(err["message"].as_str().unwrap().contains("can be withdrawn in"));
}

#[tokio::test]
async fn test_offer_withdrawn_after_grace() {
    let config = Config {
        negotiation_grace: Duration::ZERO,
        ..Config::local()
    };
    let srv = TestServer::start_with(config).await;
    let (match_id, t1, t2) = srv.two_player_match().await;
    let mut p1 = srv.seat(&match_id, Some(&t1)).await;
    let mut p2 = srv.seat(&match_id, Some(&t2)).await;

    send(&mut p1, json!({ "type": "takeback-offer" })).await;
    let err = recv_type(&mut p1, "error").await;
    assert_eq!(err["message"], "Nothing to take back");

    send(&mut p1, json!({ "type": "draw-offer" })).await;
    recv_type(&mut p2, "draw-offer").await;
    send(&mut p1, json!({ "type": "draw-reject" })).await;
    let rejected = recv_type(&mut p2, "draw-rejected").await;
    assert_eq!(rejected["offer"]["status"], "declined");

    let view: Value = srv.get(&format!("/api/matches/{match_id}")).await.json().await.unwrap();
    assert_eq!(view["snapshot"]["pendingOffers"], json!([]));
}

#[tokio::test]
async fn test_takeback_truncates_history_and_evaluations() {
    let srv = TestServer::start().await;
    let (match_id, t1, t2) = srv.two_player_match().await;
    let mut p1 = srv.seat(&match_id, Some(&t1)).await;
    let mut p2 = srv.seat(&match_id, Some(&t2)).await;

    send(&mut p1, cat_move(3, 0)).await;
    recv_state_at(&mut p2, 1).await;
    send(&mut p2, cat_move(1, 4)).await;
    recv_state_at(&mut p1, 2).await;
    send(&mut p1, cat_move(2, 0)).await;
    recv_state_at(&mut p2, 3).await;

    let (mut observer, history) = eval_observer(&srv, &match_id).await;
    assert_eq!(plies(&history), vec![0, 1, 2, 3]);

    // Player 2 is on move, so their last ply and player 1's reply both go.
    send(&mut p2, json!({ "type": "takeback-offer" })).await;
    recv_type(&mut p1, "takeback-offer").await;
    send(&mut p1, json!({ "type": "takeback-accept" })).await;

    let rewound = recv_state_at(&mut p2, 1).await;
    assert_eq!(rewound["state"]["turn"], 2);
    let status = recv_type(&mut p2, "match-status").await;
    assert_eq!(status["snapshot"]["takebacks"], 1);

    let replaced = recv_until(&mut observer, |m| {
        m["type"] == "eval-history" && m["entries"].as_array().map(Vec::len) == Some(2)
    })
    .await;
    assert_eq!(plies(&replaced), vec![0, 1]);

    // Newcomers never see the discarded plies.
    let (_late, late_history) = eval_observer(&srv, &match_id).await;
    assert_eq!(plies(&late_history), vec![0, 1]);
}

#[tokio::test]
async fn test_eval_handshake_must_match_board() {
    let srv = TestServer::start().await;
    let (match_id, _, _) = srv.two_player_match().await;

    let mut ws = srv.connect("/ws/eval").await;
    send(
        &mut ws,
        json!({
            "type": "eval-handshake",
            "gameId": match_id,
            "variant": "classic",
            "boardWidth": 5,
            "boardHeight": 5,
        }),
    )
    .await;
    let err = next_json(&mut ws).await.unwrap();
    assert_eq!(err["type"], "error");
    assert!(next_json(&mut ws).await.is_none());

    let mut unknown = srv.connect("/ws/eval").await;
    send(
        &mut unknown,
        json!({ "type": "eval-handshake", "gameId": "missing", "variant": "standard", "boardWidth": 5, "boardHeight": 5 }),
    )
    .await;
    assert_eq!(next_json(&mut unknown).await.unwrap()["message"], "Unknown game missing");
}

#[tokio::test]
async fn test_rematch_swaps_seats() {
    let srv = TestServer::start().await;
    let (match_id, t1, t2) = srv.two_player_match().await;
    let mut p1 = srv.seat(&match_id, Some(&t1)).await;
    let mut p2 = srv.seat(&match_id, Some(&t2)).await;

    // Not before the game ends.
    send(&mut p1, json!({ "type": "rematch-offer" })).await;
    recv_type(&mut p1, "error").await;

    send(&mut p1, json!({ "type": "resign" })).await;
    recv_until(&mut p2, |m| m["type"] == "state" && m["state"]["status"] == "finished").await;

    send(&mut p2, json!({ "type": "rematch-offer" })).await;
    recv_type(&mut p1, "rematch-offer").await;
    send(&mut p1, json!({ "type": "rematch-accept" })).await;

    let started = recv_type(&mut p2, "rematch-started").await;
    let new_id = started["newGameId"].as_str().unwrap().to_string();
    assert_ne!(new_id, match_id);

    let view: Value = srv.get(&format!("/api/matches/{new_id}")).await.json().await.unwrap();
    assert_eq!(view["snapshot"]["phase"], "ready");
    assert_eq!(view["snapshot"]["rematchOf"], match_id.as_str());
    assert_eq!(view["snapshot"]["seats"]["1"]["name"], "bo");
    assert_eq!(view["snapshot"]["seats"]["2"]["name"], "ann");

    // Old tokens carry over to the swapped seats.
    let mut ws = srv.connect(&format!("/ws/matches/{new_id}?token={t2}")).await;
    let welcome = recv_type(&mut ws, "welcome").await;
    assert_eq!(welcome["seat"], 1);
}
