//! Integration tests for matches against server-driven seats.

mod common;

use common::*;
use serde_json::json;
use wallwars_core::GameState;

#[tokio::test]
async fn test_local_ai_moves_first_and_accepts_draw() {
    let srv = TestServer::start().await;
    let created = srv
        .create_match(json!({ "config": standard_5x5(), "name": "ann", "seat": 2, "opponent": "local-ai" }))
        .await;
    assert_eq!(created["seat"], 2);
    assert_eq!(created["snapshot"]["seats"]["1"]["controller"], "local-ai");
    assert_eq!(created["snapshot"]["seats"]["1"]["name"], "Greedy AI");
    let match_id = created["matchId"].as_str().unwrap();
    let token = created["token"].as_str().unwrap();

    let mut me = srv.seat(match_id, Some(token)).await;
    let after_bot = recv_state_at(&mut me, 1).await;
    let state: GameState = serde_json::from_value(after_bot["state"].clone()).unwrap();
    assert_eq!(state.turn().number(), 2);

    // Bots accept after a short delay.
    send(&mut me, json!({ "type": "draw-offer" })).await;
    let done = recv_until(&mut me, |m| m["type"] == "state" && m["state"]["status"] == "finished").await;
    assert_eq!(done["state"]["result"]["reason"], "draw-agreement");
}

#[tokio::test]
async fn test_remote_bot_answers_through_engine() {
    let srv = TestServer::start().await;
    let created = srv
        .create_match(json!({ "config": standard_5x5(), "opponent": "remote-bot" }))
        .await;
    assert_eq!(created["snapshot"]["phase"], "ready");
    let match_id = created["matchId"].as_str().unwrap();
    let token = created["token"].as_str().unwrap();

    let mut me = srv.seat(match_id, Some(token)).await;
    send(&mut me, cat_move(3, 0)).await;
    let reply = recv_state_at(&mut me, 2).await;
    assert_eq!(reply["state"]["turn"], 1);
    assert_eq!(reply["state"]["history"][1]["playerId"], 2);
}

#[tokio::test]
async fn test_human_opponent_kind_rejected() {
    let srv = TestServer::start().await;
    let resp = srv
        .post("/api/matches", json!({ "config": standard_5x5(), "opponent": "human" }))
        .await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_bot_seat_cannot_be_joined() {
    let srv = TestServer::start().await;
    let created = srv
        .create_match(json!({ "config": standard_5x5(), "opponent": "local-ai" }))
        .await;
    let match_id = created["matchId"].as_str().unwrap();
    let resp = srv
        .post(&format!("/api/matches/{match_id}/join"), json!({ "name": "late" }))
        .await;
    assert_eq!(resp.status(), 409);
}
