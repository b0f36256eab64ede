use axum::{extract::Path, http::StatusCode, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::info;
use wallwars_core::{GameConfig, PerPlayer, PlayerId};

use crate::controller::ControllerKind;
use crate::error::AppError;
use crate::registry::{new_token, MatchView, Registry};
use crate::session::SeatSpec;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchRequest {
    pub config: GameConfig,
    pub name: Option<String>,
    /// Seat the creator takes, player 1 by default
    pub seat: Option<PlayerId>,
    /// Fill the other seat with a bot instead of waiting for a second player
    pub opponent: Option<ControllerKind>,
    pub opponent_name: Option<String>,
}

#[derive(Deserialize)]
pub struct JoinRequest {
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct AbortRequest {
    pub token: String,
}

fn default_bot_name(kind: ControllerKind) -> &'static str {
    match kind {
        ControllerKind::Human => "Player",
        ControllerKind::LocalAi => "Greedy AI",
        ControllerKind::RemoteBot => "Engine",
    }
}

/// POST /api/matches
pub async fn create_match(
    Extension(registry): Extension<Registry>,
    Json(req): Json<CreateMatchRequest>,
) -> Result<(StatusCode, Json<JsonValue>), AppError> {
    let seat = req.seat.unwrap_or(PlayerId::One);
    let opponent = match req.opponent {
        Some(ControllerKind::Human) => {
            return Err(AppError::BadRequest(
                "Leave the opponent empty to wait for a second player".to_string(),
            ))
        }
        Some(kind) => Some(SeatSpec {
            controller: kind,
            name: Some(
                req.opponent_name
                    .unwrap_or_else(|| default_bot_name(kind).to_string()),
            ),
            token: None,
        }),
        None => None,
    };

    let token = new_token();
    let creator = Some(SeatSpec {
        controller: ControllerKind::Human,
        name: req.name,
        token: Some(token.clone()),
    });
    let seats = match seat {
        PlayerId::One => PerPlayer::new(creator, opponent),
        PlayerId::Two => PerPlayer::new(opponent, creator),
    };

    let handle = registry.create(req.config, seats, seat, None).await?;
    info!(match_id = %handle.id(), seat = seat.number(), "Match created over HTTP");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "matchId": handle.id(),
            "seat": seat,
            "token": token,
            "snapshot": handle.view().snapshot,
        })),
    ))
}

/// POST /api/matches/{match_id}/join
pub async fn join_match(
    Extension(registry): Extension<Registry>,
    Path(match_id): Path<String>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let handle = registry
        .get(&match_id)
        .await
        .ok_or_else(|| AppError::NotFound("Match not found".to_string()))?;

    let token = new_token();
    let seat = handle.join(req.name, token.clone()).await?;

    Ok(Json(json!({
        "matchId": handle.id(),
        "seat": seat,
        "token": token,
        "snapshot": handle.view().snapshot,
    })))
}

/// POST /api/matches/{match_id}/abort
pub async fn abort_match(
    Extension(registry): Extension<Registry>,
    Path(match_id): Path<String>,
    Json(req): Json<AbortRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let handle = registry
        .get(&match_id)
        .await
        .ok_or_else(|| AppError::NotFound("Match not found".to_string()))?;
    handle.abort(req.token).await?;

    Ok(Json(json!({
        "matchId": handle.id(),
        "snapshot": handle.view().snapshot,
    })))
}

/// GET /api/matches/{match_id}
///
/// Live matches first, then the archive.
pub async fn get_match(
    Extension(registry): Extension<Registry>,
    Path(match_id): Path<String>,
) -> Result<Json<MatchView>, AppError> {
    if let Some(handle) = registry.get(&match_id).await {
        return Ok(Json(handle.view()));
    }
    match registry.archive().get(&match_id).await? {
        Some(record) => Ok(Json(MatchView {
            snapshot: record.snapshot,
            state: record.state,
        })),
        None => Err(AppError::NotFound("Match not found".to_string())),
    }
}

/// GET /api/replays/{match_id}
pub async fn get_replay(
    Extension(registry): Extension<Registry>,
    Path(match_id): Path<String>,
) -> Result<Json<JsonValue>, AppError> {
    let record = registry
        .archive()
        .get(&match_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Replay not found".to_string()))?;

    let height = record.state.config().board_height;
    let moves: Vec<String> = record
        .state
        .history()
        .iter()
        .map(|entry| wallwars_core::notation::move_to_standard_notation(&entry.mv, height))
        .collect();

    Ok(Json(json!({
        "matchId": record.match_id,
        "completedAt": record.completed_at,
        "snapshot": record.snapshot,
        "state": record.state,
        "moves": moves,
    })))
}
