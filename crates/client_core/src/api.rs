use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::GameId,
    error::{ApiError, ApiException},
    protocol::{
        AnswerPair, ApiEnvelope, CheckAnswerRequest, CheckAnswerResponse, GameScoreRecord,
        GroupSortGame, LeaderboardEntry, PlayCountRequest, SubmitScoreRequest,
    },
};
use tracing::info;
use url::Url;

/// The external capabilities the session depends on: game-definition
/// fetch, answer validation, score recording, and the leaderboard reads.
/// All durable state lives behind this seam.
#[async_trait]
pub trait GameApi: Send + Sync {
    async fn fetch_game(&self, game_id: &GameId) -> Result<GroupSortGame>;
    async fn check_answer(
        &self,
        game_id: &GameId,
        answers: Vec<AnswerPair>,
    ) -> Result<CheckAnswerResponse>;
    async fn submit_score(&self, request: SubmitScoreRequest) -> Result<()>;
    async fn highest_score(&self, game_id: &GameId) -> Result<Option<GameScoreRecord>>;
    async fn leaderboard(&self, game_id: &GameId, limit: u32) -> Result<Vec<LeaderboardEntry>>;
    async fn increment_play_count(&self, game_id: &GameId) -> Result<()>;
}

/// `GameApi` over the platform's REST backend.
pub struct HttpGameApi {
    http: Client,
    base_url: Url,
}

impl HttpGameApi {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    pub fn from_url_str(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(base_url)?))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }
}

/// Decodes a response, turning non-success statuses into `ApiException`
/// carrying the backend's `message` body when one is present.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|err| err.message)
            .unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        return Err(ApiException::new(status.as_u16(), message).into());
    }
    let envelope: ApiEnvelope<T> = response.json().await?;
    Ok(envelope.data)
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ApiException>()
        .is_some_and(ApiException::is_not_found)
}

#[async_trait]
impl GameApi for HttpGameApi {
    /// Fetches the published definition; a 404 (unpublished game) falls
    /// back to the private play endpoint before giving up with the
    /// original error.
    async fn fetch_game(&self, game_id: &GameId) -> Result<GroupSortGame> {
        let public = self
            .http
            .get(self.endpoint(&format!(
                "/api/game/game-type/group-sort/{game_id}/play/public"
            )))
            .send()
            .await?;
        match read_json(public).await {
            Ok(game) => Ok(game),
            Err(public_err) if is_not_found(&public_err) => {
                let private = self
                    .http
                    .get(self.endpoint(&format!(
                        "/api/game/game-type/group-sort/{game_id}/play/private"
                    )))
                    .send()
                    .await?;
                match read_json(private).await {
                    Ok(game) => {
                        info!(game_id = %game_id, "playing unpublished game via private endpoint");
                        Ok(game)
                    }
                    Err(_) => Err(public_err),
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn check_answer(
        &self,
        game_id: &GameId,
        answers: Vec<AnswerPair>,
    ) -> Result<CheckAnswerResponse> {
        let response = self
            .http
            .post(self.endpoint(&format!(
                "/api/game/game-type/group-sort/{game_id}/check-answer"
            )))
            .json(&CheckAnswerRequest { answers })
            .send()
            .await?;
        read_json(response).await
    }

    async fn submit_score(&self, request: SubmitScoreRequest) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("/api/score/submit"))
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|err| err.message)
                .unwrap_or_else(|_| "score submission failed".to_string());
            return Err(ApiException::new(status.as_u16(), message).into());
        }
        Ok(())
    }

    /// The backend answers `{ "data": null }` when the caller has no
    /// recorded play yet; a 404 means the same thing.
    async fn highest_score(&self, game_id: &GameId) -> Result<Option<GameScoreRecord>> {
        let response = self
            .http
            .get(self.endpoint(&format!("/api/score/highest/{game_id}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(response).await
    }

    async fn leaderboard(&self, game_id: &GameId, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        let response = self
            .http
            .get(self.endpoint(&format!("/api/score/leaderboard/{game_id}")))
            .query(&[("limit", limit)])
            .send()
            .await?;
        read_json(response).await
    }

    async fn increment_play_count(&self, game_id: &GameId) -> Result<()> {
        self.http
            .post(self.endpoint("/api/game/play-count"))
            .json(&PlayCountRequest {
                game_id: game_id.clone(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
