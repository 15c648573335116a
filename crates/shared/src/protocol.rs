use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Category, CategoryId, GameId, ItemId, UserId};

/// Every backend response nests its payload under `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
}

/// Play configuration plus the category/item definitions, as authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameData {
    pub categories: Vec<Category>,
    #[serde(rename = "timeLimit")]
    pub time_limit: u32,
    #[serde(rename = "scorePerItem")]
    pub score_per_item: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSortGame {
    pub id: GameId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_image: Option<String>,
    #[serde(default)]
    pub is_published: bool,
    pub game_data: GameData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
}

/// One placed item reported to the answer-check endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPair {
    pub item_id: ItemId,
    pub category_id: CategoryId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAnswerRequest {
    pub answers: Vec<AnswerPair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAnswerResponse {
    pub correct_count: u32,
    pub total_count: u32,
    pub score: u32,
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitScoreRequest {
    pub game_id: GameId,
    pub score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_data: Option<serde_json::Value>,
}

/// A recorded play, as persisted by the score backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameScoreRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub game_id: GameId,
    pub score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub username: String,
    pub highest_score: u32,
    pub total_plays: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayCountRequest {
    pub game_id: GameId,
}
