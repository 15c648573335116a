use std::{sync::Arc, time::Duration};

use shared::{
    domain::{CategoryId, GameId, Item, ItemId},
    error::ApiException,
    protocol::{CheckAnswerResponse, GroupSortGame, LeaderboardEntry, SubmitScoreRequest},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod api;
pub mod board;
pub mod timer;

pub use api::{GameApi, HttpGameApi};
use board::Board;
use timer::{Countdown, Tick, TimerPhase};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const LEADERBOARD_LIMIT: u32 = 5;

/// The one user-visible blocking error: the game definition could not be
/// loaded, so a session cannot start. Everything after load degrades
/// gracefully instead of failing.
#[derive(Debug, Error)]
pub enum GameLoadError {
    #[error("game {game_id} not found")]
    NotFound { game_id: GameId },
    #[error("failed to load game {game_id}: {reason}")]
    Fetch {
        game_id: GameId,
        reason: anyhow::Error,
    },
}

/// Final outcome of a play, from either the remote validator or the
/// local fallback calculation. The two paths are never mixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    pub correct_items: u32,
    pub total_items: u32,
    /// Whole percentage points.
    pub accuracy: u32,
    /// Seconds from start to submission.
    pub time_taken: u32,
    pub score: u32,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    TimeExpired,
    ResultReady(GameResult),
    HighestScoreUpdated(Option<u32>),
    LeaderboardUpdated(Vec<LeaderboardEntry>),
    Error(String),
}

/// Read-only view of the current play for rendering.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub pool: Vec<Item>,
    pub buckets: Vec<BucketSnapshot>,
    pub time_left: u32,
    pub paused: bool,
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct BucketSnapshot {
    pub category_id: CategoryId,
    pub name: String,
    pub items: Vec<Item>,
}

struct SessionInner {
    game: GroupSortGame,
    board: Board,
    countdown: Countdown,
    finished: bool,
    result: Option<GameResult>,
    highest_score: Option<u32>,
    leaderboard: Vec<LeaderboardEntry>,
}

/// One group-sort play: the placement board, the countdown, and the
/// submission flow against the remote backend. Constructed per play and
/// torn down with it; no process-wide state.
pub struct GameSession {
    api: Arc<dyn GameApi>,
    inner: Mutex<SessionInner>,
    timer_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession").finish_non_exhaustive()
    }
}

enum Validation {
    Remote(CheckAnswerResponse),
    Local { correct: u32, total: u32 },
}

impl GameSession {
    /// Fetches the game definition and builds a fresh session: shuffled
    /// pool, empty buckets, idle countdown. Also makes a best-effort
    /// initial refresh of the caller's best score and the leaderboard.
    pub async fn load(
        api: Arc<dyn GameApi>,
        game_id: &GameId,
    ) -> Result<Arc<Self>, GameLoadError> {
        let game = api.fetch_game(game_id).await.map_err(|reason| {
            if reason
                .downcast_ref::<ApiException>()
                .is_some_and(ApiException::is_not_found)
            {
                GameLoadError::NotFound {
                    game_id: game_id.clone(),
                }
            } else {
                GameLoadError::Fetch {
                    game_id: game_id.clone(),
                    reason,
                }
            }
        })?;

        let mut board = Board::new(&game.game_data.categories);
        board.shuffle_pool(&mut rand::thread_rng());
        let countdown = Countdown::new(game.game_data.time_limit);
        info!(
            game_id = %game.id,
            items = board.total_items(),
            time_limit = countdown.time_limit(),
            "loaded group-sort game"
        );

        let (events, _) = broadcast::channel(64);
        let session = Arc::new(Self {
            api,
            inner: Mutex::new(SessionInner {
                game,
                board,
                countdown,
                finished: false,
                result: None,
                highest_score: None,
                leaderboard: Vec::new(),
            }),
            timer_task: std::sync::Mutex::new(None),
            events,
        });

        session.refresh_scoreboards().await;
        Ok(session)
    }

    /// Starts the countdown and the once-per-second tick driver. A second
    /// call is a no-op; a zero-limit game submits immediately.
    pub async fn start(self: &Arc<Self>) {
        let expired_at_start = {
            let mut inner = self.inner.lock().await;
            if inner.finished || inner.countdown.phase() != TimerPhase::Idle {
                return;
            }
            inner.countdown.start();
            inner.countdown.phase() == TimerPhase::Expired
        };

        if expired_at_start {
            let _ = self.events.send(SessionEvent::TimeExpired);
            self.submit().await;
            return;
        }

        let task = self.spawn_tick_driver();
        if let Ok(mut guard) = self.timer_task.lock() {
            if let Some(previous) = guard.replace(task) {
                previous.abort();
            }
        }
    }

    pub async fn pause(&self) {
        self.inner.lock().await.countdown.pause();
    }

    pub async fn resume(&self) {
        self.inner.lock().await.countdown.resume();
    }

    pub async fn time_left(&self) -> u32 {
        self.inner.lock().await.countdown.time_left()
    }

    /// Drops an item into a category bucket. Silent no-op for unknown ids
    /// or once the session is finished.
    pub async fn place_item(&self, item_id: &ItemId, category_id: &CategoryId) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.finished {
            return false;
        }
        inner.board.place(item_id, category_id)
    }

    pub async fn return_to_pool(&self, item_id: &ItemId) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.finished {
            return false;
        }
        inner.board.return_to_pool(item_id)
    }

    /// True once every item sits in some bucket; submission is normally
    /// gated on this.
    pub async fn is_complete(&self) -> bool {
        self.inner.lock().await.board.is_complete()
    }

    pub async fn hints(&self) -> Vec<String> {
        self.inner.lock().await.board.hints()
    }

    pub async fn game(&self) -> GroupSortGame {
        self.inner.lock().await.game.clone()
    }

    pub async fn highest_score(&self) -> Option<u32> {
        self.inner.lock().await.highest_score
    }

    pub async fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.inner.lock().await.leaderboard.clone()
    }

    pub async fn result(&self) -> Option<GameResult> {
        self.inner.lock().await.result.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        let buckets = inner
            .game
            .game_data
            .categories
            .iter()
            .map(|category| BucketSnapshot {
                category_id: category.id.clone(),
                name: category.name.clone(),
                items: inner.board.placed_in(&category.id).to_vec(),
            })
            .collect();
        SessionSnapshot {
            pool: inner.board.pool().to_vec(),
            buckets,
            time_left: inner.countdown.time_left(),
            paused: inner.countdown.is_paused(),
            finished: inner.finished,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Converts the session into a persisted result, exactly once.
    ///
    /// Returns the result for the call that performed the submission and
    /// for any call after it completes; returns `None` when a submission
    /// is already in flight. Remote validation failures fall back to
    /// local scoring, and every post-validation call is best-effort, so
    /// the caller always gets a result to present.
    pub async fn submit(&self) -> Option<GameResult> {
        let (game_id, answers, local_correct, local_total, time_taken, score_per_item) = {
            let mut inner = self.inner.lock().await;
            if inner.finished {
                return inner.result.clone();
            }
            inner.finished = true;
            inner.countdown.stop();
            (
                inner.game.id.clone(),
                inner.board.answers(),
                inner.board.correct_placements(),
                inner.board.total_items(),
                inner.countdown.elapsed(),
                inner.game.game_data.score_per_item,
            )
        };

        info!(
            game_id = %game_id,
            placed = answers.len(),
            time_taken,
            "submitting group-sort session"
        );

        let validation = match self.api.check_answer(&game_id, answers).await {
            Ok(response) => Validation::Remote(response),
            Err(err) => {
                warn!(
                    game_id = %game_id,
                    "answer validation failed, scoring locally: {err}"
                );
                Validation::Local {
                    correct: local_correct,
                    total: local_total,
                }
            }
        };

        let result = match validation {
            Validation::Remote(response) => GameResult {
                correct_items: response.correct_count,
                total_items: response.total_count,
                accuracy: response.percentage,
                time_taken,
                score: response.score,
            },
            Validation::Local { correct, total } => GameResult {
                correct_items: correct,
                total_items: total,
                accuracy: if total > 0 {
                    ((correct as f64 / total as f64) * 100.0).round() as u32
                } else {
                    0
                },
                time_taken,
                score: correct * score_per_item,
            },
        };

        self.inner.lock().await.result = Some(result.clone());
        let _ = self.events.send(SessionEvent::ResultReady(result.clone()));

        if let Err(err) = self.api.increment_play_count(&game_id).await {
            warn!(game_id = %game_id, "play-count increment failed: {err}");
        }

        let score_request = SubmitScoreRequest {
            game_id: game_id.clone(),
            score: result.score,
            time_spent: Some(time_taken),
            game_data: None,
        };
        if let Err(err) = self.api.submit_score(score_request).await {
            warn!(game_id = %game_id, "score submission failed: {err}");
            let _ = self
                .events
                .send(SessionEvent::Error(format!("score submission failed: {err}")));
        }

        self.refresh_scoreboards().await;
        Some(result)
    }

    /// Tears the session down: aborts the tick driver and freezes the
    /// countdown. Call when the player navigates away without submitting.
    pub async fn shutdown(&self) {
        self.abort_timer_task();
        self.inner.lock().await.countdown.stop();
    }

    /// Re-reads the caller's best score and the leaderboard. Failures
    /// degrade to "no record" / empty leaderboard and never block.
    async fn refresh_scoreboards(&self) {
        let game_id = { self.inner.lock().await.game.id.clone() };

        let highest = match self.api.highest_score(&game_id).await {
            Ok(record) => record.map(|record| record.score),
            Err(err) => {
                warn!(game_id = %game_id, "highest-score fetch failed: {err}");
                None
            }
        };
        self.inner.lock().await.highest_score = highest;
        let _ = self.events.send(SessionEvent::HighestScoreUpdated(highest));

        let leaderboard = match self.api.leaderboard(&game_id, LEADERBOARD_LIMIT).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(game_id = %game_id, "leaderboard fetch failed: {err}");
                Vec::new()
            }
        };
        self.inner.lock().await.leaderboard = leaderboard.clone();
        let _ = self
            .events
            .send(SessionEvent::LeaderboardUpdated(leaderboard));
    }

    /// One tick per second while the session lives. Holds only a weak
    /// reference so a discarded session stops the driver; expiry fires
    /// the signal once and triggers the one submission.
    fn spawn_tick_driver(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(TICK_INTERVAL).await;
                let Some(session) = weak.upgrade() else {
                    break;
                };
                let expired = {
                    let mut inner = session.inner.lock().await;
                    if inner.finished {
                        break;
                    }
                    matches!(inner.countdown.tick(), Tick::Expired)
                };
                if expired {
                    let _ = session.events.send(SessionEvent::TimeExpired);
                    session.submit().await;
                    break;
                }
            }
        })
    }

    fn abort_timer_task(&self) {
        if let Ok(mut guard) = self.timer_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

impl Drop for GameSession {
    fn drop(&mut self) {
        // Never leave a tick driver running against a discarded session.
        self.abort_timer_task();
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
