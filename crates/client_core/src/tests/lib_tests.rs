use super::*;
use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use shared::{
    domain::{Category, UserId},
    protocol::{AnswerPair, GameData, GameScoreRecord},
};

struct TestGameApi {
    game: GroupSortGame,
    fail_fetch: Option<u16>,
    fail_check_answer: bool,
    fail_submit_score: bool,
    fail_highest: bool,
    fail_leaderboard: bool,
    highest: Option<u32>,
    leaderboard: Vec<LeaderboardEntry>,
    check_answer_calls: Arc<Mutex<u32>>,
    play_count_calls: Arc<Mutex<u32>>,
    submitted_scores: Arc<Mutex<Vec<SubmitScoreRequest>>>,
}

impl TestGameApi {
    fn new(game: GroupSortGame) -> Self {
        Self {
            game,
            fail_fetch: None,
            fail_check_answer: false,
            fail_submit_score: false,
            fail_highest: false,
            fail_leaderboard: false,
            highest: None,
            leaderboard: Vec::new(),
            check_answer_calls: Arc::new(Mutex::new(0)),
            play_count_calls: Arc::new(Mutex::new(0)),
            submitted_scores: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing_validation(mut self) -> Self {
        self.fail_check_answer = true;
        self
    }

    fn failing_score_backend(mut self) -> Self {
        self.fail_submit_score = true;
        self.fail_highest = true;
        self.fail_leaderboard = true;
        self
    }

    fn with_highest(mut self, score: u32) -> Self {
        self.highest = Some(score);
        self
    }

    fn with_leaderboard(mut self, entries: Vec<LeaderboardEntry>) -> Self {
        self.leaderboard = entries;
        self
    }

    fn correct_category_index(&self) -> HashMap<shared::domain::ItemId, CategoryId> {
        let mut index = HashMap::new();
        for category in &self.game.game_data.categories {
            for item in &category.items {
                index.insert(item.id.clone(), category.id.clone());
            }
        }
        index
    }
}

#[async_trait]
impl GameApi for TestGameApi {
    async fn fetch_game(&self, _game_id: &GameId) -> anyhow::Result<GroupSortGame> {
        if let Some(status) = self.fail_fetch {
            return Err(ApiException::new(status, "game unavailable").into());
        }
        Ok(self.game.clone())
    }

    /// Validates the way the real backend does: counts answers whose
    /// bucket matches the owning category of the item.
    async fn check_answer(
        &self,
        _game_id: &GameId,
        answers: Vec<AnswerPair>,
    ) -> anyhow::Result<CheckAnswerResponse> {
        *self.check_answer_calls.lock().await += 1;
        if self.fail_check_answer {
            return Err(anyhow!("validator unreachable"));
        }
        let index = self.correct_category_index();
        let correct_count = answers
            .iter()
            .filter(|answer| index.get(&answer.item_id) == Some(&answer.category_id))
            .count() as u32;
        let total_count = index.len() as u32;
        let percentage = if total_count > 0 {
            ((correct_count as f64 / total_count as f64) * 100.0).round() as u32
        } else {
            0
        };
        Ok(CheckAnswerResponse {
            correct_count,
            total_count,
            score: correct_count * self.game.game_data.score_per_item,
            percentage,
        })
    }

    async fn submit_score(&self, request: SubmitScoreRequest) -> anyhow::Result<()> {
        if self.fail_submit_score {
            return Err(anyhow!("score backend unavailable"));
        }
        self.submitted_scores.lock().await.push(request);
        Ok(())
    }

    async fn highest_score(&self, game_id: &GameId) -> anyhow::Result<Option<GameScoreRecord>> {
        if self.fail_highest {
            return Err(anyhow!("score backend unavailable"));
        }
        Ok(self.highest.map(|score| GameScoreRecord {
            id: uuid::Uuid::new_v4(),
            user_id: UserId::from("player-1"),
            game_id: game_id.clone(),
            score,
            time_spent: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }))
    }

    async fn leaderboard(
        &self,
        _game_id: &GameId,
        _limit: u32,
    ) -> anyhow::Result<Vec<LeaderboardEntry>> {
        if self.fail_leaderboard {
            return Err(anyhow!("score backend unavailable"));
        }
        Ok(self.leaderboard.clone())
    }

    async fn increment_play_count(&self, _game_id: &GameId) -> anyhow::Result<()> {
        *self.play_count_calls.lock().await += 1;
        Ok(())
    }
}

fn item(id: &str) -> shared::domain::Item {
    shared::domain::Item {
        id: id.into(),
        text: id.to_uppercase(),
        image: None,
        correct_category_id: CategoryId::default(),
        hint: None,
    }
}

fn sample_game(time_limit: u32) -> GroupSortGame {
    GroupSortGame {
        id: "game-1".into(),
        name: "Sort the things".to_string(),
        description: String::new(),
        thumbnail_image: None,
        is_published: true,
        game_data: GameData {
            categories: vec![
                Category {
                    id: "fruit".into(),
                    name: "Fruit".to_string(),
                    items: vec![item("apple"), item("banana")],
                },
                Category {
                    id: "animal".into(),
                    name: "Animal".to_string(),
                    items: vec![item("cat"), item("dog")],
                },
            ],
            time_limit,
            score_per_item: 10,
        },
        creator_name: Some("author-1".to_string()),
    }
}

fn ten_item_game() -> GroupSortGame {
    let mut game = sample_game(60);
    game.game_data.categories = vec![
        Category {
            id: "a".into(),
            name: "A".to_string(),
            items: (0..5).map(|n| item(&format!("a{n}"))).collect(),
        },
        Category {
            id: "b".into(),
            name: "B".to_string(),
            items: (0..5).map(|n| item(&format!("b{n}"))).collect(),
        },
    ];
    game
}

async fn place_all_correct(session: &Arc<GameSession>) {
    for (item_id, category_id) in [
        ("apple", "fruit"),
        ("banana", "fruit"),
        ("cat", "animal"),
        ("dog", "animal"),
    ] {
        assert!(session.place_item(&item_id.into(), &category_id.into()).await);
    }
}

#[tokio::test]
async fn full_play_adopts_remote_validation_result() {
    let api = Arc::new(TestGameApi::new(sample_game(60)));
    let submitted = api.submitted_scores.clone();
    let session = GameSession::load(api, &"game-1".into())
        .await
        .expect("load");

    place_all_correct(&session).await;
    assert!(session.is_complete().await);

    let result = session.submit().await.expect("result");
    assert_eq!(
        result,
        GameResult {
            correct_items: 4,
            total_items: 4,
            accuracy: 100,
            time_taken: 0,
            score: 40,
        }
    );

    let submitted = submitted.lock().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].score, 40);
    assert_eq!(submitted[0].game_id, GameId::from("game-1"));
}

#[tokio::test]
async fn falls_back_to_local_scoring_when_validation_fails() {
    let api = Arc::new(TestGameApi::new(ten_item_game()).failing_validation());
    let submitted = api.submitted_scores.clone();
    let session = GameSession::load(api, &"game-1".into())
        .await
        .expect("load");

    // Six items in the right bucket, four in the wrong one.
    for n in 0..5 {
        session.place_item(&format!("a{n}").as_str().into(), &"a".into()).await;
    }
    session.place_item(&"b0".into(), &"b".into()).await;
    for n in 1..5 {
        session.place_item(&format!("b{n}").as_str().into(), &"a".into()).await;
    }

    let result = session.submit().await.expect("result");
    assert_eq!(result.correct_items, 6);
    assert_eq!(result.total_items, 10);
    assert_eq!(result.accuracy, 60);
    assert_eq!(result.score, 60);

    // The fallback score is what gets recorded, never a re-derived one.
    let submitted = submitted.lock().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].score, 60);
}

#[tokio::test]
async fn incomplete_submission_is_scored_against_the_full_set() {
    let api = Arc::new(TestGameApi::new(sample_game(60)).failing_validation());
    let session = GameSession::load(api, &"game-1".into())
        .await
        .expect("load");

    session.place_item(&"apple".into(), &"fruit".into()).await;
    session.place_item(&"cat".into(), &"animal".into()).await;
    assert!(!session.is_complete().await);

    let result = session.submit().await.expect("result");
    assert_eq!(result.correct_items, 2);
    assert_eq!(result.total_items, 4);
    assert_eq!(result.accuracy, 50);
    assert_eq!(result.score, 20);
}

#[tokio::test]
async fn second_submit_is_a_noop() {
    let api = Arc::new(TestGameApi::new(sample_game(60)));
    let check_calls = api.check_answer_calls.clone();
    let play_counts = api.play_count_calls.clone();
    let submitted = api.submitted_scores.clone();
    let session = GameSession::load(api, &"game-1".into())
        .await
        .expect("load");
    place_all_correct(&session).await;

    let first = session.submit().await.expect("result");
    let second = session.submit().await.expect("cached result");
    assert_eq!(first, second);

    assert_eq!(*check_calls.lock().await, 1);
    assert_eq!(*play_counts.lock().await, 1);
    assert_eq!(submitted.lock().await.len(), 1);
}

#[tokio::test]
async fn score_backend_failures_never_block_the_result() {
    let api = Arc::new(TestGameApi::new(sample_game(60)).failing_score_backend());
    let session = GameSession::load(api, &"game-1".into())
        .await
        .expect("load");
    place_all_correct(&session).await;
    let mut rx = session.subscribe_events();

    let result = session.submit().await.expect("result");
    assert_eq!(result.score, 40);

    // Degraded views: no previous best, empty leaderboard.
    assert_eq!(session.highest_score().await, None);
    assert!(session.leaderboard().await.is_empty());

    let mut saw_result = false;
    let mut saw_error = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            SessionEvent::ResultReady(ready) => {
                assert_eq!(ready, result);
                saw_result = true;
            }
            SessionEvent::Error(_) => saw_error = true,
            _ => {}
        }
    }
    assert!(saw_result);
    assert!(saw_error);
}

#[tokio::test]
async fn load_refreshes_best_score_and_leaderboard() {
    let entry = LeaderboardEntry {
        user_id: UserId::from("player-2"),
        username: "rival".to_string(),
        highest_score: 90,
        total_plays: 3,
    };
    let api = Arc::new(
        TestGameApi::new(sample_game(60))
            .with_highest(70)
            .with_leaderboard(vec![entry]),
    );
    let session = GameSession::load(api, &"game-1".into())
        .await
        .expect("load");

    assert_eq!(session.highest_score().await, Some(70));
    let leaderboard = session.leaderboard().await;
    assert_eq!(leaderboard.len(), 1);
    assert_eq!(leaderboard[0].username, "rival");
}

#[tokio::test]
async fn missing_game_surfaces_as_not_found() {
    let mut api = TestGameApi::new(sample_game(60));
    api.fail_fetch = Some(404);
    let err = GameSession::load(Arc::new(api), &"missing".into())
        .await
        .expect_err("load must fail");
    assert!(matches!(err, GameLoadError::NotFound { .. }));
}

#[tokio::test]
async fn backend_outage_surfaces_as_fetch_error() {
    let mut api = TestGameApi::new(sample_game(60));
    api.fail_fetch = Some(500);
    let err = GameSession::load(Arc::new(api), &"game-1".into())
        .await
        .expect_err("load must fail");
    assert!(matches!(err, GameLoadError::Fetch { .. }));
}

#[tokio::test]
async fn placements_are_rejected_once_finished() {
    let api = Arc::new(TestGameApi::new(sample_game(60)));
    let session = GameSession::load(api, &"game-1".into())
        .await
        .expect("load");
    place_all_correct(&session).await;
    session.submit().await;

    assert!(!session.place_item(&"apple".into(), &"animal".into()).await);
    assert!(!session.return_to_pool(&"apple".into()).await);
}

#[tokio::test(start_paused = true)]
async fn timer_expiry_submits_exactly_once() {
    let api = Arc::new(TestGameApi::new(sample_game(3)));
    let check_calls = api.check_answer_calls.clone();
    let session = GameSession::load(api, &"game-1".into())
        .await
        .expect("load");
    let mut rx = session.subscribe_events();

    session.start().await;

    let mut saw_expired = false;
    loop {
        match rx.recv().await.expect("event") {
            SessionEvent::TimeExpired => saw_expired = true,
            SessionEvent::ResultReady(result) => {
                assert_eq!(result.time_taken, 3);
                break;
            }
            _ => {}
        }
    }
    assert!(saw_expired);

    // Let virtual time run on; no second submission may happen.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(*check_calls.lock().await, 1);
    assert_eq!(session.time_left().await, 0);
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_the_countdown_under_the_driver() {
    let api = Arc::new(TestGameApi::new(sample_game(60)));
    let session = GameSession::load(api, &"game-1".into())
        .await
        .expect("load");
    session.start().await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    session.pause().await;
    let frozen = session.time_left().await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(session.time_left().await, frozen);

    session.resume().await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(session.time_left().await < frozen);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_tick_driver() {
    let api = Arc::new(TestGameApi::new(sample_game(5)));
    let check_calls = api.check_answer_calls.clone();
    let session = GameSession::load(api, &"game-1".into())
        .await
        .expect("load");
    session.start().await;
    session.shutdown().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(*check_calls.lock().await, 0);
    assert!(!session.snapshot().await.finished);
}
