use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{GameResult, GameSession, HttpGameApi, SessionEvent};
use shared::domain::GameId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

mod config;

/// Terminal player for group-sort games: drag items into category
/// buckets with `place`, then `submit` before the clock runs out.
#[derive(Parser, Debug)]
struct Args {
    /// Backend base URL; overrides player.toml and the environment.
    #[arg(long)]
    server_url: Option<String>,
    /// The game to play.
    #[arg(long)]
    game_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }

    let api = HttpGameApi::from_url_str(&settings.server_url)?;
    let game_id = GameId::from(args.game_id.as_str());
    let session = GameSession::load(Arc::new(api), &game_id).await?;

    let game = session.game().await;
    println!(
        "Playing '{}' ({} seconds, {} points per item)",
        game.name, game.game_data.time_limit, game.game_data.score_per_item
    );
    if let Some(best) = session.highest_score().await {
        println!("Your best score so far: {best}");
    }
    print_board(&session).await;
    print_help();

    let mut events = session.subscribe_events();
    session.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::TimeExpired) => println!("Time is up!"),
                Ok(SessionEvent::ResultReady(result)) => {
                    print_result(&result);
                    break;
                }
                Ok(SessionEvent::Error(message)) => warn!("{message}"),
                Ok(_) => {}
                Err(_) => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_command(&session, line.trim()).await {
                    break;
                }
            }
        }
    }

    print_scoreboards(&session).await;
    session.shutdown().await;
    Ok(())
}

async fn handle_command(session: &Arc<GameSession>, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("place") => match (parts.next(), parts.next()) {
            (Some(item), Some(category)) => {
                if session.place_item(&item.into(), &category.into()).await {
                    print_board(session).await;
                } else {
                    println!("cannot place '{item}' into '{category}'");
                }
            }
            _ => println!("usage: place <item-id> <category-id>"),
        },
        Some("pool") => match parts.next() {
            Some(item) => {
                if session.return_to_pool(&item.into()).await {
                    print_board(session).await;
                } else {
                    println!("cannot return '{item}' to the pool");
                }
            }
            None => println!("usage: pool <item-id>"),
        },
        Some("board") => print_board(session).await,
        Some("hint") => {
            let hints = session.hints().await;
            if hints.is_empty() {
                println!("no hints for this game");
            }
            for hint in hints {
                println!("  - {hint}");
            }
        }
        Some("time") => println!("{} seconds left", session.time_left().await),
        Some("pause") => {
            session.pause().await;
            println!("paused");
        }
        Some("resume") => {
            session.resume().await;
            println!("resumed");
        }
        Some("submit") => {
            let pool_left = session.snapshot().await.pool.len();
            if pool_left > 0 {
                println!("submitting with {pool_left} item(s) still in the pool");
            }
            // The result arrives through the event stream.
            session.submit().await;
        }
        Some("quit") => return false,
        Some(other) => println!("unknown command '{other}' (try: place, pool, board, hint, time, pause, resume, submit, quit)"),
        None => {}
    }
    true
}

async fn print_board(session: &Arc<GameSession>) {
    let snapshot = session.snapshot().await;
    println!("pool: {}", item_list(&snapshot.pool));
    for bucket in &snapshot.buckets {
        println!(
            "  [{}] {}: {}",
            bucket.category_id,
            bucket.name,
            item_list(&bucket.items)
        );
    }
    if snapshot.paused {
        println!("(paused, {} seconds left)", snapshot.time_left);
    } else {
        println!("({} seconds left)", snapshot.time_left);
    }
}

fn item_list(items: &[shared::domain::Item]) -> String {
    if items.is_empty() {
        return "-".to_string();
    }
    items
        .iter()
        .map(|item| item.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_result(result: &GameResult) {
    println!(
        "Round over: {}/{} correct ({}%), score {} in {} seconds",
        result.correct_items,
        result.total_items,
        result.accuracy,
        result.score,
        result.time_taken
    );
}

async fn print_scoreboards(session: &Arc<GameSession>) {
    if let Some(best) = session.highest_score().await {
        println!("Best score: {best}");
    }
    let leaderboard = session.leaderboard().await;
    if !leaderboard.is_empty() {
        println!("Leaderboard:");
        for (rank, entry) in leaderboard.iter().enumerate() {
            println!(
                "  {}. {} - {} ({} plays)",
                rank + 1,
                entry.username,
                entry.highest_score,
                entry.total_plays
            );
        }
    }
}

fn print_help() {
    println!("commands: place <item> <category>, pool <item>, board, hint, time, pause, resume, submit, quit");
}
