//! Terminal chat for booking movie tickets.
//!
//! Type a title or genre to search. Lines starting with `/` press buttons:
//!
//! ```text
//! /movie N  /date N  /theater N  /show N  /seats N  /seat A5
//! /done  /food ID  /unfood ID  /pay  /refresh  /back  /cancel
//! ```
//!
//! # Usage
//!
//! ```bash
//! MARQUEE_USER_ID=64f0c2 MARQUEE_API_URL=http://localhost:8080/ cargo run --bin marquee-chat
//! ```
//!
//! Payments go through a mock checkout that approves every order; the real
//! checkout is a browser widget.

use anyhow::Context as _;
use marquee_booking::chat::{ChatAction, ChatPick, ChatReducer, ChatState};
use marquee_booking::payment::MockCheckoutProvider;
use marquee_booking::{
    BackendClient, BookingAction, BookingEnvironment, Config, FoodItemId, Money, SeatLabel,
    SessionContext,
};
use marquee_core::environment::SystemClock;
use marquee_runtime::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type ChatStore = Store<ChatState, ChatAction, BookingEnvironment, ChatReducer>;

/// How long one input may keep the backend busy before the prompt returns
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

const USAGE: &str = "Buttons: /movie N, /date N, /theater N, /show N, /seats N, /seat A5, \
                     /done, /food ID, /unfood ID, /pay, /refresh, /back, /cancel";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    config.validate().context("invalid configuration")?;
    let client = Arc::new(BackendClient::from_config(&config)?);
    tracing::info!(api = %client.base_url(), city = %config.session.city, "Starting marquee-chat");

    let env = BookingEnvironment::new(
        Arc::new(SystemClock),
        client.clone(),
        client.clone(),
        client,
        MockCheckoutProvider::approving().shared(),
        SessionContext::from_config(&config)?,
    )
    .with_update_fee(Money::new(config.pricing.update_fee));
    let store: ChatStore = Store::new(ChatState::default(), ChatReducer::new(), env);

    println!("What would you like to watch? Type a title or a genre.");
    println!("{USAGE}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = 0;
    while let Some(line) = lines.next_line().await? {
        let action = match parse_line(&line) {
            Ok(Some(action)) => action,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            },
        };

        store.send(action).await?;
        if let Err(error) = store.settle(SETTLE_TIMEOUT).await {
            tracing::warn!(%error, "Backend is slow to answer; replies will follow");
        }
        shown = print_replies(&store, shown).await;
    }

    // Give back any seats still held before exiting.
    store.send(ChatAction::Booking(BookingAction::Cancel)).await?;
    store.shutdown(SETTLE_TIMEOUT).await?;
    Ok(())
}

/// Print assistant messages added since `shown`; returns the new transcript length
async fn print_replies(store: &ChatStore, shown: usize) -> usize {
    store
        .state(|state| {
            for text in state.assistant_messages_since(shown) {
                println!("{text}");
            }
            state.transcript.len()
        })
        .await
}

/// Translate one input line
///
/// `Ok(None)` for a blank line, `Err` with a message for a malformed button.
fn parse_line(line: &str) -> Result<Option<ChatAction>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Some(ChatAction::UserSaid(line.to_string())));
    };

    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default().to_ascii_lowercase();
    let argument = words.next();

    let pick = match (name.as_str(), argument) {
        ("movie", Some(n)) => ChatPick::Movie(position(n)?),
        ("date", Some(n)) => ChatPick::Date(position(n)?),
        ("theater", Some(n)) => ChatPick::Theater(position(n)?),
        ("show", Some(n)) => ChatPick::Showtime(position(n)?),
        ("seats", Some(n)) => ChatPick::SeatCount(n.parse().map_err(|_| format!("Not a seat count: {n}"))?),
        ("seat", Some(label)) => ChatPick::Seat(SeatLabel::parse(label).map_err(|e| e.to_string())?),
        ("food", Some(id)) => ChatPick::Food(FoodItemId::new(id)),
        ("unfood", Some(id)) => ChatPick::RemoveFood(FoodItemId::new(id)),
        ("done", None) => ChatPick::Done,
        ("pay", None) => ChatPick::Pay,
        ("refresh", None) => return Ok(Some(ChatAction::Booking(BookingAction::RefreshSeatMap))),
        ("back", None) => return Ok(Some(ChatAction::Booking(BookingAction::Back))),
        ("cancel", None) => return Ok(Some(ChatAction::Booking(BookingAction::Cancel))),
        _ => return Err(USAGE.to_string()),
    };
    Ok(Some(ChatAction::Picked(pick)))
}

fn position(raw: &str) -> Result<usize, String> {
    raw.parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| format!("Not a list number: {raw}"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;

    fn pick(line: &str) -> ChatPick {
        match parse_line(line) {
            Ok(Some(ChatAction::Picked(pick))) => pick,
            other => panic!("expected a button for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn buttons_parse_to_picks() {
        assert_eq!(pick("/date 3"), ChatPick::Date(3));
        assert_eq!(pick("/show 1"), ChatPick::Showtime(1));
        assert_eq!(pick("/seats 2"), ChatPick::SeatCount(2));
        assert_eq!(pick("/seat b5"), ChatPick::Seat(SeatLabel::parse("B5").unwrap()));
        assert_eq!(pick("/food popcorn"), ChatPick::Food(FoodItemId::new("popcorn")));
        assert_eq!(pick("/unfood popcorn"), ChatPick::RemoveFood(FoodItemId::new("popcorn")));
        assert_eq!(pick(" /DONE "), ChatPick::Done);
    }

    #[test]
    fn free_text_is_said() {
        assert!(matches!(
            parse_line("  inception "),
            Ok(Some(ChatAction::UserSaid(text))) if text == "inception"
        ));
        assert!(matches!(parse_line("   "), Ok(None)));
    }

    #[test]
    fn malformed_buttons_are_explained() {
        assert!(parse_line("/date zero").is_err());
        assert!(parse_line("/date 0").is_err());
        assert!(parse_line("/seat 5B").is_err());
        assert_eq!(parse_line("/dance").unwrap_err(), USAGE);
    }

    #[test]
    fn navigation_buttons_reach_the_booking_flow() {
        assert!(matches!(
            parse_line("/cancel"),
            Ok(Some(ChatAction::Booking(BookingAction::Cancel)))
        ));
        assert!(matches!(
            parse_line("/refresh"),
            Ok(Some(ChatAction::Booking(BookingAction::RefreshSeatMap)))
        ));
    }
}
