//! Chat conventions shared by the command line tools: where barks are sent
//! and read, how they are identified, and what `autobark` says.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::codec::{Address, Message};
use crate::utils::error::Result;

/// Said when no quotes file is available.
pub const DEFAULT_QUOTE: &str = "\"On the Internet, everybody knows you're a dog.\" --Oscar Wilde";

const WORDS: [&str; 4] = ["woof", "arf", "ruff", "yap"];

/// Where a user's followers' barks are delivered.
pub fn inbox(host: &str, user: &str) -> String {
    format!("//{host}/inbox/{user}")
}

/// Where a user's own barks are sent.
pub fn outbox(host: &str, user: &str) -> String {
    format!("//{host}/outbox/{user}")
}

/// `msg` followed by the time in centiseconds as 10 hex digits.
pub fn bark_id(now: DateTime<Utc>) -> String {
    let centis = now.timestamp_millis() / 10;
    format!("msg{:010x}", centis & 0xff_ffff_ffff)
}

/// A bark from `user` addressed to their outbox.
pub fn bark_message(host: &str, user: &str, text: &str, now: DateTime<Utc>) -> Result<Message> {
    Ok(Message::new(
        Address::parse(&outbox(host, user))?,
        user.to_string(),
        text.to_string(),
        bark_id(now),
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bark {
    pub user: String,
    pub text: String,
}

/// A random bark by one of `users`. Mostly dog noises, now and then with a
/// mention or a hashtag, occasionally a quote. `None` without users.
pub fn random_bark<R: Rng + ?Sized>(
    rng: &mut R,
    users: &[String],
    quotes: &[String],
) -> Option<Bark> {
    let user = users.choose(rng)?.clone();

    if rng.gen_bool(0.1) {
        let quote = quotes
            .choose(rng)
            .map(String::as_str)
            .unwrap_or(DEFAULT_QUOTE);
        return Some(Bark {
            user,
            text: quote.to_string(),
        });
    }

    let count = rng.gen_range(3..=8);
    let mut words: Vec<String> = (0..count)
        .filter_map(|_| WORDS.choose(rng).map(|w| w.to_string()))
        .collect();
    if rng.gen_bool(0.25) {
        if let Some(other) = users.choose(rng) {
            words.push(format!("@{other}"));
        }
    }
    if rng.gen_bool(0.1) {
        words.push("#subwoofer".to_string());
    }
    Some(Bark {
        user,
        text: words.join(" "),
    })
}
