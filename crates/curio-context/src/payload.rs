// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bounded context payload handed to retrieval.

use curio_core::Exchange;
use serde::Serialize;

/// Conversational context for one turn: an optional synopsis of earlier
/// history and the recent exchanges, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextPayload {
    pub synopsis: Option<String>,
    pub exchanges: Vec<Exchange>,
}

impl ContextPayload {
    pub fn is_empty(&self) -> bool {
        self.synopsis.is_none() && self.exchanges.is_empty()
    }

    /// Text form used in the answer prompt and the conversation log.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(synopsis) = &self.synopsis {
            out.push_str(&render_synopsis(synopsis));
        }
        for exchange in &self.exchanges {
            out.push_str(&render_exchange(exchange));
        }
        out
    }

    /// Rendered length in characters.
    pub fn len(&self) -> usize {
        self.synopsis
            .as_deref()
            .map_or(0, |s| render_synopsis(s).chars().count())
            + self
                .exchanges
                .iter()
                .map(|e| render_exchange(e).chars().count())
                .sum::<usize>()
    }

    /// Shrinks the payload until it renders to at most `max_chars`.
    ///
    /// Exchanges are kept newest-first while they fit; the first one that
    /// does not fit and everything older is dropped. A synopsis that does
    /// not fit in the remaining budget is clipped, or dropped entirely when
    /// not even its label fits.
    pub fn truncate_to(&mut self, max_chars: usize) {
        let mut budget = max_chars;
        let mut keep = 0;
        for exchange in self.exchanges.iter().rev() {
            let cost = render_exchange(exchange).chars().count();
            if cost > budget {
                break;
            }
            budget -= cost;
            keep += 1;
        }
        let drop = self.exchanges.len() - keep;
        self.exchanges.drain(..drop);

        if let Some(synopsis) = self.synopsis.take() {
            let overhead = render_synopsis("").chars().count();
            if budget > overhead {
                let clipped: String = synopsis.chars().take(budget - overhead).collect();
                if !clipped.trim().is_empty() {
                    self.synopsis = Some(clipped);
                }
            }
        }
    }
}

fn render_synopsis(synopsis: &str) -> String {
    format!("Summary: {synopsis}\n")
}

fn render_exchange(exchange: &Exchange) -> String {
    format!(
        "User: {}\nAssistant: {}\n",
        exchange.user_input, exchange.model_response
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn exchange(q: &str, a: &str) -> Exchange {
        Exchange {
            conversation_id: "c".into(),
            timestamp: Utc::now(),
            user_input: q.into(),
            model_response: a.into(),
            context_used: String::new(),
        }
    }

    #[test]
    fn renders_synopsis_then_exchanges() {
        let p = ContextPayload {
            synopsis: Some("talked about tea".into()),
            exchanges: vec![exchange("hi", "hello")],
        };
        assert_eq!(p.render(), "Summary: talked about tea\nUser: hi\nAssistant: hello\n");
        assert_eq!(p.len(), p.render().chars().count());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let p = ContextPayload {
            synopsis: None,
            exchanges: vec![exchange("café", "naïve")],
        };
        assert_eq!(p.len(), "User: café\nAssistant: naïve\n".chars().count());
    }

    #[test]
    fn truncation_keeps_newest() {
        let mut p = ContextPayload {
            synopsis: None,
            exchanges: vec![exchange("one", "1"), exchange("two", "2"), exchange("three", "3")],
        };
        let newest_two = render_exchange(&p.exchanges[1]).len() + render_exchange(&p.exchanges[2]).len();
        p.truncate_to(newest_two);
        let kept: Vec<_> = p.exchanges.iter().map(|e| e.user_input.as_str()).collect();
        assert_eq!(kept, vec!["two", "three"]);
    }

    #[test]
    fn oversized_newest_empties_exchanges() {
        let mut p = ContextPayload {
            synopsis: None,
            exchanges: vec![exchange("short", "a"), exchange(&"x".repeat(100), "b")],
        };
        p.truncate_to(50);
        assert!(p.exchanges.is_empty());
    }

    #[test]
    fn synopsis_is_clipped_to_fit() {
        let mut p = ContextPayload {
            synopsis: Some("abcdefghij".into()),
            exchanges: Vec::new(),
        };
        p.truncate_to(15);
        assert_eq!(p.render(), "Summary: abcde\n");
        p.truncate_to(5);
        assert!(p.is_empty());
    }

    proptest! {
        #[test]
        fn truncated_payload_is_bounded_suffix(
            turns in prop::collection::vec(("[a-zé ]{0,40}", "[a-z ]{0,80}"), 0..12),
            synopsis in prop::option::of("[a-z ]{0,60}"),
            max in 0usize..600,
        ) {
            let original: Vec<Exchange> = turns.iter().map(|(q, a)| exchange(q, a)).collect();
            let mut p = ContextPayload { synopsis, exchanges: original.clone() };
            p.truncate_to(max);

            prop_assert!(p.len() <= max);
            let kept = p.exchanges.len();
            prop_assert_eq!(&p.exchanges[..], &original[original.len() - kept..]);
        }
    }
}
