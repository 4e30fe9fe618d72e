// SPDX-FileCopyrightText: 2026 Curio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompts and reply parsing for the clarity and necessity judgments.
//!
//! Both parsers lean toward including context: a reply that is neither
//! answer counts as "unclear" and "needed".

pub(crate) fn clarity_prompt(user_input: &str) -> String {
    format!(
        "Is the following message clear and self-contained enough to answer without more detail?\n\n\
         Message: {user_input}\n\n\
         Reply with exactly one word: clear or unclear."
    )
}

pub(crate) fn synopsis_prompt(history: &str) -> String {
    format!(
        "Summarize the key facts and open questions of this conversation in a few sentences.\n\n\
         {history}\nSummary:"
    )
}

pub(crate) fn necessity_prompt(history: &str, user_input: &str) -> String {
    format!(
        "Does answering the new message require the earlier conversation?\n\n\
         Earlier conversation:\n{history}\n\n\
         New message: {user_input}\n\n\
         Reply with exactly one word: yes or no."
    )
}

/// Outcome of the clarity judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clarity {
    Clear,
    Unclear,
}

fn first_word(reply: &str) -> String {
    reply
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

pub fn parse_clarity(reply: &str) -> Clarity {
    if first_word(reply) == "clear" {
        Clarity::Clear
    } else {
        Clarity::Unclear
    }
}

/// `false` only on an explicit "no".
pub fn parse_necessity(reply: &str) -> bool {
    first_word(reply) != "no"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clarity_needs_explicit_clear() {
        assert_eq!(parse_clarity("clear"), Clarity::Clear);
        assert_eq!(parse_clarity("  Clear.\n"), Clarity::Clear);
        assert_eq!(parse_clarity("unclear"), Clarity::Unclear);
        assert_eq!(parse_clarity("It is clear"), Clarity::Unclear);
        assert_eq!(parse_clarity(""), Clarity::Unclear);
    }

    #[test]
    fn placeholders_in_user_text_stay_literal() {
        let prompt = necessity_prompt("User: hi", "what does {history} mean?");
        assert!(prompt.contains("New message: what does {history} mean?"));
        assert_eq!(prompt.matches("User: hi").count(), 1);
    }

    #[test]
    fn necessity_defaults_to_yes() {
        assert!(parse_necessity("yes"));
        assert!(!parse_necessity("No."));
        assert!(parse_necessity("maybe"));
        assert!(parse_necessity(""));
    }
}
