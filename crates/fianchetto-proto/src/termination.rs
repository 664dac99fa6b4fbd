//! Termination-message decoding.
//!
//! A game ends in one of two textual shapes, both embedded in free text:
//!
//! ```text
//! {Game 378 (OlegM vs. Chessnull) Chessnull forfeits on time} 1-0
//! Removing game 42 from observation list.
//! ```
//!
//! The first carries a parenthetical comment (the text between `") "` and
//! `"}"`) and a result token; a result token outside the four known values
//! is reported as an error outcome with the literal token embedded. The
//! second always means plain termination.

/// Why a game ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationKind {
    /// White won (`1-0`).
    WhiteWins,
    /// Black won (`0-1`).
    BlackWins,
    /// Draw (`1/2-1/2`).
    Draw,
    /// The game ended without a result (`*`, or the game was removed).
    Terminated,
    /// The result token was unrecognized; the message embeds it.
    Error(String),
}

/// A decoded termination announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    /// Id of the terminated game.
    pub game_id: u32,
    /// Human-readable comment from the announcement (may be empty).
    pub comment: String,
    /// The outcome.
    pub kind: TerminationKind,
}

/// Prefix of the braced result shape.
const GAME_PREFIX: &str = "{Game ";

/// Prefix of the removal shape.
const REMOVING_PREFIX: &str = "Removing game ";

/// Decode a termination announcement from free text.
///
/// Returns `None` when the text contains neither shape — not an error, the
/// line is simply something else.
pub fn decode_termination(text: &str) -> Option<Termination> {
    if let Some(start) = text.find(GAME_PREFIX) {
        return decode_braced(&text[start + GAME_PREFIX.len()..]);
    }
    if let Some(start) = text.find(REMOVING_PREFIX) {
        let rest = &text[start + REMOVING_PREFIX.len()..];
        let game_id = leading_number(rest)?;
        return Some(Termination {
            game_id,
            comment: String::new(),
            kind: TerminationKind::Terminated,
        });
    }
    None
}

/// Decode the remainder of a `{Game <id> (...) <comment>} <result>` shape,
/// starting just past the prefix.
fn decode_braced(rest: &str) -> Option<Termination> {
    let game_id = leading_number(rest)?;

    let close = rest.find('}')?;
    let comment = match rest[..close].find(") ") {
        Some(paren) => rest[paren + 2..close].to_string(),
        None => String::new(),
    };

    let result = rest[close + 1..].split_whitespace().next()?;
    let kind = match result {
        "1-0" => TerminationKind::WhiteWins,
        "0-1" => TerminationKind::BlackWins,
        "1/2-1/2" => TerminationKind::Draw,
        "*" => TerminationKind::Terminated,
        other => TerminationKind::Error(format!("unexpected game result {other:?}")),
    };

    Some(Termination { game_id, comment, kind })
}

/// Parse the decimal number the text starts with.
fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_win_with_comment() {
        let t = decode_termination(
            "{Game 378 (OlegM vs. Chessnull) Chessnull forfeits on time} 1-0",
        )
        .unwrap();
        assert_eq!(t.game_id, 378);
        assert_eq!(t.comment, "Chessnull forfeits on time");
        assert_eq!(t.kind, TerminationKind::WhiteWins);
    }

    #[test]
    fn all_result_tokens() {
        let line = |result: &str| {
            format!("{{Game 9 (a vs. b) agreed}} {result}")
        };
        let kind = |result: &str| decode_termination(&line(result)).unwrap().kind;
        assert_eq!(kind("1-0"), TerminationKind::WhiteWins);
        assert_eq!(kind("0-1"), TerminationKind::BlackWins);
        assert_eq!(kind("1/2-1/2"), TerminationKind::Draw);
        assert_eq!(kind("*"), TerminationKind::Terminated);
        assert!(matches!(kind("2-2"), TerminationKind::Error(msg) if msg.contains("2-2")));
    }

    #[test]
    fn removal_shape() {
        let t = decode_termination("Removing game 42 from observation list.").unwrap();
        assert_eq!(t.game_id, 42);
        assert_eq!(t.comment, "");
        assert_eq!(t.kind, TerminationKind::Terminated);
    }

    #[test]
    fn embedded_in_surrounding_text() {
        let t = decode_termination("\rfics% {Game 12 (x vs. y) y resigns} 0-1").unwrap();
        assert_eq!(t.game_id, 12);
        assert_eq!(t.kind, TerminationKind::BlackWins);
    }

    #[test]
    fn other_lines_are_none() {
        assert_eq!(decode_termination("fics% games"), None);
        assert_eq!(decode_termination("{Game nonsense"), None);
        assert_eq!(decode_termination("Removing game x"), None);
    }
}
