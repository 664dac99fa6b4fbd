//! Move-history row decoding.
//!
//! The `moves` command backfills an already-started game as numbered rows,
//! one full move per row, each half-move followed by its think time:
//!
//! ```text
//!   1.  e4      (0:00)     e5      (0:02)
//!   2.  Nf3     (0:01)
//! {Still in progress} *
//! ```
//!
//! The second half-move is absent on the final row of an odd-length game. A
//! row opening with `{` ends the list — that is data, not an error. A row
//! whose index does not match the running counter, or that lacks the dot,
//! is an [`WireError::IllegalMoveNumber`].

use std::time::Duration;

use crate::{
    clock::parse_paren_clock,
    error::{Result, WireError},
};

/// One half-move with the time spent on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedMove {
    /// The move in the notation the server sent (SAN).
    pub notation: String,
    /// Think time for this move.
    pub elapsed: Duration,
}

/// One decoded move-history row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryLine {
    /// A numbered row carrying white's half-move and, except on the last
    /// row of an odd-length game, black's.
    Moves {
        /// White's half-move.
        white: TimedMove,
        /// Black's half-move, when present.
        black: Option<TimedMove>,
    },
    /// A `{`-opening row: end of the list.
    End,
}

/// Decode one move-history row against the running move counter.
pub fn decode_history_line(line: &str, expected: u32) -> Result<HistoryLine> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('{') {
        return Ok(HistoryLine::End);
    }

    let illegal = || WireError::IllegalMoveNumber { expected, line: line.to_string() };

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let (&index_token, rest) = tokens.split_first().ok_or_else(illegal)?;

    let index: u32 =
        index_token.strip_suffix('.').and_then(|n| n.parse().ok()).ok_or_else(illegal)?;
    if index != expected {
        return Err(illegal());
    }

    let half_move = |notation: Option<&&str>, time: Option<&&str>| -> Result<TimedMove> {
        let notation = (*notation.ok_or_else(illegal)?).to_string();
        let elapsed = time.and_then(|t| parse_paren_clock(t)).ok_or_else(illegal)?;
        Ok(TimedMove { notation, elapsed })
    };

    let white = half_move(rest.first(), rest.get(1))?;
    let black = match rest.len() {
        2 => None,
        4 => Some(half_move(rest.get(2), rest.get(3))?),
        _ => return Err(illegal()),
    };

    Ok(HistoryLine::Moves { white, black })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_move_row() {
        let row = "  1.  e4      (0:00)     e5      (0:02)";
        let HistoryLine::Moves { white, black } = decode_history_line(row, 1).unwrap() else {
            panic!("expected a moves row");
        };
        assert_eq!(white, TimedMove { notation: "e4".to_string(), elapsed: Duration::ZERO });
        assert_eq!(
            black,
            Some(TimedMove { notation: "e5".to_string(), elapsed: Duration::from_secs(2) })
        );
    }

    #[test]
    fn final_row_of_odd_length_game() {
        let row = " 31.  Qxf7+   (0:11)";
        let HistoryLine::Moves { white, black } = decode_history_line(row, 31).unwrap() else {
            panic!("expected a moves row");
        };
        assert_eq!(white.notation, "Qxf7+");
        assert_eq!(black, None);
    }

    #[test]
    fn brace_row_ends_the_list() {
        let row = "{Still in progress} *";
        assert_eq!(decode_history_line(row, 12).unwrap(), HistoryLine::End);
    }

    #[test]
    fn index_mismatch_is_illegal() {
        let row = "  3.  e4 (0:00)  e5 (0:02)";
        let err = decode_history_line(row, 2).unwrap_err();
        assert!(matches!(err, WireError::IllegalMoveNumber { expected: 2, .. }));
    }

    #[test]
    fn missing_dot_is_illegal() {
        let row = "  2  e4 (0:00)";
        assert!(matches!(
            decode_history_line(row, 2).unwrap_err(),
            WireError::IllegalMoveNumber { .. }
        ));
    }

    #[test]
    fn malformed_time_is_illegal() {
        let row = "  2.  e4 0:00";
        assert!(matches!(
            decode_history_line(row, 2).unwrap_err(),
            WireError::IllegalMoveNumber { .. }
        ));
    }
}
