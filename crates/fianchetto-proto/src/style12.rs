//! Style-12 position row decoding.
//!
//! Live game updates arrive as fixed-field rows introduced by the literal
//! `<12>` prefix:
//!
//! ```text
//! <12> rnbqkbnr pppppppp -------- -------- -------- -------- PPPPPPPP RNBQKBNR
//!      B -1 1 1 1 1 0 7 Newton Einstein 0 2 12 39 39 119 122 2 P/e2-e4 (0:06) e4 0 1 0
//! ```
//!
//! A row that does not start with the prefix, or tokenizes into fewer than
//! 31 fields, is simply not this format (`Ok(None)`). Once the format is
//! recognized, every field must parse and validate; a single bad field
//! aborts the whole row as [`WireError::MalformedPosition`] carrying the
//! game id when it is still recoverable, because a silently dropped
//! position would desynchronize that game's board.

use std::time::Duration;

use crate::{
    clock::parse_paren_clock,
    error::{Result, WireError},
    types::{BoardGrid, Color, Piece, Relation},
};

/// Literal prefix identifying a position row.
pub const STYLE12_PREFIX: &str = "<12>";

/// Minimum field count (prefix included) for a row to be this format.
const MIN_FIELDS: usize = 31;

/// Field count at which the trailing clock-ticking and lag fields exist.
const FIELDS_WITH_LAG: usize = 33;

/// Castling-rights bit: white may castle short.
pub const CASTLE_WHITE_SHORT: u8 = 0b0001;

/// Castling-rights bit: white may castle long.
pub const CASTLE_WHITE_LONG: u8 = 0b0010;

/// Castling-rights bit: black may castle short.
pub const CASTLE_BLACK_SHORT: u8 = 0b0100;

/// Castling-rights bit: black may castle long.
pub const CASTLE_BLACK_LONG: u8 = 0b1000;

/// One decoded position/move update. Produced per row, consumed by the
/// owning game session, then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionUpdate {
    /// Board contents, rank-major with index 0 = rank 1.
    pub board: BoardGrid,
    /// Side to move.
    pub to_move: Color,
    /// Castling rights as a 4-bit mask (see the `CASTLE_*` constants).
    pub castling: u8,
    /// Irreversible-move counter (halfmove clock).
    pub irreversible: u32,
    /// Server game id.
    pub game_id: u32,
    /// White's handle.
    pub white_name: String,
    /// Black's handle.
    pub black_name: String,
    /// The viewer's relation to this game.
    pub relation: Relation,
    /// Base time of the time control.
    pub base: Duration,
    /// Increment per move.
    pub increment: Duration,
    /// White's material count.
    pub white_material: u32,
    /// Black's material count.
    pub black_material: u32,
    /// White's remaining time.
    pub white_remaining: Duration,
    /// Black's remaining time.
    pub black_remaining: Duration,
    /// Move number about to be played.
    pub move_number: u32,
    /// Whether the board should be shown flipped. Set exactly when the
    /// move-number field is 1.
    pub flipped: bool,
    /// Last move in verbose coordinate form (`P/e2-e4`, or `none`).
    pub verbose_move: String,
    /// Time spent on the last move.
    pub move_time: Duration,
    /// Last move in short algebraic form.
    pub san_move: String,
    /// Whether the active clock is ticking. Defaults to `true` when the
    /// trailing fields are absent.
    pub clock_ticking: bool,
    /// Network lag in milliseconds. Defaults to `0` when absent.
    pub lag_ms: u32,
}

/// Decode one line as a Style-12 position row.
///
/// Returns `Ok(None)` when the line is not this format (wrong prefix or too
/// few fields) — that is never an error. Returns `Err` only for a
/// recognized row with a malformed field.
pub fn decode_style12(line: &str) -> Result<Option<PositionUpdate>> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.first() != Some(&STYLE12_PREFIX) || fields.len() < MIN_FIELDS {
        return Ok(None);
    }

    // The id field parses in the common case even when an earlier field is
    // bad, so errors can still be routed to the affected game.
    let game_id: Option<u32> = fields[16].parse().ok();
    let bad = |reason: String| WireError::MalformedPosition { game_id, reason };
    let int = |idx: usize, name: &str| -> Result<i64> {
        fields[idx].parse().map_err(|_| bad(format!("{name}: {:?}", fields[idx])))
    };

    let mut board: BoardGrid = [[None; 8]; 8];
    for (i, rank_field) in fields[1..9].iter().enumerate() {
        if rank_field.chars().count() != 8 {
            return Err(bad(format!("rank field {} is not 8 squares", i + 1)));
        }
        // Wire order is rank 8 first.
        let rank = 7 - i;
        for (file, square) in rank_field.chars().enumerate() {
            board[rank][file] = match square {
                '-' => None,
                letter => Some(
                    Piece::from_letter(letter)
                        .ok_or_else(|| bad(format!("unknown piece letter {letter:?}")))?,
                ),
            };
        }
    }

    let to_move = fields[9]
        .chars()
        .next()
        .and_then(Color::from_char)
        .filter(|_| fields[9].len() == 1)
        .ok_or_else(|| bad(format!("side to move: {:?}", fields[9])))?;

    // Double-pawn-push file; validated as an integer but not used.
    let _ = int(10, "double push file")?;

    let mut castling = 0u8;
    for (bit, idx) in [CASTLE_WHITE_SHORT, CASTLE_WHITE_LONG, CASTLE_BLACK_SHORT, CASTLE_BLACK_LONG]
        .into_iter()
        .zip(11..15)
    {
        match int(idx, "castling flag")? {
            0 => {},
            1 => castling |= bit,
            v => return Err(bad(format!("castling flag out of range: {v}"))),
        }
    }

    let irreversible = u32::try_from(int(15, "irreversible count")?)
        .map_err(|_| bad("irreversible count is negative".to_string()))?;
    let id = u32::try_from(int(16, "game id")?)
        .map_err(|_| bad("game id is negative".to_string()))?;

    let white_name = fields[17].to_string();
    let black_name = fields[18].to_string();

    let relation_code = int(19, "relation")?;
    let relation = i8::try_from(relation_code)
        .ok()
        .and_then(Relation::from_code)
        .ok_or_else(|| bad(format!("relation out of range: {relation_code}")))?;

    let base_minutes = u64::try_from(int(20, "base time")?)
        .map_err(|_| bad("base time is negative".to_string()))?;
    let increment_seconds = u64::try_from(int(21, "increment")?)
        .map_err(|_| bad("increment is negative".to_string()))?;
    let white_material = u32::try_from(int(22, "white material")?)
        .map_err(|_| bad("white material is negative".to_string()))?;
    let black_material = u32::try_from(int(23, "black material")?)
        .map_err(|_| bad("black material is negative".to_string()))?;

    let white_remaining = u64::try_from(int(24, "white remaining time")?)
        .map_err(|_| bad("white remaining time is negative".to_string()))?;
    let black_remaining = u64::try_from(int(25, "black remaining time")?)
        .map_err(|_| bad("black remaining time is negative".to_string()))?;

    let move_number = u32::try_from(int(26, "move number")?)
        .map_err(|_| bad("move number is negative".to_string()))?;
    let flipped = move_number == 1;

    let verbose_move = fields[27].to_string();
    let move_time = parse_paren_clock(fields[28])
        .ok_or_else(|| bad(format!("move time: {:?}", fields[28])))?;
    let san_move = fields[29].to_string();

    // Orientation field; validated as an integer, orientation itself is
    // driven by the move-number coupling above.
    let _ = int(30, "orientation flag")?;

    let (clock_ticking, lag_ms) = if fields.len() >= FIELDS_WITH_LAG {
        let ticking = match int(31, "clock ticking flag")? {
            0 => false,
            1 => true,
            v => return Err(bad(format!("clock ticking flag out of range: {v}"))),
        };
        let lag = u32::try_from(int(32, "lag")?)
            .map_err(|_| bad("lag is negative".to_string()))?;
        (ticking, lag)
    } else {
        (true, 0)
    };

    Ok(Some(PositionUpdate {
        board,
        to_move,
        castling,
        irreversible,
        game_id: id,
        white_name,
        black_name,
        relation,
        base: Duration::from_secs(base_minutes * 60),
        increment: Duration::from_secs(increment_seconds),
        white_material,
        black_material,
        white_remaining: Duration::from_secs(white_remaining),
        black_remaining: Duration::from_secs(black_remaining),
        move_number,
        flipped,
        verbose_move,
        move_time,
        san_move,
        clock_ticking,
        lag_ms,
    }))
}
