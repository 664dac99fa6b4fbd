//! Game-list row decoding.
//!
//! One row of the server's `games` output describes one running game:
//!
//! ```text
//!  93 1723 WFMKierzek    1734 Kakashisan [ sr 20  10]   5:11 -  6:48 (18-18) W: 19
//! ```
//!
//! Ratings map `+`-prefixed tokens to `-1` (guest) and `-`-prefixed to `0`
//! (unrated); the bracket token carries the private flag, category tag,
//! rated flag and time control; the tail carries both clocks, the material
//! pair and the side-to-move/move-number token. Any structural anomaly is
//! reported as [`WireError::UnsupportedListing`] — the caller skips the row,
//! it never aborts the surrounding command.

use std::{fmt, time::Duration};

use crate::{
    clock::parse_clock,
    error::{Result, WireError},
    types::{Category, Color},
};

/// Rating shown for an unregistered (guest) player.
pub const RATING_GUEST: i32 = -1;

/// Rating shown for a registered but unrated player.
pub const RATING_UNRATED: i32 = 0;

/// One row of the server game list. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameListing {
    /// Server-assigned game id.
    pub id: u32,
    /// White's rating (`-1` guest, `0` unrated, else numeric).
    pub white_rating: i32,
    /// White's handle.
    pub white_name: String,
    /// Black's rating (`-1` guest, `0` unrated, else numeric).
    pub black_rating: i32,
    /// Black's handle.
    pub black_name: String,
    /// Game category from the bracket token.
    pub category: Category,
    /// Whether the game is rated.
    pub rated: bool,
    /// Whether the game is private (cannot be observed).
    pub private: bool,
    /// Base time for each side.
    pub base: Duration,
    /// Increment per move.
    pub increment: Duration,
    /// Time white has used so far.
    pub white_elapsed: Duration,
    /// Time black has used so far.
    pub black_elapsed: Duration,
    /// White's material count.
    pub white_material: u32,
    /// Black's material count.
    pub black_material: u32,
    /// Side to move.
    pub to_move: Color,
    /// Moves already played.
    pub move_number: u32,
}

fn unsupported(reason: &'static str) -> WireError {
    WireError::UnsupportedListing { reason }
}

/// Decode a rating token: `+`-prefixed → guest, `-`-prefixed → unrated,
/// else a plain integer.
pub fn parse_rating(token: &str) -> Option<i32> {
    if token.starts_with('+') {
        Some(RATING_GUEST)
    } else if token.starts_with('-') {
        Some(RATING_UNRATED)
    } else {
        token.parse().ok()
    }
}

/// Decode one game-list row into a [`GameListing`].
pub fn decode_game_listing(line: &str) -> Result<GameListing> {
    let lb = line.find('[').ok_or_else(|| unsupported("missing opening bracket"))?;
    let rb = line[lb..]
        .find(']')
        .map(|i| lb + i)
        .ok_or_else(|| unsupported("missing closing bracket"))?;

    let head: Vec<&str> = line[..lb].split_whitespace().collect();
    let [id, white_rating, white_name, black_rating, black_name] = head.as_slice() else {
        return Err(unsupported("unexpected token count before bracket"));
    };
    let id: u32 = id.parse().map_err(|_| unsupported("game id is not a number"))?;
    let white_rating = parse_rating(white_rating).ok_or_else(|| unsupported("white rating"))?;
    let black_rating = parse_rating(black_rating).ok_or_else(|| unsupported("black rating"))?;

    let inner: Vec<&str> = line[lb + 1..rb].split_whitespace().collect();
    let [flags, base, increment] = inner.as_slice() else {
        return Err(unsupported("unexpected token count inside bracket"));
    };
    let flags: Vec<char> = flags.chars().collect();
    let (private, cat_char, rated_char) = match flags.as_slice() {
        ['p', cat, rated] => (true, *cat, *rated),
        [cat, rated] => (false, *cat, *rated),
        _ => return Err(unsupported("unexpected flags token")),
    };
    let category = Category::from_char(cat_char).ok_or_else(|| unsupported("unknown category"))?;
    let rated = match rated_char {
        'r' => true,
        'u' => false,
        _ => return Err(unsupported("rated flag is neither r nor u")),
    };
    let base_minutes: u64 = base.parse().map_err(|_| unsupported("base time"))?;
    let increment_seconds: u64 = increment.parse().map_err(|_| unsupported("increment"))?;

    let tail: Vec<&str> = line[rb + 1..].split_whitespace().collect();
    if tail.len() < 5 {
        return Err(unsupported("unexpected token count after bracket"));
    }
    let white_elapsed = parse_clock(tail[0]).ok_or_else(|| unsupported("white clock"))?;
    if tail[1] != "-" {
        return Err(unsupported("missing clock separator"));
    }
    let black_elapsed = parse_clock(tail[2]).ok_or_else(|| unsupported("black clock"))?;

    let material = tail[3]
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| unsupported("material token"))?;
    let (white_material, black_material) =
        material.split_once('-').ok_or_else(|| unsupported("material token"))?;
    let white_material: u32 =
        white_material.parse().map_err(|_| unsupported("white material"))?;
    let black_material: u32 =
        black_material.parse().map_err(|_| unsupported("black material"))?;

    let side = tail[4];
    let to_move = match side.as_bytes().first() {
        Some(b'W') => Color::White,
        Some(b'B') => Color::Black,
        _ => return Err(unsupported("side-to-move token")),
    };
    let rest = side.get(1..).and_then(|r| r.strip_prefix(':'));
    let move_number: u32 = match rest {
        Some("") => {
            let tok = tail.get(5).ok_or_else(|| unsupported("missing move number"))?;
            tok.parse().map_err(|_| unsupported("move number"))?
        },
        Some(n) => n.parse().map_err(|_| unsupported("move number"))?,
        None => return Err(unsupported("side-to-move token")),
    };

    Ok(GameListing {
        id,
        white_rating,
        white_name: (*white_name).to_string(),
        black_rating,
        black_name: (*black_name).to_string(),
        category,
        rated,
        private,
        base: Duration::from_secs(base_minutes * 60),
        increment: Duration::from_secs(increment_seconds),
        white_elapsed,
        black_elapsed,
        white_material,
        black_material,
        to_move,
        move_number,
    })
}

fn fmt_rating(rating: i32) -> String {
    match rating {
        RATING_GUEST => "++++".to_string(),
        RATING_UNRATED => "----".to_string(),
        r => r.to_string(),
    }
}

fn fmt_elapsed(elapsed: Duration) -> String {
    let centis = elapsed.as_millis() / 10;
    let (secs, frac) = (centis / 100, centis % 100);
    let clock = if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else {
        format!("{}:{:02}", secs / 60, secs % 60)
    };
    if frac == 0 { clock } else { format!("{clock}.{frac:02}") }
}

/// Canonical re-serialization of the structured fields. Whitespace is not
/// byte-identical to server output, but [`decode_game_listing`] reads it
/// back losslessly.
impl fmt::Display for GameListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} [ {}{}{} {} {}] {} - {} ({}-{}) {}: {}",
            self.id,
            fmt_rating(self.white_rating),
            self.white_name,
            fmt_rating(self.black_rating),
            self.black_name,
            if self.private { "p" } else { "" },
            self.category.to_char(),
            if self.rated { 'r' } else { 'u' },
            self.base.as_secs() / 60,
            self.increment.as_secs(),
            fmt_elapsed(self.white_elapsed),
            fmt_elapsed(self.black_elapsed),
            self.white_material,
            self.black_material,
            self.to_move.to_char(),
            self.move_number,
        )
    }
}
