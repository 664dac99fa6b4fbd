//! Shared protocol data model.
//!
//! Plain enums and small value types used across the decoders: piece and
//! color letters, game categories, the viewer's relation to a game, and
//! termination outcomes. Each wire-facing enum pairs a `from_*` constructor
//! with the inverse accessor so round-trips are testable.

/// Side color. The wire uses `W`/`B` single-character fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// White pieces (uppercase letters on the wire).
    White,
    /// Black pieces (lowercase letters on the wire).
    Black,
}

impl Color {
    /// Parse a `W`/`B` side-to-move character.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'W' => Some(Self::White),
            'B' => Some(Self::Black),
            _ => None,
        }
    }

    /// The wire character for this color.
    #[must_use]
    pub fn to_char(self) -> char {
        match self {
            Self::White => 'W',
            Self::Black => 'B',
        }
    }

    /// The other side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

/// Piece kind, independent of color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    /// Pawn (`P`).
    Pawn,
    /// Knight (`N`).
    Knight,
    /// Bishop (`B`).
    Bishop,
    /// Rook (`R`).
    Rook,
    /// Queen (`Q`).
    Queen,
    /// King (`K`).
    King,
}

/// A colored piece as it appears in a board field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Piece {
    /// Owning side.
    pub color: Color,
    /// Kind of piece.
    pub kind: PieceKind,
}

impl Piece {
    /// Decode a board-field letter. Uppercase is white, lowercase is black.
    /// `None` for any letter outside the piece table (including `-`).
    pub fn from_letter(c: char) -> Option<Self> {
        let color = if c.is_ascii_uppercase() { Color::White } else { Color::Black };
        let kind = match c.to_ascii_uppercase() {
            'P' => PieceKind::Pawn,
            'N' => PieceKind::Knight,
            'B' => PieceKind::Bishop,
            'R' => PieceKind::Rook,
            'Q' => PieceKind::Queen,
            'K' => PieceKind::King,
            _ => return None,
        };
        Some(Self { color, kind })
    }

    /// The board-field letter for this piece.
    #[must_use]
    pub fn to_letter(self) -> char {
        let upper = match self.kind {
            PieceKind::Pawn => 'P',
            PieceKind::Knight => 'N',
            PieceKind::Bishop => 'B',
            PieceKind::Rook => 'R',
            PieceKind::Queen => 'Q',
            PieceKind::King => 'K',
        };
        match self.color {
            Color::White => upper,
            Color::Black => upper.to_ascii_lowercase(),
        }
    }
}

/// 8×8 board contents, rank-major with index 0 = rank 1.
///
/// The wire sends rank 8 first; the decoder fills from the last rank down so
/// `grid[0]` is always rank 1 and `grid[rank][file]` addresses a square.
pub type BoardGrid = [[Option<Piece>; 8]; 8];

/// Game category from the single-character type tag in a game-list row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Blitz (`b`).
    Blitz,
    /// Lightning (`l`).
    Lightning,
    /// Untimed (`u`).
    Untimed,
    /// Standard (`s`).
    Standard,
    /// Examined game (`e`).
    Examined,
    /// Wild variant (`w`).
    Wild,
    /// Atomic (`x`).
    Atomic,
    /// Crazyhouse (`z`).
    Crazyhouse,
    /// Bughouse (`B`).
    Bughouse,
    /// Losers (`L`).
    Losers,
    /// Suicide (`S`).
    Suicide,
    /// Non-standard time controls (`n`).
    NonStandard,
}

impl Category {
    /// Decode the category tag of a game-list row.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'b' => Some(Self::Blitz),
            'l' => Some(Self::Lightning),
            'u' => Some(Self::Untimed),
            's' => Some(Self::Standard),
            'e' => Some(Self::Examined),
            'w' => Some(Self::Wild),
            'x' => Some(Self::Atomic),
            'z' => Some(Self::Crazyhouse),
            'B' => Some(Self::Bughouse),
            'L' => Some(Self::Losers),
            'S' => Some(Self::Suicide),
            'n' => Some(Self::NonStandard),
            _ => None,
        }
    }

    /// The wire tag for this category.
    #[must_use]
    pub fn to_char(self) -> char {
        match self {
            Self::Blitz => 'b',
            Self::Lightning => 'l',
            Self::Untimed => 'u',
            Self::Standard => 's',
            Self::Examined => 'e',
            Self::Wild => 'w',
            Self::Atomic => 'x',
            Self::Crazyhouse => 'z',
            Self::Bughouse => 'B',
            Self::Losers => 'L',
            Self::Suicide => 'S',
            Self::NonStandard => 'n',
        }
    }

    /// Whether games of this category can be observed through the engine.
    ///
    /// The board collaborator only understands orthodox single-board play,
    /// so drop-piece and multi-board variants are excluded.
    #[must_use]
    pub fn is_observable(self) -> bool {
        matches!(
            self,
            Self::Blitz
                | Self::Lightning
                | Self::Untimed
                | Self::Standard
                | Self::Wild
                | Self::NonStandard
        )
    }
}

/// The viewer's relation to a game, from the signed field of a position row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// Isolated position, no game attached (`-3`).
    IsolatedPosition,
    /// Observing a game being examined (`-2`).
    ObservingExamined,
    /// Playing, opponent to move (`-1`).
    OpponentToMove,
    /// Observing a played game (`0`).
    Observer,
    /// Playing, my move (`1`).
    MyTurn,
    /// Examining the game (`2`).
    Examiner,
}

impl Relation {
    /// Decode the signed relation code. Valid range is `-3..=2`.
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            -3 => Some(Self::IsolatedPosition),
            -2 => Some(Self::ObservingExamined),
            -1 => Some(Self::OpponentToMove),
            0 => Some(Self::Observer),
            1 => Some(Self::MyTurn),
            2 => Some(Self::Examiner),
            _ => None,
        }
    }

    /// The wire code for this relation.
    #[must_use]
    pub fn code(self) -> i8 {
        match self {
            Self::IsolatedPosition => -3,
            Self::ObservingExamined => -2,
            Self::OpponentToMove => -1,
            Self::Observer => 0,
            Self::MyTurn => 1,
            Self::Examiner => 2,
        }
    }
}
