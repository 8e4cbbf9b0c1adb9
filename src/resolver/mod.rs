//! Algebraic move resolution.
//!
//! Loads a lightweight board snapshot from a FEN string and converts
//! loosely-specified move notation ("e4", "Nf3", "Rxd5", "O-O", "e7e8q")
//! into strict coordinate notation by generating pseudo-legal moves along
//! direction vectors and keeping the single candidate that satisfies every
//! given constraint.
//!
//! Resolution is pseudo-legal only: it checks movement geometry and
//! occupancy, never whether the mover's king is left in check.

mod error;
mod square;

pub use error::FenError;
pub use square::{
    Delta, Square, BISHOP_DIRECTIONS, KING_DIRECTIONS, KNIGHT_JUMPS, ROOK_DIRECTIONS,
};

use std::fmt;

/// The side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Black,
}

impl Color {
    fn index(self) -> usize {
        match self {
            Color::White => 0,
            Color::Black => 1,
        }
    }
}

/// A castling move expressed as the king's origin and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KingMove {
    from: Square,
    to: Square,
}

impl fmt::Display for KingMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)
    }
}

/// Capture constraint parsed from a move descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    /// No marker given; captures and quiet moves both qualify.
    Unspecified,
    /// '-' marker; the destination must be empty.
    Quiet,
    /// 'x' or ':' marker; the destination must hold an enemy piece.
    Required,
    /// An enemy piece letter; exactly that piece type must be captured.
    Piece(char),
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    from: Square,
    to: Square,
}

fn is_file(b: u8) -> bool {
    (b'a'..=b'h').contains(&b)
}

fn is_rank(b: u8) -> bool {
    (b'1'..=b'8').contains(&b)
}

fn file_of(b: u8) -> u8 {
    b - b'a'
}

fn rank_of(b: u8) -> u8 {
    b - b'1'
}

/// Pseudo-legal position loader and move generator, used for translating
/// algebraic moves to coordinates.
///
/// The board is rebuilt wholesale by each [`load_fen`](Self::load_fen)
/// call and never mutated incrementally. After a failed load the state is
/// unspecified and must not be reused.
#[derive(Debug, Clone)]
pub struct MoveResolver {
    /// Piece letters indexed `[file][rank]`; uppercase white, lowercase black.
    board: [[Option<char>; 8]; 8],
    side: Color,
    castle_short: [Option<KingMove>; 2],
    castle_long: [Option<KingMove>; 2],
    ep: Option<Square>,
}

impl Default for MoveResolver {
    fn default() -> Self {
        MoveResolver {
            board: [[None; 8]; 8],
            side: Color::White,
            castle_short: [None; 2],
            castle_long: [None; 2],
            ep: None,
        }
    }
}

impl MoveResolver {
    #[must_use]
    pub fn new() -> Self {
        MoveResolver::default()
    }

    /// Is the given character a FEN piece letter (PNBRQK either case)?
    #[must_use]
    pub fn is_piece(ch: char) -> bool {
        matches!(ch.to_ascii_uppercase(), 'B' | 'K' | 'N' | 'P' | 'Q' | 'R')
    }

    #[must_use]
    pub fn side_to_move(&self) -> Color {
        self.side
    }

    #[must_use]
    pub fn en_passant(&self) -> Option<Square> {
        self.ep
    }

    /// Load a board position from the given FEN string.
    ///
    /// Parses piece placement, side to move, castling rights (translated
    /// into king-move descriptors), and the optional en-passant target.
    /// Trailing fields (halfmove clock, move number, EPD opcodes) are
    /// ignored.
    pub fn load_fen(&mut self, fen: &str) -> Result<(), FenError> {
        *self = MoveResolver::default();

        let mut fields = fen.split_whitespace();
        let placement = fields.next().ok_or(FenError::MissingField {
            field: "placement",
        })?;

        let mut ranks = placement.split('/');
        for y in (0..8usize).rev() {
            let rank = ranks.next().ok_or(FenError::MissingRank { rank: y + 1 })?;
            let mut x = 0usize;
            for ch in rank.chars() {
                match ch {
                    '1'..='8' => x += (ch as usize) - ('0' as usize),
                    _ if Self::is_piece(ch) => {
                        if x >= 8 {
                            return Err(FenError::TooManyFiles { rank: y + 1 });
                        }
                        self.board[x][y] = Some(ch);
                        x += 1;
                    }
                    _ => return Err(FenError::InvalidPiece { found: ch }),
                }
            }
            if x != 8 {
                return Err(FenError::BadRankWidth {
                    rank: y + 1,
                    files: x,
                });
            }
        }
        if ranks.next().is_some() {
            return Err(FenError::TooManyRanks);
        }

        let side = fields.next().ok_or(FenError::MissingField {
            field: "side to move",
        })?;
        self.side = match side {
            "w" => Color::White,
            "b" => Color::Black,
            _ => {
                return Err(FenError::InvalidSideToMove {
                    found: side.to_string(),
                })
            }
        };

        if let Some(castling) = fields.next() {
            for ch in castling.chars() {
                match ch {
                    '-' => break,
                    'K' => {
                        self.castle_short[Color::White.index()] = Some(KingMove {
                            from: Square::E1,
                            to: Square::G1,
                        });
                    }
                    'Q' => {
                        self.castle_long[Color::White.index()] = Some(KingMove {
                            from: Square::E1,
                            to: Square::C1,
                        });
                    }
                    'k' => {
                        self.castle_short[Color::Black.index()] = Some(KingMove {
                            from: Square::E8,
                            to: Square::G8,
                        });
                    }
                    'q' => {
                        self.castle_long[Color::Black.index()] = Some(KingMove {
                            from: Square::E8,
                            to: Square::C8,
                        });
                    }
                    _ => return Err(FenError::InvalidCastling { found: ch }),
                }
            }
        }

        if let Some(ep) = fields.next() {
            let bytes = ep.as_bytes();
            if bytes.len() >= 2 && is_file(bytes[0]) && is_rank(bytes[1]) {
                self.ep = Square::new(file_of(bytes[0]), rank_of(bytes[1]));
            }
        }

        Ok(())
    }

    /// Convert a move string into coordinate notation.
    ///
    /// Coordinate notation is 4 or 5 characters: origin square,
    /// destination square, optional lowercase promotion piece letter.
    /// Returns `None` when the notation matches no pseudo-legal move or
    /// more than one (ambiguous and illegal notation are not
    /// distinguished).
    #[must_use]
    pub fn resolve(&self, notation: &str) -> Option<String> {
        if notation.len() < 2 || !notation.is_ascii() {
            return None;
        }
        let side = self.side.index();

        let long = self.castle_long[side];
        if matches!(notation, "0-0-0" | "O-O-O" | "o-o-o")
            || long.is_some_and(|m| m.to_string() == notation)
        {
            return long.map(|m| m.to_string());
        }

        let short = self.castle_short[side];
        if matches!(notation, "0-0" | "O-O" | "o-o")
            || short.is_some_and(|m| m.to_string() == notation)
        {
            return short.map(|m| m.to_string());
        }

        if notation == "ep" || notation == "e.p." {
            let target = self.ep?;
            return self.pawn_move("", None, Some(target));
        }

        let b = notation.as_bytes();
        match b[0] {
            b'B' | b'K' | b'N' | b'Q' | b'R' => {
                self.simple_move(b[0] as char, &notation[1..], None, None)
            }
            b'P' => self.pawn_move(&notation[1..], None, None),
            _ if is_file(b[0]) && is_rank(b[1]) => {
                let sq = Square::new(file_of(b[0]), rank_of(b[1]))?;
                let rest = &notation[2..];
                match self.piece_at(sq) {
                    None => self.pawn_move(rest, None, Some(sq)),
                    Some(pc) if pc == self.friend_piece(pc) => {
                        match pc.to_ascii_uppercase() {
                            'P' => self.pawn_move(rest, Some(sq), None),
                            kind => self.simple_move(kind, rest, Some(sq), None),
                        }
                    }
                    Some(_) => None,
                }
            }
            _ if is_file(b[0]) && (is_file(b[1]) || matches!(b[1], b'-' | b'x' | b':')) => {
                self.pawn_move(notation, None, None)
            }
            _ => None,
        }
    }

    fn piece_at(&self, sq: Square) -> Option<char> {
        self.board[sq.x() as usize][sq.y() as usize]
    }

    fn friend_piece(&self, piece: char) -> char {
        match self.side {
            Color::White => piece.to_ascii_uppercase(),
            Color::Black => piece.to_ascii_lowercase(),
        }
    }

    /// Resolve a non-pawn move; any text left after the descriptor
    /// invalidates the notation.
    fn simple_move(
        &self,
        kind: char,
        rest: &str,
        from: Option<Square>,
        to: Option<Square>,
    ) -> Option<String> {
        let (coords, remainder) = self.descriptor_move(kind, rest, from, to)?;
        remainder.is_empty().then_some(coords)
    }

    /// Resolve a pawn move; a trailing promotion letter is appended
    /// verbatim, any other trailing text invalidates the notation.
    fn pawn_move(&self, rest: &str, from: Option<Square>, to: Option<Square>) -> Option<String> {
        let (mut coords, remainder) = self.descriptor_move('P', rest, from, to)?;
        match remainder.chars().next() {
            None => Some(coords),
            Some(ch) => match ch.to_ascii_lowercase() {
                promo @ ('b' | 'n' | 'q' | 'r') => {
                    coords.push(promo);
                    Some(coords)
                }
                _ => None,
            },
        }
    }

    /// Parse the remaining descriptor text and find the single matching
    /// pseudo-legal move.
    ///
    /// Returns the move in coordinate notation plus the text left after
    /// the descriptor (trailing punctuation is consumed).
    fn descriptor_move<'a>(
        &self,
        kind: char,
        rest: &'a str,
        preset_from: Option<Square>,
        preset_to: Option<Square>,
    ) -> Option<(String, &'a str)> {
        let piece = self.friend_piece(kind);
        let b = rest.as_bytes();
        let mut i = 0usize;

        let mut from = preset_from;
        let mut from_x = from.map(Square::x);
        let mut from_y = from.map(Square::y);
        if from.is_none() {
            if b.len() >= 2 && is_file(b[0]) && is_rank(b[1]) {
                // A bare square here is the destination; it only names the
                // origin when more of the descriptor follows.
                if b.len() > 2 {
                    let sq = Square::new(file_of(b[0]), rank_of(b[1]))?;
                    from = Some(sq);
                    from_x = Some(sq.x());
                    from_y = Some(sq.y());
                    i = 2;
                }
            } else if b.len() >= 2 && is_file(b[0]) {
                from_x = Some(file_of(b[0]));
                i = 1;
            } else if b.len() >= 2 && is_rank(b[0]) {
                from_y = Some(rank_of(b[0]));
                i = 1;
            }
        }

        let mut cap = Capture::Unspecified;
        if i < b.len() && matches!(b[i], b'-' | b'x' | b':') {
            cap = if b[i] == b'-' {
                Capture::Quiet
            } else {
                Capture::Required
            };
            i += 1;
        }
        if i < b.len() && matches!(b[i], b'B' | b'N' | b'P' | b'Q' | b'R') {
            if cap == Capture::Quiet {
                return None;
            }
            cap = Capture::Piece(b[i] as char);
            i += 1;
        }

        let mut to = preset_to;
        let mut to_x = to.map(Square::x);
        let mut to_y = to.map(Square::y);
        if to.is_none() {
            let r = &b[i..];
            if r.len() >= 2 && is_file(r[0]) && is_rank(r[1]) {
                let sq = Square::new(file_of(r[0]), rank_of(r[1]))?;
                to = Some(sq);
                to_x = Some(sq.x());
                to_y = Some(sq.y());
                i += 2;
            } else if r.len() >= 2 && is_file(r[0]) {
                to_x = Some(file_of(r[0]));
                i += 1;
            } else if r.len() >= 2 && is_rank(r[0]) {
                to_y = Some(rank_of(r[0]));
                i += 1;
            } else {
                // Nothing left for a destination: what was parsed as the
                // origin was the destination all along.
                to = from;
                to_x = from_x;
                to_y = from_y;
                from_x = None;
                from_y = None;
            }
        }

        let origins = self.origins(piece, from_x, from_y);
        if origins.is_empty() {
            return None;
        }

        let mut moves = Vec::new();
        match kind {
            'B' => self.slider_moves(&origins, &BISHOP_DIRECTIONS, to, to_x, to_y, cap, &mut moves),
            'R' => self.slider_moves(&origins, &ROOK_DIRECTIONS, to, to_x, to_y, cap, &mut moves),
            'Q' => {
                self.slider_moves(&origins, &BISHOP_DIRECTIONS, to, to_x, to_y, cap, &mut moves);
                self.slider_moves(&origins, &ROOK_DIRECTIONS, to, to_x, to_y, cap, &mut moves);
            }
            'N' => self.knight_moves(&origins, to, to_x, to_y, cap, &mut moves),
            'K' => self.king_moves(&origins, to, to_x, to_y, cap, &mut moves),
            'P' => self.pawn_candidates(&origins, to_x, to_y, cap, &mut moves),
            _ => return None,
        }

        if moves.len() != 1 {
            return None;
        }

        while i < b.len() && b[i].is_ascii_punctuation() {
            i += 1;
        }

        let found = moves[0];
        Some((format!("{}{}", found.from, found.to), &rest[i..]))
    }

    /// All friendly pieces of the given letter whose position matches the
    /// partial origin constraint.
    fn origins(&self, piece: char, from_x: Option<u8>, from_y: Option<u8>) -> Vec<Square> {
        let mut out = Vec::new();
        for x in 0..8u8 {
            if from_x.is_some_and(|fx| fx != x) {
                continue;
            }
            for y in 0..8u8 {
                if from_y.is_some_and(|fy| fy != y) {
                    continue;
                }
                if self.board[x as usize][y as usize] == Some(piece) {
                    out.extend(Square::new(x, y));
                }
            }
        }
        out
    }

    /// Consider `dest` as a candidate destination.
    ///
    /// Returns true when generation along the current line must stop:
    /// at the first occupied square, or once a matched target square has
    /// been handled.
    fn try_add(
        &self,
        from: Square,
        dest: Square,
        to_x: Option<u8>,
        to_y: Option<u8>,
        cap: Capture,
        moves: &mut Vec<Candidate>,
    ) -> bool {
        let on_target =
            to_x.map_or(true, |x| x == dest.x()) && to_y.map_or(true, |y| y == dest.y());
        if on_target {
            let captured = self.piece_at(dest);
            if captured.is_some_and(|pc| pc == self.friend_piece(pc)) {
                return true;
            }
            let allowed = match cap {
                Capture::Unspecified => true,
                Capture::Quiet => captured.is_none(),
                Capture::Required => captured.is_some(),
                Capture::Piece(kind) => {
                    captured.is_some_and(|pc| pc.to_ascii_uppercase() == kind)
                }
            };
            if !allowed {
                return true;
            }
            moves.push(Candidate { from, to: dest });
            if captured.is_some() {
                return true;
            }
        }
        self.piece_at(dest).is_some()
    }

    fn slider_moves(
        &self,
        origins: &[Square],
        directions: &[Delta],
        target: Option<Square>,
        to_x: Option<u8>,
        to_y: Option<u8>,
        cap: Capture,
        moves: &mut Vec<Candidate>,
    ) {
        for &from in origins {
            // With origin and destination both known, scanning is pruned
            // to the one direction between them.
            let restrict = target.and_then(|t| from.delta_to(t));
            for &dir in directions {
                if restrict.is_some_and(|d| d != dir) {
                    continue;
                }
                let mut next = from.step(dir);
                while let Some(dest) = next {
                    if self.try_add(from, dest, to_x, to_y, cap, moves) {
                        break;
                    }
                    next = dest.step(dir);
                }
            }
        }
    }

    fn king_moves(
        &self,
        origins: &[Square],
        target: Option<Square>,
        to_x: Option<u8>,
        to_y: Option<u8>,
        cap: Capture,
        moves: &mut Vec<Candidate>,
    ) {
        for &from in origins {
            let restrict = target.and_then(|t| from.delta_to(t));
            for &dir in &KING_DIRECTIONS {
                if restrict.is_some_and(|d| d != dir) {
                    continue;
                }
                if let Some(dest) = from.step(dir) {
                    self.try_add(from, dest, to_x, to_y, cap, moves);
                }
            }
        }
    }

    fn knight_moves(
        &self,
        origins: &[Square],
        target: Option<Square>,
        to_x: Option<u8>,
        to_y: Option<u8>,
        cap: Capture,
        moves: &mut Vec<Candidate>,
    ) {
        for &from in origins {
            let restrict = target.and_then(|t| from.delta_to(t));
            for &jump in &KNIGHT_JUMPS {
                if restrict.is_some_and(|d| d != jump) {
                    continue;
                }
                if let Some(dest) = from.step(jump) {
                    self.try_add(from, dest, to_x, to_y, cap, moves);
                }
            }
        }
    }

    fn pawn_candidates(
        &self,
        origins: &[Square],
        to_x: Option<u8>,
        to_y: Option<u8>,
        cap: Capture,
        moves: &mut Vec<Candidate>,
    ) {
        let (push, captures, start_rank) = match self.side {
            Color::White => (
                Delta::new(0, 1),
                [Delta::new(1, 1), Delta::new(-1, 1)],
                1u8,
            ),
            Color::Black => (
                Delta::new(0, -1),
                [Delta::new(1, -1), Delta::new(-1, -1)],
                6u8,
            ),
        };

        for &from in origins {
            if let Some(one) = from.step(push) {
                if self.piece_at(one).is_none() {
                    self.try_add(from, one, to_x, to_y, cap, moves);
                    if from.y() == start_rank {
                        if let Some(two) = one.step(push) {
                            if self.piece_at(two).is_none() {
                                self.try_add(from, two, to_x, to_y, cap, moves);
                            }
                        }
                    }
                }
            }
            for &diag in &captures {
                if let Some(dest) = from.step(diag) {
                    if self.piece_at(dest).is_some() || Some(dest) == self.ep {
                        self.try_add(from, dest, to_x, to_y, cap, moves);
                    }
                }
            }
        }
    }
}
