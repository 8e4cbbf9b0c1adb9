//! Error types for position loading.

use std::fmt;

/// Error type for FEN parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    /// A required FEN field is missing entirely
    MissingField { field: &'static str },
    /// Fewer than 8 ranks in the placement field
    MissingRank { rank: usize },
    /// More than 8 ranks in the placement field
    TooManyRanks,
    /// Invalid piece character in the placement field
    InvalidPiece { found: char },
    /// A rank does not describe exactly 8 files
    BadRankWidth { rank: usize, files: usize },
    /// A piece lands beyond the h-file
    TooManyFiles { rank: usize },
    /// Invalid side to move (must be 'w' or 'b')
    InvalidSideToMove { found: String },
    /// Invalid castling rights character
    InvalidCastling { found: char },
}

impl fmt::Display for FenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenError::MissingField { field } => {
                write!(f, "FEN is missing the {field} field")
            }
            FenError::MissingRank { rank } => {
                write!(f, "FEN placement ends before rank {rank}")
            }
            FenError::TooManyRanks => write!(f, "FEN placement has more than 8 ranks"),
            FenError::InvalidPiece { found } => {
                write!(f, "Invalid piece character '{found}' in FEN")
            }
            FenError::BadRankWidth { rank, files } => {
                write!(f, "Rank {rank} describes {files} files, expected 8")
            }
            FenError::TooManyFiles { rank } => {
                write!(f, "Too many files in rank {rank}")
            }
            FenError::InvalidSideToMove { found } => {
                write!(f, "Invalid side to move '{found}', expected 'w' or 'b'")
            }
            FenError::InvalidCastling { found } => {
                write!(f, "Invalid castling character '{found}' in FEN")
            }
        }
    }
}

impl std::error::Error for FenError {}
