//! Approval stages and the level taxonomy they are built from
use super::error::ParseStageError;
use std::fmt;
use std::str::FromStr;

/// Highest level the engine can be configured with.
pub const MAX_LEVELS: u8 = 9;

/// Number of levels most modules run with.
pub const DEFAULT_LEVELS: u8 = 3;

/// A 1-based approval level. `Level(1)` is the first sign-off.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Level(#[n(0)] u8);

impl Level {
    pub const FIRST: Level = Level(1);

    pub fn new(n: u8) -> Option<Self> {
        (n >= 1).then_some(Self(n))
    }
    pub fn get(self) -> u8 {
        self.0
    }
    /// The stage a record must sit at before this level may act on it.
    pub fn predecessor(self) -> ApprovalStage {
        match self.0 {
            1 => ApprovalStage::None,
            n => ApprovalStage::Approved(Level(n - 1)),
        }
    }
    pub fn next(self) -> Level {
        Level(self.0.saturating_add(1))
    }
    /// Index into per-level arrays such as approver stamps.
    pub fn index(self) -> usize {
        usize::from(self.0.saturating_sub(1))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Where a record currently sits in the approval chain.
///
/// Stored and exchanged as `NONE`, `L<k>` or `L<k>_REJECTED`. The level in a
/// rejected stage names the level that rejected, never the one it was
/// pending at.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ApprovalStage {
    #[n(0)]
    #[default]
    None,
    #[n(1)]
    Approved(#[n(0)] Level),
    #[n(2)]
    Rejected(#[n(0)] Level),
}

impl ApprovalStage {
    /// Parse a stage as it arrives from the backend, where an absent or blank
    /// value means the record was never acted on.
    pub fn from_wire(raw: Option<&str>) -> Result<Self, ParseStageError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::None),
            Some(s) => s.parse(),
        }
    }

    /// The level that would act next, or `None` once the record is terminal.
    pub fn next_level(self, levels: u8) -> Option<Level> {
        match self {
            Self::None => Some(Level::FIRST),
            Self::Approved(level) if level.get() < levels => Some(level.next()),
            Self::Approved(_) | Self::Rejected(_) => None,
        }
    }

    pub fn is_terminal(self, levels: u8) -> bool {
        self.next_level(levels).is_none()
    }

    pub fn is_rejected(self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn is_fully_approved(self, levels: u8) -> bool {
        matches!(self, Self::Approved(level) if level.get() >= levels)
    }

    pub fn approved_level(self) -> Option<Level> {
        match self {
            Self::Approved(level) => Some(level),
            _ => None,
        }
    }

    pub fn rejected_level(self) -> Option<Level> {
        match self {
            Self::Rejected(level) => Some(level),
            _ => None,
        }
    }

    /// Human readable status tag for list views.
    pub fn describe(self, levels: u8) -> String {
        match self {
            Self::None => "Pending L1".to_string(),
            Self::Approved(level) if level.get() >= levels => "Fully approved".to_string(),
            Self::Approved(level) => format!("Approved by {level}, pending {}", level.next()),
            Self::Rejected(level) => format!("Rejected by {level}"),
        }
    }
}

impl fmt::Display for ApprovalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("NONE"),
            Self::Approved(level) => write!(f, "{level}"),
            Self::Rejected(level) => write!(f, "{level}_REJECTED"),
        }
    }
}

impl FromStr for ApprovalStage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper == "NONE" {
            return Ok(Self::None);
        }

        let (body, rejected) = match upper.strip_suffix("_REJECTED") {
            Some(body) => (body, true),
            None => (upper.as_str(), false),
        };

        let level = parse_level(body).ok_or_else(|| ParseStageError(s.to_string()))?;

        Ok(if rejected {
            Self::Rejected(level)
        } else {
            Self::Approved(level)
        })
    }
}

/// Parses `L<k>` into a level. Shared with role parsing.
pub(crate) fn parse_level(s: &str) -> Option<Level> {
    let digits = s.strip_prefix('L')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u8>().ok().and_then(Level::new)
}
