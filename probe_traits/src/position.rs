use std::fmt;

/// Identity of a probing location on the bed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PositionId {
    /// Mesh corner, 1-based in planning order.
    Corner(u8),
    Center,
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionId::Corner(n) => write!(f, "corner{n}"),
            PositionId::Center => f.write_str("center"),
        }
    }
}

/// A named bed location in machine coordinates (mm).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(id: PositionId, x: f64, y: f64) -> Self {
        Self { id, x, y }
    }

    pub fn center(x: f64, y: f64) -> Self {
        Self::new(PositionId::Center, x, y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.0}, {:.0})", self.id, self.x, self.y)
    }
}
