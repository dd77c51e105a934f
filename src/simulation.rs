//! Position simulation engine.
//!
//! Straight-line, constant-speed interpolation on raw coordinate units. Each
//! tick moves the position one fixed step toward the target, and snaps onto
//! the target once it is closer than the arrival tolerance.

use crate::app::Coordinate;

/// Inputs for one tick, rebuilt each time from the stored position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationTick {
    pub current: Coordinate,
    pub target: Coordinate,
    pub speed_per_tick: f64,
    pub arrival_epsilon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Advanced one step; still en route.
    Moved(Coordinate),
    /// Within tolerance; position is exactly the target.
    Arrived(Coordinate),
}

impl TickOutcome {
    pub fn position(self) -> Coordinate {
        match self {
            Self::Moved(p) | Self::Arrived(p) => p,
        }
    }

    pub fn arrived(self) -> bool {
        matches!(self, Self::Arrived(_))
    }
}

/// Euclidean distance in coordinate units (not kilometres).
pub fn separation(a: Coordinate, b: Coordinate) -> f64 {
    (b.lat - a.lat).hypot(b.lng - a.lng)
}

impl SimulationTick {
    pub fn step(&self) -> TickOutcome {
        let d_lat = self.target.lat - self.current.lat;
        let d_lng = self.target.lng - self.current.lng;
        let magnitude = d_lat.hypot(d_lng);

        if magnitude < self.arrival_epsilon {
            return TickOutcome::Arrived(self.target);
        }

        // A step longer than the remaining gap would overshoot; land on the target.
        if self.speed_per_tick >= magnitude {
            return TickOutcome::Arrived(self.target);
        }

        TickOutcome::Moved(Coordinate::new(
            self.current.lat + d_lat / magnitude * self.speed_per_tick,
            self.current.lng + d_lng / magnitude * self.speed_per_tick,
        ))
    }
}
