//! Core fencing vocabulary shared by storage, services and DTOs.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Visual lane of the scoring apparatus. Red is displayed on the left, green on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FencerColor {
    /// Left lane.
    Red,
    /// Right lane.
    Green,
}

impl FencerColor {
    /// Wire representation of the color.
    pub fn as_str(self) -> &'static str {
        match self {
            FencerColor::Red => "red",
            FencerColor::Green => "green",
        }
    }
}

impl fmt::Display for FencerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FencerColor {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "red" => Ok(FencerColor::Red),
            "green" => Ok(FencerColor::Green),
            other => Err(format!("invalid color `{other}` (expected `red` or `green`)")),
        }
    }
}

/// Which fencer a touch was awarded to, from the logging user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    /// The logging user.
    Me,
    /// The opponent.
    Opponent,
}

impl Scorer {
    /// Resolve the scorer from the tapped lane and the match's fixed lane for the user.
    pub fn from_tap(my_color: FencerColor, tapped: FencerColor) -> Self {
        if my_color == tapped {
            Scorer::Me
        } else {
            Scorer::Opponent
        }
    }

    /// Wire representation of the scorer.
    pub fn as_str(self) -> &'static str {
        match self {
            Scorer::Me => "me",
            Scorer::Opponent => "opponent",
        }
    }

    /// Lane the scorer fences on, given the user's lane.
    pub fn color(self, my_color: FencerColor) -> FencerColor {
        match (self, my_color) {
            (Scorer::Me, color) => color,
            (Scorer::Opponent, FencerColor::Red) => FencerColor::Green,
            (Scorer::Opponent, FencerColor::Green) => FencerColor::Red,
        }
    }
}

impl fmt::Display for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scorer {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "me" => Ok(Scorer::Me),
            "opponent" => Ok(Scorer::Opponent),
            other => Err(format!("invalid scorer `{other}` (expected `me` or `opponent`)")),
        }
    }
}
