// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Drink log model.

use serde::{Deserialize, Serialize};
use std::fmt;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Kind of drink a photo can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum DrinkType {
    Shot,
    Beer,
    Cocktail,
    Wine,
    Seltzer,
}

impl DrinkType {
    pub const ALL: [DrinkType; 5] = [
        DrinkType::Shot,
        DrinkType::Beer,
        DrinkType::Cocktail,
        DrinkType::Wine,
        DrinkType::Seltzer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DrinkType::Shot => "shot",
            DrinkType::Beer => "beer",
            DrinkType::Cocktail => "cocktail",
            DrinkType::Wine => "wine",
            DrinkType::Seltzer => "seltzer",
        }
    }
}

impl fmt::Display for DrinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged drink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Drink {
    #[serde(rename = "type")]
    pub drink_type: DrinkType,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub timestamp: i64,
}

/// Drink counts broken down by type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrinkTally {
    pub shots: u32,
    pub beers: u32,
    pub cocktails: u32,
    pub wines: u32,
    pub seltzers: u32,
}

impl DrinkTally {
    pub fn from_drinks(drinks: &[Drink]) -> Self {
        let mut tally = Self::default();
        for drink in drinks {
            tally.add(drink.drink_type);
        }
        tally
    }

    pub fn add(&mut self, drink_type: DrinkType) {
        match drink_type {
            DrinkType::Shot => self.shots += 1,
            DrinkType::Beer => self.beers += 1,
            DrinkType::Cocktail => self.cocktails += 1,
            DrinkType::Wine => self.wines += 1,
            DrinkType::Seltzer => self.seltzers += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.shots + self.beers + self.cocktails + self.wines + self.seltzers
    }
}
