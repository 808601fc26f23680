use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Source of every random draw the simulation makes.
pub trait RandomSource: Send {
    /// Uniform integer in `low..=high`.
    fn range(&mut self, low: u32, high: u32) -> u32;

    /// True with the given probability.
    fn chance(&mut self, probability: f64) -> bool;
}

/// `StdRng` backed source, seeded from entropy or from a fixed seed.
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Same seed, same workload.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SeededRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for SeededRandom {
    fn range(&mut self, low: u32, high: u32) -> u32 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    fn chance(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }
}

/// Replays fixed sequences. Range draws are clamped into the requested
/// bounds; once a queue runs dry it yields `low` and `false`.
#[derive(Debug, Default, Clone)]
pub struct ScriptedRandom {
    values: VecDeque<u32>,
    coins: VecDeque<bool>,
}

impl ScriptedRandom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.values.extend(values);
        self
    }

    pub fn with_coins(mut self, coins: impl IntoIterator<Item = bool>) -> Self {
        self.coins.extend(coins);
        self
    }

    pub fn push_value(&mut self, value: u32) {
        self.values.push_back(value);
    }

    pub fn push_coin(&mut self, coin: bool) {
        self.coins.push_back(coin);
    }
}

impl RandomSource for ScriptedRandom {
    fn range(&mut self, low: u32, high: u32) -> u32 {
        match self.values.pop_front() {
            Some(v) => v.clamp(low, high.max(low)),
            None => low,
        }
    }

    fn chance(&mut self, _probability: f64) -> bool {
        self.coins.pop_front().unwrap_or(false)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for Box<R> {
    fn range(&mut self, low: u32, high: u32) -> u32 {
        (**self).range(low, high)
    }

    fn chance(&mut self, probability: f64) -> bool {
        (**self).chance(probability)
    }
}
