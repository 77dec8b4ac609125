use rand::Rng;
use serde::{Deserialize, Serialize};

/// Display-only vehicle readout. Not derived from any diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub temperature: u32,
    pub fuel: f64,
    pub health: u32,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            temperature: 91,
            fuel: 64.0,
            health: 96,
        }
    }
}

impl Telemetry {
    /// Advances the readout by one tick.
    pub fn step<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        Self {
            temperature: 89 + rng.gen_range(0..5),
            fuel: if self.fuel > 0.0 {
                (self.fuel - 0.01).max(0.0)
            } else {
                0.0
            },
            health: self.health,
        }
    }
}
