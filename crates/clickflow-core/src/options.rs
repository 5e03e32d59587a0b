//! Run-level modifiers: repetition and pacing between steps

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    #[default]
    Once,
    Times(u32),
    /// Until stopped.
    Forever,
}

impl Repeat {
    /// Whether another pass should start after `completed` passes.
    pub fn continues(&self, completed: u32) -> bool {
        match self {
            Repeat::Once => false,
            Repeat::Times(n) => completed < (*n).max(1),
            Repeat::Forever => true,
        }
    }

    pub fn label(&self, iteration: u32) -> String {
        match self {
            Repeat::Once => format!("Iteration {}/1", iteration),
            Repeat::Times(n) => format!("Iteration {}/{}", iteration, (*n).max(1)),
            Repeat::Forever => format!("Iteration {}", iteration),
        }
    }
}

/// Pause inserted between consecutive steps, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDelay {
    #[default]
    None,
    Fixed(f64),
    Random { min: f64, max: f64 },
}

impl StepDelay {
    pub fn sample(&self) -> Duration {
        let seconds = match *self {
            StepDelay::None => 0.0,
            StepDelay::Fixed(s) => s,
            StepDelay::Random { min, max } => {
                let (min, max) = (clamp_bound(min), clamp_bound(max));
                let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
                if hi > lo {
                    rand::thread_rng().gen_range(lo..=hi)
                } else {
                    lo
                }
            }
        };
        seconds_to_duration(seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub repeat: Repeat,
    pub step_delay: StepDelay,
    /// Passed through untouched; the engine never reads it.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RunOptions {
    pub fn repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn step_delay(mut self, delay: StepDelay) -> Self {
        self.step_delay = delay;
        self
    }

    /// Build from a flat settings map: `loop`, `infinite`, `loop_count`,
    /// `delay_mode` (`fixed`/`random`), `delay`, `delay_min`, `delay_max`.
    /// Unrecognised keys land in `extra`.
    pub fn from_settings(settings: &serde_json::Map<String, serde_json::Value>) -> Self {
        let flag = |k: &str| settings.get(k).and_then(|v| v.as_bool()).unwrap_or(false);
        let num = |k: &str| settings.get(k).and_then(|v| v.as_f64());

        let repeat = if !flag("loop") {
            Repeat::Once
        } else if flag("infinite") {
            Repeat::Forever
        } else {
            Repeat::Times(num("loop_count").map(|n| n.max(1.0) as u32).unwrap_or(1))
        };

        let random = settings.get("delay_mode").and_then(|v| v.as_str()) == Some("random");
        let step_delay = if random {
            StepDelay::Random {
                min: num("delay_min").unwrap_or(0.0),
                max: num("delay_max").unwrap_or(0.0),
            }
        } else {
            match num("delay") {
                Some(s) if s > 0.0 => StepDelay::Fixed(s),
                _ => StepDelay::None,
            }
        };

        const KNOWN: [&str; 7] = [
            "loop", "infinite", "loop_count", "delay_mode", "delay", "delay_min", "delay_max",
        ];
        let extra = settings
            .iter()
            .filter(|(k, _)| !KNOWN.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            repeat,
            step_delay,
            extra,
        }
    }
}

/// Largest random delay bound, in seconds. Keeps the sampled range finite.
const MAX_RANDOM_BOUND: f64 = u32::MAX as f64;

fn clamp_bound(seconds: f64) -> f64 {
    if seconds.is_nan() {
        0.0
    } else {
        seconds.clamp(0.0, MAX_RANDOM_BOUND)
    }
}

/// Negative and NaN become zero; values too large for a `Duration` saturate.
pub(crate) fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(v: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn repeat_counts() {
        assert!(!Repeat::Once.continues(1));
        assert!(Repeat::Times(3).continues(2));
        assert!(!Repeat::Times(3).continues(3));
        assert!(!Repeat::Times(0).continues(1));
        assert!(Repeat::Forever.continues(1_000));
    }

    #[test]
    fn from_settings_fixed_loop() {
        let opts = RunOptions::from_settings(&settings(json!({
            "loop": true, "infinite": false, "loop_count": 4,
            "delay_mode": "fixed", "delay": 0.5, "delay_min": 0.2, "delay_max": 1.0,
            "theme": "dark"
        })));
        assert_eq!(opts.repeat, Repeat::Times(4));
        assert_eq!(opts.step_delay, StepDelay::Fixed(0.5));
        assert_eq!(opts.extra.get("theme"), Some(&json!("dark")));
        assert_eq!(opts.extra.len(), 1);
    }

    #[test]
    fn from_settings_random_forever() {
        let opts = RunOptions::from_settings(&settings(json!({
            "loop": true, "infinite": true,
            "delay_mode": "random", "delay_min": 0.2, "delay_max": 1.0
        })));
        assert_eq!(opts.repeat, Repeat::Forever);
        assert_eq!(opts.step_delay, StepDelay::Random { min: 0.2, max: 1.0 });
    }

    #[test]
    fn from_settings_defaults() {
        let opts = RunOptions::from_settings(&serde_json::Map::new());
        assert_eq!(opts, RunOptions::default());
    }

    #[test]
    fn random_delay_stays_in_range() {
        let delay = StepDelay::Random { min: 0.3, max: 0.1 };
        for _ in 0..50 {
            let d = delay.sample().as_secs_f64();
            assert!((0.1..=0.3).contains(&d), "{}", d);
        }
        assert_eq!(StepDelay::Fixed(-1.0).sample(), Duration::ZERO);
    }

    #[test]
    fn random_delay_with_unbounded_limits() {
        let open_ended = StepDelay::Random { min: 1.0, max: f64::INFINITY };
        let d = open_ended.sample().as_secs_f64();
        assert!((1.0..=MAX_RANDOM_BOUND).contains(&d), "{}", d);

        let nan = StepDelay::Random { min: f64::NAN, max: f64::NEG_INFINITY };
        assert_eq!(nan.sample(), Duration::ZERO);
    }

    #[test]
    fn oversized_seconds_saturate() {
        assert_eq!(seconds_to_duration(f64::INFINITY), Duration::MAX);
        assert_eq!(seconds_to_duration(f64::NAN), Duration::ZERO);
    }
}
