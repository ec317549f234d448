use rand::Rng;
use serde::{Deserialize, Serialize};

/// The type a strategy parameter's raw string value is interpreted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    Int,
    Float,
    Bool,
    String,
    Select,
}

/// A parameter that only applies when another parameter holds a given
/// value, e.g. `breakevenLockTriggerPercent` only matters when
/// `breakevenLockEnabled == "true"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnabledWhen {
    pub param_key: String,
    pub value: String,
}

/// Static metadata describing one strategy parameter. Pure methods only —
/// the runtime value lives separately in `ParameterValue`, following the
/// `(descriptor, value)` pairing spec §9 calls for rather than an instance
/// that sometimes holds a value and sometimes doesn't.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub label: String,
    pub param_type: ParameterType,
    pub group: String,
    pub class_default: String,
    pub options: Option<Vec<String>>,
    pub enabled_when: Option<EnabledWhen>,
    pub is_backtest_relevant: bool,
}

impl ParameterDescriptor {
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        param_type: ParameterType,
        group: impl Into<String>,
        class_default: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            param_type,
            group: group.into(),
            class_default: class_default.into(),
            options: None,
            enabled_when: None,
            is_backtest_relevant: true,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_enabled_when(mut self, param_key: impl Into<String>, value: impl Into<String>) -> Self {
        self.enabled_when = Some(EnabledWhen {
            param_key: param_key.into(),
            value: value.into(),
        });
        self
    }

    /// Canonicalises a raw value for this parameter's type: BOOL maps any
    /// of `{"true","yes","1"}` (case-insensitively) to `"true"` and
    /// everything else to `"false"`; FLOAT strips trailing zeros; INT/
    /// STRING/SELECT pass through unchanged. Idempotent by construction.
    pub fn normalize(&self, raw: &str) -> String {
        match self.param_type {
            ParameterType::Bool => {
                let truthy = matches!(raw.trim().to_lowercase().as_str(), "true" | "yes" | "1");
                truthy.to_string()
            }
            ParameterType::Float => normalize_float(raw),
            ParameterType::Int | ParameterType::String | ParameterType::Select => {
                raw.trim().to_string()
            }
        }
    }

    /// Produces a pseudo-random neighbour of `current` for the parameter
    /// optimiser, per spec §4.9's mutation rules. Never consults system
    /// entropy: `rng` is supplied by the caller so mutation stays
    /// deterministic given a seed.
    pub fn mutate(&self, current: &str, rng: &mut impl Rng) -> String {
        match self.param_type {
            ParameterType::Bool => {
                let current_bool = matches!(current.trim().to_lowercase().as_str(), "true" | "yes" | "1");
                (!current_bool).to_string()
            }
            ParameterType::Int => {
                let value: i64 = current.trim().parse().unwrap_or(0);
                let delta = if rng.random_bool(0.5) { 1 } else { -1 };
                let mutated = value + delta;
                // 0 - 1 would go negative; spec's clamp forces that case to 1,
                // not back down to 0.
                let mutated = if mutated < 0 { value + 1 } else { mutated };
                mutated.to_string()
            }
            ParameterType::Float => {
                let value: f64 = current.trim().parse().unwrap_or(0.0);
                let magnitude = rng.random_range(0.5..=1.0) * 0.10;
                let delta = if rng.random_bool(0.5) {
                    magnitude
                } else {
                    -magnitude
                };
                let mutated = (value * (1.0 + delta)).max(0.0);
                normalize_float(&mutated.to_string())
            }
            ParameterType::Select => {
                let options = self.options.clone().unwrap_or_default();
                if options.len() < 2 {
                    return current.to_string();
                }
                loop {
                    let idx = rng.random_range(0..options.len());
                    if options[idx] != current {
                        return options[idx].clone();
                    }
                }
            }
            ParameterType::String => current.to_string(),
        }
    }
}

fn normalize_float(raw: &str) -> String {
    let trimmed = raw.trim();
    let value: f64 = trimmed.parse().unwrap_or(0.0);
    let mut formatted = format!("{value}");
    if formatted.contains('.') {
        while formatted.ends_with('0') {
            formatted.pop();
        }
        if formatted.ends_with('.') {
            formatted.pop();
        }
    }
    formatted
}

/// A concrete runtime value for a parameter, created by resolving a raw
/// string against its descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterValue {
    pub raw: String,
}

impl ParameterValue {
    pub fn from_raw(descriptor: &ParameterDescriptor, raw: &str) -> Self {
        Self {
            raw: descriptor.normalize(raw),
        }
    }

    pub fn as_bool(&self) -> bool {
        self.raw == "true"
    }

    pub fn as_int(&self) -> i64 {
        self.raw.parse().unwrap_or(0)
    }

    pub fn as_float(&self) -> f64 {
        self.raw.parse().unwrap_or(0.0)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn bool_normalize_recognises_truthy_set() {
        let d = ParameterDescriptor::new("x", "X", ParameterType::Bool, "g", "false");
        assert_eq!(d.normalize("yes"), "true");
        assert_eq!(d.normalize("1"), "true");
        assert_eq!(d.normalize("TRUE"), "true");
        assert_eq!(d.normalize("no"), "false");
    }

    #[test]
    fn float_normalize_strips_trailing_zeros() {
        let d = ParameterDescriptor::new("x", "X", ParameterType::Float, "g", "0");
        assert_eq!(d.normalize("5.500"), "5.5");
        assert_eq!(d.normalize("5.000"), "5");
        assert_eq!(d.normalize("5"), "5");
    }

    #[test]
    fn normalize_is_idempotent_for_every_type() {
        let cases = [
            (ParameterType::Bool, "yes"),
            (ParameterType::Float, "5.500"),
            (ParameterType::Int, "7"),
            (ParameterType::String, "abc"),
            (ParameterType::Select, "abc"),
        ];
        for (ty, raw) in cases {
            let d = ParameterDescriptor::new("x", "X", ty, "g", "0");
            let once = d.normalize(raw);
            let twice = d.normalize(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn bool_mutation_flips() {
        let d = ParameterDescriptor::new("x", "X", ParameterType::Bool, "g", "false");
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(d.mutate("true", &mut rng), "false");
        assert_eq!(d.mutate("false", &mut rng), "true");
    }

    #[test]
    fn int_mutation_never_negative() {
        let d = ParameterDescriptor::new("x", "X", ParameterType::Int, "g", "0");
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..50 {
            let mutated = d.mutate("0", &mut rng);
            assert!(mutated.parse::<i64>().unwrap() >= 0);
        }
    }

    #[test]
    fn int_mutation_of_zero_always_goes_to_one() {
        // spec's "INT +-1 (0 -> 1)" clamp: the -1 branch at value 0 must
        // land on 1, not be clamped back down to 0.
        let d = ParameterDescriptor::new("x", "X", ParameterType::Int, "g", "0");
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(d.mutate("0", &mut rng), "1");
        }
    }

    #[test]
    fn float_mutation_stays_non_negative_and_bounded() {
        let d = ParameterDescriptor::new("x", "X", ParameterType::Float, "g", "0");
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let mutated = d.mutate("10", &mut rng);
            let v: f64 = mutated.parse().unwrap();
            assert!(v >= 0.0);
            assert!(v >= 8.9 && v <= 11.1);
        }
    }

    #[test]
    fn select_mutation_picks_other_option() {
        let d = ParameterDescriptor::new("x", "X", ParameterType::Select, "g", "a")
            .with_options(vec!["a".into(), "b".into(), "c".into()]);
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..20 {
            let mutated = d.mutate("a", &mut rng);
            assert_ne!(mutated, "a");
        }
    }

    #[test]
    fn mutation_is_deterministic_given_a_seed() {
        let d = ParameterDescriptor::new("x", "X", ParameterType::Float, "g", "0");
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(42);
        assert_eq!(d.mutate("10", &mut rng1), d.mutate("10", &mut rng2));
    }
}
