use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// The perturbation family selected by a rule number.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum PerturbationFamily {
    Temporal,
    Spatial,
    Combined,
    Unperturbed,
}

impl PerturbationFamily {
    pub fn from_rule_number(rule_number: u32) -> PerturbationFamily {
        match rule_number {
            1 => PerturbationFamily::Temporal,
            2 => PerturbationFamily::Spatial,
            3 => PerturbationFamily::Combined,
            _ => PerturbationFamily::Unperturbed,
        }
    }

    pub fn method_tag(&self) -> &'static str {
        match self {
            PerturbationFamily::Temporal => "TEMPORAL_UNCERTAINTY_PERTURBATIONS",
            PerturbationFamily::Spatial => "SPATIAL_UNCERTAINTY_PERTURBATIONS",
            PerturbationFamily::Combined => "COMBINED_UNCERTAINTY_PERTURBATIONS",
            PerturbationFamily::Unperturbed => "NO_UNCERTAINTY_PERTURBATIONS",
        }
    }
}

/// A demand multiplier paired with a perturbation rule number.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct UncertaintyRule {
    multiplier: f64,
    rule_number: u32,
}

impl UncertaintyRule {
    pub fn new(multiplier: f64, rule_number: u32) -> UncertaintyRule {
        UncertaintyRule {
            multiplier,
            rule_number,
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn rule_number(&self) -> u32 {
        self.rule_number
    }

    /// Deterministic seed: trunc(multiplier * 1000) * 10 + rule number.
    pub fn seed(&self) -> u64 {
        let scaled = (self.multiplier * 1000.) as i64;
        (scaled * 10 + self.rule_number as i64) as u64
    }

    pub fn scenario_suffix(&self) -> String {
        format!("trip{}_rule{}", format_multiplier(self.multiplier), self.rule_number)
    }

    pub fn is_baseline(&self) -> bool {
        (self.multiplier - 1.0).abs() < 0.001 && self.rule_number == 1
    }

    pub fn family(&self) -> PerturbationFamily {
        PerturbationFamily::from_rule_number(self.rule_number)
    }
}

/// Multipliers are written with at least one decimal place, so 1 becomes "1.0" and 0.5 stays
/// "0.5".
pub fn format_multiplier(multiplier: f64) -> String {
    if multiplier.fract() == 0. {
        format!("{:.1}", multiplier)
    } else {
        format!("{}", multiplier)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct PatternIdError {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for PatternIdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid pattern id {:?}: {}", self.name, self.reason)
    }
}

impl Error for PatternIdError {}

/// Identifies a demand pattern: `<scenario>_trip<multiplier>_rule<rule>`.
#[derive(PartialEq, Debug, Clone)]
pub struct PatternId {
    pub scenario: String,
    pub rule: UncertaintyRule,
}

impl PatternId {
    pub fn new(scenario: &str, multiplier: f64, rule_number: u32) -> PatternId {
        PatternId {
            scenario: String::from(scenario),
            rule: UncertaintyRule::new(multiplier, rule_number),
        }
    }

    /// Parse a file stem. A stem without a `_trip` part names a scenario at multiplier 1.0 and
    /// rule 1.
    pub fn parse(stem: &str) -> Result<PatternId, PatternIdError> {
        let err = |reason: &str| PatternIdError {
            name: String::from(stem),
            reason: String::from(reason),
        };

        let trip_pos = match stem.rfind("_trip") {
            Some(pos) => pos,
            None => {
                if stem.is_empty() || stem.contains("_rule") {
                    return Err(err("expected <scenario>_trip<multiplier>_rule<n> or <scenario>"));
                }
                return Ok(PatternId::new(stem, 1.0, 1));
            }
        };

        let scenario = &stem[..trip_pos];
        if scenario.is_empty() {
            return Err(err("empty scenario name"));
        }
        let rest = &stem[trip_pos + "_trip".len()..];
        let parts: Vec<&str> = rest.splitn(2, "_rule").collect();
        if parts.len() != 2 {
            return Err(err("missing _rule<n> suffix"));
        }
        let multiplier: f64 = parts[0].parse().map_err(|_| err("multiplier is not a number"))?;
        if !multiplier.is_finite() || multiplier <= 0. {
            return Err(err("multiplier must be positive"));
        }
        let rule_number: u32 = parts[1].parse().map_err(|_| err("rule is not an integer"))?;

        Ok(PatternId::new(scenario, multiplier, rule_number))
    }

    pub fn multiplier(&self) -> f64 {
        self.rule.multiplier()
    }

    pub fn rule_number(&self) -> u32 {
        self.rule.rule_number()
    }

    pub fn person_id(&self, index: usize) -> String {
        format!("{}_person_{}", self, index)
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}_{}", self.scenario, self.rule.scenario_suffix())
    }
}

impl FromStr for PatternId {
    type Err = PatternIdError;

    fn from_str(ss: &str) -> Result<PatternId, PatternIdError> {
        PatternId::parse(ss)
    }
}
