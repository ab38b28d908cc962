/// Shaping that pulls departures toward a set of peak hours.
#[derive(PartialEq, Debug, Clone)]
pub struct PeakShaping {
    pub peak_hours: Vec<u32>,
    pub snap_probability: f64,
    pub noise_std_s: f64,
}

impl Default for PeakShaping {
    fn default() -> PeakShaping {
        PeakShaping {
            peak_hours: vec![7, 8, 17, 18],
            snap_probability: 0.6,
            noise_std_s: 15. * 60.,
        }
    }
}

/// Timing noise that emulates clustering of demand in a few zones.
#[derive(PartialEq, Debug, Clone)]
pub struct ClusterTiming {
    pub jitter_probability: f64,
    pub noise_std_s: f64,
}

impl Default for ClusterTiming {
    fn default() -> ClusterTiming {
        ClusterTiming {
            jitter_probability: 0.3,
            noise_std_s: 10. * 60.,
        }
    }
}

/// Restricts reallocation to the zones carrying the most demand.
#[derive(PartialEq, Debug, Clone)]
pub struct Concentration {
    // zones scoring at least this fraction of the best zone's score are kept
    pub threshold: f64,
    pub allocation_probability: f64,
}

impl Default for Concentration {
    fn default() -> Concentration {
        Concentration {
            threshold: 0.7,
            allocation_probability: 0.9,
        }
    }
}

/// What a scenario name means for the temporal and spatial stages.
#[derive(PartialEq, Debug, Clone)]
pub enum ScenarioKind {
    Baseline,
    TemporalPeak(PeakShaping),
    SpatialConcentration(ClusterTiming, Concentration),
    Combined(PeakShaping, ClusterTiming),
    RealPattern,
    Custom(String),
}

impl ScenarioKind {
    /// Map a scenario name from a pattern id to its kind, with default parameters.
    pub fn from_name(name: &str) -> ScenarioKind {
        match name {
            "base" => ScenarioKind::Baseline,
            "S1" => ScenarioKind::TemporalPeak(PeakShaping::default()),
            "S2" => ScenarioKind::SpatialConcentration(ClusterTiming::default(),
                                                       Concentration::default()),
            "S3" => ScenarioKind::Combined(PeakShaping::default(), ClusterTiming::default()),
            "S4" => ScenarioKind::RealPattern,
            other => ScenarioKind::Custom(String::from(other)),
        }
    }

    pub fn peak_shaping(&self) -> Option<&PeakShaping> {
        match self {
            ScenarioKind::TemporalPeak(peaks) | ScenarioKind::Combined(peaks, _) => Some(peaks),
            _ => None,
        }
    }

    pub fn cluster_timing(&self) -> Option<&ClusterTiming> {
        match self {
            ScenarioKind::SpatialConcentration(timing, _) | ScenarioKind::Combined(_, timing) => {
                Some(timing)
            }
            _ => None,
        }
    }

    pub fn concentration(&self) -> Option<&Concentration> {
        match self {
            ScenarioKind::SpatialConcentration(_, conc) => Some(conc),
            _ => None,
        }
    }

    pub fn uses_real_patterns(&self) -> bool {
        *self == ScenarioKind::RealPattern
    }

    pub fn temporal_method(&self) -> &'static str {
        match self {
            ScenarioKind::TemporalPeak(_) => "TEMPORAL_PEAKS_ENHANCEMENT",
            ScenarioKind::SpatialConcentration(..) => "SPATIAL_CONCENTRATION_TEMPORAL",
            ScenarioKind::Combined(..) => "COMBINED_TEMPORAL_SPATIAL",
            ScenarioKind::RealPattern => "SMARTCARD_PATTERN_MATCHING",
            ScenarioKind::Baseline | ScenarioKind::Custom(_) => "BASE_UNIFORM_DISTRIBUTION",
        }
    }

    pub fn spatial_method(&self) -> &'static str {
        match self {
            ScenarioKind::TemporalPeak(_) => "TEMPORAL_SPATIAL_PROPORTIONAL",
            ScenarioKind::SpatialConcentration(..) => "STRONG_SPATIAL_CONCENTRATION",
            ScenarioKind::Combined(..) => "COMBINED_SPATIAL_TEMPORAL",
            ScenarioKind::RealPattern => "REAL_WORLD_SPATIAL_PATTERNS",
            ScenarioKind::Baseline | ScenarioKind::Custom(_) => "BASE_ZONE_DISTRIBUTION",
        }
    }
}
