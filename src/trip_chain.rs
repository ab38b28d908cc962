use std::error::Error;
use std::fmt;

use super::geometry::Point2d;

/// Assumed travel time between the end of one activity and the start of the next.
pub const TRAVEL_TIME_S: f64 = 30. * 60.;
/// Fixed time spent at a destination activity.
pub const DESTINATION_DURATION_S: f64 = 8. * 3600.;
/// origin activity, leg, destination activity, leg, return activity
pub const CANONICAL_CHAIN_LEN: usize = 5;
/// Activities per traveler in a canonical chain. Used to normalise per-activity rates.
pub const NOMINAL_ACTIVITIES: usize = 3;
pub static DEFAULT_LEG_MODE: &str = "drt";

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub enum ActivityType {
    Origin,
    Destination,
}

impl ActivityType {
    /// The tag written to population files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Origin => "home",
            ActivityType::Destination => "work",
        }
    }

    pub fn parse(tag: &str) -> Option<ActivityType> {
        match tag {
            "home" | "origin" => Some(ActivityType::Origin),
            "work" | "destination" => Some(ActivityType::Destination),
            _ => None,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Activity {
    pub act_type: ActivityType,
    pub coord: Point2d,
    // seconds since midnight; None for the last activity of a chain
    pub end_time_s: Option<f64>,
}

impl Activity {
    pub fn new(act_type: ActivityType, coord: Point2d, end_time_s: Option<f64>) -> Activity {
        Activity {
            act_type,
            coord,
            end_time_s,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Leg {
    pub mode: String,
}

impl Leg {
    pub fn new(mode: &str) -> Leg {
        Leg {
            mode: String::from(mode),
        }
    }
}

// This enum allows a plan to hold both activities and the legs between them.
#[derive(PartialEq, Debug, Clone)]
pub enum PlanElement {
    Activity(Activity),
    Leg(Leg),
}

#[derive(PartialEq, Debug, Clone)]
pub enum ChainError {
    Empty,
    EvenLength(usize),
    NotAlternating(usize),
    MissingEndTime(usize),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::Empty => write!(f, "trip chain has no elements"),
            ChainError::EvenLength(len) => write!(f, "trip chain has even length {}", len),
            ChainError::NotAlternating(idx) => {
                write!(f, "element {} breaks the activity/leg alternation", idx)
            }
            ChainError::MissingEndTime(idx) => {
                write!(f, "activity at element {} has no end time", idx)
            }
        }
    }
}

impl Error for ChainError {}

/// One synthetic traveler: an id and an alternating sequence of activities and legs.
#[derive(PartialEq, Debug, Clone)]
pub struct TripChainRecord {
    pub id: String,
    elements: Vec<PlanElement>,
}

pub type Population = Vec<TripChainRecord>;

impl TripChainRecord {
    pub fn new(id: &str, elements: Vec<PlanElement>) -> TripChainRecord {
        TripChainRecord {
            id: String::from(id),
            elements,
        }
    }

    /// Build the canonical origin -> destination -> origin chain, departing at `departure_s` and
    /// leaving the destination after the fixed duration.
    pub fn round_trip(id: &str, origin: Point2d, destination: Point2d, departure_s: f64,
                      mode: &str) -> TripChainRecord {
        let destination_end = departure_s + TRAVEL_TIME_S + DESTINATION_DURATION_S;
        TripChainRecord::new(id, vec![
            PlanElement::Activity(Activity::new(ActivityType::Origin, origin, Some(departure_s))),
            PlanElement::Leg(Leg::new(mode)),
            PlanElement::Activity(Activity::new(ActivityType::Destination, destination,
                                                Some(destination_end))),
            PlanElement::Leg(Leg::new(mode)),
            PlanElement::Activity(Activity::new(ActivityType::Origin, origin, None)),
        ])
    }

    /// Deep copy under a new identifier. Every stage builds its output population with this.
    pub fn clone_with_id(&self, id: &str) -> TripChainRecord {
        TripChainRecord {
            id: String::from(id),
            elements: self.elements.clone(),
        }
    }

    pub fn get_id(&self) -> &str {
        &self.id
    }

    pub fn elements(&self) -> &Vec<PlanElement> {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.elements.iter().filter_map(|elem| match elem {
            PlanElement::Activity(act) => Some(act),
            PlanElement::Leg(_) => None,
        })
    }

    pub fn activities_mut(&mut self) -> impl Iterator<Item = &mut Activity> {
        self.elements.iter_mut().filter_map(|elem| match elem {
            PlanElement::Activity(act) => Some(act),
            PlanElement::Leg(_) => None,
        })
    }

    /// Element indices of all activities, in chain order.
    pub fn activity_indices(&self) -> Vec<usize> {
        self.elements.iter().enumerate()
            .filter(|(_, elem)| matches!(elem, PlanElement::Activity(_)))
            .map(|(ii, _)| ii)
            .collect()
    }

    pub fn activity_at(&self, element_idx: usize) -> Option<&Activity> {
        match self.elements.get(element_idx) {
            Some(PlanElement::Activity(act)) => Some(act),
            _ => None,
        }
    }

    pub fn activity_at_mut(&mut self, element_idx: usize) -> Option<&mut Activity> {
        match self.elements.get_mut(element_idx) {
            Some(PlanElement::Activity(act)) => Some(act),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.elements.is_empty() {
            return Err(ChainError::Empty);
        }
        if self.elements.len() % 2 == 0 {
            return Err(ChainError::EvenLength(self.elements.len()));
        }
        let last_idx = self.elements.len() - 1;
        for (ii, elem) in self.elements.iter().enumerate() {
            match elem {
                PlanElement::Activity(act) => {
                    if ii % 2 == 1 {
                        return Err(ChainError::NotAlternating(ii));
                    }
                    if ii < last_idx && act.end_time_s.is_none() {
                        return Err(ChainError::MissingEndTime(ii));
                    }
                }
                PlanElement::Leg(_) => {
                    if ii % 2 == 0 {
                        return Err(ChainError::NotAlternating(ii));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn is_well_formed(&self) -> bool {
        self.validate().is_ok()
    }

    /// Well-formed and exactly origin, leg, destination, leg, return.
    pub fn is_canonical(&self) -> bool {
        self.elements.len() == CANONICAL_CHAIN_LEN && self.is_well_formed()
    }

    /// The first activity, if it is of origin type.
    pub fn origin_activity(&self) -> Option<&Activity> {
        self.activity_at(0).filter(|act| act.act_type == ActivityType::Origin)
    }

    pub fn origin_activity_mut(&mut self) -> Option<&mut Activity> {
        self.activity_at_mut(0).filter(|act| act.act_type == ActivityType::Origin)
    }

    pub fn departure_time_s(&self) -> Option<f64> {
        self.origin_activity().and_then(|act| act.end_time_s)
    }

    /// Time of arrival at the activity at `element_idx`: the previous activity's end plus the
    /// travel time.
    pub fn arrival_time_s(&self, element_idx: usize) -> Option<f64> {
        if element_idx < 2 {
            return None;
        }
        self.activity_at(element_idx - 2)
            .and_then(|prev| prev.end_time_s)
            .map(|end| end + TRAVEL_TIME_S)
    }

    /// True if no destination activity ends before the traveler arrives there.
    pub fn is_chain_consistent(&self) -> bool {
        self.activity_indices().into_iter().all(|ii| {
            let act = &self.elements[ii];
            match (act, self.arrival_time_s(ii)) {
                (PlanElement::Activity(act), Some(arrival))
                    if act.act_type == ActivityType::Destination => {
                    match act.end_time_s {
                        Some(end) => end >= arrival,
                        None => true,
                    }
                }
                _ => true,
            }
        })
    }

    /// Recompute every destination activity's end time as arrival plus the fixed duration.
    pub fn enforce_destination_durations(&mut self) {
        for ii in self.activity_indices() {
            let is_destination = self.activity_at(ii)
                .map_or(false, |act| act.act_type == ActivityType::Destination);
            if !is_destination {
                continue;
            }
            let arrival = self.arrival_time_s(ii).unwrap_or(0.);
            if let Some(act) = self.activity_at_mut(ii) {
                act.end_time_s = Some(arrival + DESTINATION_DURATION_S);
            }
        }
    }
}
