use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::error::Error;
use std::fs::File;
use std::io;
use std::path::Path;

use chrono::NaiveDateTime;
use chrono::Timelike;
use glob::glob;

use super::geometry::Point2d;
use super::reprojection::both_frames;
use super::reprojection::CoordinateTransform;
use super::rules::PatternId;
use super::scenario::ScenarioKind;

pub type ZoneId = u32;

pub static TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
static HOUR_COLUMN_PREFIX: &str = "t_";
static REAL_TIME_SUFFIX: &str = "_real_time";

/// Hourly origin-destination volumes for one scenario, multiplier and rule.
#[derive(PartialEq, Debug, Clone)]
pub struct DemandPattern {
    pub id: PatternId,
    pub scenario: ScenarioKind,
    od_volumes: BTreeMap<(ZoneId, ZoneId, u32), f64>,
    hourly_totals: BTreeMap<u32, f64>,
    zones: BTreeSet<ZoneId>,
    pub skipped_rows: usize,
}

impl DemandPattern {
    pub fn new(id: PatternId) -> DemandPattern {
        let scenario = ScenarioKind::from_name(&id.scenario);
        DemandPattern {
            id,
            scenario,
            od_volumes: BTreeMap::new(),
            hourly_totals: BTreeMap::new(),
            zones: BTreeSet::new(),
            skipped_rows: 0,
        }
    }

    /// Add `volume` trips from `origin` to `destination` in `hour`. Non-positive volumes are
    /// ignored; repeated keys accumulate.
    pub fn add_demand(&mut self, origin: ZoneId, destination: ZoneId, hour: u32, volume: f64) {
        if !(volume > 0.) {
            return;
        }
        *self.od_volumes.entry((origin, destination, hour)).or_insert(0.) += volume;
        *self.hourly_totals.entry(hour).or_insert(0.) += volume;
        self.zones.insert(origin);
        self.zones.insert(destination);
    }

    pub fn demand(&self, origin: ZoneId, destination: ZoneId, hour: u32) -> f64 {
        self.od_volumes.get(&(origin, destination, hour)).cloned().unwrap_or(0.)
    }

    pub fn od_volumes(&self) -> &BTreeMap<(ZoneId, ZoneId, u32), f64> {
        &self.od_volumes
    }

    pub fn hourly_totals(&self) -> &BTreeMap<u32, f64> {
        &self.hourly_totals
    }

    pub fn zones(&self) -> &BTreeSet<ZoneId> {
        &self.zones
    }

    pub fn total_trips(&self) -> f64 {
        self.hourly_totals.values().sum()
    }

    /// Volumes per (origin, destination) summed over all hours.
    pub fn od_pair_volumes(&self) -> BTreeMap<(ZoneId, ZoneId), f64> {
        let mut pairs = BTreeMap::new();
        for ((orig, dest, _), vol) in &self.od_volumes {
            *pairs.entry((*orig, *dest)).or_insert(0.) += vol;
        }
        pairs
    }

    /// Sum of the volumes of every OD entry that starts or ends in each zone.
    pub fn zone_scores(&self) -> BTreeMap<ZoneId, f64> {
        let mut scores = BTreeMap::new();
        for ((orig, dest, _), vol) in &self.od_volumes {
            *scores.entry(*orig).or_insert(0.) += vol;
            *scores.entry(*dest).or_insert(0.) += vol;
        }
        scores
    }

    pub fn from_csv_path(path: &Path) -> Result<DemandPattern, Box<dyn Error>> {
        let stem = path.file_stem()
            .and_then(|ss| ss.to_str())
            .ok_or_else(|| format!("no usable file name in {}", path.display()))?;
        let id = PatternId::parse(stem)?;
        let file = File::open(path)?;
        parse_od_table(id, file)
    }
}

/// Read an OD table whose first two columns are origin and destination zones and whose `t_<h>`
/// columns hold the volume for hour h.
pub fn parse_od_table<R: io::Read>(id: PatternId, reader: R)
                                   -> Result<DemandPattern, Box<dyn Error>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(format!("OD table for {} needs origin and destination columns", id).into());
    }
    let hour_columns: Vec<(usize, u32)> = headers.iter().enumerate()
        .skip(2)
        .filter_map(|(ii, name)| {
            if !name.starts_with(HOUR_COLUMN_PREFIX) {
                return None;
            }
            name[HOUR_COLUMN_PREFIX.len()..].parse().ok().map(|hour| (ii, hour))
        })
        .collect();
    if hour_columns.is_empty() {
        log::warn!("OD table for {} has no t_<hour> columns", id);
    }

    let mut pattern = DemandPattern::new(id);
    for (row_idx, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                log::warn!("{}: skipping unreadable row {}: {}", pattern.id, row_idx + 1, err);
                pattern.skipped_rows += 1;
                continue;
            }
        };
        match parse_od_row(&record, &hour_columns) {
            Some((orig, dest, volumes)) => {
                for (hour, volume) in volumes {
                    pattern.add_demand(orig, dest, hour, volume);
                }
            }
            None => {
                log::warn!("{}: skipping malformed row {}: {:?}", pattern.id, row_idx + 1,
                           record);
                pattern.skipped_rows += 1;
            }
        }
    }

    log::debug!("parsed {}: {} OD entries, {} zones, {} trips", pattern.id,
                pattern.od_volumes.len(), pattern.zones.len(), pattern.total_trips());
    Ok(pattern)
}

fn parse_od_row(record: &csv::StringRecord, hour_columns: &[(usize, u32)])
                -> Option<(ZoneId, ZoneId, Vec<(u32, f64)>)> {
    let orig: ZoneId = record.get(0)?.parse().ok()?;
    let dest: ZoneId = record.get(1)?.parse().ok()?;
    let mut volumes = Vec::with_capacity(hour_columns.len());
    for (col, hour) in hour_columns {
        let volume: f64 = record.get(*col)?.parse().ok()?;
        if !volume.is_finite() {
            return None;
        }
        volumes.push((*hour, volume));
    }
    Some((orig, dest, volumes))
}

/// One observed trip from a real-time (smart card) record.
#[derive(PartialEq, Debug, Clone)]
pub struct RealTimeTrip {
    pub idx: u64,
    pub origin_zone: ZoneId,
    pub destination_zone: ZoneId,
    pub hour: u32,
    pub origin_h3: String,
    pub dest_h3: String,
    pub origin_raw: Point2d,
    pub dest_raw: Point2d,
    pub origin_geodetic: Point2d,
    pub dest_geodetic: Point2d,
    // in the projected frame
    pub origin: Point2d,
    pub destination: Point2d,
    pub departure: NaiveDateTime,
    pub departure_time_s: f64,
}

/// Parse a real-time trip table. Columns are read by position:
/// idx, origin, destination, hour, origin_h3, dest_h3, origin_x, origin_y, dest_x, dest_y,
/// timestamp. Returns the trips and the number of rows skipped.
pub fn parse_real_time_trips<R: io::Read>(reader: R, transform: &dyn CoordinateTransform)
                                          -> Result<(Vec<RealTimeTrip>, usize), Box<dyn Error>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut trips = vec![];
    let mut skipped = 0;
    for (row_idx, result) in reader.records().enumerate() {
        let parsed = result.map_err(|err| err.to_string())
            .and_then(|record| parse_real_time_row(&record, transform));
        match parsed {
            Ok(trip) => trips.push(trip),
            Err(msg) => {
                log::warn!("skipping real-time row {}: {}", row_idx + 1, msg);
                skipped += 1;
            }
        }
    }
    Ok((trips, skipped))
}

fn parse_real_time_row(record: &csv::StringRecord, transform: &dyn CoordinateTransform)
                       -> Result<RealTimeTrip, String> {
    if record.len() < 11 {
        return Err(format!("expected 11 fields, found {}", record.len()));
    }
    fn field<T: std::str::FromStr>(record: &csv::StringRecord, idx: usize) -> Result<T, String> {
        let raw = record.get(idx).unwrap_or("");
        raw.parse().map_err(|_| format!("bad value {:?} in column {}", raw, idx))
    }

    let origin_raw = Point2d::new(field(record, 6)?, field(record, 7)?);
    let dest_raw = Point2d::new(field(record, 8)?, field(record, 9)?);
    if !origin_raw.is_finite() || !dest_raw.is_finite() {
        return Err(String::from("non-finite coordinate"));
    }
    let (origin_geodetic, origin) = both_frames(&origin_raw, transform);
    let (dest_geodetic, destination) = both_frames(&dest_raw, transform);

    let timestamp = record.get(10).unwrap_or("");
    let departure = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|err| format!("bad timestamp {:?}: {}", timestamp, err))?;

    Ok(RealTimeTrip {
        idx: field(record, 0)?,
        origin_zone: field(record, 1)?,
        destination_zone: field(record, 2)?,
        hour: field(record, 3)?,
        origin_h3: String::from(record.get(4).unwrap_or("")),
        dest_h3: String::from(record.get(5).unwrap_or("")),
        origin_raw,
        dest_raw,
        origin_geodetic,
        dest_geodetic,
        origin,
        destination,
        departure,
        departure_time_s: departure.time().num_seconds_from_midnight() as f64,
    })
}

/// Every demand pattern and real-time trip table found on disk, keyed for lookup.
pub struct RulesDataSet {
    // keyed by the pattern id's string form, which also fixes batch order
    patterns: BTreeMap<String, DemandPattern>,
    real_time_trips: BTreeMap<String, Vec<RealTimeTrip>>,
    trips_by_hour: BTreeMap<String, BTreeMap<u32, Vec<usize>>>,
}

impl RulesDataSet {
    pub fn new() -> RulesDataSet {
        RulesDataSet {
            patterns: BTreeMap::new(),
            real_time_trips: BTreeMap::new(),
            trips_by_hour: BTreeMap::new(),
        }
    }

    pub fn load(rules_dir: &Path, real_time_dir: &Path, transform: &dyn CoordinateTransform)
                -> Result<RulesDataSet, Box<dyn Error>> {
        if !rules_dir.is_dir() {
            return Err(format!("rules directory {} does not exist", rules_dir.display()).into());
        }

        let mut dataset = RulesDataSet::new();
        for path in csv_files_in(rules_dir)? {
            let is_real_time = path.file_stem()
                .and_then(|ss| ss.to_str())
                .map_or(false, |ss| ss.ends_with(REAL_TIME_SUFFIX));
            if is_real_time {
                continue;
            }
            match DemandPattern::from_csv_path(&path) {
                Ok(pattern) => dataset.insert_pattern(pattern),
                Err(err) => log::warn!("skipping rules file {}: {}", path.display(), err),
            }
        }
        log::info!("loaded {} demand patterns from {}", dataset.patterns.len(),
                   rules_dir.display());

        if !real_time_dir.is_dir() {
            log::warn!("real-time directory {} does not exist, continuing without real trips",
                       real_time_dir.display());
            return Ok(dataset);
        }
        for path in csv_files_in(real_time_dir)? {
            let scenario = match path.file_stem().and_then(|ss| ss.to_str()) {
                Some(stem) if stem.ends_with(REAL_TIME_SUFFIX) => {
                    String::from(&stem[..stem.len() - REAL_TIME_SUFFIX.len()])
                }
                _ => continue,
            };
            let file = match File::open(&path) {
                Ok(file) => file,
                Err(err) => {
                    log::warn!("could not open {}: {}", path.display(), err);
                    continue;
                }
            };
            let (trips, skipped) = parse_real_time_trips(file, transform)?;
            log::info!("loaded {} real-time trips for scenario {} ({} rows skipped)",
                       trips.len(), scenario, skipped);
            dataset.insert_trips(&scenario, trips);
        }

        Ok(dataset)
    }

    /// Add a pattern. A second pattern with the same id is dropped.
    pub fn insert_pattern(&mut self, pattern: DemandPattern) {
        let key = pattern.id.to_string();
        if self.patterns.contains_key(&key) {
            log::warn!("duplicate demand pattern {}, keeping the first one", key);
            return;
        }
        self.patterns.insert(key, pattern);
    }

    pub fn insert_trips(&mut self, scenario: &str, trips: Vec<RealTimeTrip>) {
        let mut by_hour: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (ii, trip) in trips.iter().enumerate() {
            by_hour.entry(trip.hour).or_insert(vec![]).push(ii);
        }
        self.trips_by_hour.insert(String::from(scenario), by_hour);
        self.real_time_trips.insert(String::from(scenario), trips);
    }

    pub fn get_pattern(&self, scenario: &str, multiplier: f64, rule_number: u32)
                       -> Option<&DemandPattern> {
        let key = PatternId::new(scenario, multiplier, rule_number).to_string();
        self.patterns.get(&key)
    }

    pub fn pattern_by_id(&self, id: &str) -> Option<&DemandPattern> {
        self.patterns.get(id)
    }

    /// All patterns, ordered by pattern id.
    pub fn patterns(&self) -> impl Iterator<Item = &DemandPattern> {
        self.patterns.values()
    }

    pub fn num_patterns(&self) -> usize {
        self.patterns.len()
    }

    /// Real-time trips for a scenario; empty if none were loaded.
    pub fn real_time_trips(&self, scenario: &str) -> &[RealTimeTrip] {
        match self.real_time_trips.get(scenario) {
            Some(trips) => trips,
            None => &[],
        }
    }

    pub fn trips_by_hour(&self, scenario: &str, hour: u32) -> Vec<&RealTimeTrip> {
        let trips = self.real_time_trips(scenario);
        self.trips_by_hour.get(scenario)
            .and_then(|by_hour| by_hour.get(&hour))
            .map(|idxs| idxs.iter().map(|ii| &trips[*ii]).collect())
            .unwrap_or_default()
    }

    pub fn scenarios_with_trips(&self) -> impl Iterator<Item = &String> {
        self.real_time_trips.keys()
    }
}

fn csv_files_in(dir: &Path) -> Result<Vec<std::path::PathBuf>, Box<dyn Error>> {
    let pattern = dir.join("*.csv");
    let pattern = pattern.to_str()
        .ok_or_else(|| format!("non-UTF-8 directory {}", dir.display()))?;
    let mut paths = vec![];
    for entry in glob(pattern)? {
        match entry {
            Ok(path) => paths.push(path),
            Err(err) => log::warn!("could not read directory entry: {}", err),
        }
    }
    paths.sort();
    Ok(paths)
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::super::reprojection::IdentityTransform;
    use approx::assert_abs_diff_eq;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_parse_od_table() -> Result<(), Box<dyn Error>> {
        let table = "o,d,t_7,t_8,note\n\
                     1,2,3.5,0,x\n\
                     2,1,0,4,y\n\
                     1,2,1.5,2,z\n";
        let pattern = parse_od_table(PatternId::new("S1", 1.5, 2), table.as_bytes())?;

        assert_eq!(pattern.scenario, ScenarioKind::from_name("S1"));
        assert_abs_diff_eq!(pattern.demand(1, 2, 7), 5.0);
        assert_abs_diff_eq!(pattern.demand(1, 2, 8), 2.0);
        assert_abs_diff_eq!(pattern.demand(2, 1, 7), 0.0);
        assert_abs_diff_eq!(pattern.hourly_totals()[&7], 5.0);
        assert_abs_diff_eq!(pattern.hourly_totals()[&8], 6.0);
        assert_abs_diff_eq!(pattern.total_trips(), 11.0);
        assert_eq!(pattern.zones().iter().cloned().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(pattern.skipped_rows, 0);

        let scores = pattern.zone_scores();
        assert_abs_diff_eq!(scores[&1], 11.0);
        assert_abs_diff_eq!(pattern.od_pair_volumes()[&(2, 1)], 4.0);
        Ok(())
    }

    #[test]
    fn test_hourly_totals_match_od_volumes() -> Result<(), Box<dyn Error>> {
        let table = "origin,destination,t_6,t_7\n1,2,1,2\n3,4,5,0\n1,3,0,7\n";
        let pattern = parse_od_table(PatternId::new("base", 1.0, 1), table.as_bytes())?;
        for (hour, total) in pattern.hourly_totals() {
            let sum: f64 = pattern.od_volumes().iter()
                .filter(|((_, _, hh), _)| hh == hour)
                .map(|(_, vv)| vv)
                .sum();
            assert_abs_diff_eq!(*total, sum);
        }
        // zone 4 only appears with a positive volume, zone 3 in both roles
        assert!(pattern.zones().contains(&4));
        assert!(pattern.zones().contains(&3));
        Ok(())
    }

    #[test]
    fn test_malformed_rows_are_skipped() -> Result<(), Box<dyn Error>> {
        let table = "o,d,t_9\n1,2,4\nabc,2,1\n3,4,notanumber\n5,6\n7,8,2\n";
        let pattern = parse_od_table(PatternId::new("base", 1.0, 1), table.as_bytes())?;
        assert_eq!(pattern.skipped_rows, 3);
        assert_abs_diff_eq!(pattern.total_trips(), 6.0);
        Ok(())
    }

    #[test]
    fn test_parse_real_time_trips() -> Result<(), Box<dyn Error>> {
        let table = "idx,origin,destination,hour,origin_h3,dest_h3,\
                     origin_x,origin_y,dest_x,dest_y,timestamp\n\
                     0,3,5,7,8a30,8a31,940100.5,1911000,941000,1912000,2024-10-24 07:00:34\n\
                     1,3,5,7,8a30,8a31,940100.5,1911000,941000,1912000,yesterday\n\
                     2,5,3,17,8a31,8a30,941000,1912000,940100.5,1911000,2024-10-24 17:45:00\n";
        let (trips, skipped) = parse_real_time_trips(table.as_bytes(), &IdentityTransform)?;
        assert_eq!(skipped, 1);
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].origin_zone, 3);
        assert_eq!(trips[0].origin_h3, "8a30");
        assert_eq!(trips[0].origin, Point2d::new(940100.5, 1911000.));
        assert_abs_diff_eq!(trips[0].departure_time_s, (7 * 3600 + 34) as f64);
        assert_eq!(trips[1].idx, 2);
        assert_eq!(trips[1].hour, 17);
        Ok(())
    }

    #[test]
    fn test_load_directories() -> Result<(), Box<dyn Error>> {
        let rules_dir = tempdir()?;
        let rt_dir = tempdir()?;
        let write = |path: std::path::PathBuf, contents: &str| -> Result<(), Box<dyn Error>> {
            let mut file = File::create(path)?;
            file.write_all(contents.as_bytes())?;
            Ok(())
        };
        write(rules_dir.path().join("base.csv"), "o,d,t_8\n1,2,3\n")?;
        write(rules_dir.path().join("S1_trip1.5_rule2.csv"), "o,d,t_7\n2,1,4\n")?;
        write(rules_dir.path().join("not_a_rule_name_rule3.csv"), "o,d,t_7\n2,1,4\n")?;
        write(rt_dir.path().join("S1_real_time.csv"),
              "idx,o,d,hour,oh,dh,ox,oy,dx,dy,time\n\
               0,2,1,7,a,b,940000,1911000,940300,1911300,2024-10-24 07:10:00\n")?;

        let dataset = RulesDataSet::load(rules_dir.path(), rt_dir.path(), &IdentityTransform)?;
        assert_eq!(dataset.num_patterns(), 2);
        assert!(dataset.get_pattern("base", 1.0, 1).is_some());
        assert!(dataset.get_pattern("S1", 1.5, 2).is_some());
        assert!(dataset.get_pattern("S1", 1.0, 2).is_none());
        assert_eq!(dataset.real_time_trips("S1").len(), 1);
        assert!(dataset.real_time_trips("base").is_empty());
        assert_eq!(dataset.trips_by_hour("S1", 7).len(), 1);
        assert!(dataset.trips_by_hour("S1", 8).is_empty());

        let ids: Vec<String> = dataset.patterns().map(|pp| pp.id.to_string()).collect();
        assert_eq!(ids, vec!["S1_trip1.5_rule2", "base_trip1.0_rule1"]);
        Ok(())
    }

    #[test]
    fn test_missing_directories() -> Result<(), Box<dyn Error>> {
        let rules_dir = tempdir()?;
        let missing = rules_dir.path().join("nope");
        assert!(RulesDataSet::load(&missing, rules_dir.path(), &IdentityTransform).is_err());
        let dataset = RulesDataSet::load(rules_dir.path(), &missing, &IdentityTransform)?;
        assert_eq!(dataset.num_patterns(), 0);
        Ok(())
    }
}
