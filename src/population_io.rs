use std::error::Error;
use std::fs;
use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use xml::attribute::OwnedAttribute;
use xml::reader::EventReader;
use xml::reader::XmlEvent;
use xml::writer::EmitterConfig;
use xml::writer::XmlEvent as WriterEvent;

use super::config_utils;
use super::demand::DemandPattern;
use super::geometry::Point2d;
use super::pipeline::BatchSummary;
use super::trip_chain::Activity;
use super::trip_chain::ActivityType;
use super::trip_chain::Leg;
use super::trip_chain::PlanElement;
use super::trip_chain::Population;
use super::trip_chain::TripChainRecord;
use super::trip_chain::DEFAULT_LEG_MODE;
use super::trip_chain::TRAVEL_TIME_S;
use super::PopulationWriter;


/// Where a population was written and how big the file is.
#[derive(PartialEq, Debug, Clone)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub num_persons: usize,
    pub num_bytes: u64,
}

/// One `<person>` being read. Only the first plan of a person is kept.
struct PersonInProgress {
    id: Option<String>,
    elements: Vec<PlanElement>,
    in_plan: bool,
    plan_done: bool,
    error: Option<String>,
}

impl PersonInProgress {
    fn new(attributes: &[OwnedAttribute]) -> PersonInProgress {
        let id = config_utils::get_xml_attribute_value(attributes, "id");
        let error = match id {
            Some(_) => None,
            None => Some(String::from("person has no id")),
        };
        PersonInProgress {
            id,
            elements: vec![],
            in_plan: false,
            plan_done: false,
            error,
        }
    }

    fn reading(&self) -> bool {
        self.in_plan && !self.plan_done && self.error.is_none()
    }

    fn push_activity(&mut self, attributes: &[OwnedAttribute]) {
        match self.parse_activity(attributes) {
            Ok(act) => self.elements.push(PlanElement::Activity(act)),
            Err(err) => self.error = Some(err.to_string()),
        }
    }

    fn parse_activity(&self, attributes: &[OwnedAttribute]) -> Result<Activity, Box<dyn Error>> {
        let type_str = config_utils::required_xml_attribute(attributes, "type", "activity")?;
        let act_type = ActivityType::parse(&type_str)
            .ok_or_else(|| format!("unknown activity type {:?}", type_str))?;
        let xx: f64 = config_utils::required_xml_attribute(attributes, "x", "activity")?.parse()?;
        let yy: f64 = config_utils::required_xml_attribute(attributes, "y", "activity")?.parse()?;

        let end_time_s = match config_utils::get_xml_attribute_value(attributes, "end_time") {
            Some(time_str) => Some(config_utils::get_num_seconds_from_time_str(&time_str)?),
            None => match config_utils::get_xml_attribute_value(attributes, "max_dur") {
                // a duration counts from the arrival at this activity
                Some(dur_str) => {
                    let duration = config_utils::get_num_seconds_from_time_str(&dur_str)?;
                    self.last_end_time().map(|prev| prev + TRAVEL_TIME_S + duration)
                }
                None => None,
            },
        };
        Ok(Activity::new(act_type, Point2d::new(xx, yy), end_time_s))
    }

    fn last_end_time(&self) -> Option<f64> {
        self.elements.iter().rev()
            .find_map(|elem| match elem {
                PlanElement::Activity(act) => Some(act.end_time_s),
                PlanElement::Leg(_) => None,
            })
            .flatten()
    }

    fn push_leg(&mut self, attributes: &[OwnedAttribute]) {
        let mode = config_utils::get_xml_attribute_value(attributes, "mode")
            .unwrap_or_else(|| String::from(DEFAULT_LEG_MODE));
        self.elements.push(PlanElement::Leg(Leg::new(&mode)));
    }

    fn finish(self) -> Result<TripChainRecord, Box<dyn Error>> {
        if let Some(err) = self.error {
            return Err(err.into());
        }
        let id = self.id.ok_or("person has no id")?;
        let person = TripChainRecord::new(&id, self.elements);
        person.validate()
            .map_err(|err| format!("person {}: {}", id, err))?;
        Ok(person)
    }
}

/// Read persons from population XML. Persons that cannot be read or whose plan is not a valid
/// trip chain are logged and skipped; the number skipped is returned with the population.
pub fn parse_population_xml<R: io::Read>(source: R)
                                         -> Result<(Population, usize), Box<dyn Error>> {
    let parser = EventReader::new(source);
    let mut population = vec![];
    let mut skipped = 0;
    let mut person: Option<PersonInProgress> = None;

    for event in parser {
        match event? {
            XmlEvent::StartElement { name, attributes, .. } => {
                match name.local_name.as_str() {
                    "person" => person = Some(PersonInProgress::new(&attributes)),
                    "plan" => {
                        if let Some(pp) = person.as_mut() {
                            pp.in_plan = true;
                        }
                    }
                    "activity" | "act" => {
                        if let Some(pp) = person.as_mut().filter(|pp| pp.reading()) {
                            pp.push_activity(&attributes);
                        }
                    }
                    "leg" => {
                        if let Some(pp) = person.as_mut().filter(|pp| pp.reading()) {
                            pp.push_leg(&attributes);
                        }
                    }
                    _ => (),
                }
            }
            XmlEvent::EndElement { name } => {
                match name.local_name.as_str() {
                    "plan" => {
                        if let Some(pp) = person.as_mut() {
                            pp.plan_done = true;
                        }
                    }
                    "person" => {
                        if let Some(pp) = person.take() {
                            match pp.finish() {
                                Ok(record) => population.push(record),
                                Err(err) => {
                                    log::warn!("skipping person: {}", err);
                                    skipped += 1;
                                }
                            }
                        }
                    }
                    _ => (),
                }
            }
            XmlEvent::EndDocument => break,
            _ => (),
        }
    }

    Ok((population, skipped))
}

pub fn population_from_xml_path(path: &Path) -> Result<Population, Box<dyn Error>> {
    let file = File::open(path)
        .map_err(|err| format!("could not open {}: {}", path.display(), err))?;
    let (population, skipped) = parse_population_xml(io::BufReader::new(file))?;
    log::info!("read {} persons from {} ({} skipped)", population.len(), path.display(),
               skipped);
    Ok(population)
}

/// Write `population` as a population XML document. Coordinates keep full precision; end
/// times are written as `HH:MM:SS` and so are rounded to the nearest second.
pub fn write_population_xml<W: Write>(population: &[TripChainRecord], sink: W)
                                      -> Result<(), Box<dyn Error>> {
    let mut writer = EmitterConfig::new()
        .perform_indent(true)
        .create_writer(sink);

    writer.write(WriterEvent::start_element("population"))?;
    for person in population {
        writer.write(WriterEvent::start_element("person").attr("id", person.get_id()))?;
        writer.write(WriterEvent::start_element("plan").attr("selected", "yes"))?;
        for element in person.elements() {
            match element {
                PlanElement::Activity(act) => {
                    let xx = act.coord.x_coord.to_string();
                    let yy = act.coord.y_coord.to_string();
                    let end_time = act.end_time_s.map(config_utils::time_str_from_num_seconds);
                    let mut start = WriterEvent::start_element("activity")
                        .attr("type", act.act_type.as_str())
                        .attr("x", &xx)
                        .attr("y", &yy);
                    if let Some(end_time) = &end_time {
                        start = start.attr("end_time", end_time);
                    }
                    writer.write(start)?;
                }
                PlanElement::Leg(leg) => {
                    writer.write(WriterEvent::start_element("leg").attr("mode", &leg.mode))?;
                }
            }
            writer.write(WriterEvent::end_element())?;
        }
        // plan, then person
        writer.write(WriterEvent::end_element())?;
        writer.write(WriterEvent::end_element())?;
    }
    writer.write(WriterEvent::end_element())?;
    Ok(())
}

/// Writes each pattern's population to `<output_dir>/<pattern id>_population.xml`.
#[derive(Debug, Clone)]
pub struct XmlPopulationWriter {
    output_dir: PathBuf,
}

impl XmlPopulationWriter {
    pub fn new(output_dir: &Path) -> XmlPopulationWriter {
        XmlPopulationWriter {
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn output_path(&self, pattern: &DemandPattern) -> PathBuf {
        self.output_dir.join(format!("{}_population.xml", pattern.id))
    }
}

impl PopulationWriter for XmlPopulationWriter {
    fn write(&self, population: &[TripChainRecord], pattern: &DemandPattern)
             -> Result<WriteOutcome, Box<dyn Error>> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_path(pattern);
        let file = File::create(&path)
            .map_err(|err| format!("could not create {}: {}", path.display(), err))?;
        let mut sink = BufWriter::new(file);
        write_population_xml(population, &mut sink)?;
        sink.flush()?;

        let num_bytes = fs::metadata(&path)?.len();
        log::debug!("wrote {} persons to {}", population.len(), path.display());
        Ok(WriteOutcome {
            path,
            num_persons: population.len(),
            num_bytes,
        })
    }
}


static REPORT_HEADER: &[&str] = &[
    "pattern_id", "status", "seed", "scaling_method", "original_size", "scaled_size",
    "temporal_method", "temporal_fitness", "spatial_method", "spatial_fitness",
    "perturbation_method", "perturbations", "intensity", "departures_shifted", "output_path",
    "output_bytes", "elapsed_ms", "error",
];

/// One CSV row per pattern of a batch, successes first, then failures with their message.
pub fn write_report_csv<W: Write>(batch: &BatchSummary, sink: W) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(REPORT_HEADER)?;
    for result in &batch.results {
        writer.write_record(&[
            result.pattern_id.to_string(),
            String::from("ok"),
            result.master_seed.to_string(),
            String::from(result.scaling.method.tag()),
            result.scaling.original_size.to_string(),
            result.scaling.scaled_size.to_string(),
            String::from(result.temporal.method),
            format!("{:.4}", result.temporal.temporal_fitness),
            String::from(result.spatial.method),
            format!("{:.4}", result.spatial.spatial_fitness),
            String::from(result.perturbation.method),
            result.perturbation.total_perturbations().to_string(),
            format!("{:.4}", result.perturbation.intensity),
            result.perturbation.departures_shifted.to_string(),
            result.output.path.display().to_string(),
            result.output.num_bytes.to_string(),
            result.elapsed_ms.to_string(),
            String::new(),
        ])?;
    }
    for (id, err) in &batch.failures {
        let mut record = vec![String::new(); REPORT_HEADER.len()];
        record[0] = id.clone();
        record[1] = String::from("failed");
        record[REPORT_HEADER.len() - 1] = err.clone();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_report(path: &Path, batch: &BatchSummary) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)
        .map_err(|err| format!("could not create report {}: {}", path.display(), err))?;
    write_report_csv(batch, BufWriter::new(file))?;
    log::info!("wrote run report to {}", path.display());
    Ok(())
}
