use std::error::Error;
use std::path::Path;
use std::path::PathBuf;

use xml::attribute::OwnedAttribute;


pub fn get_xml_attribute_value(attributes: &[OwnedAttribute], attr_name: &str)
                               -> Option<String> {
    attributes.iter()
        .find(|attr| attr.name.local_name == attr_name)
        .map(|attr| attr.value.clone())
}

/// Like `get_xml_attribute_value`, but a missing attribute is an error naming the element.
pub fn required_xml_attribute(attributes: &[OwnedAttribute], attr_name: &str, element: &str)
                              -> Result<String, Box<dyn Error>> {
    get_xml_attribute_value(attributes, attr_name)
        .ok_or_else(|| format!("<{}> has no {} attribute", element, attr_name).into())
}

/// Relative paths are taken relative to `default_base_dir`.
pub fn str_to_absolute_path(path_str: &str, default_base_dir: &Path) -> PathBuf {
    let path = Path::new(path_str);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        default_base_dir.join(path)
    }
}

/// Parse `HH:MM:SS` (hours may run past 24) into seconds since midnight.
pub fn get_num_seconds_from_time_str(timestr: &str) -> Result<f64, Box<dyn Error>> {
    let parts: Vec<&str> = timestr.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(format!("time string {:?} is not HH:MM:SS", timestr).into());
    }
    let hours: u64 = parts[0].parse()?;
    let minutes: u64 = parts[1].parse()?;
    let seconds: f64 = parts[2].parse()?;
    if minutes >= 60 || !(0. ..60.).contains(&seconds) {
        return Err(format!("time string {:?} is out of range", timestr).into());
    }
    let whole_seconds = hours.checked_mul(3600)
        .and_then(|hh| hh.checked_add(minutes * 60))
        .ok_or_else(|| format!("time string {:?} overflows", timestr))?;
    Ok(whole_seconds as f64 + seconds)
}

/// Seconds since midnight as `HH:MM:SS`, rounded to the nearest second.
pub fn time_str_from_num_seconds(seconds: f64) -> String {
    let total = seconds.max(0.).round() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
