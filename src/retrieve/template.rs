//! Date templates in data paths, URLs and file names.
//!
//! Templates use `{name}` or `{name:spec}` fields, where `spec` is an
//! integer format such as `03d`. `{{` and `}}` produce literal braces.

use crate::error::RetrievalError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Names accepted inside template fields.
pub const TEMPLATE_KEYS: [&str; 12] = [
    "bin6",
    "fcst_hr",
    "dd",
    "hh",
    "hh_even",
    "jjj",
    "mm",
    "yy",
    "yyyy",
    "yyyymm",
    "yyyymmdd",
    "yyyymmddhh",
];

/// Parse a cycle given as `YYYYMMDDHH`.
pub fn parse_cycle(s: &str) -> Result<NaiveDateTime, String> {
    if s.len() != 10 || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("'{}' is not a YYYYMMDDHH date", s));
    }
    let date = NaiveDate::parse_from_str(&s[..8], "%Y%m%d").map_err(|e| format!("'{}': {}", s, e))?;
    let hour: u32 = s[8..].parse().map_err(|_| format!("'{}' has an invalid hour", s))?;
    date.and_hms_opt(hour, 0, 0)
        .ok_or_else(|| format!("'{}' has an invalid hour", s))
}

enum Field {
    Text(String),
    Int(i64),
}

fn field_value(name: &str, cycle: &NaiveDateTime, fcst_hr: i64) -> Option<Field> {
    let hour = cycle.hour();
    let text = |s: String| Some(Field::Text(s));
    match name {
        "bin6" => {
            let low = hour / 6 * 6;
            text(format!("{:02}-{:02}", low, low + 5))
        }
        "fcst_hr" => Some(Field::Int(fcst_hr)),
        "dd" => text(format!("{:02}", cycle.day())),
        "hh" => text(format!("{:02}", hour)),
        "hh_even" => text(format!("{:02}", hour / 2 * 2)),
        "jjj" => text(format!("{:03}", cycle.ordinal())),
        "mm" => text(format!("{:02}", cycle.month())),
        "yy" => text(cycle.format("%y").to_string()),
        "yyyy" => text(cycle.format("%Y").to_string()),
        "yyyymm" => text(cycle.format("%Y%m").to_string()),
        "yyyymmdd" => text(cycle.format("%Y%m%d").to_string()),
        "yyyymmddhh" => text(cycle.format("%Y%m%d%H").to_string()),
        _ => None,
    }
}

/// Apply an integer spec like `03d`, `2d` or `d`.
fn format_int(value: i64, spec: &str) -> Option<String> {
    let digits = spec.strip_suffix('d')?;
    if digits.is_empty() {
        return Some(value.to_string());
    }
    let (zero, width) = match digits.strip_prefix('0') {
        Some(rest) => (true, rest),
        None => (false, digits),
    };
    let width: usize = width.parse().ok()?;
    Some(if zero {
        if value < 0 {
            format!("-{:0width$}", -value, width = width.saturating_sub(1))
        } else {
            format!("{:0width$}", value, width = width)
        }
    } else {
        format!("{:>width$}", value, width = width)
    })
}

/// Fill date and forecast-hour fields in `template`.
pub fn fill_template(template: &str, cycle: &NaiveDateTime, fcst_hr: i64) -> Result<String, RetrievalError> {
    let err = |reason: String| RetrievalError::Template {
        template: template.to_string(),
        reason,
    };
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    return Err(err("unterminated field".to_string()));
                }
                let (name, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name, Some(spec)),
                    None => (field.as_str(), None),
                };
                let value = field_value(name, cycle, fcst_hr).ok_or_else(|| err(format!("unknown field '{}'", name)))?;
                let rendered = match (value, spec) {
                    (Field::Text(s), None) => s,
                    (Field::Int(n), None) => n.to_string(),
                    (Field::Int(n), Some(spec)) => {
                        format_int(n, spec).ok_or_else(|| err(format!("unsupported format '{}'", spec)))?
                    }
                    (Field::Text(_), Some(spec)) => {
                        return Err(err(format!("format '{}' needs an integer field, not '{}'", spec, name)));
                    }
                };
                out.push_str(&rendered);
            }
            '}' => return Err(err("single '}' encountered".to_string())),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Expand a forecast-hour argument list.
///
/// One value is a single hour, two or three are an inclusive
/// `start stop [step]` range, and longer lists are used as given.
pub fn fhr_list(args: &[i64]) -> Result<Vec<i64>, RetrievalError> {
    match args {
        [] => Err(RetrievalError::InvalidHours("at least one forecast hour is required".to_string())),
        [start, stop] => Ok((*start..=*stop).collect()),
        [start, stop, step] => {
            if *step <= 0 {
                return Err(RetrievalError::InvalidHours(format!("increment must be positive, got {}", step)));
            }
            Ok((*start..=*stop).step_by(*step as usize).collect())
        }
        _ => Ok(args.to_vec()),
    }
}

/// Join path or URL pieces the way a POSIX path join does: an absolute
/// piece replaces what came before.
pub fn join_location(base: &str, name: &str) -> String {
    if base.is_empty() || name.starts_with('/') {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle() -> NaiveDateTime {
        parse_cycle("2022062713").unwrap()
    }

    #[test]
    fn test_parse_cycle() {
        assert_eq!(cycle().format("%Y-%m-%d %H").to_string(), "2022-06-27 13");
        assert!(parse_cycle("20220627").is_err());
        assert!(parse_cycle("2022062725").is_err());
    }

    #[test]
    fn test_fill_template_fields() {
        let c = cycle();
        assert_eq!(fill_template("{bin6}", &c, 0).unwrap(), "12-17");
        assert_eq!(fill_template("{hh_even}", &c, 0).unwrap(), "12");
        assert_eq!(fill_template("{jjj}", &c, 0).unwrap(), "178");
        assert_eq!(fill_template("{yy}{mm}{dd}{hh}", &c, 0).unwrap(), "22062713");
        assert_eq!(
            fill_template("/data/{yyyymmdd}/gfs.t{hh}z.pgrb2.0p25.f{fcst_hr:03d}", &c, 6).unwrap(),
            "/data/20220627/gfs.t13z.pgrb2.0p25.f006"
        );
        assert_eq!(fill_template("{yyyymmddhh}_{fcst_hr}", &c, 12).unwrap(), "2022062713_12");
        assert_eq!(fill_template("{{literal}}", &c, 0).unwrap(), "{literal}");
    }

    #[test]
    fn test_fill_template_errors() {
        let c = cycle();
        assert!(matches!(fill_template("{nope}", &c, 0), Err(RetrievalError::Template { .. })));
        assert!(fill_template("{hh", &c, 0).is_err());
        assert!(fill_template("{hh:03d}", &c, 0).is_err());
    }

    #[test]
    fn test_fhr_list() {
        assert_eq!(fhr_list(&[6]).unwrap(), vec![6]);
        assert_eq!(fhr_list(&[0, 3]).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(fhr_list(&[0, 12, 6]).unwrap(), vec![0, 6, 12]);
        assert_eq!(fhr_list(&[0, 3, 9, 24]).unwrap(), vec![0, 3, 9, 24]);
        assert!(fhr_list(&[]).is_err());
        assert!(fhr_list(&[0, 6, 0]).is_err());
    }

    #[test]
    fn test_join_location() {
        assert_eq!(join_location("https://host/path", "f.grib2"), "https://host/path/f.grib2");
        assert_eq!(join_location("/base/", "f"), "/base/f");
        assert_eq!(join_location("", "f"), "f");
        assert_eq!(join_location("/base", "/abs/f"), "/abs/f");
    }
}
