//! Value converters from HL7v2 to FHIR
//!
//! Each converter either produces a value or fails naming the raw input.
//! Absent input is handled by the callers, which skip the element.

use crate::hl7::{Cx, Xcn, Xpn};
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{json, Map, Value};

/// Code system for patient class codes
pub const ACT_CODE_SYSTEM: &str = "http://hl7.org/fhir/v3/ActCode";

/// Administrative gender from PID-8
///
/// Only the first letter is significant.
pub fn sex(value: &str) -> Result<&'static str, String> {
    let first = value.trim().chars().next().map(|c| c.to_ascii_lowercase());
    match first {
        Some('m') => Ok("male"),
        Some('f') => Ok("female"),
        Some('o') => Ok("other"),
        Some('u') | Some('n') | Some('i') => Ok("unknown"),
        _ => Err(format!("{value} not recognised as a sex value")),
    }
}

/// Encounter class code from PV1-2
pub fn patient_class(value: &str) -> Result<&'static str, String> {
    match value.trim().to_ascii_uppercase().as_str() {
        "I" | "R" | "B" => Ok("IMP"),
        "O" => Ok("AMB"),
        "E" => Ok("EMER"),
        "P" => Ok("PRENC"),
        _ => Err(format!("{value} not recognised as a patient class")),
    }
}

/// Encounter class as a coding
pub fn patient_class_coding(value: &str) -> Result<Value, String> {
    Ok(json!({
        "system": ACT_CODE_SYSTEM,
        "code": patient_class(value)?,
    }))
}

/// How much of a timestamp was supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

/// A parsed HL7 DTM value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hl7Timestamp {
    /// Local date and time; missing parts are the earliest value
    pub local: NaiveDateTime,
    /// Supplied precision
    pub precision: Precision,
    /// Fractional seconds exactly as supplied
    pub fraction: Option<String>,
    /// UTC offset, if supplied
    pub offset: Option<FixedOffset>,
}

impl Hl7Timestamp {
    /// Parse `YYYY[MM[DD[HH[MM[SS[.S]]]]]][+/-ZZZZ]`
    pub fn parse(value: &str) -> Result<Self, String> {
        let invalid = || format!("{value} is not a valid HL7 timestamp");
        let trimmed = value.trim();

        let (body, offset) = match trimmed.find(['+', '-']) {
            Some(index) => {
                let offset = parse_offset(&trimmed[index..]).ok_or_else(invalid)?;
                (&trimmed[..index], Some(offset))
            }
            None => (trimmed, None),
        };

        let (digits, fraction) = match body.split_once('.') {
            Some((digits, fraction)) => {
                if digits.len() != 14
                    || fraction.is_empty()
                    || !fraction.chars().all(|c| c.is_ascii_digit())
                {
                    return Err(invalid());
                }
                (digits, Some(fraction.to_string()))
            }
            None => (body, None),
        };

        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let precision = match digits.len() {
            4 => Precision::Year,
            6 => Precision::Month,
            8 => Precision::Day,
            10 => Precision::Hour,
            12 => Precision::Minute,
            14 => Precision::Second,
            _ => return Err(invalid()),
        };

        let part = |range: std::ops::Range<usize>, default: u32| -> Option<u32> {
            match digits.get(range) {
                Some(p) => p.parse().ok(),
                None => Some(default),
            }
        };
        let year: i32 = digits[0..4].parse().map_err(|_| invalid())?;
        let date = NaiveDate::from_ymd_opt(
            year,
            part(4..6, 1).ok_or_else(invalid)?,
            part(6..8, 1).ok_or_else(invalid)?,
        )
        .ok_or_else(invalid)?;
        let time = NaiveTime::from_hms_opt(
            part(8..10, 0).ok_or_else(invalid)?,
            part(10..12, 0).ok_or_else(invalid)?,
            part(12..14, 0).ok_or_else(invalid)?,
        )
        .ok_or_else(invalid)?;

        Ok(Self {
            local: NaiveDateTime::new(date, time),
            precision,
            fraction,
            offset,
        })
    }

    /// FHIR `date` rendering at no more than day precision
    pub fn to_fhir_date(&self) -> String {
        match self.precision {
            Precision::Year => self.local.format("%Y").to_string(),
            Precision::Month => self.local.format("%Y-%m").to_string(),
            _ => self.local.format("%Y-%m-%d").to_string(),
        }
    }

    /// FHIR `dateTime` rendering
    ///
    /// Values with a time part are rendered to seconds, followed by the
    /// fraction and offset when supplied.
    pub fn to_fhir_date_time(&self) -> String {
        if self.precision < Precision::Hour {
            return self.to_fhir_date();
        }

        let mut rendered = self.local.format("%Y-%m-%dT%H:%M:%S").to_string();
        if let Some(fraction) = &self.fraction {
            rendered.push('.');
            rendered.push_str(fraction);
        }
        if let Some(offset) = self.offset {
            rendered.push_str(&offset.to_string());
        }
        rendered
    }
}

fn parse_offset(text: &str) -> Option<FixedOffset> {
    let (sign, digits) = text.split_at(1);
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    let seconds = hours * 3600 + minutes * 60;
    match sign {
        "+" => FixedOffset::east_opt(seconds),
        _ => FixedOffset::west_opt(seconds),
    }
}

/// FHIR dateTime from an HL7 timestamp
pub fn date_time(value: &str) -> Result<String, String> {
    Hl7Timestamp::parse(value).map(|t| t.to_fhir_date_time())
}

/// FHIR date from an HL7 timestamp
pub fn date(value: &str) -> Result<String, String> {
    Hl7Timestamp::parse(value).map(|t| t.to_fhir_date())
}

/// HumanName from an XPN value; `None` when the name is empty
pub fn human_name(name: &Xpn, usage: &str) -> Option<Value> {
    if name.is_empty() {
        return None;
    }
    let given: Vec<&str> = [&name.given, &name.middle]
        .into_iter()
        .filter_map(|g| g.as_deref())
        .collect();

    let mut target = Map::new();
    target.insert("use".to_string(), json!(usage));
    insert_opt(&mut target, "family", name.family.as_deref().map(|f| json!([f])));
    if !given.is_empty() {
        target.insert("given".to_string(), json!(given));
    }
    insert_opt(&mut target, "prefix", name.prefix.as_deref().map(|p| json!([p])));
    insert_opt(&mut target, "suffix", name.suffix.as_deref().map(|s| json!([s])));
    Some(Value::Object(target))
}

/// HumanName from the name parts of an XCN value
pub fn practitioner_name(person: &Xcn) -> Value {
    let mut target = Map::new();
    target.insert("use".to_string(), json!("official"));
    insert_opt(&mut target, "family", person.family.as_deref().map(|f| json!([f])));
    insert_opt(&mut target, "given", person.given.as_deref().map(|g| json!([g])));
    insert_opt(&mut target, "prefix", person.prefix.as_deref().map(|p| json!([p])));
    Value::Object(target)
}

/// Identifier from a CX value
///
/// The assigning authority becomes the identifier system, qualified by the
/// type code when both are present.
pub fn identifier(cx: &Cx) -> Value {
    let mut target = Map::new();
    insert_opt(&mut target, "system", identifier_system(cx).map(Value::String));
    target.insert("value".to_string(), json!(cx.id));
    if let Some(type_code) = cx.type_code.as_deref() {
        target.insert("type".to_string(), json!({ "text": type_code }));
    }
    Value::Object(target)
}

fn identifier_system(cx: &Cx) -> Option<String> {
    let slug = |s: &str| s.trim().to_ascii_lowercase().replace(char::is_whitespace, "-");
    match (cx.assigning_authority.as_deref(), cx.type_code.as_deref()) {
        (Some(authority), Some(type_code)) => Some(format!(
            "urn:hl7relay:identifier:{}:{}",
            slug(authority),
            slug(type_code)
        )),
        (Some(authority), None) => Some(format!("urn:hl7relay:identifier:{}", slug(authority))),
        (None, Some(type_code)) => Some(format!("urn:hl7relay:identifier:{}", slug(type_code))),
        (None, None) => None,
    }
}

/// Insert a value only when present
pub fn insert_opt(target: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        target.insert(key.to_string(), value);
    }
}
