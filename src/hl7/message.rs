//! ER7 message tokenizer
//!
//! Splits an HL7v2 message into segments, fields, repetitions and components.
//! Field numbering follows the standard: `PID-3` is `segment.field(3)`, and for MSH
//! the field separator itself is `MSH-1`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while tokenizing a message
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Hl7Error {
    /// The payload contains no segments at all
    #[error("Message is empty")]
    Empty,

    /// The first segment is not a usable MSH
    #[error("Invalid MSH segment: {0}")]
    InvalidHeader(String),

    /// A segment identifier is not three alphanumeric characters
    #[error("Invalid segment '{0}'")]
    InvalidSegment(String),
}

/// Delimiters declared in MSH-1 and MSH-2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

/// Message structure and trigger event from MSH-9
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageType {
    /// Message code, e.g. `ADT`
    pub code: String,

    /// Trigger event, e.g. `A01`
    pub trigger: String,
}

impl MessageType {
    /// Merge events carry an MRG segment and no PD1
    pub fn is_merge(&self) -> bool {
        matches!(self.trigger.as_str(), "A34" | "A35" | "A44")
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}^{}", self.code, self.trigger)
    }
}

/// A tokenized HL7v2 message
#[derive(Debug, Clone)]
pub struct Hl7Message {
    delimiters: Delimiters,
    segments: Vec<Segment>,
}

impl Hl7Message {
    /// Tokenizes an ER7 encoded message
    ///
    /// Segments may be separated by CR, LF or CRLF; blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is empty, does not start with a valid MSH
    /// segment, or contains a malformed segment identifier.
    pub fn parse(text: &str) -> Result<Self, Hl7Error> {
        let mut lines = text
            .split(['\r', '\n'])
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty());

        let header = lines.next().ok_or(Hl7Error::Empty)?;
        let delimiters = read_delimiters(header)?;

        let mut segments = vec![Segment::parse_header(header, delimiters)];
        for line in lines {
            segments.push(Segment::parse(line, delimiters)?);
        }

        Ok(Self {
            delimiters,
            segments,
        })
    }

    /// Delimiters declared by this message
    pub fn delimiters(&self) -> Delimiters {
        self.delimiters
    }

    /// The MSH segment
    pub fn header(&self) -> &Segment {
        // parse() always places MSH first
        &self.segments[0]
    }

    /// All segments in message order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// First segment with the given identifier
    pub fn segment(&self, id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    /// Number of segments with the given identifier
    pub fn count(&self, id: &str) -> usize {
        self.segments.iter().filter(|s| s.id == id).count()
    }

    /// MSH-9 message type, if populated
    pub fn message_type(&self) -> Option<MessageType> {
        let value = self.header().value(9)?;
        Some(MessageType {
            code: value.component(1)?,
            trigger: value.component(2).unwrap_or_default(),
        })
    }

    /// MSH-10 message control id
    pub fn control_id(&self) -> Option<String> {
        self.header().text(10)
    }
}

/// One segment of a message
#[derive(Debug, Clone)]
pub struct Segment {
    id: String,
    fields: Vec<String>,
    delimiters: Delimiters,
}

impl Segment {
    fn parse_header(line: &str, delimiters: Delimiters) -> Self {
        let mut parts = line.split(delimiters.field);
        let id = parts.next().unwrap_or("MSH").to_string();
        let mut fields = vec![id.clone(), delimiters.field.to_string()];
        fields.extend(parts.map(str::to_string));
        Self {
            id,
            fields,
            delimiters,
        }
    }

    fn parse(line: &str, delimiters: Delimiters) -> Result<Self, Hl7Error> {
        let fields: Vec<String> = line.split(delimiters.field).map(str::to_string).collect();
        let id = fields.first().cloned().unwrap_or_default();
        if id.len() != 3 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Hl7Error::InvalidSegment(line.chars().take(20).collect()));
        }
        Ok(Self {
            id,
            fields,
            delimiters,
        })
    }

    /// Segment identifier, e.g. `PID`
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw (still escaped) content of a field
    pub fn raw(&self, field: usize) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|f| !f.is_empty())
    }

    /// Non-empty repetitions of a field
    pub fn repetitions(&self, field: usize) -> Vec<FieldValue<'_>> {
        self.raw(field)
            .map(|raw| {
                raw.split(self.delimiters.repetition)
                    .filter(|r| !r.trim().is_empty())
                    .map(|r| FieldValue {
                        raw: r,
                        delimiters: self.delimiters,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First non-empty repetition of a field
    pub fn value(&self, field: usize) -> Option<FieldValue<'_>> {
        self.repetitions(field).into_iter().next()
    }

    /// First component of the first repetition, unescaped
    pub fn text(&self, field: usize) -> Option<String> {
        self.value(field).and_then(|v| v.component(1))
    }
}

/// One repetition of a field
#[derive(Debug, Clone, Copy)]
pub struct FieldValue<'a> {
    raw: &'a str,
    delimiters: Delimiters,
}

impl<'a> FieldValue<'a> {
    /// Raw (still escaped) repetition text
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    /// 1-based component, first subcomponent only, unescaped and trimmed
    pub fn component(&self, index: usize) -> Option<String> {
        self.subcomponent(index, 1)
    }

    /// 1-based component and subcomponent, unescaped and trimmed
    pub fn subcomponent(&self, index: usize, sub: usize) -> Option<String> {
        let component = self
            .raw
            .split(self.delimiters.component)
            .nth(index.checked_sub(1)?)?;
        let value = component
            .split(self.delimiters.subcomponent)
            .nth(sub.checked_sub(1)?)?;
        let value = unescape(value, self.delimiters);
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

fn read_delimiters(header: &str) -> Result<Delimiters, Hl7Error> {
    if !header.starts_with("MSH") {
        return Err(Hl7Error::InvalidHeader(
            "message must start with an MSH segment".to_string(),
        ));
    }

    let mut chars = header.chars().skip(3);
    let field = chars
        .next()
        .ok_or_else(|| Hl7Error::InvalidHeader("missing field separator".to_string()))?;
    let encoding: Vec<char> = chars.take_while(|c| *c != field).collect();
    if encoding.len() < 3 {
        return Err(Hl7Error::InvalidHeader(format!(
            "expected at least 3 encoding characters, found {}",
            encoding.len()
        )));
    }

    let defaults = Delimiters::default();
    Ok(Delimiters {
        field,
        component: encoding[0],
        repetition: encoding[1],
        escape: encoding[2],
        subcomponent: encoding.get(3).copied().unwrap_or(defaults.subcomponent),
    })
}

/// Decodes HL7 escape sequences (`\F\`, `\S\`, `\T\`, `\R\`, `\E\`, `\.br\`)
///
/// Unknown sequences are kept verbatim.
fn unescape(value: &str, delimiters: Delimiters) -> String {
    if !value.contains(delimiters.escape) {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find(delimiters.escape) {
        out.push_str(&rest[..start]);
        let after = &rest[start + delimiters.escape.len_utf8()..];
        match after.find(delimiters.escape) {
            Some(end) => {
                let sequence = &after[..end];
                match sequence {
                    "F" => out.push(delimiters.field),
                    "S" => out.push(delimiters.component),
                    "T" => out.push(delimiters.subcomponent),
                    "R" => out.push(delimiters.repetition),
                    "E" => out.push(delimiters.escape),
                    ".br" => out.push('\n'),
                    other => {
                        out.push(delimiters.escape);
                        out.push_str(other);
                        out.push(delimiters.escape);
                    }
                }
                rest = &after[end + delimiters.escape.len_utf8()..];
            }
            None => {
                out.push(delimiters.escape);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
