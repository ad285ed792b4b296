use crate::course::Course;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref COMMAND_RE: Regex =
        Regex::new(r"^/(?P<name>[A-Za-z_]+)(?:@\S+)?(?:\s+(?P<args>.*))?$").expect("valid regex");
    static ref SPACES_RE: Regex = Regex::new(r"\s+").expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Cutoffs,
    McaCutoff,
    MbaCutoff,
    Syllabus,
    McaSyllabus,
    MbaSyllabus,
    Kea,
    Colleges,
    Predict,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    pub name: String,
    pub course: Course,
    pub marks: f64,
}

/// Why a prediction line was rejected. `Display` is the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    Format,
    MarksNotNumber,
    MarksOutOfRange,
    UnknownCourse(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Format => f.write_str("⚠️ Format error. Use: `Name Course Marks` (e.g. `Arun MCA 54`)"),
            InputError::MarksNotNumber => f.write_str("⚠️ Marks must be a number (e.g. `54`)"),
            InputError::MarksOutOfRange => f.write_str("⚠️ Marks must be zero or more."),
            InputError::UnknownCourse(_) => f.write_str("⚠️ Course must be either `MCA` or `MBA`."),
        }
    }
}

impl std::error::Error for InputError {}

pub fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().trim().to_string()
}

pub fn parse_command(text: &str) -> Option<Command> {
    let text = normalize(text);
    let caps = COMMAND_RE.captures(&text)?;
    let name = caps.name("name")?.as_str().to_lowercase();
    let cmd = match name.as_str() {
        "start" => Command::Start,
        "cutoffs" => Command::Cutoffs,
        "mca_cutoff" => Command::McaCutoff,
        "mba_cutoff" => Command::MbaCutoff,
        "syllabus" => Command::Syllabus,
        "mca_syllabus" => Command::McaSyllabus,
        "mba_syllabus" => Command::MbaSyllabus,
        "kea" => Command::Kea,
        "colleges" => Command::Colleges,
        "predict" => Command::Predict,
        _ => Command::Unknown(name),
    };
    Some(cmd)
}

pub fn parse_prediction(text: &str) -> Result<PredictionRequest, InputError> {
    let text = normalize(text);
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(InputError::Format);
    }
    let (name_parts, tail) = parts.split_at(parts.len() - 2);
    let marks: f64 = tail[1].parse().map_err(|_| InputError::MarksNotNumber)?;
    if !marks.is_finite() {
        return Err(InputError::MarksNotNumber);
    }
    if marks < 0.0 {
        return Err(InputError::MarksOutOfRange);
    }
    let course = tail[0]
        .parse::<Course>()
        .map_err(|_| InputError::UnknownCourse(tail[0].to_uppercase()))?;
    Ok(PredictionRequest { name: name_parts.join(" "), course, marks })
}

pub fn normalize_district(text: &str) -> String {
    SPACES_RE.replace_all(&normalize(text), " ").to_lowercase()
}

pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
