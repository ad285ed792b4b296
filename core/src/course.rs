use crate::estimate::{estimate, Estimate};
use crate::table::{build, Observation, RankTable};
use anyhow::{bail, Error};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref MCA_OBSERVATIONS: Vec<Observation> =
        serde_json::from_str(include_str!("../data/mca.json")).expect("bundled MCA dataset is valid JSON");
    static ref MBA_OBSERVATIONS: Vec<Observation> =
        serde_json::from_str(include_str!("../data/mba.json")).expect("bundled MBA dataset is valid JSON");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Course {
    Mca,
    Mba,
}

impl Course {
    pub const ALL: [Course; 2] = [Course::Mca, Course::Mba];

    pub fn code(&self) -> &'static str {
        match self {
            Course::Mca => "MCA",
            Course::Mba => "MBA",
        }
    }

    pub fn total_candidates(&self) -> u32 {
        match self {
            Course::Mca => 18_738,
            Course::Mba => 28_875,
        }
    }

    pub fn observations(&self) -> &'static [Observation] {
        match self {
            Course::Mca => &MCA_OBSERVATIONS,
            Course::Mba => &MBA_OBSERVATIONS,
        }
    }
}

impl fmt::Display for Course {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.code()) }
}

impl FromStr for Course {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MCA" => Ok(Course::Mca),
            "MBA" => Ok(Course::Mba),
            other => bail!("unknown course code `{other}`"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CourseTables {
    tables: HashMap<Course, RankTable>,
}

impl CourseTables {
    pub fn bundled() -> Self {
        let tables = Course::ALL
            .iter()
            .map(|&c| (c, build(c.observations(), c.total_candidates())))
            .collect();
        Self { tables }
    }

    pub fn from_tables(mut tables: HashMap<Course, RankTable>) -> Self {
        for course in Course::ALL {
            tables
                .entry(course)
                .or_insert_with(|| build(course.observations(), course.total_candidates()));
        }
        Self { tables }
    }

    pub fn get(&self, course: Course) -> Option<&RankTable> { self.tables.get(&course) }

    pub fn estimate(&self, course: Course, marks: f64) -> Option<Estimate> {
        self.get(course).map(|t| estimate(t, marks))
    }
}

impl Default for CourseTables {
    fn default() -> Self { Self::bundled() }
}
