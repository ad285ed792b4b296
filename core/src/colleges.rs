use crate::course::Course;
use crate::input::normalize_district;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct CollegeDirectory {
    districts: HashMap<String, HashMap<Course, Vec<String>>>,
    aliases: HashMap<String, String>,
}

impl CollegeDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn bundled() -> Self {
        let mut dir = Self::new();
        dir.insert("mangalore", Course::Mca, &["St Joseph Engineering College", "Sahyadri College", "Canara Engineering College"]);
        dir.insert("mangalore", Course::Mba, &["A J Institute of Management", "St Aloysius Institute of Management & Information Technology"]);
        dir.insert("bangalore", Course::Mca, &["RV College", "MSRIT", "BMSCE"]);
        dir.insert("bangalore", Course::Mba, &["Christ University", "PES University", "Alliance University"]);
        dir.alias("mangaluru", "mangalore");
        dir.alias("bengaluru", "bangalore");
        dir
    }

    pub fn insert(&mut self, district: &str, course: Course, colleges: &[&str]) {
        self.districts
            .entry(normalize_district(district))
            .or_default()
            .entry(course)
            .or_default()
            .extend(colleges.iter().map(|c| c.to_string()));
    }

    pub fn alias(&mut self, alias: &str, district: &str) {
        self.aliases.insert(normalize_district(alias), normalize_district(district));
    }

    pub fn lookup(&self, district: &str, course: Course) -> Option<&[String]> {
        let key = normalize_district(district);
        let key = self.aliases.get(&key).unwrap_or(&key);
        self.districts
            .get(key)
            .and_then(|by_course| by_course.get(&course))
            .map(Vec::as_slice)
            .filter(|c| !c.is_empty())
    }

    pub fn districts(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.districts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case_spacing_and_aliases() {
        let dir = CollegeDirectory::bundled();
        assert_eq!(dir.lookup("  BANGALORE ", Course::Mca).map(|c| c.len()), Some(3));
        assert_eq!(dir.lookup("Bengaluru", Course::Mba).map(|c| c[0].as_str()), Some("Christ University"));
        assert!(dir.lookup("mysore", Course::Mca).is_none());
    }

    #[test]
    fn districts_are_sorted() {
        assert_eq!(CollegeDirectory::bundled().districts(), vec!["bangalore", "mangalore"]);
    }
}
