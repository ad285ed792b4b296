use crate::course::{Course, CourseTables};
use crate::registry::now;
use crate::table::{Observation, RankTable};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub course: Course,
    pub total: u32,
    pub distinct_marks: usize,
    pub observations: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub tables: Vec<TableMeta>,
    pub created_at: String,
    pub version: u32,
}

pub struct TablePaths {
    pub root: PathBuf,
}

impl TablePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn table(&self, course: Course) -> PathBuf { self.root.join(format!("{}.table.bin", course.code().to_lowercase())) }
    fn meta(&self) -> PathBuf { self.root.join("tables.json") }
}

pub fn load_observations<P: AsRef<Path>>(path: P) -> Result<Vec<Observation>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut out = Vec::new();
        for (n, line) in BufReader::new(f).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            let obs: Observation = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: invalid observation", path.display(), n + 1))?;
            out.push(obs);
        }
        return Ok(out);
    }
    let json: serde_json::Value = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("failed to parse {}", path.display()))?;
    match json {
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(anyhow::Error::from))
            .collect(),
        serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(json)?]),
        _ => Err(anyhow!("{}: expected an array or object of observations", path.display())),
    }
}

pub fn save_table(paths: &TablePaths, course: Course, table: &RankTable) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.table(course))?;
    let bytes = bincode::serialize(table)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_table(paths: &TablePaths, course: Course) -> Result<RankTable> {
    let file = paths.table(course);
    let mut f = File::open(&file).with_context(|| format!("failed to open {}", file.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let table = bincode::deserialize(&buf)?;
    Ok(table)
}

pub fn save_meta(paths: &TablePaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &TablePaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

pub fn save_tables(paths: &TablePaths, tables: &[(Course, RankTable)]) -> Result<MetaFile> {
    let mut metas = Vec::with_capacity(tables.len());
    for (course, table) in tables {
        save_table(paths, *course, table)?;
        metas.push(TableMeta {
            course: *course,
            total: table.total(),
            distinct_marks: table.len(),
            observations: table.observation_count(),
        });
    }
    let meta = MetaFile { tables: metas, created_at: now(), version: FORMAT_VERSION };
    save_meta(paths, &meta)?;
    Ok(meta)
}

pub fn load_course_tables(paths: &TablePaths) -> Result<CourseTables> {
    let meta = load_meta(paths)?;
    if meta.version != FORMAT_VERSION {
        return Err(anyhow!("unsupported table format version {}", meta.version));
    }
    let mut tables = HashMap::new();
    for entry in &meta.tables {
        tables.insert(entry.course, load_table(paths, entry.course)?);
    }
    tracing::info!(loaded = tables.len(), root = %paths.root.display(), "loaded rank tables");
    Ok(CourseTables::from_tables(tables))
}
