use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use pgcet_core::persist::{load_course_tables, load_observations, save_tables, TablePaths};
use pgcet_core::{build, estimate, Course, CourseTables, RankTable};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ranktool")]
#[command(about = "Build rank tables from historical results and query rank estimates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build rank tables from dataset files (JSON array or JSONL of {"m", "r"} observations)
    Build {
        /// Input path: a dataset file, or a directory of `<course>.json` / `<course>.jsonl` files
        #[arg(long)]
        input: String,
        /// Output table directory
        #[arg(long)]
        output: String,
        /// Course for a single input file (defaults to the file stem)
        #[arg(long)]
        course: Option<String>,
        /// Override the total candidate count (single course only)
        #[arg(long)]
        total: Option<u32>,
    },
    /// Estimate the rank for a marks value
    Estimate {
        #[arg(long)]
        course: String,
        #[arg(long)]
        marks: f64,
        /// Table directory; bundled datasets when absent
        #[arg(long)]
        tables: Option<String>,
    },
    /// Print estimated ranks across a marks range as JSON lines
    Curve {
        #[arg(long)]
        course: String,
        #[arg(long, default_value_t = 0.0)]
        from: f64,
        #[arg(long, default_value_t = 100.0)]
        to: f64,
        #[arg(long, default_value_t = 1.0)]
        step: f64,
        #[arg(long)]
        tables: Option<String>,
    },
}

#[derive(Serialize)]
struct CurvePoint {
    marks: f64,
    rank: i64,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, course, total } => build_tables(&input, &output, course.as_deref(), total),
        Commands::Estimate { course, marks, tables } => {
            let course: Course = course.parse()?;
            if !marks.is_finite() || marks < 0.0 {
                return Err(anyhow!("marks must be a non-negative number"));
            }
            let table = course_table(tables.as_deref(), course)?;
            println!("{}", estimate(&table, marks));
            Ok(())
        }
        Commands::Curve { course, from, to, step, tables } => {
            let course: Course = course.parse()?;
            if !(step > 0.0) || !from.is_finite() || !to.is_finite() {
                return Err(anyhow!("need finite bounds and a positive step"));
            }
            let table = course_table(tables.as_deref(), course)?;
            for point in curve(&table, from, to, step) {
                println!("{}", serde_json::to_string(&point)?);
            }
            Ok(())
        }
    }
}

fn course_table(tables: Option<&str>, course: Course) -> Result<RankTable> {
    let tables = match tables {
        Some(dir) => load_course_tables(&TablePaths::new(dir))?,
        None => CourseTables::bundled(),
    };
    tables.get(course).cloned().ok_or_else(|| anyhow!("no table for {course}"))
}

fn curve(table: &RankTable, from: f64, to: f64, step: f64) -> Vec<CurvePoint> {
    let mut out = Vec::new();
    let mut i = 0u64;
    loop {
        let marks = from + step * i as f64;
        if marks > to { break; }
        out.push(CurvePoint { marks, rank: estimate(table, marks) });
        i += 1;
    }
    out
}

fn build_tables(input: &str, output: &str, course: Option<&str>, total: Option<u32>) -> Result<()> {
    let input_path = Path::new(input);
    let out_paths = TablePaths::new(output);

    let mut files: BTreeMap<Course, Vec<PathBuf>> = BTreeMap::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if !p.is_file() { continue; }
            let ext = p.extension().and_then(|s| s.to_str());
            if !matches!(ext, Some("json" | "jsonl")) { continue; }
            match course_from_stem(p) {
                Some(c) => files.entry(c).or_default().push(p.to_path_buf()),
                None => tracing::warn!(path = %p.display(), "skipping file not named after a course"),
            }
        }
    } else if input_path.is_file() {
        let c = match course {
            Some(code) => code.parse::<Course>()?,
            None => course_from_stem(input_path)
                .ok_or_else(|| anyhow!("cannot tell the course of {input}; pass --course"))?,
        };
        files.entry(c).or_default().push(input_path.to_path_buf());
    } else {
        return Err(anyhow!("input {input} does not exist"));
    }
    if files.is_empty() {
        return Err(anyhow!("no dataset files found under {input}"));
    }
    if total.is_some() && files.len() > 1 {
        return Err(anyhow!("--total applies to a single course, found {}", files.len()));
    }

    let mut tables = Vec::with_capacity(files.len());
    for (c, paths) in files {
        let mut observations = Vec::new();
        for p in &paths {
            observations.extend(load_observations(p)?);
        }
        let total = total.unwrap_or_else(|| c.total_candidates());
        let table = build(&observations, total);
        tracing::info!(course = %c, files = paths.len(), observations = observations.len(), distinct_marks = table.len(), total, "built table");
        tables.push((c, table));
    }

    let meta = save_tables(&out_paths, &tables)?;
    tracing::info!(output, tables = meta.tables.len(), "table build complete");
    Ok(())
}

fn course_from_stem(path: &Path) -> Option<Course> {
    path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgcet_core::Observation;

    #[test]
    fn curve_includes_both_ends() {
        let table = build(&[Observation::new(80, 10), Observation::new(60, 50)], 100);
        let points = curve(&table, 60.0, 80.0, 10.0);
        let ranks: Vec<i64> = points.iter().map(|p| p.rank).collect();
        assert_eq!(ranks, vec![50, 30, 10]);
    }

    #[test]
    fn builds_directory_of_datasets() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let data = dir.join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("mca.json"), r#"[{"m": 60, "r": 500}, {"m": 60, "r": 700}]"#).unwrap();
        std::fs::write(data.join("notes.json"), "[]").unwrap();
        let out = dir.join("tables");

        build_tables(data.to_str().unwrap(), out.to_str().unwrap(), None, None).unwrap();
        let table = course_table(out.to_str(), Course::Mca).unwrap();
        assert_eq!(estimate(&table, 60.0), 600);
        assert_eq!(table.total(), 18_738);
    }
}
