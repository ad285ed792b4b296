pub mod colleges;
pub mod course;
pub mod dialogue;
pub mod estimate;
pub mod input;
pub mod persist;
pub mod registry;
pub mod table;

pub use course::{Course, CourseTables};
pub use estimate::{estimate, Estimate};
pub use table::{build, Marks, Observation, Rank, RankTable};
