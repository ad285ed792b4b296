use crate::course::Course;
use crate::estimate::Estimate;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use time::format_description::well_known::Rfc3339;

pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub name: String,
    pub registered_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub input_name: String,
    pub course: Course,
    pub marks: f64,
    pub rank: Estimate,
    pub recorded_at: String,
}

/// sled holds an exclusive lock on its directory, so one process owns a registry at a time.
#[derive(Clone)]
pub struct Registry {
    db: sled::Db,
    users: sled::Tree,
    predictions: sled::Tree,
}

impl Registry {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).with_context(|| format!("failed to open registry at {}", path.display()))?;
        Self::from_db(db)
    }

    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let users = db.open_tree("users")?;
        let predictions = db.open_tree("predictions")?;
        Ok(Self { db, users, predictions })
    }

    pub fn register_user(&self, user_id: UserId, name: &str) -> Result<bool> {
        let record = UserRecord { user_id, name: name.to_string(), registered_at: now() };
        let bytes = bincode::serialize(&record)?;
        let swapped = self
            .users
            .compare_and_swap(key(user_id), None as Option<&[u8]>, Some(bytes))?;
        let inserted = swapped.is_ok();
        if inserted {
            tracing::info!(user_id, "registered user");
        }
        Ok(inserted)
    }

    pub fn user(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        match self.users.get(key(user_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn users(&self) -> Result<Vec<UserRecord>> {
        self.users
            .iter()
            .values()
            .map(|v| -> Result<UserRecord> { Ok(bincode::deserialize(&v?)?) })
            .collect()
    }

    pub fn user_ids(&self) -> Result<Vec<UserId>> {
        self.users
            .iter()
            .keys()
            .map(|k| -> Result<UserId> {
                let k = k?;
                let bytes: [u8; 8] = k.as_ref().try_into().context("malformed user key")?;
                Ok(UserId::from_be_bytes(bytes))
            })
            .collect()
    }

    pub fn record_prediction(&self, record: &PredictionRecord) -> Result<()> {
        let bytes = bincode::serialize(record)?;
        self.predictions.insert(key(record.user_id), bytes)?;
        tracing::debug!(user_id = record.user_id, course = %record.course, marks = record.marks, rank = record.rank, "recorded prediction");
        Ok(())
    }

    pub fn prediction(&self, user_id: UserId) -> Result<Option<PredictionRecord>> {
        match self.predictions.get(key(user_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn predictions(&self) -> Result<Vec<PredictionRecord>> {
        self.predictions
            .iter()
            .values()
            .map(|v| -> Result<PredictionRecord> { Ok(bincode::deserialize(&v?)?) })
            .collect()
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn key(user_id: UserId) -> [u8; 8] { user_id.to_be_bytes() }

pub(crate) fn now() -> String {
    time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}
