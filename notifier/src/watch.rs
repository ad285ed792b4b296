use crate::kea::{KeaClient, KEA_URL};
use crate::telegram::TelegramClient;
use anyhow::{Context, Result};
use pgcet_core::registry::Registry;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchState {
    pub fingerprint: String,
    pub text: String,
    pub updated_at: String,
}

impl WatchState {
    pub fn new(text: &str) -> Self {
        Self {
            fingerprint: fingerprint(text),
            text: text.to_string(),
            updated_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    NoHeadline,
    Unchanged,
    Notified { delivered: usize, failed: usize },
}

pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn load_state(path: &Path) -> Result<Option<WatchState>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let state = serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(state))
}

pub fn save_state(path: &Path, state: &WatchState) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    fs::write(path, serde_json::to_string_pretty(state)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn record_if_changed(path: &Path, headline: &str) -> Result<Option<WatchState>> {
    let previous = load_state(path)?;
    let fp = fingerprint(headline);
    if previous.as_ref().is_some_and(|p| p.fingerprint == fp) {
        return Ok(None);
    }
    let state = WatchState::new(headline);
    save_state(path, &state)?;
    Ok(Some(state))
}

pub fn update_message(headline: &str) -> String {
    format!("📢 New KEA Update:\n\n{headline}\n\nVisit: {KEA_URL}")
}

pub struct Watcher {
    kea: KeaClient,
    telegram: TelegramClient,
    registry: Registry,
    state_path: PathBuf,
}

impl Watcher {
    pub fn new(kea: KeaClient, telegram: TelegramClient, registry: Registry, state_path: PathBuf) -> Self {
        Self { kea, telegram, registry, state_path }
    }

    pub async fn check_once(&self) -> Result<CheckOutcome> {
        tracing::info!(url = %self.kea.url(), "checking portal for updates");
        let Some(headline) = self.kea.headline().await? else {
            return Ok(CheckOutcome::NoHeadline);
        };
        let Some(state) = record_if_changed(&self.state_path, &headline)? else {
            tracing::info!("no new updates");
            return Ok(CheckOutcome::Unchanged);
        };
        tracing::info!(fingerprint = %state.fingerprint, "new update found");
        let (delivered, failed) = self.broadcast(&update_message(&state.text)).await?;
        Ok(CheckOutcome::Notified { delivered, failed })
    }

    pub async fn broadcast(&self, text: &str) -> Result<(usize, usize)> {
        let ids = self.registry.user_ids()?;
        let (mut delivered, mut failed) = (0usize, 0usize);
        for id in ids {
            match self.telegram.send_message(id, text, false).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(user_id = id, error = %e, "could not notify user");
                }
            }
        }
        tracing::info!(delivered, failed, "broadcast finished");
        Ok((delivered, failed))
    }

    pub async fn run(&self, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.check_once().await {
                tracing::warn!(error = %e, "update check failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_headline_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/last_kea_update.json");
        let state = record_if_changed(&path, "Results out").unwrap().unwrap();
        assert_eq!(state.text, "Results out");
        assert_eq!(load_state(&path).unwrap(), Some(state));
    }

    #[test]
    fn same_headline_is_not_recorded_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last.json");
        assert!(record_if_changed(&path, "Results out").unwrap().is_some());
        assert!(record_if_changed(&path, "Results out").unwrap().is_none());
        assert!(record_if_changed(&path, "Counselling dates").unwrap().is_some());
        assert_eq!(load_state(&path).unwrap().unwrap().text, "Counselling dates");
    }

    #[test]
    fn missing_state_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_state(&dir.path().join("nope.json")).unwrap(), None);
    }

    #[test]
    fn unwritable_state_dir_reports_the_cause() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let err = save_state(&blocker.join("last.json"), &WatchState::new("x")).unwrap_err();
        assert!(err.to_string().starts_with("failed to create"), "{err}");
    }

    #[test]
    fn fingerprint_ignores_surrounding_whitespace() {
        assert_eq!(fingerprint(" a b "), fingerprint("a b"));
        assert_eq!(fingerprint("abc").len(), 40);
    }

    #[test]
    fn message_links_portal() {
        let msg = update_message("Seat matrix");
        assert!(msg.starts_with("📢 New KEA Update:\n\nSeat matrix"));
        assert!(msg.ends_with(KEA_URL));
    }
}
