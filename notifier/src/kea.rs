use anyhow::{Context, Result};
use reqwest::{header, Client};
use scraper::{Html, Selector};
use serde::Serialize;
use std::time::Duration;
use url::Url;

pub const KEA_URL: &str = "https://cetonline.karnataka.gov.in/kea/";
pub const DEFAULT_USER_AGENT: &str = "pgcet-notifier/0.1 (+https://cetonline.karnataka.gov.in/kea/)";
pub const LATEST_LIMIT: usize = 5;
pub const HEADLINE_MAX_CHARS: usize = 200;

const LATEST_ROWS: &str = "table#ContentPlaceHolder1_Gridlatestannoc tr";
const LATEST_TABLE: &str = "table#ContentPlaceHolder1_Gridlatestannoc";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub title: String,
    pub link: Option<String>,
}

pub fn parse_latest(html: &str, base: &Url, limit: usize) -> Option<Vec<Announcement>> {
    let doc = Html::parse_document(html);
    let table_sel = Selector::parse(LATEST_TABLE).expect("valid selector");
    let row_sel = Selector::parse(LATEST_ROWS).expect("valid selector");
    let a_sel = Selector::parse("a").expect("valid selector");

    doc.select(&table_sel).next()?;
    let items = doc
        .select(&row_sel)
        .take(limit)
        .filter_map(|row| {
            let a = row.select(&a_sel).next()?;
            let title = collapse(&a.text().collect::<String>());
            if title.is_empty() { return None; }
            let link = a
                .value()
                .attr("href")
                .and_then(|h| Url::parse(h).or_else(|_| base.join(h)).ok())
                .map(|u| u.to_string());
            Some(Announcement { title, link })
        })
        .collect();
    Some(items)
}

pub fn parse_marquee(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("marquee").expect("valid selector");
    let text = collapse(&doc.select(&sel).next()?.text().collect::<String>());
    if text.is_empty() { return None; }
    Some(text.chars().take(HEADLINE_MAX_CHARS).collect())
}

pub fn format_announcements(latest: Option<&[Announcement]>) -> String {
    match latest {
        None => "ℹ️ No recent announcements found.".to_string(),
        Some([]) => "ℹ️ No announcements available.".to_string(),
        Some(items) => items
            .iter()
            .map(|a| format!("🔸 {}", a.title))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn collapse(s: &str) -> String { s.split_whitespace().collect::<Vec<_>>().join(" ") }

#[derive(Clone)]
pub struct KeaClient {
    client: Client,
    url: Url,
}

impl KeaClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid portal url {url}"))?;
        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url { &self.url }

    pub async fn fetch_page(&self) -> Result<String> {
        let resp = self
            .client
            .get(self.url.clone())
            .header(header::ACCEPT, "text/html")
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", self.url))?
            .error_for_status()?;
        Ok(resp.text().await?)
    }

    pub async fn latest(&self, limit: usize) -> Result<Option<Vec<Announcement>>> {
        let html = self.fetch_page().await?;
        let latest = parse_latest(&html, &self.url, limit);
        tracing::debug!(found = latest.as_ref().map(Vec::len), "parsed latest announcements");
        Ok(latest)
    }

    pub async fn headline(&self) -> Result<Option<String>> {
        let html = self.fetch_page().await?;
        Ok(parse_marquee(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <marquee>  PGCET 2025   provisional   results published  </marquee>
          <table id="ContentPlaceHolder1_Gridlatestannoc">
            <tr><th>Latest</th></tr>
            <tr><td><a href="docs/mca_seat_matrix.pdf">MCA seat matrix</a></td></tr>
            <tr><td><a href="https://cetonline.karnataka.gov.in/kea/notice2">Option entry
                extended</a></td></tr>
            <tr><td><a href="/x">Third</a></td></tr>
            <tr><td><a href="/y">Fourth</a></td></tr>
            <tr><td><a href="/z">Fifth</a></td></tr>
          </table>
        </body></html>"#;

    fn base() -> Url { Url::parse(KEA_URL).unwrap() }

    #[test]
    fn reads_first_rows_with_links() {
        let items = parse_latest(PAGE, &base(), LATEST_LIMIT).unwrap();
        // Header row counts toward the limit but has no link.
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].title, "MCA seat matrix");
        assert_eq!(items[0].link.as_deref(), Some("https://cetonline.karnataka.gov.in/kea/docs/mca_seat_matrix.pdf"));
        assert_eq!(items[1].title, "Option entry extended");
    }

    #[test]
    fn missing_grid_is_none() {
        assert_eq!(parse_latest("<html><body><p>down</p></body></html>", &base(), 5), None);
        assert_eq!(format_announcements(None), "ℹ️ No recent announcements found.");
    }

    #[test]
    fn marquee_is_collapsed_and_truncated() {
        assert_eq!(parse_marquee(PAGE).as_deref(), Some("PGCET 2025 provisional results published"));
        let long = format!("<marquee>{}</marquee>", "é".repeat(500));
        assert_eq!(parse_marquee(&long).unwrap().chars().count(), HEADLINE_MAX_CHARS);
        assert_eq!(parse_marquee("<p>none</p>"), None);
    }

    #[test]
    fn formats_bullets() {
        let items = vec![
            Announcement { title: "One".into(), link: None },
            Announcement { title: "Two".into(), link: None },
        ];
        assert_eq!(format_announcements(Some(items.as_slice())), "🔸 One\n\n🔸 Two");
        assert_eq!(format_announcements(Some(&[][..])), "ℹ️ No announcements available.");
    }
}
