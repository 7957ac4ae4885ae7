use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub const ACCOUNTS_RANGE: &str = "Accounts!A:D";
pub const HISTORY_RANGE: &str = "History!A:D";

/// One row of the Accounts worksheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub platform: String,
    pub username: String,
    pub status: String,
    pub niche: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Whole-sheet read / row-append client for the spreadsheet that backs the
/// account panel. Takes a ready bearer token; token acquisition is not this
/// crate's problem.
pub struct SheetsClient {
    client: Client,
    spreadsheet_id: String,
    token: String,
}

impl SheetsClient {
    pub fn new(client: Client, spreadsheet_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
        }
    }

    async fn read_rows(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = format!("{}/{}/values/{}", SHEETS_BASE, self.spreadsheet_id, range);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .context("sheet read request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let snippet = raw.chars().take(400).collect::<String>();
            anyhow::bail!("sheet read HTTP {}: {}", status.as_u16(), snippet);
        }

        let parsed: ValueRange = resp.json().await.context("sheet response parse failed")?;
        Ok(parsed.values)
    }

    async fn append_row(&self, range: &str, row: &[String]) -> Result<()> {
        let url = format!(
            "{}/{}/values/{}:append",
            SHEETS_BASE, self.spreadsheet_id, range
        );
        let body = json!({ "values": [row] });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&body)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .context("sheet append request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let snippet = raw.chars().take(400).collect::<String>();
            anyhow::bail!("sheet append HTTP {}: {}", status.as_u16(), snippet);
        }

        Ok(())
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = self.read_rows(ACCOUNTS_RANGE).await?;
        Ok(rows_to_accounts(&rows))
    }

    pub async fn add_account(&self, account: &Account) -> Result<()> {
        let row = vec![
            account.platform.clone(),
            account.username.clone(),
            account.status.clone(),
            account.niche.clone(),
        ];
        self.append_row(ACCOUNTS_RANGE, &row).await
    }

    pub async fn list_history(&self) -> Result<Vec<Vec<String>>> {
        let mut rows = self.read_rows(HISTORY_RANGE).await?;
        if !rows.is_empty() {
            rows.remove(0);
        }
        Ok(rows)
    }

    pub async fn append_history(&self, row: &[String]) -> Result<()> {
        self.append_row(HISTORY_RANGE, row).await
    }
}

fn cell(row: &[String], idx: usize) -> String {
    row.get(idx).cloned().unwrap_or_default()
}

/// First row is the header; short rows pad out with empty cells.
fn rows_to_accounts(rows: &[Vec<String>]) -> Vec<Account> {
    rows.iter()
        .skip(1)
        .filter(|row| !row.is_empty())
        .map(|row| Account {
            platform: cell(row, 0),
            username: cell(row, 1),
            status: cell(row, 2),
            niche: cell(row, 3),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn header_row_is_skipped() {
        let rows = vec![
            row(&["platform", "username", "status", "niche"]),
            row(&["Instagram", "grindset.daily", "Active", "Motivation (Luxury)"]),
        ];
        let accounts = rows_to_accounts(&rows);
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].platform, "Instagram");
        assert_eq!(accounts[0].niche, "Motivation (Luxury)");
    }

    #[test]
    fn short_rows_pad_with_empty_cells() {
        let rows = vec![
            row(&["platform", "username", "status", "niche"]),
            row(&["TikTok", "stoic.mindset"]),
        ];
        let accounts = rows_to_accounts(&rows);
        assert_eq!(accounts[0].username, "stoic.mindset");
        assert_eq!(accounts[0].status, "");
        assert_eq!(accounts[0].niche, "");
    }

    #[test]
    fn empty_sheet_yields_no_accounts() {
        assert!(rows_to_accounts(&[]).is_empty());
        assert!(rows_to_accounts(&[row(&["platform"])]).is_empty());
    }

    #[test]
    fn value_range_without_values_parses() {
        let parsed: ValueRange =
            serde_json::from_str(r#"{"range":"Accounts!A1:D1","majorDimension":"ROWS"}"#).unwrap();
        assert!(parsed.values.is_empty());

        let parsed: ValueRange = serde_json::from_str(
            r#"{"range":"Accounts!A:D","values":[["platform","username"],["YouTube Shorts","relentless"]]}"#,
        )
        .unwrap();
        assert_eq!(parsed.values.len(), 2);
    }
}
