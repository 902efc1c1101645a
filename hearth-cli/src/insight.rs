use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use hearth_core::Roster;
use hearth_reports::Report;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("insight endpoint is not configured (set insight.endpoint)")]
    NotConfigured,
    #[error("environment variable {0} holding the insight API key is not set")]
    MissingApiKey(String),
    #[error("insight request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("insight service responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse insight response: {0}")]
    Parse(String),
    #[error("insight service returned no text")]
    EmptyResponse,
}

/// Opaque text-generation service used for spending insights.
#[async_trait]
pub trait InsightClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, InsightError>;
}

/// Single request/response client for a `generateContent` style endpoint.
pub struct HttpInsightClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl HttpInsightClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InsightError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/models/{}:generateContent", self.model)
    }
}

#[async_trait]
impl InsightClient for HttpInsightClient {
    async fn generate(&self, prompt: &str) -> Result<String, InsightError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = %status, bytes = body.len(), "insight response received");
        if !status.is_success() {
            return Err(InsightError::Status {
                status: status.as_u16(),
                body: truncate(&body, 256).to_string(),
            });
        }
        extract_text(&body)
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

fn extract_text(body: &str) -> Result<String, InsightError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|err| InsightError::Parse(format!("{err} (body snippet: {})", truncate(body, 256))))?;
    let text: String = response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(InsightError::EmptyResponse);
    }
    Ok(text)
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Summarise a report into a prompt asking for household spending advice.
pub fn build_prompt(report: &Report, roster: &Roster, question: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are helping a shared household review its expenses. \
         Amounts are in the household's single currency.\n\n",
    );
    let _ = writeln!(prompt, "Total spent: {:.2}", report.total_spent);
    let _ = writeln!(prompt, "Total contributions: {:.2}", report.total_contributions);
    prompt.push_str("\nSpend by category:\n");
    for category in &report.categories {
        let _ = writeln!(
            prompt,
            "- {}: {:.2} across {} expenses",
            category.category, category.total, category.expense_count
        );
    }
    prompt.push_str("\nMonthly totals:\n");
    for month in &report.monthly {
        let top = month
            .top_spender
            .as_ref()
            .map(|id| roster.display_name(id))
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(
            prompt,
            "- {}: {:.2} (top spender {})",
            month.label(),
            month.total,
            top
        );
    }
    prompt.push_str("\nMember balances:\n");
    for row in &report.balances {
        let _ = writeln!(prompt, "- {}: {:.2}", row.name, row.current_balance);
    }
    prompt.push('\n');
    prompt.push_str(question.unwrap_or(
        "Point out notable spending patterns and suggest two or three practical ways to \
         keep balances even.",
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hearth_core::{Category, Expense, ExpenseId};
    use hearth_reports::ReportRange;
    use rust_decimal_macros::dec;

    #[test]
    fn extracts_concatenated_candidate_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Spend "},{"text":"less."}]}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "Spend less.");
    }

    #[test]
    fn empty_or_malformed_responses_are_errors() {
        assert!(matches!(
            extract_text(r#"{"candidates":[]}"#),
            Err(InsightError::EmptyResponse)
        ));
        assert!(matches!(extract_text("not json"), Err(InsightError::Parse(_))));
    }

    #[test]
    fn prompt_mentions_totals_and_question() {
        let roster = Roster::household_default();
        let expense = Expense {
            id: ExpenseId::generate(),
            item_name: "Rice".into(),
            category: Category::Food,
            cost: dec!(42.5),
            date: NaiveDate::from_ymd_opt(2024, 2, 3).unwrap(),
            buyer: "karthik".into(),
            shared_with: vec!["karthik".into()],
            split_amount: Some(dec!(42.5)),
            is_gym_expense: false,
        };
        let report = Report::generate(&roster, ReportRange::all_time(), &[expense], &[], Vec::new());
        let prompt = build_prompt(&report, &roster, Some("Where can we save?"));
        assert!(prompt.contains("Total spent: 42.50"));
        assert!(prompt.contains("February 2024: 42.50 (top spender Karthik)"));
        assert!(prompt.ends_with("Where can we save?"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
