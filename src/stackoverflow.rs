//! Stack Exchange API access.
//!
//! A thin async client over the question-search and answers endpoints,
//! with the JSON handling kept in pure functions so selection rules are
//! testable without a network.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::cache::ResponseCache;

pub const API_BASE_URL: &str = "https://api.stackexchange.com/2.2";

const REQUEST_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("pysage/", env!("CARGO_PKG_VERSION"));

/// A search hit worth fetching answers for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub has_accepted: bool,
}

/// One retrieved answer, body still in rendered HTML.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub id: String,
    pub accepted: bool,
    pub score: i64,
    pub body: String,
    pub author: String,
    pub profile_image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<QuestionItem>,
}

#[derive(Debug, Deserialize)]
struct QuestionItem {
    question_id: u64,
    #[serde(default)]
    is_answered: bool,
    accepted_answer_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AnswersResponse {
    #[serde(default)]
    items: Vec<AnswerItem>,
}

#[derive(Debug, Deserialize)]
struct AnswerItem {
    answer_id: u64,
    #[serde(default)]
    is_accepted: bool,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    body: String,
    owner: Option<Owner>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    display_name: Option<String>,
    profile_image: Option<String>,
}

/// Parse a question-search payload, dropping questions with no answers.
pub fn questions_from_json(body: &str) -> Result<Vec<Question>> {
    let response: SearchResponse =
        serde_json::from_str(body).context("malformed question search response")?;
    Ok(response
        .items
        .into_iter()
        .filter(|item| item.is_answered)
        .map(|item| Question {
            id: item.question_id.to_string(),
            has_accepted: item.accepted_answer_id.is_some(),
        })
        .collect())
}

/// Parse a per-question answers payload and keep the ones worth showing:
/// the top-voted answer plus the accepted one when they differ. The API
/// returns items already sorted by votes.
pub fn answers_from_json(body: &str) -> Result<Vec<Answer>> {
    let response: AnswersResponse =
        serde_json::from_str(body).context("malformed answers response")?;
    Ok(response
        .items
        .into_iter()
        .enumerate()
        .filter(|(i, item)| *i == 0 || item.is_accepted)
        .map(|(_, item)| to_answer(item))
        .collect())
}

fn to_answer(item: AnswerItem) -> Answer {
    let (author, profile_image) = match item.owner {
        Some(owner) => (
            owner.display_name.unwrap_or_else(|| "unknown".to_string()),
            owner.profile_image,
        ),
        None => ("unknown".to_string(), None),
    };
    Answer {
        id: item.answer_id.to_string(),
        accepted: item.is_accepted,
        score: item.score,
        body: item.body,
        author,
        profile_image,
    }
}

/// HTTP client for the Stack Exchange API. Responses go through the
/// on-disk cache so repeated diagnoses of the same error stay off the
/// network.
pub struct StackClient {
    http: reqwest::Client,
    cache: Option<ResponseCache>,
}

impl StackClient {
    pub fn new(use_cache: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            cache: use_cache.then(ResponseCache::new),
        })
    }

    /// Run a search query (a full URL built by the classifier) and return
    /// the answered questions it found.
    pub async fn search_questions(&self, query: &str) -> Result<Vec<Question>> {
        let body = self.get_text(query).await?;
        questions_from_json(&body)
    }

    /// Fetch and select the answers for one question.
    pub async fn fetch_answers(&self, question: &Question) -> Result<Vec<Answer>> {
        let url = format!(
            "{API_BASE_URL}/questions/{}/answers?site=stackoverflow&filter=withbody&order=desc&sort=votes",
            question.id
        );
        let body = self.get_text(&url).await?;
        answers_from_json(&body)
    }

    /// GET through the cache: a fresh entry short-circuits the network and
    /// successful fetches are stored best-effort.
    async fn get_text(&self, url: &str) -> Result<String> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(url) {
                return Ok(hit);
            }
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Stack Exchange API returned {status} for {url}");
        }
        let body = response
            .text()
            .await
            .context("failed to read API response body")?;

        if let Some(cache) = &self.cache {
            cache.put(url, &body);
        }
        Ok(body)
    }
}
