//! LLM-backed cost estimator.
//!
//! Asks the model for strict JSON, tolerates fenced code blocks, rejects
//! non-positive numbers, and prices each call from its token usage.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{CostEstimator, Priced, ProviderError};
use crate::config::EstimationSettings;
use crate::llm::{ChatMessage, ChatOptions, LlmClient, OpenRouterClient, TokenUsage};
use crate::pricing::{DailyCosts, HotelPercentiles};

const SYSTEM_PROMPT: &str =
    "You are a travel pricing analyst. Answer with a single JSON object and nothing else. \
     All amounts are in US dollars for the current year.";

/// Per-token prices of the estimation model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenPricing {
    pub prompt_usd_per_mtok: f64,
    pub completion_usd_per_mtok: f64,
}

impl TokenPricing {
    pub fn cost_usd(&self, usage: &TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 * self.prompt_usd_per_mtok
            + usage.completion_tokens as f64 * self.completion_usd_per_mtok)
            / 1_000_000.0
    }
}

/// Cost estimator backed by an [`LlmClient`].
pub struct LlmCostEstimator {
    llm: Arc<dyn LlmClient>,
    model: String,
    pricing: TokenPricing,
}

#[derive(Debug, Deserialize)]
struct HotelAnswer {
    p25: f64,
    p50: f64,
    p75: f64,
}

#[derive(Debug, Deserialize)]
struct DailyAnswer {
    food: f64,
    transport: f64,
    misc: f64,
}

impl LlmCostEstimator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, pricing: TokenPricing) -> Self {
        Self {
            llm,
            model: model.into(),
            pricing,
        }
    }

    /// OpenRouter-backed estimator for the configured model.
    pub fn from_settings(settings: &EstimationSettings, api_key: &str) -> Self {
        let client = OpenRouterClient::with_base_url(api_key, &settings.base_url);
        Self::new(
            Arc::new(client),
            &settings.model,
            TokenPricing {
                prompt_usd_per_mtok: settings.prompt_usd_per_mtok,
                completion_usd_per_mtok: settings.completion_usd_per_mtok,
            },
        )
    }

    /// Send one prompt and return the raw JSON text plus the call's cost.
    async fn ask(&self, prompt: String) -> Result<(String, f64), ProviderError> {
        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let options = ChatOptions {
            temperature: Some(0.0),
            max_tokens: Some(200),
            json_response: true,
        };
        let response = self
            .llm
            .chat_completion(&self.model, &messages, options)
            .await?;

        let cost = response
            .usage
            .as_ref()
            .map(|u| self.pricing.cost_usd(u))
            .unwrap_or(0.0);
        let content = response
            .content
            .ok_or_else(|| ProviderError::Parse("empty completion".to_string()))?;
        Ok((content, cost))
    }
}

/// Slice out the outermost JSON object, skipping prose or code fences around it.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_answer<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, ProviderError> {
    let json = extract_json_object(text)
        .ok_or_else(|| ProviderError::Parse(format!("no JSON object in: {}", truncate(text))))?;
    serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))
}

fn truncate(text: &str) -> String {
    if text.chars().count() > 120 {
        format!("{}...", text.chars().take(120).collect::<String>())
    } else {
        text.to_string()
    }
}

#[async_trait]
impl CostEstimator for LlmCostEstimator {
    async fn fetch_hotel_pricing(
        &self,
        city_name: &str,
        country_name: &str,
    ) -> Result<Priced<HotelPercentiles>, ProviderError> {
        let prompt = format!(
            "Estimate the nightly price of a double room in {city_name}, {country_name} \
             across the hotel market. Respond as {{\"p25\": number, \"p50\": number, \"p75\": number}} \
             where p25 is the 25th percentile (budget), p50 the median, and p75 the 75th percentile."
        );
        let (text, cost_usd) = self.ask(prompt).await?;
        let answer: HotelAnswer = parse_answer(&text)?;

        let prices = HotelPercentiles {
            p25: answer.p25,
            p50: answer.p50,
            p75: answer.p75,
        }
        .normalized();
        if !prices.is_valid() {
            return Err(ProviderError::Parse(format!(
                "implausible hotel prices for {city_name}: {prices:?}"
            )));
        }
        Ok(Priced {
            value: prices,
            cost_usd,
        })
    }

    async fn fetch_daily_costs(
        &self,
        city_name: &str,
        country_name: &str,
    ) -> Result<Priced<DailyCosts>, ProviderError> {
        let prompt = format!(
            "Estimate what a mid-range traveller spends per day in {city_name}, {country_name}, \
             excluding lodging. Respond as {{\"food\": number, \"transport\": number, \"misc\": number}}."
        );
        let (text, cost_usd) = self.ask(prompt).await?;
        let answer: DailyAnswer = parse_answer(&text)?;

        let costs = DailyCosts {
            food: answer.food,
            transport: answer.transport,
            misc: answer.misc,
        };
        if !costs.is_valid() {
            return Err(ProviderError::Parse(format!(
                "implausible daily costs for {city_name}: {costs:?}"
            )));
        }
        Ok(Priced {
            value: costs,
            cost_usd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatResponse;
    use std::sync::Mutex;

    /// Replays canned completions in order.
    struct ScriptedLlm {
        replies: Mutex<Vec<anyhow::Result<String>>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<anyhow::Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _options: ChatOptions,
        ) -> anyhow::Result<ChatResponse> {
            let next = self.replies.lock().unwrap().remove(0)?;
            Ok(ChatResponse {
                content: Some(next),
                finish_reason: Some("stop".to_string()),
                usage: Some(TokenUsage::new(1_000, 500)),
                model: None,
            })
        }
    }

    fn estimator(llm: Arc<ScriptedLlm>) -> LlmCostEstimator {
        LlmCostEstimator::new(
            llm,
            "test/model",
            TokenPricing {
                prompt_usd_per_mtok: 1.0,
                completion_usd_per_mtok: 2.0,
            },
        )
    }

    #[tokio::test]
    async fn test_hotel_answer_in_code_fence_is_parsed_and_sorted() {
        let llm = ScriptedLlm::new(vec![Ok(
            "```json\n{\"p25\": 120, \"p50\": 80, \"p75\": 200}\n```".to_string(),
        )]);
        let priced = estimator(llm)
            .fetch_hotel_pricing("Lisbon", "Portugal")
            .await
            .unwrap();
        assert_eq!(priced.value.p25, 80.0);
        assert_eq!(priced.value.p75, 200.0);
        // 1000 * 1.0 + 500 * 2.0 per million tokens
        assert!((priced.cost_usd - 0.002).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_daily_answer_rejects_negative_amounts() {
        let llm = ScriptedLlm::new(vec![Ok(
            r#"{"food": -3, "transport": 10, "misc": 5}"#.to_string(),
        )]);
        let err = estimator(llm)
            .fetch_daily_costs("Hanoi", "Vietnam")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[tokio::test]
    async fn test_llm_failure_surfaces_as_provider_error() {
        let llm = ScriptedLlm::new(vec![Err(anyhow::anyhow!("rate limited"))]);
        let err = estimator(llm)
            .fetch_hotel_pricing("Tokyo", "Japan")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Llm(_)));
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("noise {\"a\":1} tail"), Some("{\"a\":1}"));
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }
}
