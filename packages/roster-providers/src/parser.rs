use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

const SYSTEM_PROMPT: &str = "\
You convert a people-search query into structured retrieval constraints. \
Respond with a single JSON object: {\"confidence\": number 0-1, \
\"must\": {\"intents\": [], \"companies\": [], \"teams\": [], \"locations\": [], \
\"domains\": [], \"subdomains\": [], \"date_from\": null, \"date_to\": null, \
\"salary_min\": null, \"salary_max\": null}, \
\"should\": {\"keywords\": [], \"phrases\": []}, \
\"exclude\": {\"companies\": [], \"keywords\": []}, \
\"search_text\": string}. Dates use YYYY, YYYY-MM, or YYYY-MM-DD. \
Only list a field under must when the query states it explicitly.";

/// Parse a free-text query into a raw constraint payload. The caller treats
/// any failure as an unconstrained semantic search.
pub async fn parse_query(cfg: &roster_config::LlmProviderConfig, query: &str) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);

	for _ in 0..2 {
		let body = serde_json::json!({
			"model": cfg.model,
			"temperature": cfg.temperature,
			"messages": [
				{ "role": "system", "content": SYSTEM_PROMPT },
				{ "role": "user", "content": query },
			],
		});
		let res = client
			.post(&url)
			.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;
		if let Ok(parsed) = parse_constraints_json(json) {
			return Ok(parsed);
		}
	}

	Err(eyre::eyre!("Query parser response is not valid JSON."))
}

fn parse_constraints_json(json: Value) -> Result<Value> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		let parsed: Value = serde_json::from_str(content)
			.map_err(|_| eyre::eyre!("Query parser content is not valid JSON."))?;

		return Ok(parsed);
	}

	if json.is_object() {
		return Ok(json);
	}

	Err(eyre::eyre!("Query parser response is missing JSON content."))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_choice_content_json() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "{\"confidence\": 0.8, \"must\": {}}" } }
			]
		});
		let parsed = parse_constraints_json(json).expect("parse failed");
		assert_eq!(parsed.get("confidence").and_then(Value::as_f64), Some(0.8));
	}

	#[test]
	fn rejects_non_json_content() {
		let json = serde_json::json!({
			"choices": [ { "message": { "content": "no structure here" } } ]
		});
		assert!(parse_constraints_json(json).is_err());
	}
}
