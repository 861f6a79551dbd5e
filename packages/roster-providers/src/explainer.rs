use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

const SYSTEM_PROMPT: &str = "\
You write short reasons why each person matches a people-search query, from \
the evidence provided. Respond with a single JSON object: {\"people\": \
[{\"person_id\": string, \"reasons\": [string, ...]}]}. At most 3 reasons per \
person, each a single short sentence grounded in the evidence. Skip a person \
rather than inventing a reason.";

#[derive(Debug, Clone)]
pub struct RefinedReasons {
	pub person_id: String,
	pub reasons: Vec<String>,
}

/// Send the batched per-person evidence and get back refined reasons. Callers
/// validate every reason before accepting it; failure here is always
/// tolerable.
pub async fn refine(
	cfg: &roster_config::LlmProviderConfig,
	query: &str,
	evidence: &Value,
) -> Result<Vec<RefinedReasons>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let user_content = serde_json::json!({ "query": query, "people": evidence });
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": [
			{ "role": "system", "content": SYSTEM_PROMPT },
			{ "role": "user", "content": user_content.to_string() },
		],
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_refine_response(json)
}

fn parse_refine_response(json: Value) -> Result<Vec<RefinedReasons>> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.map(|text| {
			serde_json::from_str::<Value>(text)
				.map_err(|_| eyre::eyre!("Explainer content is not valid JSON."))
		})
		.transpose()?
		.unwrap_or(json);
	let people = content
		.get("people")
		.and_then(|v| v.as_array())
		.ok_or_else(|| eyre::eyre!("Explainer response is missing people array."))?;

	let mut out = Vec::with_capacity(people.len());
	for person in people {
		let Some(person_id) = person.get("person_id").and_then(|v| v.as_str()) else {
			continue;
		};
		let reasons: Vec<String> = person
			.get("reasons")
			.and_then(|v| v.as_array())
			.map(|items| {
				items
					.iter()
					.filter_map(|item| item.as_str())
					.map(str::to_string)
					.collect()
			})
			.unwrap_or_default();

		out.push(RefinedReasons { person_id: person_id.to_string(), reasons });
	}

	Ok(out)
}
