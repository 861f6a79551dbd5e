use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SUBRECORD_KINDS: [&str; 4] = ["metrics", "tools", "achievements", "context"];

/// Normalized shape of a sub-record's stored value blob. Stored payloads are
/// never trusted: anything malformed collapses to the empty value on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubRecordValue {
	pub raw_text: Option<String>,
	pub items: Vec<SubRecordItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubRecordItem {
	pub title: String,
	pub description: String,
}

impl SubRecordValue {
	/// Validate and normalize a stored jsonb blob. Unknown fields drop,
	/// non-object payloads become raw text, blank items are discarded.
	pub fn parse(raw: &Value) -> Self {
		let parsed = match raw {
			Value::Object(_) => {
				serde_json::from_value::<Self>(raw.clone()).unwrap_or_default()
			},
			Value::String(text) => Self { raw_text: Some(text.clone()), items: Vec::new() },
			Value::Array(_) => Self {
				raw_text: None,
				items: serde_json::from_value(raw.clone()).unwrap_or_default(),
			},
			_ => Self::default(),
		};

		parsed.normalized()
	}

	fn normalized(mut self) -> Self {
		self.raw_text = self
			.raw_text
			.map(|text| text.trim().to_string())
			.filter(|text| !text.is_empty());
		self.items.retain(|item| !item.title.trim().is_empty());

		for item in &mut self.items {
			item.title = item.title.trim().to_string();
			item.description = item.description.trim().to_string();
		}

		self
	}

	pub fn is_empty(&self) -> bool {
		self.raw_text.is_none() && self.items.is_empty()
	}

	/// Flattened display lines, item titles first, raw text last.
	pub fn display_lines(&self) -> Vec<String> {
		let mut out = Vec::new();

		for item in &self.items {
			if item.description.is_empty() {
				out.push(item.title.clone());
			} else {
				out.push(format!("{}: {}", item.title, item.description));
			}
		}
		if let Some(text) = self.raw_text.as_deref() {
			out.push(text.to_string());
		}

		out
	}
}

pub fn is_known_kind(kind: &str) -> bool {
	SUBRECORD_KINDS.contains(&kind)
}
