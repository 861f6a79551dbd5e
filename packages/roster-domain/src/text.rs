use std::collections::HashSet;

/// Lowercased alphanumeric tokens, deduplicated, first-seen order.
pub fn tokenize(text: &str, max_terms: usize) -> Vec<String> {
	let mut normalized = String::with_capacity(text.len());

	for ch in text.chars() {
		if ch.is_ascii_alphanumeric() {
			normalized.push(ch.to_ascii_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for token in normalized.split_whitespace() {
		if token.len() < 2 {
			continue;
		}
		if seen.insert(token.to_string()) {
			out.push(token.to_string());
		}
		if out.len() >= max_terms {
			break;
		}
	}

	out
}

/// Count SHOULD matches for one record: keywords against the record's search
/// phrases and text tokens, phrases as whole substrings of the record text.
pub fn count_should_hits(
	keywords: &[String],
	phrases: &[String],
	search_phrases: &[String],
	record_text: &str,
) -> u32 {
	let lowered_text = record_text.to_lowercase();
	let lowered_phrases: Vec<String> =
		search_phrases.iter().map(|phrase| phrase.to_lowercase()).collect();
	let text_tokens: HashSet<String> = tokenize(record_text, 1_024).into_iter().collect();
	let mut hits = 0;

	for keyword in keywords {
		let lowered = keyword.to_lowercase();
		let tokens = tokenize(keyword, 8);
		let token_hit =
			!tokens.is_empty() && tokens.iter().all(|token| text_tokens.contains(token));
		let phrase_hit = !lowered.trim().is_empty()
			&& lowered_phrases.iter().any(|phrase| phrase.contains(&lowered));

		if token_hit || phrase_hit {
			hits += 1;
		}
	}
	for phrase in phrases {
		let lowered = phrase.trim().to_lowercase();

		if lowered.is_empty() {
			continue;
		}
		if lowered_text.contains(&lowered)
			|| lowered_phrases.iter().any(|candidate| candidate.contains(&lowered))
		{
			hits += 1;
		}
	}

	hits
}

/// Case-insensitive containment used for the location-mismatch penalty.
pub fn contains_term(haystack: &str, term: &str) -> bool {
	let term = term.trim();

	if term.is_empty() {
		return false;
	}

	haystack.to_lowercase().contains(&term.to_lowercase())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokenize_dedupes_and_bounds() {
		let tokens = tokenize("Rust, rust! systems; a systems engineer", 3);

		assert_eq!(tokens, vec!["rust".to_string(), "systems".to_string(), "engineer".to_string()]);
	}

	#[test]
	fn should_hits_count_keywords_and_phrases() {
		let keywords = vec!["kubernetes".to_string(), "golang".to_string()];
		let phrases = vec!["ml infra".to_string()];
		let search_phrases = vec!["ML infra at scale".to_string()];
		let hits = count_should_hits(
			&keywords,
			&phrases,
			&search_phrases,
			"Ran Kubernetes clusters for the ML infra platform",
		);

		// kubernetes (text) + "ml infra" (phrase) match; golang does not.
		assert_eq!(hits, 2);
	}

	#[test]
	fn contains_term_is_case_insensitive() {
		assert!(contains_term("Mumbai, India", "mumbai"));
		assert!(!contains_term("Mumbai, India", "berlin"));
		assert!(!contains_term("Mumbai", "  "));
	}
}
