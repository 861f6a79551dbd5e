pub fn render_schema(vector_dim: u32) -> String {
	let init = include_str!("../../../sql/init.sql");
	let expanded = expand_includes(init);

	expanded.replace("<VECTOR_DIM>", &vector_dim.to_string())
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_person_profiles.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_person_profiles.sql")),
				"tables/002_experience_records.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_experience_records.sql")),
				"tables/003_experience_subrecords.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_experience_subrecords.sql")),
				"tables/004_record_embeddings.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_record_embeddings.sql")),
				"tables/005_subrecord_embeddings.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_subrecord_embeddings.sql")),
				"tables/006_credit_ledger.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_credit_ledger.sql")),
				"tables/007_search_requests.sql" =>
					out.push_str(include_str!("../../../sql/tables/007_search_requests.sql")),
				"tables/008_search_results.sql" =>
					out.push_str(include_str!("../../../sql/tables/008_search_results.sql")),
				"tables/009_idempotency_keys.sql" =>
					out.push_str(include_str!("../../../sql/tables/009_idempotency_keys.sql")),
				"tables/010_explanation_outbox.sql" =>
					out.push_str(include_str!("../../../sql/tables/010_explanation_outbox.sql")),
				"tables/011_embedding_outbox.sql" =>
					out.push_str(include_str!("../../../sql/tables/011_embedding_outbox.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
