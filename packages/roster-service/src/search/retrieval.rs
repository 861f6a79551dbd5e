use std::collections::HashSet;

use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::ServiceResult;
use roster_domain::{
	constraints::{DateWindow, QueryConstraints},
	fallback::FallbackTier,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ParentHit {
	pub record_id: Uuid,
	pub person_id: Uuid,
	pub similarity: f32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ChildHit {
	pub subrecord_id: Uuid,
	pub record_id: Uuid,
	pub person_id: Uuid,
	pub similarity: f32,
}

#[derive(Debug, Default)]
pub(crate) struct TierCandidates {
	pub parents: Vec<ParentHit>,
	pub child_best: Vec<ChildHit>,
	pub child_evidence: Vec<ChildHit>,
}
impl TierCandidates {
	/// Distinct persons found via parents plus per-person child aggregates.
	pub fn distinct_persons(&self) -> HashSet<Uuid> {
		self.parents
			.iter()
			.map(|hit| hit.person_id)
			.chain(self.child_best.iter().map(|hit| hit.person_id))
			.collect()
	}
}

pub(crate) struct RetrievalArgs<'a> {
	pub pool: &'a PgPool,
	pub constraints: &'a QueryConstraints,
	pub open_to_work_only: bool,
	pub query_vec_text: &'a str,
	pub embedding_version: &'a str,
	pub candidate_k: i64,
	pub child_evidence_k: i64,
	pub min_distinct_persons: usize,
}

/// Run candidate retrieval at successively looser tiers until enough distinct
/// persons are found. Always terminates at the terminal tier regardless of
/// result count; the tier actually used is returned for penalty decisions.
pub(crate) async fn retrieve_with_fallback(
	args: &RetrievalArgs<'_>,
) -> ServiceResult<(FallbackTier, TierCandidates)> {
	let mut tier = FallbackTier::Strict;

	loop {
		let candidates = retrieve_at_tier(args, tier).await?;
		let found = candidates.distinct_persons().len();

		if found >= args.min_distinct_persons {
			return Ok((tier, candidates));
		}

		let Some(next) = tier.next() else {
			return Ok((tier, candidates));
		};

		tracing::debug!(
			tier = tier.as_i32(),
			found,
			needed = args.min_distinct_persons,
			"Candidate tier starved; relaxing filters."
		);

		tier = next;
	}
}

async fn retrieve_at_tier(
	args: &RetrievalArgs<'_>,
	tier: FallbackTier,
) -> ServiceResult<TierCandidates> {
	let parents = parent_candidates(args, tier).await?;
	let child_best = child_best_per_person(args, tier).await?;
	let child_evidence = child_evidence_per_person(args, tier).await?;

	Ok(TierCandidates { parents, child_best, child_evidence })
}

/// Top-N visible parent records by vector distance under the tier's filters.
async fn parent_candidates(
	args: &RetrievalArgs<'_>,
	tier: FallbackTier,
) -> ServiceResult<Vec<ParentHit>> {
	let mut qb: QueryBuilder<Postgres> =
		QueryBuilder::new("SELECT r.record_id, r.person_id, (1 - (e.vec <=> ");

	qb.push_bind(args.query_vec_text.to_string());
	qb.push(
		"::text::vector))::real AS similarity \
FROM experience_records r \
JOIN record_embeddings e ON e.record_id = r.record_id AND e.embedding_version = ",
	);
	qb.push_bind(args.embedding_version.to_string());
	qb.push(" JOIN person_profiles p ON p.person_id = r.person_id WHERE r.visible");
	push_filters(&mut qb, args, tier);
	qb.push(" ORDER BY e.vec <=> ");
	qb.push_bind(args.query_vec_text.to_string());
	qb.push("::text::vector LIMIT ");
	qb.push_bind(args.candidate_k);

	let parents = qb.build_query_as().fetch_all(args.pool).await?;

	Ok(parents)
}

/// Top-N child records aggregated to best distance per person, each joined
/// back to its visible owning parent for filter application.
async fn child_best_per_person(
	args: &RetrievalArgs<'_>,
	tier: FallbackTier,
) -> ServiceResult<Vec<ChildHit>> {
	let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
		"SELECT subrecord_id, record_id, person_id, similarity FROM (\
SELECT DISTINCT ON (s.person_id) s.subrecord_id, s.record_id, s.person_id, (1 - (se.vec <=> ",
	);

	qb.push_bind(args.query_vec_text.to_string());
	qb.push("::text::vector))::real AS similarity");
	push_child_joins(&mut qb, args);
	push_filters(&mut qb, args, tier);
	qb.push(" ORDER BY s.person_id, se.vec <=> ");
	qb.push_bind(args.query_vec_text.to_string());
	qb.push("::text::vector) best ORDER BY similarity DESC LIMIT ");
	qb.push_bind(args.candidate_k);

	let hits = qb.build_query_as().fetch_all(args.pool).await?;

	Ok(hits)
}

/// Bounded top-K child evidence per person, for display and for child-only
/// parent selection.
async fn child_evidence_per_person(
	args: &RetrievalArgs<'_>,
	tier: FallbackTier,
) -> ServiceResult<Vec<ChildHit>> {
	let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
		"SELECT subrecord_id, record_id, person_id, similarity FROM (\
SELECT s.subrecord_id, s.record_id, s.person_id, (1 - (se.vec <=> ",
	);

	qb.push_bind(args.query_vec_text.to_string());
	qb.push("::text::vector))::real AS similarity, row_number() OVER (PARTITION BY s.person_id ORDER BY se.vec <=> ");
	qb.push_bind(args.query_vec_text.to_string());
	qb.push("::text::vector) AS evidence_rank");
	push_child_joins(&mut qb, args);
	push_filters(&mut qb, args, tier);
	qb.push(") ranked WHERE evidence_rank <= ");
	qb.push_bind(args.child_evidence_k);
	qb.push(" ORDER BY similarity DESC LIMIT ");
	qb.push_bind(args.candidate_k * args.child_evidence_k);

	let hits = qb.build_query_as().fetch_all(args.pool).await?;

	Ok(hits)
}

fn push_child_joins(qb: &mut QueryBuilder<'_, Postgres>, args: &RetrievalArgs<'_>) {
	qb.push(
		" FROM experience_subrecords s \
JOIN subrecord_embeddings se ON se.subrecord_id = s.subrecord_id AND se.embedding_version = ",
	);
	qb.push_bind(args.embedding_version.to_string());
	qb.push(
		" JOIN experience_records r ON r.record_id = s.record_id \
JOIN person_profiles p ON p.person_id = s.person_id WHERE r.visible",
	);
}

/// Append the tier-dependent MUST/EXCLUDE conditions. `r` is the parent
/// record alias, `p` the person alias, in every query this feeds.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, args: &RetrievalArgs<'_>, tier: FallbackTier) {
	let must = &args.constraints.must;

	if args.open_to_work_only {
		qb.push(" AND p.open_to_work");
	}

	if tier.company_filter_applies() {
		if !must.companies.is_empty() {
			push_any_ilike(qb, &["r.company"], must.companies.clone());
		}
		if !must.teams.is_empty() {
			push_any_ilike(qb, &["r.team", "r.role"], must.teams.clone());
		}
	}

	if tier.location_filter_applies() && !must.locations.is_empty() {
		push_any_ilike(qb, &["r.location"], must.locations.clone());
	}

	if !must.domains.is_empty() {
		push_any_ilike(qb, &["r.domain", "r.summary"], must.domains.clone());
	}
	if !must.subdomains.is_empty() {
		push_any_ilike(qb, &["r.domain", "r.summary"], must.subdomains.clone());
	}

	if tier.time_filter_applies()
		&& let Some(window) = must.date_window
	{
		push_time_window(qb, window);
	}

	if !args.constraints.exclude.companies.is_empty() {
		qb.push(" AND NOT EXISTS (SELECT 1 FROM unnest(");
		qb.push_bind(args.constraints.exclude.companies.clone());
		qb.push(") AS pat WHERE r.company ILIKE '%' || pat || '%')");
	}
}

/// `AND EXISTS (... any column ILIKE any pattern ...)`.
fn push_any_ilike(qb: &mut QueryBuilder<'_, Postgres>, columns: &[&str], patterns: Vec<String>) {
	qb.push(" AND EXISTS (SELECT 1 FROM unnest(");
	qb.push_bind(patterns);
	qb.push(") AS pat WHERE ");

	for (idx, column) in columns.iter().enumerate() {
		if idx > 0 {
			qb.push(" OR ");
		}
		qb.push(format!("{column} ILIKE '%' || pat || '%'"));
	}

	qb.push(")");
}

/// True overlap test: the record needs at least one known bound, and dated
/// records outside the window are excluded. An unknown end on a current
/// record counts as open-ended.
fn push_time_window(qb: &mut QueryBuilder<'_, Postgres>, window: DateWindow) {
	qb.push(" AND (r.start_date IS NOT NULL OR r.end_date IS NOT NULL)");

	if let Some(to) = window.to {
		qb.push(" AND (r.start_date IS NULL OR r.start_date <= ");
		qb.push_bind(to);
		qb.push(")");
	}
	if let Some(from) = window.from {
		qb.push(" AND (r.is_current OR r.end_date IS NULL OR r.end_date >= ");
		qb.push_bind(from);
		qb.push(")");
	}
}
