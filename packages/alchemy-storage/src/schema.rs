pub fn render_schema() -> String {
	let init = include_str!("../../../sql/init.sql");

	expand_includes(init)
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_prompts.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_prompts.sql")),
				"tables/002_prompt_relationships.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_prompt_relationships.sql")),
				"tables/003_feedback_events.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_feedback_events.sql")),
				"tables/004_ranking_weights.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_ranking_weights.sql")),
				"tables/005_patterns.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_patterns.sql")),
				"tables/006_job_state.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_job_state.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn includes_are_expanded() {
		let sql = render_schema();

		assert!(!sql.contains("\\ir "));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS prompts"));
		assert!(sql.contains("CREATE TABLE IF NOT EXISTS job_state"));
	}
}
