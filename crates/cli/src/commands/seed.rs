use anyhow::Result;
use strata_migrations::SeedRunResult;

use super::context::ProjectContext;

pub async fn run(context: &ProjectContext, specific: Option<&str>, force: bool) -> Result<()> {
    let runner = context.seed_runner().await?;
    let result = runner.run(specific, force).await?;
    println!("{}", format_seed_run(&result));
    Ok(())
}

pub(crate) fn format_seed_run(result: &SeedRunResult) -> String {
    if result.seeds.is_empty() {
        return "No seed files exist".to_string();
    }
    let mut lines = vec![format!("Ran {} seed files", result.seeds.len())];
    lines.extend(result.seeds.iter().cloned());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_seed_run() {
        let result = SeedRunResult {
            seeds: vec!["01_users".to_string(), "02_posts".to_string()],
            execution_time_ms: 5,
        };
        assert_eq!(format_seed_run(&result), "Ran 2 seed files\n01_users\n02_posts");

        let empty = SeedRunResult {
            seeds: Vec::new(),
            execution_time_ms: 0,
        };
        assert_eq!(format_seed_run(&empty), "No seed files exist");
    }
}
