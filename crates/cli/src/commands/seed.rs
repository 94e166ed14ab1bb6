use crate::commands::{open_pool, prepare, CommandResult, Failure, EXIT_MIGRATION, EXIT_SEED};
use wfh_db::{migrations, DemoSeedDataset, SeedResult};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let outcome = seed_demo_accounts(&pool).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", render_summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

async fn seed_demo_accounts(pool: &wfh_db::DbPool) -> Result<SeedResult, Failure> {
    migrations::run_pending(pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

    let seeded = DemoSeedDataset::load(pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), EXIT_SEED))?;

    let verification = DemoSeedDataset::verify(pool)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED))?;
    if !verification.all_present {
        return Err(("seed_verification", verification_failure(&verification.checks), EXIT_SEED));
    }

    Ok(seeded)
}

fn verification_failure(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "some demo accounts failed to load".to_string()
    } else {
        format!("demo account verification failed for: {}", failed_checks.join(", "))
    }
}

fn render_summary(seeded: &SeedResult) -> String {
    let lines: Vec<String> = seeded
        .users_seeded
        .iter()
        .map(|user| {
            let state = if user.created { "created" } else { "existing" };
            format!("  - {} / {} ({}, {state})", user.username, user.password, user.role.as_str())
        })
        .collect();

    format!(
        "demo accounts ready ({} created):\n{}",
        seeded.created_count(),
        lines.join("\n")
    )
}
