//! Console statistics for a finished run

use crate::crawler::RunSummary;
use crate::state::CategoryState;

/// Share of settled page tasks that succeeded, as a percentage
pub fn page_success_rate(summary: &RunSummary) -> f64 {
    let tasks = summary.total_tasks();
    if tasks == 0 {
        return 0.0;
    }
    let succeeded: usize = summary.categories.iter().map(|c| c.pages_succeeded).sum();
    (succeeded as f64 / tasks as f64) * 100.0
}

/// Prints the run summary to stdout in a formatted manner
pub fn print_summary(summary: &RunSummary) {
    println!("=== Harvest Summary: {} ===\n", summary.site);

    println!("Overview:");
    println!("  Categories processed: {}", summary.categories_processed());
    println!("  Page tasks: {}", summary.total_tasks());
    println!("  Fetch attempts: {}", summary.total_attempts());
    println!("  Records harvested: {}", summary.total_records());
    println!("  Duration: {:.1}s", summary.duration.as_secs_f64());
    if summary.interrupted {
        println!("  Interrupted by shutdown request");
    }
    println!();

    println!("Categories by State:");
    for state in [
        CategoryState::Done,
        CategoryState::PartiallyFailed,
        CategoryState::Failed,
    ] {
        let count = summary.categories_in(state);
        if count > 0 {
            println!("  {}: {}", state, count);
        }
    }
    println!();

    let troubled: Vec<_> = summary
        .categories
        .iter()
        .filter(|c| c.state != CategoryState::Done)
        .collect();

    if !troubled.is_empty() {
        println!("Failures:");
        for category in troubled {
            println!(
                "  {} ({}): {} of {} pages failed",
                category.name,
                category.state,
                category.pages_failed(),
                category.tasks
            );
            if let Some(error) = &category.error {
                println!("    - {}", error);
            }
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} pages failed)",
        page_success_rate(summary),
        summary.pages_failed()
    );
}
