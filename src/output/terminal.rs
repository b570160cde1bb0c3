// Colored terminal output for one-off scoring (`toxguard score`).

use colored::Colorize;

use crate::scoring::Verdict;

/// Display a verdict with its per-category breakdown.
pub fn display_verdict(text: &str, verdict: &Verdict, threshold: f64) {
    println!(
        "\n{}",
        format!("=== Score for \"{}\" ===", super::truncate_chars(text, 60)).bold()
    );

    let decision = if verdict.toxic {
        "TOXIC".red().bold()
    } else {
        "not toxic".green()
    };
    println!("  Verdict: {decision}  (threshold {threshold:.2})");
    println!("  Toxicity: {:.2}", verdict.primary_score);

    println!("\n  {:<18} {:>6}", "Category".dimmed(), "Score".dimmed());
    println!("  {}", "-".repeat(25).dimmed());
    for (category, score) in verdict.categories.iter() {
        let formatted = format!("{score:>6.2}");
        let colored_score = if score > threshold {
            formatted.red().bold()
        } else if score > threshold / 2.0 {
            formatted.yellow()
        } else {
            formatted.normal()
        };
        println!("  {:<18} {}", category.as_str(), colored_score);
    }

    if verdict.toxic {
        println!("\n  {} {}", "!!".red().bold(), verdict.reasons_label());
    }
    println!();
}
