//! Console banners for the migration CLI.

use console::{style, Style};

use crate::config::MigrationConfig;
use crate::pipeline::MigrationSummary;

/// Prints the tool header.
pub fn print_header() {
    let cyan = Style::new().cyan().bold();

    println!();
    println!(
        "{}",
        cyan.apply_to("╔═══════════════════════════════════════════════════════════════╗")
    );
    println!(
        "{}",
        cyan.apply_to("║         AZURE SQL MIGRATION                                   ║")
    );
    println!(
        "{}",
        cyan.apply_to("║         Export, copy, import and verify                       ║")
    );
    println!(
        "{}",
        cyan.apply_to("╚═══════════════════════════════════════════════════════════════╝")
    );
    println!();
}

/// Prints the plan described by a validated configuration.
pub fn print_plan(config: &MigrationConfig, queries: usize) {
    let bold = Style::new().bold();

    println!("┌─────────────────────────────────────────────────────────────┐");
    println!(
        "│ {} {}",
        bold.apply_to("Source storage:"),
        config.source.storage_url()
    );
    println!(
        "│ {} {}",
        bold.apply_to("Target storage:"),
        config.target.storage_url()
    );
    println!("│ {} {}", bold.apply_to("Probes:        "), queries);
    println!("├─────────────────────────────────────────────────────────────┤");
    for pair in &config.database_configs {
        println!("│   • {} → {}", pair.source_label(), pair.target_label());
    }
    println!("└─────────────────────────────────────────────────────────────┘");
}

/// Prints the end-of-run summary.
pub fn print_summary(summary: &MigrationSummary) {
    let green = Style::new().green().bold();
    let bold = Style::new().bold();

    println!();
    if summary.report.is_clean() {
        println!("{}", green.apply_to("✅ Migration Complete!"));
    } else {
        println!(
            "{} Migration complete with verification mismatches",
            style("⚠").yellow().bold()
        );
    }
    println!();
    println!("   {} {}", bold.apply_to("Databases: "), summary.pairs);
    println!("   {} {}", bold.apply_to("Exported:  "), summary.exported);
    println!("   {} {}", bold.apply_to("Imported:  "), summary.imported);
    println!(
        "   {} {:.1}s",
        bold.apply_to("Duration:  "),
        summary.duration_secs
    );
    if summary.mismatches() > 0 {
        println!(
            "   {} {}",
            style("Mismatches:").yellow(),
            summary.mismatches()
        );
    }
    println!();
}

/// Prints an error message.
pub fn print_error(message: &str) {
    println!();
    println!("{} {}", style("❌").red().bold(), message);
}
