//! Markdown review report generation
//!
//! Flagged and failed sites need a human to decide what happens next. This module writes
//! them, with their error records, into a markdown report.

use crate::crawler::SiteReview;
use crate::output::stats::HarvestStatistics;
use crate::output::OutputResult;
use crate::state::SiteStatus;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Error records listed per site before the rest are elided
const MAX_RECORDS_PER_SITE: usize = 20;

/// Writes the review report to `output_path`
///
/// # Arguments
///
/// * `reviews` - Sites awaiting review
/// * `stats` - Fleet statistics for the report header
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn generate_review_report(
    reviews: &[SiteReview],
    stats: &HarvestStatistics,
    output_path: &Path,
) -> OutputResult<()> {
    let markdown = format_review_report(reviews, stats);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats the review report as markdown
pub fn format_review_report(reviews: &[SiteReview], stats: &HarvestStatistics) -> String {
    let mut md = String::new();

    md.push_str("# Corpus-Harvest Review Report\n\n");

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Registered Sites**: {}\n", stats.total_sites));
    md.push_str(&format!("- **Unique Content Hashes**: {}\n", stats.unique_hashes));
    md.push_str(&format!("- **Documents Saved**: {}\n", stats.documents_saved));
    md.push_str(&format!(
        "- **Completion Rate**: {:.2}%\n\n",
        stats.completion_rate()
    ));

    md.push_str("## Site Status Breakdown\n\n");
    md.push_str("| Status | Count |\n");
    md.push_str("|--------|-------|\n");
    for status in SiteStatus::all() {
        md.push_str(&format!("| {} | {} |\n", status, stats.count(status)));
    }
    md.push('\n');

    if reviews.is_empty() {
        md.push_str("No sites need review.\n");
        return md;
    }

    for status in [SiteStatus::Flagged, SiteStatus::Failed] {
        let group: Vec<_> = reviews.iter().filter(|r| r.site.status == status).collect();
        if group.is_empty() {
            continue;
        }

        md.push_str(&format!("## {:?} Sites ({})\n\n", status, group.len()));

        for review in group {
            let site = &review.site;
            md.push_str(&format!("### {}\n\n", site.id));
            md.push_str(&format!("- **Memory Tier**: {}\n", site.memory_tier));
            md.push_str(&format!("- **Passes**: {}\n", site.pass_count));
            md.push_str(&format!(
                "- **Pages**: {} accepted of {} attempted\n\n",
                site.accepted_page_count, site.attempted_page_count
            ));

            if review.errors.is_empty() {
                continue;
            }

            md.push_str("| Time | Kind | URL | Detail |\n");
            md.push_str("|------|------|-----|--------|\n");
            for record in review.errors.iter().take(MAX_RECORDS_PER_SITE) {
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.kind,
                    record.url.as_deref().unwrap_or("-"),
                    record.detail.replace('|', "\\|")
                ));
            }
            if review.errors.len() > MAX_RECORDS_PER_SITE {
                md.push_str(&format!(
                    "\n... and {} more\n",
                    review.errors.len() - MAX_RECORDS_PER_SITE
                ));
            }
            md.push('\n');
        }
    }

    md
}
