use std::collections::HashMap;

use chrono::Duration;
use url::Url;

use crate::{tracker::record::SessionRecord, utils::percentage::Percentage};

#[derive(Debug, PartialEq, Eq)]
pub struct SiteUsage {
    pub site: String,
    pub duration: Duration,
}

/// Host of an http(s) url. Other schemes (extension pages, files) have no site.
pub fn site_of(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str().map(str::to_owned)
}

/// Returns vector of unique sites with their time + total time of all counted records.
/// `wall_clock` counts the whole session instead of its active part.
pub fn analyze_sites(
    records: impl IntoIterator<Item = SessionRecord>,
    wall_clock: bool,
    min_percentage: Percentage,
) -> (Vec<SiteUsage>, Duration) {
    let mut map = HashMap::<String, Duration>::new();
    let mut total = Duration::zero();

    for record in records {
        let Some(site) = site_of(&record.url) else {
            continue;
        };
        let duration = if wall_clock {
            record.span()
        } else {
            record.active
        };
        total += duration;
        *map.entry(site).or_insert_with(Duration::zero) += duration;
    }

    let threshold_ms = (total.num_milliseconds() as f64 * *min_percentage / 100.) as i64;

    let mut usages = map
        .into_iter()
        .map(|(site, duration)| SiteUsage { site, duration })
        .filter(|v| v.duration.num_milliseconds() >= threshold_ms)
        .collect::<Vec<_>>();
    usages.sort_by(|a, b| a.site.cmp(&b.site));
    (usages, total)
}
