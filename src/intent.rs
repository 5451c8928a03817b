//! Intent extraction.
//!
//! Turns a question into an [`Intent`]: which tables, which metric, how to
//! aggregate, group, filter, order and limit. Every decision is driven by a
//! small ordered rule table, so precedence reads top to bottom and each table
//! can be tested on its own.
//!
//! ```text
//! "top 5 services by cost in the last 30 days"
//!   │
//!   ├── tables     provider keywords / table aliases, else all
//!   ├── aggregate  AGGREGATE_RULES        (none → metric default)
//!   ├── metric     longest metric alias   (none → primary cost metric)
//!   ├── group_by   by/per/each X, noun after a superlative, tag keys
//!   ├── filters    time window, region, service, tag presence
//!   └── order      ORDER_RULES + "top N"
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use serde::Serialize;

use crate::alias::{AliasResolver, MatchKind};
use crate::catalog::{AggFn, Catalog, Provider};
use crate::sql::SortDir;
use crate::text::{contains_any, contains_phrase, find_phrase, normalize_question, words};

/// Rows returned by a listing question.
pub const DEFAULT_LISTING_LIMIT: u64 = 10;

/// Limit used for "top X" without a count.
pub const DEFAULT_TOP_LIMIT: u64 = 10;

// ============================================================================
// Rule tables
// ============================================================================

/// Aggregate keywords, checked in order.
const AGGREGATE_RULES: &[(&[&str], AggFn)] = &[
    (&["average", "avg", "mean"], AggFn::Avg),
    (&["maximum", "max"], AggFn::Max),
    (&["minimum", "min"], AggFn::Min),
    (&["count", "number of", "how many"], AggFn::Count),
    (&["total", "sum", "overall"], AggFn::Sum),
];

/// Ordering keywords, checked in order.
const ORDER_RULES: &[(&[&str], SortDir)] = &[
    (&["lowest", "cheapest", "bottom", "least", "smallest"], SortDir::Asc),
    (
        &["top", "highest", "most expensive", "most", "biggest", "largest"],
        SortDir::Desc,
    ),
];

/// Words after which the next noun names the ranked dimension.
const SUPERLATIVES: &[&str] = &[
    "top", "first", "highest", "lowest", "bottom", "biggest", "largest", "cheapest",
];

/// Words that introduce a grouping dimension.
const GROUP_MARKERS: &[&str] = &["by", "per", "each", "every", "across"];

/// Filler skipped between a group marker or superlative and its noun.
const FILLER: &[&str] = &[
    "the", "a", "each", "every", "most", "least", "expensive", "costly", "spending", "by",
];

const MULTI_PROVIDER_WORDS: &[&str] = &[
    "both",
    "all providers",
    "all clouds",
    "every provider",
    "compare",
    "comparison",
    "aws and azure",
    "azure and aws",
];

const TAG_WORDS: &[&str] = &["tag", "tags", "tagged", "label", "labels", "labeled"];

/// Tag keys recognised in a question and the key stored in the tags JSON.
const TAG_KEYS: &[(&str, &str)] = &[
    ("cost center", "CostCenter"),
    ("costcenter", "CostCenter"),
    ("environment", "Environment"),
    ("env", "Environment"),
    ("application", "Application"),
    ("app", "Application"),
    ("project", "Project"),
    ("owner", "Owner"),
    ("team", "Team"),
];

/// A service named in a question: the phrase, the text matched against the
/// service column, and the provider when the service belongs to one.
pub struct ServiceTerm {
    pub phrase: &'static str,
    pub pattern: &'static str,
    pub provider: Option<Provider>,
}

pub const SERVICE_TERMS: &[ServiceTerm] = &[
    ServiceTerm { phrase: "ec2", pattern: "Elastic Compute Cloud", provider: Some(Provider::Aws) },
    ServiceTerm { phrase: "s3", pattern: "Simple Storage Service", provider: Some(Provider::Aws) },
    ServiceTerm { phrase: "rds", pattern: "Relational Database Service", provider: Some(Provider::Aws) },
    ServiceTerm { phrase: "lambda", pattern: "Lambda", provider: Some(Provider::Aws) },
    ServiceTerm { phrase: "cloudfront", pattern: "CloudFront", provider: Some(Provider::Aws) },
    ServiceTerm { phrase: "virtual machines", pattern: "Virtual Machines", provider: Some(Provider::Azure) },
    ServiceTerm { phrase: "virtual machine", pattern: "Virtual Machines", provider: Some(Provider::Azure) },
    ServiceTerm { phrase: "vms", pattern: "Virtual Machines", provider: Some(Provider::Azure) },
    ServiceTerm { phrase: "vm", pattern: "Virtual Machines", provider: Some(Provider::Azure) },
    ServiceTerm { phrase: "app service", pattern: "App Service", provider: Some(Provider::Azure) },
    ServiceTerm { phrase: "azure sql", pattern: "Azure SQL", provider: Some(Provider::Azure) },
    ServiceTerm { phrase: "storage", pattern: "Storage", provider: None },
    ServiceTerm { phrase: "database", pattern: "Database", provider: None },
    ServiceTerm { phrase: "databases", pattern: "Database", provider: None },
    ServiceTerm { phrase: "compute", pattern: "Compute", provider: None },
];

/// The service terms present in a normalized question.
pub fn service_terms_in(question: &str) -> Vec<&'static ServiceTerm> {
    let mut found: Vec<&ServiceTerm> = Vec::new();
    for term in SERVICE_TERMS {
        if !contains_phrase(question, term.phrase) {
            continue;
        }
        // "virtual machine" is already covered by "virtual machines".
        if found.iter().any(|f| f.pattern == term.pattern) {
            continue;
        }
        found.push(term);
    }
    found
}

/// Providers named directly in a normalized question.
pub fn providers_in(question: &str) -> Vec<Provider> {
    Provider::ALL
        .into_iter()
        .filter(|p| contains_any(question, p.keywords()))
        .collect()
}

static LAST_N: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:last|past|previous)\s+(\d+)\s+(day|week|month)s?\b").expect("valid regex")
});

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid regex"));

static REGION_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:us|eu|ap|sa|ca|me|af)-(?:north|south|east|west|central|northeast|southeast|northwest|southwest)-\d\b")
        .expect("valid regex")
});

static QUOTED_REGION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bregion\s+'([^']+)'").expect("valid regex"));

static TOP_N: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:top|first|highest|lowest|bottom|largest|biggest|cheapest)\s+(\d+)\b")
        .expect("valid regex")
});

static N_MOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+)\s+(?:most|least|highest|lowest|biggest|largest|cheapest)\b")
        .expect("valid regex")
});

/// Named windows, checked in order after `last N <unit>`.
const WINDOW_RULES: &[(&[&str], TimeWindow)] = &[
    (&["today"], TimeWindow::Today),
    (&["this month", "current month", "month to date", "mtd"], TimeWindow::ThisMonth),
    (&["last month", "previous month", "past month"], TimeWindow::LastMonth),
    (
        &["this year", "current year", "year to date", "ytd"],
        TimeWindow::YearToDate,
    ),
    (&["last week", "past week", "this week"], TimeWindow::LastDays(7)),
    (&["last quarter", "past quarter"], TimeWindow::LastMonths(3)),
    (&["last year", "past year"], TimeWindow::LastMonths(12)),
];

// ============================================================================
// Time windows
// ============================================================================

/// A relative time window anchored to the current date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeWindow {
    Today,
    LastDays(u32),
    LastMonths(u32),
    ThisMonth,
    LastMonth,
    YearToDate,
}

impl TimeWindow {
    /// Parse the value of a `time_range` clarification option.
    pub fn from_slot_value(value: &str) -> Option<Self> {
        match value {
            "today" => Some(TimeWindow::Today),
            "this_month" => Some(TimeWindow::ThisMonth),
            "last_month" => Some(TimeWindow::LastMonth),
            "year_to_date" => Some(TimeWindow::YearToDate),
            _ => {
                let rest = value.strip_prefix("last_")?;
                if let Some(n) = rest.strip_suffix("_days") {
                    n.parse().ok().filter(|n| *n > 0).map(TimeWindow::LastDays)
                } else if let Some(n) = rest.strip_suffix("_months") {
                    n.parse().ok().filter(|n| *n > 0).map(TimeWindow::LastMonths)
                } else {
                    None
                }
            }
        }
    }

    pub fn slot_value(&self) -> String {
        match self {
            TimeWindow::Today => "today".into(),
            TimeWindow::LastDays(n) => format!("last_{n}_days"),
            TimeWindow::LastMonths(n) => format!("last_{n}_months"),
            TimeWindow::ThisMonth => "this_month".into(),
            TimeWindow::LastMonth => "last_month".into(),
            TimeWindow::YearToDate => "year_to_date".into(),
        }
    }

    /// Human label, e.g. "Last 30 days".
    pub fn label(&self) -> String {
        match self {
            TimeWindow::Today => "Today".into(),
            TimeWindow::LastDays(n) => format!("Last {n} days"),
            TimeWindow::LastMonths(n) => format!("Last {n} months"),
            TimeWindow::ThisMonth => "Current month".into(),
            TimeWindow::LastMonth => "Previous month".into(),
            TimeWindow::YearToDate => "Year to date".into(),
        }
    }

    /// SQLite `date()` expressions for the lower and upper bound.
    pub fn sql_bounds(&self) -> (String, String) {
        let now = "date('now')".to_string();
        match self {
            TimeWindow::Today => (now.clone(), now),
            TimeWindow::LastDays(n) => (format!("date('now', '-{n} days')"), now),
            TimeWindow::LastMonths(n) => (format!("date('now', '-{n} months')"), now),
            TimeWindow::ThisMonth => ("date('now', 'start of month')".into(), now),
            TimeWindow::LastMonth => (
                "date('now', 'start of month', '-1 month')".into(),
                "date('now', 'start of month', '-1 day')".into(),
            ),
            TimeWindow::YearToDate => ("date('now', 'start of year')".into(), now),
        }
    }

    /// Concrete dates covered when evaluated on `today`.
    pub fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let month_start = today.with_day(1).unwrap_or(today);
        match self {
            TimeWindow::Today => (today, today),
            TimeWindow::LastDays(n) => (today - chrono::Duration::days(i64::from(*n)), today),
            TimeWindow::LastMonths(n) => (
                today.checked_sub_months(Months::new(*n)).unwrap_or(today),
                today,
            ),
            TimeWindow::ThisMonth => (month_start, today),
            TimeWindow::LastMonth => {
                let start = month_start
                    .checked_sub_months(Months::new(1))
                    .unwrap_or(month_start);
                (start, month_start.pred_opt().unwrap_or(month_start))
            }
            TimeWindow::YearToDate => (today.with_ordinal(1).unwrap_or(today), today),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

// ============================================================================
// Intent
// ============================================================================

/// A grouping dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GroupKey {
    Column(String),
    /// A key inside the JSON `tags` column.
    Tag(String),
}

/// A filter, rendered per table by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IntentFilter {
    Time(TimeWindow),
    DateRange {
        from: NaiveDate,
        to: Option<NaiveDate>,
    },
    Region(String),
    /// Substring of the service name.
    Service(String),
    TagPresent(String),
}

/// What a question asks for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intent {
    pub aggregate: Option<AggFn>,
    /// Metric column name.
    pub metric: Option<String>,
    pub group_by: Vec<GroupKey>,
    pub filters: Vec<IntentFilter>,
    pub limit: Option<u64>,
    pub order: Option<SortDir>,
    pub tables: BTreeSet<String>,
    /// Plain row listing, no aggregation.
    pub listing: bool,
}

impl Intent {
    /// Add a region filter unless one is already present.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        if !self.filters.iter().any(|f| matches!(f, IntentFilter::Region(_))) {
            self.filters.push(IntentFilter::Region(region.into()));
        }
        self
    }

    /// Add a time window unless the question already bounds time.
    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        let has_time = self
            .filters
            .iter()
            .any(|f| matches!(f, IntentFilter::Time(_) | IntentFilter::DateRange { .. }));
        if !has_time {
            self.filters.push(IntentFilter::Time(window));
        }
        self
    }

    pub fn time_window(&self) -> Option<TimeWindow> {
        self.filters.iter().find_map(|f| match f {
            IntentFilter::Time(w) => Some(*w),
            _ => None,
        })
    }
}

/// Extract the intent of a question against a catalog.
pub fn extract(question: &str, catalog: &Catalog) -> Intent {
    let q = normalize_question(question);
    let resolver = AliasResolver::new(catalog);

    let tables = detect_tables(&q, catalog, &resolver);
    let table_list: Vec<String> = tables.iter().cloned().collect();

    let aggregate = AGGREGATE_RULES
        .iter()
        .find(|(keywords, _)| contains_any(&q, keywords))
        .map(|(_, agg)| *agg);

    let mentioned_metric = resolver
        .mentions(&q)
        .into_iter()
        .flat_map(|m| m.candidates)
        .filter(|c| c.match_kind != MatchKind::AliasSubstring)
        .find(|c| {
            table_list.contains(&c.table)
                && catalog
                    .column(&c.table, &c.column)
                    .is_some_and(|col| col.is_metric())
        })
        .map(|c| c.column);

    let mut group_by = detect_groups(&q, catalog, &resolver, &table_list);
    let mut filters = Vec::new();

    if let Some(tag) = detect_tag_key(&q) {
        group_by.push(GroupKey::Tag(tag.to_string()));
        filters.push(IntentFilter::TagPresent(tag.to_string()));
    }

    filters.extend(detect_time(&q));
    filters.extend(detect_regions(&q, catalog, &table_list));
    filters.extend(detect_services(&q, catalog, &table_list));

    let explicit_limit = TOP_N
        .captures(&q)
        .or_else(|| N_MOST.captures(&q))
        .and_then(|c| c[1].parse::<u64>().ok())
        .filter(|n| *n > 0);
    let has_superlative = contains_any(&q, SUPERLATIVES) || contains_phrase(&q, "most");
    let mut order = ORDER_RULES
        .iter()
        .find(|(keywords, _)| contains_any(&q, keywords))
        .map(|(_, dir)| *dir);

    let listing = aggregate.is_none() && mentioned_metric.is_none() && group_by.is_empty();
    if listing {
        tracing::debug!(question = %q, "row listing");
        return Intent {
            aggregate: None,
            metric: None,
            group_by,
            filters,
            limit: Some(explicit_limit.unwrap_or(DEFAULT_LISTING_LIMIT)),
            order: None,
            tables,
            listing: true,
        };
    }

    let metric = mentioned_metric.or_else(|| {
        if aggregate == Some(AggFn::Count) {
            None
        } else {
            catalog.primary_cost_metric().map(|c| c.name.clone())
        }
    });
    let aggregate = aggregate.or_else(|| {
        let column = metric.as_deref().and_then(|m| {
            table_list
                .iter()
                .find_map(|t| catalog.column(t, m))
        });
        Some(column.map_or(AggFn::Sum, |c| c.effective_aggregate()))
    });

    let mut limit = explicit_limit;
    if limit.is_some() && order.is_none() {
        order = Some(SortDir::Desc);
    }
    if limit.is_none() && has_superlative && !group_by.is_empty() {
        limit = Some(DEFAULT_TOP_LIMIT);
    }
    if group_by.is_empty() && limit.is_none() {
        // A single aggregate row has nothing to rank.
        order = None;
    }

    let intent = Intent {
        aggregate,
        metric,
        group_by,
        filters,
        limit,
        order,
        tables,
        listing: false,
    };
    tracing::debug!(?intent, "intent extracted");
    intent
}

fn detect_tables(q: &str, catalog: &Catalog, resolver: &AliasResolver<'_>) -> BTreeSet<String> {
    let all: BTreeSet<String> = catalog.table_names().map(str::to_string).collect();
    if contains_any(q, MULTI_PROVIDER_WORDS) {
        return all;
    }

    let mut providers: BTreeSet<Provider> = providers_in(q).into_iter().collect();
    providers.extend(service_terms_in(q).into_iter().filter_map(|t| t.provider));

    let mut tables: BTreeSet<String> = resolver.tables_mentioned(q).into_iter().collect();
    for provider in providers {
        tables.extend(catalog.provider_tables(provider).map(|t| t.name.clone()));
    }

    if tables.is_empty() {
        all
    } else {
        tables
    }
}

/// A groupable column named by the words at the start of `rest`, with the
/// number of words consumed.
fn group_column(
    catalog: &Catalog,
    resolver: &AliasResolver<'_>,
    tables: &[String],
    rest: &[&str],
) -> Option<(String, usize)> {
    for n in (1..=rest.len().min(2)).rev() {
        let phrase = rest[..n].join(" ");
        let mut candidates = resolver.resolve_noun(&phrase);
        if candidates.is_empty() && n > 1 {
            candidates = resolver.resolve(&rest[..n].concat());
        }
        let found = candidates
            .into_iter()
            .filter(|c| c.match_kind != MatchKind::AliasSubstring)
            .find(|c| {
                tables.contains(&c.table)
                    && catalog
                        .column(&c.table, &c.column)
                        .is_some_and(|col| col.groupable)
            });
        if let Some(c) = found {
            return Some((c.column, n));
        }
    }
    None
}

fn detect_groups(
    q: &str,
    catalog: &Catalog,
    resolver: &AliasResolver<'_>,
    tables: &[String],
) -> Vec<GroupKey> {
    let tokens: Vec<&str> = words(q).collect();
    let mut columns: Vec<String> = Vec::new();
    let mut push = |column: String| {
        if !columns.contains(&column) {
            columns.push(column);
        }
    };

    let mut i = 0;
    while i < tokens.len() {
        let word = tokens[i];
        let is_marker = GROUP_MARKERS.contains(&word);
        let is_superlative = SUPERLATIVES.contains(&word);
        if !is_marker && !is_superlative {
            i += 1;
            continue;
        }

        // Look a few words ahead, skipping filler and counts.
        let mut j = i + 1;
        let mut matched = None;
        while j < tokens.len() && j <= i + 4 {
            let w = tokens[j];
            if FILLER.contains(&w) || w.chars().all(|c| c.is_ascii_digit()) {
                j += 1;
                continue;
            }
            matched = group_column(catalog, resolver, tables, &tokens[j..]);
            if matched.is_some() || is_marker {
                break;
            }
            j += 1;
        }

        let Some((column, used)) = matched else {
            i += 1;
            continue;
        };
        tracing::debug!(marker = word, column = %column, "group by");
        push(column);
        i = j + used;

        // "by region and service"
        while is_marker && i + 1 < tokens.len() && tokens[i] == "and" {
            match group_column(catalog, resolver, tables, &tokens[i + 1..]) {
                Some((column, used)) => {
                    push(column);
                    i += 1 + used;
                }
                None => break,
            }
        }
    }

    columns.into_iter().map(GroupKey::Column).collect()
}

fn detect_tag_key(q: &str) -> Option<&'static str> {
    if !contains_any(q, TAG_WORDS) {
        return None;
    }
    TAG_KEYS
        .iter()
        .find(|(phrase, _)| contains_phrase(q, phrase))
        .map(|(_, key)| *key)
}

fn detect_time(q: &str) -> Option<IntentFilter> {
    if let Some(caps) = LAST_N.captures(q) {
        let n: u32 = caps[1].parse().ok().filter(|n| *n > 0)?;
        let window = match &caps[2] {
            "day" => TimeWindow::LastDays(n),
            "week" => TimeWindow::LastDays(n.saturating_mul(7)),
            _ => TimeWindow::LastMonths(n),
        };
        return Some(IntentFilter::Time(window));
    }

    if let Some((_, window)) = WINDOW_RULES
        .iter()
        .find(|(keywords, _)| contains_any(q, keywords))
    {
        return Some(IntentFilter::Time(*window));
    }

    let dates: Vec<NaiveDate> = ISO_DATE
        .captures_iter(q)
        .filter_map(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok())
        .collect();
    match dates.as_slice() {
        [] => None,
        [from, to, ..] => Some(IntentFilter::DateRange {
            from: *from.min(to),
            to: Some(*from.max(to)),
        }),
        [only] => {
            let open_ended = contains_any(q, &["since", "after", "from", "starting"]);
            Some(IntentFilter::DateRange {
                from: *only,
                to: (!open_ended).then_some(*only),
            })
        }
    }
}

/// Region values known to the catalog for the queried tables.
fn known_regions(catalog: &Catalog, tables: &[String]) -> Vec<String> {
    tables
        .iter()
        .filter_map(|t| catalog.table(t))
        .filter_map(|t| t.region_column())
        .flat_map(|c| c.sample_values.iter().cloned())
        .collect()
}

fn detect_regions(q: &str, catalog: &Catalog, tables: &[String]) -> Option<IntentFilter> {
    if let Some(caps) = QUOTED_REGION.captures(q) {
        return Some(IntentFilter::Region(caps[1].to_string()));
    }
    if let Some(code) = REGION_CODE.find(q) {
        return Some(IntentFilter::Region(code.as_str().to_string()));
    }
    known_regions(catalog, tables)
        .into_iter()
        .filter(|r| find_phrase(q, &r.to_lowercase()).is_some())
        .max_by_key(|r| r.len())
        .map(IntentFilter::Region)
}

fn detect_services(q: &str, catalog: &Catalog, tables: &[String]) -> Option<IntentFilter> {
    if let Some(term) = service_terms_in(q).first() {
        return Some(IntentFilter::Service(term.pattern.to_string()));
    }
    tables
        .iter()
        .filter_map(|t| catalog.table(t))
        .filter_map(|t| t.service_column())
        .flat_map(|c| c.sample_values.iter())
        .filter(|v| contains_phrase(q, &v.to_lowercase()))
        .max_by_key(|v| v.len())
        .map(|v| IntentFilter::Service(v.clone()))
}

/// True if the question bounds time in any way the extractor understands.
pub fn has_time_bound(question: &str) -> bool {
    let q = normalize_question(question);
    detect_time(&q).is_some()
}
