//! Prompt rendering and response cleanup.

use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::{Catalog, ColumnMetadata};

pub const SYSTEM_PROMPT: &str = "You are a SQL expert that converts natural language to SQL queries. \
Return only the SQL query without explanations.";

/// Aliases listed per column.
const PROMPT_ALIASES: usize = 3;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid regex"));

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```[a-z]*").expect("valid regex"));

static STATEMENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:\([ \t]*)*(?:select|with)\b").expect("valid regex")
});

static SELECT_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bselect\b").expect("valid regex"));

const END_TOKENS: &[&str] = &["<|im_end|>", "<|eot_id|>", "<|end|>", "</s>"];

/// Render the full user prompt for `question`.
pub fn build_prompt(catalog: &Catalog, question: &str) -> String {
    let metrics = catalog.metric_columns();
    let primary = catalog
        .primary_cost_metric()
        .map(|c| c.name.as_str())
        .unwrap_or("billedcost");
    let others: Vec<&str> = metrics
        .iter()
        .filter(|c| c.is_currency() && c.name != primary)
        .map(|c| c.name.as_str())
        .collect();
    let metric_rule = if others.is_empty() {
        format!("For cost questions, use the {primary} column")
    } else {
        format!(
            "For cost questions, use {primary} unless the question asks for {}",
            others.join(" or ")
        )
    };

    let guidelines = [
        "ALL column names are lowercase without underscores (e.g., billedcost, servicename, regionname)".to_string(),
        metric_rule,
        "Each cloud provider has its own table. To compare providers, query each table, add a literal provider column and combine them with UNION ALL".to_string(),
        "With UNION ALL, write ORDER BY and LIMIT once, after the last SELECT".to_string(),
        "Every GROUP BY column must also appear in the SELECT list".to_string(),
        "Always use appropriate aggregations (SUM for costs, COUNT for counts)".to_string(),
        "Add ORDER BY ... DESC when asking for \"top\" or \"highest\"".to_string(),
        "Add LIMIT when asking for a specific number of results".to_string(),
        "Use LIKE '%value%' for text searches and json_extract(tags, '$.Key') for tags".to_string(),
        "Use SQLite date functions such as date('now', '-30 days') for relative periods".to_string(),
    ];

    let mut prompt = String::new();
    prompt.push_str(
        "You are a SQL expert. Convert the following natural language question into a SQLite query.\n\n",
    );
    prompt.push_str("Database Schema:\n");
    prompt.push_str(&render_schema(catalog));
    prompt.push_str("\nImportant Guidelines:\n");
    for (i, rule) in guidelines.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {rule}", i + 1);
    }
    let _ = write!(
        prompt,
        "\nNatural Language Question: {question}\n\n\
         Generate ONLY the SQL query without any explanation or markdown formatting:"
    );
    prompt
}

/// The catalog as `Table:` / `Description:` / `Columns:` blocks.
pub fn render_schema(catalog: &Catalog) -> String {
    let mut out = String::new();
    for table in catalog.tables() {
        let _ = writeln!(out, "\nTable: {}", table.name);
        if !table.description.is_empty() {
            let _ = writeln!(out, "Description: {}", table.description);
        }
        out.push_str("Columns:\n");
        for column in table.columns.values() {
            render_column(&mut out, column);
        }
    }
    out
}

fn render_column(out: &mut String, column: &ColumnMetadata) {
    let _ = write!(out, "  - {} ({})", column.name, column.data_type.sql_name());
    if !column.description.is_empty() {
        let _ = write!(out, ": {}", column.description);
    }
    out.push('\n');

    if !column.aliases.is_empty() {
        let aliases: Vec<&str> = column
            .aliases
            .iter()
            .take(PROMPT_ALIASES)
            .map(String::as_str)
            .collect();
        let _ = writeln!(out, "    Aliases: {}", aliases.join(", "));
    }

    let mut usage = Vec::new();
    if let Some(agg) = column.default_aggregate {
        usage.push(format!("aggregate with {agg}"));
    }
    if column.groupable {
        usage.push("groupable".to_string());
    }
    if column.filterable {
        usage.push("filterable".to_string());
    }
    if !usage.is_empty() {
        let _ = writeln!(out, "    Usage: {}", usage.join(", "));
    }

    if let Some(guidance) = &column.guidance {
        for (label, text) in [
            ("When to use", &guidance.when_to_use),
            ("How to use", &guidance.how_to_use),
            ("Do not use for", &guidance.do_not_use_for),
        ] {
            if !text.is_empty() {
                let _ = writeln!(out, "    {label}: {text}");
            }
        }
    }
}

/// Extract the SQL statement from raw model output.
///
/// Drops chat end tokens, `<think>` blocks, code fences, any preamble
/// before the statement and anything after the first `;`.
pub fn clean_sql_output(raw: &str) -> String {
    let mut text = raw.to_string();
    for token in END_TOKENS {
        text = text.replace(token, "");
    }
    let text = THINK_BLOCK.replace_all(&text, "").into_owned();
    let text = CODE_FENCE.replace_all(&text, "").into_owned();

    let start = STATEMENT_LINE
        .find(&text)
        .or_else(|| SELECT_WORD.find(&text))
        .map_or(0, |m| m.start());
    let statement = &text[start..];
    let statement = match statement.find(';') {
        Some(end) => &statement[..end],
        None => statement,
    };
    statement.trim().to_string()
}
