//! Aggregation and comparison over recorded executions.
//!
//! Pure functions: the caller fetches executions with whatever filter is
//! active and passes both in, so the engine holds no ambient state and every
//! edge case is unit-testable.
//!
//! Null policy: a metric average is computed only across executions where
//! the metric is present. A group with zero present values reports `None`
//! ("unknown"), never 0 or NaN; 0.0 is a legitimate low score and must stay
//! distinguishable from "not computed".

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Execution, ExecutionFilter, Technique};

pub mod feed;


/// Per-technique summary statistics, derived on demand and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonRow {
    pub technique: Technique,
    pub execution_count: usize,
    pub avg_latency_ms: Option<f64>,
    pub avg_cost_usd: Option<f64>,
    pub avg_faithfulness: Option<f64>,
    pub avg_answer_relevancy: Option<f64>,
    pub avg_context_precision: Option<f64>,
    pub avg_context_recall: Option<f64>,
    pub avg_chunks_retrieved: Option<f64>,
    pub avg_top1: Option<f64>,
    pub avg_top2: Option<f64>,
    pub avg_top3: Option<f64>,
    pub avg_top3_mean: Option<f64>,
}

/// The comparison payload consumed by the polling dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub rows: Vec<ComparisonRow>,
    pub rankings: BTreeMap<String, Vec<Technique>>,
    pub filters_applied: ExecutionFilter,
}

impl ComparisonReport {
    /// "No data yet" — a soft empty state, not an error.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Group the executions by technique and compute all summary statistics and
/// rankings. Row order is the order techniques first appear in the input,
/// which also fixes ranking tie-breaks.
pub fn aggregate(executions: &[Execution], filter: ExecutionFilter) -> ComparisonReport {
    let groups = group_by_technique(executions);

    let rows: Vec<ComparisonRow> = groups
        .into_iter()
        .map(|(technique, members)| summarize_group(technique, &members))
        .collect();

    let rankings = rankings(&rows);

    ComparisonReport {
        rows,
        rankings,
        filters_applied: filter,
    }
}

/// Order-preserving group-by: techniques appear in the order of their first
/// execution in the input.
fn group_by_technique(executions: &[Execution]) -> Vec<(Technique, Vec<&Execution>)> {
    let mut groups: Vec<(Technique, Vec<&Execution>)> = Vec::new();
    for execution in executions {
        match groups.iter_mut().find(|(t, _)| *t == execution.technique) {
            Some((_, members)) => members.push(execution),
            None => groups.push((execution.technique, vec![execution])),
        }
    }
    groups
}

fn summarize_group(technique: Technique, members: &[&Execution]) -> ComparisonRow {
    let tops: Vec<[Option<f64>; 3]> = members.iter().map(|e| top_scores(e)).collect();

    let avg_top1 = mean(tops.iter().map(|t| t[0]));
    let avg_top2 = mean(tops.iter().map(|t| t[1]));
    let avg_top3 = mean(tops.iter().map(|t| t[2]));
    // Composite retrieval-quality indicator: mean of the present positional
    // averages.
    let avg_top3_mean = mean([avg_top1, avg_top2, avg_top3].into_iter());

    ComparisonRow {
        technique,
        execution_count: members.len(),
        avg_latency_ms: mean(members.iter().map(|e| Some(e.metrics.latency_ms))),
        avg_cost_usd: mean(members.iter().map(|e| e.metrics.cost_usd)),
        avg_faithfulness: mean(members.iter().map(|e| e.metrics.faithfulness)),
        avg_answer_relevancy: mean(members.iter().map(|e| e.metrics.answer_relevancy)),
        avg_context_precision: mean(members.iter().map(|e| e.metrics.context_precision)),
        avg_context_recall: mean(members.iter().map(|e| e.metrics.context_recall)),
        avg_chunks_retrieved: mean(
            members
                .iter()
                .map(|e| e.metrics.chunks_retrieved.map(|v| v as f64)),
        ),
        avg_top1,
        avg_top2,
        avg_top3,
        avg_top3_mean,
    }
}

/// Arithmetic mean over the present values; `None` when nothing qualifies.
fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values.flatten() {
        sum += value;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Scores at rank positions 1-3 for one execution: its sources sorted by
/// score descending, missing positions unknown. Source order itself is
/// retrieval rank and is deliberately not trusted to be score order.
fn top_scores(execution: &Execution) -> [Option<f64>; 3] {
    let mut scores: Vec<f64> = execution.sources.iter().map(|s| s.score).collect();
    scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    [
        scores.first().copied(),
        scores.get(1).copied(),
        scores.get(2).copied(),
    ]
}

/// Deterministic markdown rendering of a report, used as the context for
/// the LLM analysis and as the fallback narrative when the LLM is down.
pub fn render_summary(report: &ComparisonReport) -> String {
    if report.is_empty() {
        return "No execution data available yet. Run some queries first.".to_string();
    }

    let mut lines = Vec::new();
    let total: usize = report.rows.iter().map(|r| r.execution_count).sum();
    lines.push(format!(
        "Techniques compared: {} ({} executions)",
        report.rows.len(),
        total
    ));
    lines.push(String::new());

    for row in &report.rows {
        lines.push(format!(
            "## {} ({} executions)",
            row.technique, row.execution_count
        ));
        lines.push(format!("- avg latency: {}", fmt_ms(row.avg_latency_ms)));
        lines.push(format!("- avg cost: {}", fmt_usd(row.avg_cost_usd)));
        lines.push(format!(
            "- quality: faithfulness {}, relevancy {}, precision {}, recall {}",
            fmt_score(row.avg_faithfulness),
            fmt_score(row.avg_answer_relevancy),
            fmt_score(row.avg_context_precision),
            fmt_score(row.avg_context_recall),
        ));
        lines.push(format!(
            "- retrieval: top1 {}, top2 {}, top3 {} (mean {})",
            fmt_score(row.avg_top1),
            fmt_score(row.avg_top2),
            fmt_score(row.avg_top3),
            fmt_score(row.avg_top3_mean),
        ));
        lines.push(String::new());
    }

    if !report.rankings.is_empty() {
        lines.push("## Rankings".to_string());
        for (category, order) in &report.rankings {
            let names: Vec<&str> = order.iter().map(|t| t.as_str()).collect();
            lines.push(format!("- {}: {}", category, names.join(" > ")));
        }
    }

    lines.join("\n")
}

fn fmt_ms(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}ms", v),
        None => "unknown".to_string(),
    }
}

fn fmt_usd(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${:.6}", v),
        None => "unknown".to_string(),
    }
}

fn fmt_score(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => "unknown".to_string(),
    }
}

struct RankingCategory {
    name: &'static str,
    key: fn(&ComparisonRow) -> Option<f64>,
    lower_is_better: bool,
}

const CATEGORIES: [RankingCategory; 7] = [
    RankingCategory {
        name: "fastest",
        key: |row| row.avg_latency_ms,
        lower_is_better: true,
    },
    RankingCategory {
        name: "cheapest",
        key: |row| row.avg_cost_usd,
        lower_is_better: true,
    },
    RankingCategory {
        name: "most_faithful",
        key: |row| row.avg_faithfulness,
        lower_is_better: false,
    },
    RankingCategory {
        name: "most_relevant",
        key: |row| row.avg_answer_relevancy,
        lower_is_better: false,
    },
    RankingCategory {
        name: "best_precision",
        key: |row| row.avg_context_precision,
        lower_is_better: false,
    },
    RankingCategory {
        name: "best_recall",
        key: |row| row.avg_context_recall,
        lower_is_better: false,
    },
    RankingCategory {
        name: "best_retrieval",
        key: |row| row.avg_top3_mean,
        lower_is_better: false,
    },
];

/// Ordered technique lists per ranking category, best first.
///
/// Techniques with an unknown value for a category's metric are excluded
/// from that category; a category with no qualifying technique is omitted
/// entirely. Ties keep the rows' first-appearance order (stable sort).
pub fn rankings(rows: &[ComparisonRow]) -> BTreeMap<String, Vec<Technique>> {
    let mut result = BTreeMap::new();

    for category in &CATEGORIES {
        let mut candidates: Vec<(Technique, f64)> = rows
            .iter()
            .filter_map(|row| (category.key)(row).map(|value| (row.technique, value)))
            .collect();
        if candidates.is_empty() {
            continue;
        }

        candidates.sort_by(|a, b| {
            let ordering = a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal);
            if category.lower_is_better {
                ordering
            } else {
                ordering.reverse()
            }
        });

        result.insert(
            category.name.to_string(),
            candidates.into_iter().map(|(technique, _)| technique).collect(),
        );
    }

    result
}
