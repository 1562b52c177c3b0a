//! Human-readable rendering of provider trees.
//!
//! Left-deep join trees are printed as one flattened chain, so a join of
//! four tables reads as four sources rather than three nested levels.

use std::fmt::Write;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use crate::flatten::{flatten_join_chain, JoinChain, JoinCondition};
use crate::provider::{JoinType, OrderItem, Provider, ProviderKind};

const INDENT: &str = "  ";

/// Render `provider` as an indented tree, one operator per line.
pub fn explain(provider: &Arc<Provider>) -> String {
    let mut out = String::new();
    write_node(&mut out, provider, 0);
    out
}

/// Render `provider` as nested JSON objects with `op`, `detail` and
/// `children` fields.
pub fn explain_json(provider: &Arc<Provider>) -> JsonValue {
    if let Some(chain) = flatten_join_chain(provider) {
        let steps: Vec<JsonValue> = chain
            .steps
            .iter()
            .map(|step| {
                json!({
                    "join_type": join_type_name(step.join_type),
                    "condition": condition_label(&step.condition),
                    "source": step.source,
                })
            })
            .collect();
        return json!({
            "op": "JoinChain",
            "order": order_label(&provider.header().order),
            "steps": steps,
            "children": chain.sources.iter().map(explain_json).collect::<Vec<_>>(),
        });
    }

    json!({
        "op": provider.kind_name(),
        "detail": detail(provider),
        "order": order_label(&provider.header().order),
        "children": provider.sources().into_iter().map(explain_json).collect::<Vec<_>>(),
    })
}

fn write_node(out: &mut String, provider: &Arc<Provider>, depth: usize) {
    if let Some(chain) = flatten_join_chain(provider) {
        write_chain(out, &chain, depth);
        return;
    }

    line(out, depth, provider.kind_name(), &detail(provider));
    for source in provider.sources() {
        write_node(out, source, depth + 1);
    }
}

fn write_chain(out: &mut String, chain: &JoinChain, depth: usize) {
    line(
        out,
        depth,
        "JoinChain",
        &format!("{} sources", chain.sources.len()),
    );
    if let Some(first) = chain.sources.first() {
        write_node(out, first, depth + 1);
    }
    for step in &chain.steps {
        let label = format!(
            "{} on {}",
            join_type_name(step.join_type),
            condition_label(&step.condition)
        );
        line(out, depth + 1, "Join", &label);
        if let Some(source) = chain.sources.get(step.source) {
            write_node(out, source, depth + 2);
        }
    }
}

fn line(out: &mut String, depth: usize, op: &str, detail: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(op);
    if !detail.is_empty() {
        out.push(' ');
        out.push_str(detail);
    }
    out.push('\n');
}

fn detail(provider: &Provider) -> String {
    match provider.kind() {
        ProviderKind::IndexScan { index } => index.name.clone(),
        ProviderKind::Raw { rows } => format!("({} rows)", rows.len()),
        ProviderKind::Filter { predicate, .. } => predicate.to_string(),
        ProviderKind::Select { columns, .. } => positions(columns),
        ProviderKind::Calculate { columns, .. } => list(
            columns
                .iter()
                .map(|c| format!("{} = {}", c.name, c.expr)),
        ),
        ProviderKind::Alias { alias, .. } => alias.clone(),
        ProviderKind::Sort { order, .. } => order_label(order),
        ProviderKind::Skip { count, .. } | ProviderKind::Take { count, .. } => count.to_string(),
        ProviderKind::Paging { skip, take, .. } => format!("skip={} take={}", skip, take),
        ProviderKind::RowNumber { column, .. } => column.clone(),
        ProviderKind::Distinct { .. }
        | ProviderKind::Union { .. }
        | ProviderKind::Concat { .. } => String::new(),
        ProviderKind::Aggregate {
            group_columns,
            aggregates,
            ..
        } => {
            let aggregates = list(aggregates.iter().map(|a| match a.column {
                Some(column) => format!("{} = {:?}(#{})", a.name, a.kind, column),
                None => format!("{} = {:?}(*)", a.name, a.kind),
            }));
            format!("by {} {}", positions(group_columns), aggregates)
        }
        ProviderKind::Join {
            join_type,
            equalities,
            ..
        } => format!(
            "{} on {}",
            join_type_name(*join_type),
            equalities_label(equalities)
        ),
        ProviderKind::PredicateJoin {
            join_type,
            predicate,
            ..
        } => format!("{} on {}", join_type_name(*join_type), predicate),
        ProviderKind::Apply {
            apply_type,
            bindings,
            ..
        } => format!(
            "{:?} {}",
            apply_type,
            list(bindings.iter().map(|(c, name)| format!("${} = #{}", name, c)))
        ),
        ProviderKind::Seek { index, key } => format!("{} key={}", index.name, key),
        ProviderKind::Range { index, range } => format!("{} {}", index.name, range),
        ProviderKind::RangeSet { index, ranges } => format!("{} {}", index.name, ranges),
        ProviderKind::MultiSeek { index, keys } => format!(
            "{} keys={}",
            index.name,
            list(keys.iter().map(|k| k.to_string()))
        ),
    }
}

fn join_type_name(join_type: JoinType) -> &'static str {
    match join_type {
        JoinType::Inner => "Inner",
        JoinType::LeftOuter => "LeftOuter",
    }
}

fn condition_label(condition: &JoinCondition) -> String {
    match condition {
        JoinCondition::Equalities(pairs) => equalities_label(pairs),
        JoinCondition::Predicate(predicate) => predicate.to_string(),
    }
}

fn equalities_label(pairs: &[(usize, usize)]) -> String {
    if pairs.is_empty() {
        return "true".to_string();
    }
    let mut out = String::new();
    for (i, (l, r)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push_str(" && ");
        }
        let _ = write!(out, "#{} = #{}", l, r);
    }
    out
}

fn order_label(order: &[OrderItem]) -> String {
    list(order.iter().map(|item| item.to_string()))
}

fn positions(columns: &[usize]) -> String {
    list(columns.iter().map(|c| format!("#{}", c)))
}

fn list(items: impl Iterator<Item = String>) -> String {
    format!("[{}]", items.collect::<Vec<_>>().join(", "))
}
