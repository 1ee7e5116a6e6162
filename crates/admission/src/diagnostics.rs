// Copyright (c) 2023 - 2025 readgate developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::permit::{PermitEntry, PermitState, TableSchema};
use crate::resources::ReadResources;

const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(30);

static LAST_INTERNAL_DUMP: Mutex<Option<Instant>> = Mutex::new(None);

/// Gate for the diagnostics dumps emitted on internal error paths (timeout,
/// overload). At most one per 30 seconds across the process, so persistent
/// overload doesn't flood the logs.
pub(crate) fn internal_dump_permitted() -> bool {
    let mut last = LAST_INTERNAL_DUMP.lock();
    match *last {
        Some(at) if at.elapsed() < RATE_LIMIT_INTERVAL => false,
        _ => {
            *last = Some(Instant::now());
            true
        }
    }
}

/// `1264` -> `1264`, `16384` -> `16K`, truncating division by 1024 per
/// step. Negative values keep their sign.
fn hr_size(bytes: i64) -> String {
    const SUFFIXES: [&str; 5] = ["", "K", "M", "G", "T"];
    let mut value = bytes.unsigned_abs();
    let mut suffix = 0;
    while value >= 1024 && suffix + 1 < SUFFIXES.len() {
        value /= 1024;
        suffix += 1;
    }
    let sign = if bytes < 0 { "-" } else { "" };
    format!("{sign}{value}{suffix}", suffix = SUFFIXES[suffix])
}

#[derive(Default, Clone, Copy)]
struct PermitStats {
    permits: u64,
    resources: ReadResources,
}

struct PermitSummary<'a> {
    schema: Option<&'a TableSchema>,
    op_name: &'a str,
    state: PermitState,
    stats: PermitStats,
}

impl PermitSummary<'_> {
    fn label(&self) -> String {
        format!(
            "{}.{}/{}/{}",
            self.schema.map_or("*", TableSchema::keyspace),
            self.schema.map_or("*", TableSchema::table),
            self.op_name,
            self.state,
        )
    }
}

fn print_line(out: &mut String, col1: impl std::fmt::Display, col2: i32, col3: &str, col4: &str) {
    writeln!(out, "{col1}\t{col2}\t{col3}\t{col4}").expect("writing to a String cannot fail");
}

/// Renders the permit dump used both for operator requests and for the
/// internal "something went wrong" paths. Permits are grouped by
/// `(schema, op, state)`, sorted by descending memory; at most `max_lines`
/// rows are printed (0 = unlimited), the rest folds into an aggregate row.
pub(crate) fn render_permit_dump(
    name: &str,
    initial: ReadResources,
    current: ReadResources,
    permits: &HashMap<u64, PermitEntry>,
    problem: &str,
    max_lines: usize,
) -> String {
    // Group by schema identity (pointer), op name and state.
    let mut groups: HashMap<(usize, &str, PermitState), PermitSummary<'_>> = HashMap::new();
    for entry in permits.values() {
        let schema_key = entry
            .schema
            .as_ref()
            .map_or(0, |schema| Arc::as_ptr(schema) as usize);
        let summary = groups
            .entry((schema_key, entry.op_name.as_ref(), entry.state))
            .or_insert_with(|| PermitSummary {
                schema: entry.schema.as_deref(),
                op_name: entry.op_name.as_ref(),
                state: entry.state,
                stats: PermitStats::default(),
            });
        summary.stats.permits += 1;
        summary.stats.resources += entry.consumed;
    }

    let mut summaries: Vec<_> = groups.into_values().collect();
    summaries.sort_by(|a, b| b.stats.resources.memory.cmp(&a.stats.resources.memory));

    let mut out = String::new();
    writeln!(
        out,
        "Semaphore {} with {}/{} count and {}/{} memory resources: {}, dumping permit diagnostics:",
        name,
        initial.count - current.count,
        initial.count,
        initial.memory - current.memory,
        initial.memory,
        problem,
    )
    .expect("writing to a String cannot fail");

    let mut total = PermitStats::default();
    let mut omitted = PermitStats::default();
    let mut lines = 0usize;

    out.push_str("permits\tcount\tmemory\ttable/description/state\n");
    for summary in &summaries {
        total.permits += summary.stats.permits;
        total.resources += summary.stats.resources;
        if max_lines == 0 || lines < max_lines {
            lines += 1;
            print_line(
                &mut out,
                summary.stats.permits,
                summary.stats.resources.count,
                &hr_size(summary.stats.resources.memory),
                &summary.label(),
            );
        } else {
            omitted.permits += summary.stats.permits;
            omitted.resources += summary.stats.resources;
        }
    }
    if omitted.permits > 0 {
        print_line(
            &mut out,
            omitted.permits,
            omitted.resources.count,
            &hr_size(omitted.resources.memory),
            "permits omitted for brevity",
        );
    }
    out.push('\n');
    print_line(
        &mut out,
        total.permits,
        total.resources.count,
        &hr_size(total.resources.memory),
        "total",
    );

    writeln!(
        out,
        "\nTotal: {} permits with {} count and {} memory resources",
        total.permits,
        total.resources.count,
        hr_size(total.resources.memory),
    )
    .expect("writing to a String cannot fail");

    out
}
