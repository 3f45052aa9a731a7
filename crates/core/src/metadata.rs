//! Informational counters attached to every parse result.

use indexmap::IndexMap;
use serde::Serialize;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::parser::Document;
use crate::rules::RuleSet;
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsingMetadata {
    /// Start of the parse, RFC 3339.
    pub started_at: String,
    pub started_at_unix_ms: i64,
    pub elapsed_us: u64,
    pub input_bytes: u64,
    pub line_count: usize,
    pub field_count: usize,
    pub rule_count: usize,
    pub record_count: usize,
    pub error_count: usize,
    /// Mean serialized size of the kept records; 0 with no records.
    pub average_record_bytes: f64,
    /// Wall time per section kind, summed over repeated passes.
    pub section_timings_us: IndexMap<String, u64>,
}

pub(crate) struct MetadataCollector {
    started_at: OffsetDateTime,
    clock: Instant,
    sections: IndexMap<String, u64>,
}

impl MetadataCollector {
    pub(crate) fn start() -> Self {
        MetadataCollector {
            started_at: OffsetDateTime::now_utc(),
            clock: Instant::now(),
            sections: IndexMap::new(),
        }
    }

    pub(crate) fn section(&mut self, name: &str, elapsed: Duration) {
        *self.sections.entry(name.to_owned()).or_insert(0) += micros(elapsed);
    }

    pub(crate) fn finish(
        self,
        input_bytes: u64,
        line_count: usize,
        schema: &Schema,
        rules: &RuleSet,
        records: &[Document],
        error_count: usize,
    ) -> ParsingMetadata {
        let record_bytes: usize = records
            .iter()
            .map(|d| serde_json::to_string(&d.value).map_or(0, |s| s.len()))
            .sum();
        let average_record_bytes = if records.is_empty() {
            0.0
        } else {
            record_bytes as f64 / records.len() as f64
        };
        ParsingMetadata {
            started_at: self
                .started_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| self.started_at.to_string()),
            started_at_unix_ms: (self.started_at.unix_timestamp_nanos() / 1_000_000) as i64,
            elapsed_us: micros(self.clock.elapsed()),
            input_bytes,
            line_count,
            field_count: schema.field_count(),
            rule_count: rules.rule_count(),
            record_count: records.len(),
            error_count,
            average_record_bytes,
            section_timings_us: self.sections,
        }
    }
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
