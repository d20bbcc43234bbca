//! Renders one year of watermarks into bounded report chunks.
//!
//! ```text
//! ## **📊 Year `2025 (1)` Count Log:**
//! `日にち/date : 合計/sum  (5minutes change)`
//! `06/16` : **10** (+10)
//! `06/17` : **8** (+-2)
//! ```
//!
//! Each line's change is relative to the previous rendered line, starting
//! from zero, and the baseline carries across chunk boundaries within the
//! year. The `+` is always printed, so drops render as `(+-2)`.

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Data lines per chunk, which keeps a chunk under Discord's message limit.
pub const LINES_PER_CHUNK: usize = 50;
/// A `-# -n-` marker follows every this many data lines within a chunk.
pub const SEPARATOR_EVERY: usize = 5;

const DATE_LABEL: &str = "日にち/date";
const SUM_LABEL: &str = "合計/sum";
const CHANGE_LABEL: &str = "5minutes change";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportChunk {
    pub year: i32,
    /// 1-based position within the year.
    pub part: u32,
    /// Stable identity of this chunk inside posted message text.
    pub header_tag: String,
    pub body: String,
}

impl ReportChunk {
    fn new(year: i32, part: u32, lines: &[String]) -> Self {
        let header_tag = header_tag(year, part);
        let body = format!(
            "## **📊 {header_tag} Count Log:**\n`{DATE_LABEL} : {SUM_LABEL}  ({CHANGE_LABEL})`\n{}",
            lines.join("\n")
        );
        Self {
            year,
            part,
            header_tag,
            body,
        }
    }
}

/// The substring that identifies a chunk, e.g. ``Year `2025 (1)` ``. The
/// closing backtick keeps part 1 from matching part 10.
pub fn header_tag(year: i32, part: u32) -> String {
    format!("Year `{year} ({part})`")
}

fn data_line(date: NaiveDate, count: u64, delta: i128) -> String {
    format!("`{}` : **{}** (+{})", date.format("%m/%d"), count, delta)
}

/// Render `counts` (all within `year`) into chunks, in date order.
pub fn render(year: i32, counts: &BTreeMap<NaiveDate, u64>) -> Vec<ReportChunk> {
    let mut chunks = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut data_lines = 0usize;
    let mut prev: u64 = 0;

    for (&date, &count) in counts {
        lines.push(data_line(date, count, count as i128 - prev as i128));
        prev = count;
        data_lines += 1;

        if data_lines % SEPARATOR_EVERY == 0 {
            lines.push(format!("-# -{data_lines}-"));
        }

        if data_lines == LINES_PER_CHUNK {
            chunks.push(ReportChunk::new(year, chunks.len() as u32 + 1, &lines));
            lines.clear();
            data_lines = 0;
        }
    }

    if data_lines > 0 {
        chunks.push(ReportChunk::new(year, chunks.len() as u32 + 1, &lines));
    }

    chunks
}
