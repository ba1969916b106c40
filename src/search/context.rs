// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context-window reconstruction from the interleaved `context`/`match` stream.
//!
//! A context line between two matches of the same file belongs to whichever
//! match is nearer; on a tie it goes to the later match. Every context line is
//! therefore attributed to at most one match.

use std::ops::Range;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::search::events::{LineRecord, SearchEvent};
use crate::search::scoring::MatchScorer;
use crate::search::types::{ContextLine, Match};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Context,
    Match,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLine {
    pub kind: LineKind,
    pub record: LineRecord,
}

/// Index ranges into a file's line list describing one match window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    pub match_index: usize,
    pub before: Range<usize>,
    pub after: Range<usize>,
}

/// Attribute the context lines of one file to its matches.
pub fn attribute_context(lines: &[FileLine], before: usize, after: usize) -> Vec<ContextWindow> {
    let match_positions: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.kind == LineKind::Match)
        .map(|(idx, _)| idx)
        .collect();

    match_positions
        .iter()
        .enumerate()
        .map(|(k, &pos)| {
            let current = lines[pos].record.line;
            let previous = k
                .checked_sub(1)
                .map(|p| lines[match_positions[p]].record.line);
            let next = match_positions
                .get(k + 1)
                .map(|&n| lines[n].record.line);

            let mut start = pos;
            while start > 0 {
                let candidate = &lines[start - 1];
                let c = candidate.record.line;
                if candidate.kind != LineKind::Context
                    || c + 1 != lines[start].record.line
                    || current - c > before as u64
                {
                    break;
                }
                if let Some(p) = previous {
                    if c <= p || c - p < current - c {
                        break;
                    }
                }
                start -= 1;
            }

            let mut end = pos + 1;
            while end < lines.len() {
                let candidate = &lines[end];
                let c = candidate.record.line;
                if candidate.kind != LineKind::Context
                    || c != lines[end - 1].record.line + 1
                    || c - current > after as u64
                {
                    break;
                }
                if let Some(n) = next {
                    if c >= n || c - current >= n - c {
                        break;
                    }
                }
                end += 1;
            }

            ContextWindow {
                match_index: pos,
                before: start..pos,
                after: pos + 1..end,
            }
        })
        .collect()
}

/// Consumes tool events, groups them per file and emits scored matches.
#[derive(Debug)]
pub struct MatchCollector {
    root: PathBuf,
    before: usize,
    after: usize,
    scorer: MatchScorer,
    current_path: Option<PathBuf>,
    lines: Vec<FileLine>,
    matches: Vec<Match>,
}

impl MatchCollector {
    pub fn new(root: PathBuf, before: usize, after: usize, scorer: MatchScorer) -> Self {
        Self {
            root,
            before,
            after,
            scorer,
            current_path: None,
            lines: Vec::new(),
            matches: Vec::new(),
        }
    }

    pub fn push(&mut self, event: SearchEvent) {
        match event {
            SearchEvent::Begin { path } => {
                self.flush();
                self.current_path = Some(path);
            }
            SearchEvent::Context(record) => self.push_line(LineKind::Context, record),
            SearchEvent::Match(record) => self.push_line(LineKind::Match, record),
            SearchEvent::End { .. } => {
                self.flush();
                self.current_path = None;
            }
        }
    }

    pub fn finish(mut self) -> Vec<Match> {
        self.flush();
        self.matches
    }

    fn push_line(&mut self, kind: LineKind, record: LineRecord) {
        // Streams without begin/end markers still group correctly by path.
        if self.current_path.as_ref() != Some(&record.path) {
            self.flush();
            self.current_path = Some(record.path.clone());
        }
        self.lines.push(FileLine { kind, record });
    }

    fn flush(&mut self) {
        if self.lines.is_empty() {
            return;
        }
        let lines = std::mem::take(&mut self.lines);
        for window in attribute_context(&lines, self.before, self.after) {
            self.matches.push(self.build_match(&lines, &window));
        }
    }

    fn build_match(&self, lines: &[FileLine], window: &ContextWindow) -> Match {
        let record = &lines[window.match_index].record;
        let to_context = |line: &FileLine, is_match: bool| ContextLine {
            line: line.record.line,
            text: line.record.text.clone(),
            is_match,
        };

        let mut context = Vec::with_capacity(window.before.len() + 1 + window.after.len());
        context.extend(lines[window.before.clone()].iter().map(|l| to_context(l, false)));
        context.push(to_context(&lines[window.match_index], true));
        context.extend(lines[window.after.clone()].iter().map(|l| to_context(l, false)));

        Match {
            path: record.path.clone(),
            root: self.root.clone(),
            line: record.line,
            column: record.submatches.first().map(|s| s.start).unwrap_or(0),
            text: record.text.clone(),
            context,
            score: self
                .scorer
                .score(&record.path, &record.text, &record.submatches),
            submatches: record.submatches.clone(),
        }
    }
}

/// Drain the event channel into a collector until the producer hangs up.
pub async fn collect_events(
    mut rx: mpsc::Receiver<SearchEvent>,
    mut collector: MatchCollector,
) -> Vec<Match> {
    while let Some(event) = rx.recv().await {
        collector.push(event);
    }
    collector.finish()
}
