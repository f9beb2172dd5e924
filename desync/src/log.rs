//! Per-node protocol log.
//!
//! Every node keeps an append-only list of [`LogRecord`]s. The field order and
//! the kind vocabulary are consumed by offline analysis tooling, so both are
//! fixed: `(time, node_id, kind, detail)` with kind one of `init`,
//! `broadcast`, `deficit`, `reset`.

use core::fmt;

use crate::time::Timestamp;
use crate::types::NodeId;

/// Detail string for records that carry no value.
pub const DETAIL_NONE: &str = "None";

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    /// Node constructed.
    Init,
    /// Node broadcast its beacon.
    Broadcast,
    /// Slot closed; detail is the relative deficit.
    Deficit,
    /// Adjustment loop detected; node backs off.
    Reset,
}

impl LogKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogKind::Init => "init",
            LogKind::Broadcast => "broadcast",
            LogKind::Deficit => "deficit",
            LogKind::Reset => "reset",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub time: Timestamp,
    pub node: NodeId,
    pub kind: LogKind,
    pub detail: String,
}

impl LogRecord {
    pub fn new(time: Timestamp, node: NodeId, kind: LogKind, detail: impl Into<String>) -> Self {
        Self {
            time,
            node,
            kind,
            detail: detail.into(),
        }
    }

    /// Record without a detail value.
    pub fn bare(time: Timestamp, node: NodeId, kind: LogKind) -> Self {
        Self::new(time, node, kind, DETAIL_NONE)
    }

    /// Parse the deficit value back out of a `deficit` record.
    pub fn deficit(&self) -> Option<f64> {
        match self.kind {
            LogKind::Deficit => self.detail.parse().ok(),
            _ => None,
        }
    }
}

/// Tab-separated, in contract field order.
impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.time, self.node, self.kind, self.detail
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_rendering() {
        let record = LogRecord::bare(Timestamp::from_ticks(1500), 3, LogKind::Broadcast);
        assert_eq!(record.to_string(), "1500\t3\tbroadcast\tNone");

        let record = LogRecord::new(Timestamp::from_ticks(20), 1, LogKind::Deficit, "0.25");
        assert_eq!(record.to_string(), "20\t1\tdeficit\t0.25");
        assert_eq!(record.deficit(), Some(0.25));
    }

    #[test]
    fn test_kind_vocabulary() {
        let kinds = [
            LogKind::Init,
            LogKind::Broadcast,
            LogKind::Deficit,
            LogKind::Reset,
        ];
        let names: Vec<_> = kinds.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, ["init", "broadcast", "deficit", "reset"]);
    }
}
