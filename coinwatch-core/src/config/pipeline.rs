//! Names of the broker objects shared by every worker.

use compact_str::CompactString;

/// Broker keys the workers agree on.
///
/// All processes of one deployment must use the same names, otherwise they
/// silently talk past each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineNames {
    /// Queue carrying ticks from ingest to the threshold watcher.
    pub tick_queue: CompactString,
    /// Queue carrying commands from the router to ingest.
    pub command_queue: CompactString,
    /// Pub/sub channel carrying system events.
    pub event_channel: CompactString,
    /// Set holding the durable watch-list.
    pub watch_list_key: CompactString,
}

impl Default for PipelineNames {
    fn default() -> Self {
        Self {
            tick_queue: "price".into(),
            command_queue: "ingest_commands".into(),
            event_channel: "events".into(),
            watch_list_key: "watched_symbols".into(),
        }
    }
}
