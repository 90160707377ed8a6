// Metric name constants for the publisher and the shard workers.
// Described and exported by the service binary.

#[derive(Debug, Clone, Copy)]
pub struct Metric {
    pub name: &'static str,
    pub description: &'static str,
}

// Upstream sink
pub const SINK_EVENTS_RECEIVED_TOTAL: Metric = Metric {
    name: "tweetamo_sink_events_received_total",
    description: "Total events handed over by the upstream source",
};

pub const SINK_EVENTS_DROPPED_TOTAL: Metric = Metric {
    name: "tweetamo_sink_events_dropped_total",
    description: "Total events dropped at the sink because the publish queue was full or closed",
};

// Publisher
pub const PUBLISH_TOTAL: Metric = Metric {
    name: "tweetamo_publish_total",
    description: "Total publish attempts to the log (result={success,retry,dropped})",
};

// Shard workers
pub const CONSUMER_RECORDS_PROCESSED_TOTAL: Metric = Metric {
    name: "tweetamo_consumer_records_processed_total",
    description: "Total records handed to the processor successfully (per shard)",
};

pub const CONSUMER_RECORDS_MALFORMED_TOTAL: Metric = Metric {
    name: "tweetamo_consumer_records_malformed_total",
    description: "Total records skipped because their payload failed to decode (per shard)",
};

pub const CONSUMER_CHECKPOINTS_TOTAL: Metric = Metric {
    name: "tweetamo_consumer_checkpoints_total",
    description: "Total checkpoints written (per shard)",
};

pub const CONSUMER_WORKER_FAILURES_TOTAL: Metric = Metric {
    name: "tweetamo_consumer_worker_failures_total",
    description: "Total shard workers that ended in the Failed state",
};

pub const ALL_METRICS: [Metric; 7] = [
    SINK_EVENTS_RECEIVED_TOTAL,
    SINK_EVENTS_DROPPED_TOTAL,
    PUBLISH_TOTAL,
    CONSUMER_RECORDS_PROCESSED_TOTAL,
    CONSUMER_RECORDS_MALFORMED_TOTAL,
    CONSUMER_CHECKPOINTS_TOTAL,
    CONSUMER_WORKER_FAILURES_TOTAL,
];
