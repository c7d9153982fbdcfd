use crate::snapshot::Snapshot;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Instant;

/// Health of the agent itself, exposed on `/metrics` when `listen` is set.
pub struct Metrics {
    registry: Registry,
    started_at: Instant,
    pub hostmon_snapshots_total: Counter,
    pub hostmon_send_total: CounterVec,
    pub hostmon_cpu_percent: Gauge,
    pub hostmon_memory_percent: Gauge,
    pub hostmon_process_count: Gauge,
    pub hostmon_volume_bytes_read_total: CounterVec,
    pub hostmon_volume_bytes_written_total: CounterVec,
    pub hostmon_cpu_mean_percent: Gauge,
    pub hostmon_uptime_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let hostmon_snapshots_total = Counter::with_opts(opts!(
            "hostmon_snapshots_total",
            "Snapshots collected and handed to the sink"
        ))?;
        let hostmon_send_total = CounterVec::new(
            opts!("hostmon_send_total", "Snapshot deliveries by result"),
            &["result"],
        )?;
        let hostmon_cpu_percent = Gauge::with_opts(opts!(
            "hostmon_cpu_percent",
            "CPU usage in the latest snapshot (0..100)"
        ))?;
        let hostmon_memory_percent = Gauge::with_opts(opts!(
            "hostmon_memory_percent",
            "Physical memory usage in the latest snapshot (0..100)"
        ))?;
        let hostmon_process_count = Gauge::with_opts(opts!(
            "hostmon_process_count",
            "Process count in the latest snapshot"
        ))?;
        let hostmon_volume_bytes_read_total = CounterVec::new(
            opts!(
                "hostmon_volume_bytes_read_total",
                "Bytes read per volume, summed over snapshots"
            ),
            &["volume"],
        )?;
        let hostmon_volume_bytes_written_total = CounterVec::new(
            opts!(
                "hostmon_volume_bytes_written_total",
                "Bytes written per volume, summed over snapshots"
            ),
            &["volume"],
        )?;
        let hostmon_cpu_mean_percent = Gauge::with_opts(opts!(
            "hostmon_cpu_mean_percent",
            "Mean CPU usage over the last ten sent snapshots"
        ))?;
        let hostmon_uptime_seconds =
            Gauge::with_opts(opts!("hostmon_uptime_seconds", "Agent uptime in seconds"))?;

        register(&registry, &hostmon_snapshots_total)?;
        register(&registry, &hostmon_send_total)?;
        register(&registry, &hostmon_cpu_percent)?;
        register(&registry, &hostmon_memory_percent)?;
        register(&registry, &hostmon_process_count)?;
        register(&registry, &hostmon_volume_bytes_read_total)?;
        register(&registry, &hostmon_volume_bytes_written_total)?;
        register(&registry, &hostmon_cpu_mean_percent)?;
        register(&registry, &hostmon_uptime_seconds)?;

        Ok(Arc::new(Self {
            registry,
            started_at: Instant::now(),
            hostmon_snapshots_total,
            hostmon_send_total,
            hostmon_cpu_percent,
            hostmon_memory_percent,
            hostmon_process_count,
            hostmon_volume_bytes_read_total,
            hostmon_volume_bytes_written_total,
            hostmon_cpu_mean_percent,
            hostmon_uptime_seconds,
        }))
    }

    pub fn observe_snapshot(&self, snapshot: &Snapshot) {
        self.hostmon_snapshots_total.inc();
        self.hostmon_cpu_percent.set(snapshot.cpu_percent() as f64);
        self.hostmon_memory_percent
            .set(snapshot.memory_percent() as f64);
        self.hostmon_process_count
            .set(snapshot.process_count() as f64);
        for stat in snapshot.volume_io() {
            let volume = stat.volume_id.as_str();
            self.hostmon_volume_bytes_read_total
                .with_label_values(&[volume])
                .inc_by(stat.bytes_read as f64);
            self.hostmon_volume_bytes_written_total
                .with_label_values(&[volume])
                .inc_by(stat.bytes_written as f64);
        }
    }

    pub fn inc_send(&self, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.hostmon_send_total.with_label_values(&[result]).inc();
    }

    pub fn set_cpu_mean(&self, mean: f32) {
        self.hostmon_cpu_mean_percent.set(mean as f64);
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        self.hostmon_uptime_seconds
            .set(self.started_at.elapsed().as_secs_f64());
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
