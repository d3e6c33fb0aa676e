//! Hardware performance counters provided by a vendor library.
//!
//! The profiler only needs to enumerate the counters and collect one set of values per frame.
//! Without a vendor backend the metrics of every frame are simply empty.

/// Unit of a metric value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MetricUnit {
    #[default]
    Generic,
    Percentage,
    Nanoseconds,
    Bytes,
    BytesPerSecond,
    Kelvin,
    Watts,
    Volts,
    Amps,
    Hertz,
    Cycles,
}

/// Description of a metric reported by a backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MetricProperties {
    pub short_name: String,
    pub description: String,
    pub unit: MetricUnit,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    Float(f64),
    Unsigned(u64),
    Signed(i64),
}

/// Outcome of [`MetricsBackend::enumerate_properties`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnumerateResult {
    /// Number of metrics available, or written.
    Complete(usize),
    /// The buffer was too small. Holds the number of properties written.
    Incomplete(usize),
}

/// Source of hardware performance counters.
pub trait VendorMetrics: Send + Sync {
    /// Properties of all metrics, in the order values are reported.
    fn metric_properties(&self) -> Vec<MetricProperties>;

    fn metric_count(&self) -> usize {
        self.metric_properties().len()
    }

    /// Values collected over the frame that just ended, in the order of [`Self::metric_properties`].
    fn collect_frame_metrics(&self) -> Vec<MetricValue>;
}

#[derive(Default)]
pub enum MetricsBackend {
    #[default]
    None,
    Vendor(Box<dyn VendorMetrics>),
}

impl MetricsBackend {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Vendor(_))
    }

    pub fn metric_count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Vendor(vendor) => vendor.metric_count(),
        }
    }

    /// Two-call enumeration: without a buffer, reports the number of metrics.
    /// With a buffer, fills as many properties as fit.
    pub fn enumerate_properties(&self, properties: Option<&mut [MetricProperties]>) -> EnumerateResult {
        let Some(properties) = properties else {
            return EnumerateResult::Complete(self.metric_count());
        };

        let available = match self {
            Self::None => Vec::new(),
            Self::Vendor(vendor) => vendor.metric_properties(),
        };
        let written = available.len().min(properties.len());
        properties[..written].clone_from_slice(&available[..written]);

        if written < available.len() {
            EnumerateResult::Incomplete(written)
        } else {
            EnumerateResult::Complete(written)
        }
    }

    pub fn collect_frame_metrics(&self) -> Vec<MetricValue> {
        match self {
            Self::None => Vec::new(),
            Self::Vendor(vendor) => vendor.collect_frame_metrics(),
        }
    }
}

impl std::fmt::Debug for MetricsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Vendor(vendor) => write!(f, "Vendor({} metrics)", vendor.metric_count()),
        }
    }
}
