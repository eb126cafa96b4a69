use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    pub fn as_prometheus_type(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Summary => "summary",
            Self::Untyped => "untyped",
        }
    }

    pub fn from_prometheus_type(value: &str) -> Option<Self> {
        match value {
            "counter" => Some(Self::Counter),
            "gauge" => Some(Self::Gauge),
            "histogram" => Some(Self::Histogram),
            "summary" => Some(Self::Summary),
            "untyped" => Some(Self::Untyped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(f64),
    Gauge(f64),
    Untyped(f64),
    Histogram {
        buckets: Vec<(f64, u64)>,
        count: u64,
        sum: f64,
    },
    Summary {
        quantiles: Vec<(f64, f64)>,
        count: u64,
        sum: f64,
    },
}

impl MetricValue {
    pub fn empty_for(metric_type: MetricType) -> Self {
        match metric_type {
            MetricType::Counter => Self::Counter(0.0),
            MetricType::Gauge => Self::Gauge(0.0),
            MetricType::Untyped => Self::Untyped(0.0),
            MetricType::Histogram => Self::Histogram {
                buckets: Vec::new(),
                count: 0,
                sum: 0.0,
            },
            MetricType::Summary => Self::Summary {
                quantiles: Vec::new(),
                count: 0,
                sum: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub labels: Vec<(String, String)>,
    pub value: MetricValue,
    pub timestamp_ms: Option<i64>,
}

impl MetricSeries {
    pub fn new(labels: Vec<(String, String)>, value: MetricValue) -> Self {
        Self {
            labels,
            value,
            timestamp_ms: None,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub series: Vec<MetricSeries>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, help: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            metric_type,
            series: Vec::new(),
        }
    }

    pub fn with_series(mut self, series: MetricSeries) -> Self {
        self.series.push(series);
        self
    }
}

pub type MetricFamilies = BTreeMap<String, MetricFamily>;
