use crate::types::{MetricFamilies, MetricFamily, MetricSeries, MetricValue};

pub fn encode(families: &MetricFamilies) -> String {
    let mut output = String::new();
    for family in families.values() {
        encode_family(&mut output, family);
    }
    output
}

pub fn encode_family(output: &mut String, family: &MetricFamily) {
    if family.series.is_empty() {
        return;
    }

    if !family.help.is_empty() {
        output.push_str("# HELP ");
        output.push_str(&family.name);
        output.push(' ');
        output.push_str(&escape_help(&family.help));
        output.push('\n');
    }

    output.push_str("# TYPE ");
    output.push_str(&family.name);
    output.push(' ');
    output.push_str(family.metric_type.as_prometheus_type());
    output.push('\n');

    for series in &family.series {
        encode_series(output, &family.name, series);
    }
}

fn encode_series(output: &mut String, name: &str, series: &MetricSeries) {
    let timestamp = series.timestamp_ms;
    match &series.value {
        MetricValue::Counter(value) | MetricValue::Gauge(value) | MetricValue::Untyped(value) => {
            output.push_str(&render_sample_line(name, &series.labels, None, *value, timestamp));
        }
        MetricValue::Histogram {
            buckets,
            count,
            sum,
        } => {
            let bucket_name = format!("{name}_bucket");
            let mut saw_inf = false;
            for (bound, cumulative) in buckets {
                saw_inf |= bound.is_infinite() && bound.is_sign_positive();
                let le = ("le", format_float(*bound));
                output.push_str(&render_sample_line(
                    &bucket_name,
                    &series.labels,
                    Some(le),
                    *cumulative as f64,
                    timestamp,
                ));
            }
            if !saw_inf {
                output.push_str(&render_sample_line(
                    &bucket_name,
                    &series.labels,
                    Some(("le", "+Inf".to_string())),
                    *count as f64,
                    timestamp,
                ));
            }
            output.push_str(&render_sample_line(
                &format!("{name}_sum"),
                &series.labels,
                None,
                *sum,
                timestamp,
            ));
            output.push_str(&render_sample_line(
                &format!("{name}_count"),
                &series.labels,
                None,
                *count as f64,
                timestamp,
            ));
        }
        MetricValue::Summary {
            quantiles,
            count,
            sum,
        } => {
            for (quantile, value) in quantiles {
                output.push_str(&render_sample_line(
                    name,
                    &series.labels,
                    Some(("quantile", format_float(*quantile))),
                    *value,
                    timestamp,
                ));
            }
            output.push_str(&render_sample_line(
                &format!("{name}_sum"),
                &series.labels,
                None,
                *sum,
                timestamp,
            ));
            output.push_str(&render_sample_line(
                &format!("{name}_count"),
                &series.labels,
                None,
                *count as f64,
                timestamp,
            ));
        }
    }
}

fn render_sample_line(
    name: &str,
    labels: &[(String, String)],
    extra: Option<(&str, String)>,
    value: f64,
    timestamp: Option<i64>,
) -> String {
    let mut rendered = String::new();
    rendered.push_str(name);

    if !labels.is_empty() || extra.is_some() {
        rendered.push('{');
        let pairs = labels
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .chain(extra.as_ref().map(|(key, value)| (*key, value.as_str())));
        for (index, (key, value)) in pairs.enumerate() {
            if index > 0 {
                rendered.push(',');
            }
            rendered.push_str(key);
            rendered.push_str("=\"");
            rendered.push_str(&escape_label_value(value));
            rendered.push('"');
        }
        rendered.push('}');
    }

    rendered.push(' ');
    rendered.push_str(&format_float(value));

    if let Some(ts) = timestamp {
        rendered.push(' ');
        rendered.push_str(&ts.to_string());
    }

    rendered.push('\n');
    rendered
}

pub(crate) fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}
