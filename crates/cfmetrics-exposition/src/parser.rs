use std::collections::{HashMap, HashSet};

use crate::{
    error::{ExpositionError, Result},
    types::{MetricFamilies, MetricFamily, MetricSeries, MetricType, MetricValue},
};

type LabelSet = Vec<(String, String)>;

pub fn decode(input: &[u8]) -> Result<MetricFamilies> {
    let text = std::str::from_utf8(input).map_err(|_| ExpositionError::InvalidUtf8)?;
    let mut parser = TextParser::default();
    for (index, line) in text.lines().enumerate() {
        parser.parse_line(index + 1, line)?;
    }
    Ok(parser.finish())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suffix {
    Bucket,
    Sum,
    Count,
}

#[derive(Default)]
struct TextParser {
    families: MetricFamilies,
    typed: HashSet<String>,
    helped: HashSet<String>,
    grouped: HashMap<(String, LabelSet), usize>,
}

impl TextParser {
    fn parse_line(&mut self, line_no: usize, raw: &str) -> Result<()> {
        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }

        if let Some(comment) = line.strip_prefix('#') {
            return self.parse_comment(line_no, comment.trim_start());
        }

        let sample = parse_sample(line_no, line)?;
        self.add_sample(line_no, sample)
    }

    fn parse_comment(&mut self, line_no: usize, comment: &str) -> Result<()> {
        let Some((keyword, rest)) = comment.split_once(char::is_whitespace) else {
            return Ok(());
        };
        if keyword != "HELP" && keyword != "TYPE" {
            return Ok(());
        }

        let rest = rest.trim_start();
        let (name, text) = rest
            .split_once(char::is_whitespace)
            .map(|(name, text)| (name, text.trim_start()))
            .unwrap_or((rest, ""));
        if !is_valid_metric_name(name) {
            return Err(ExpositionError::parse(
                line_no,
                format!("invalid metric name in {keyword} line: {name:?}"),
            ));
        }

        if keyword == "HELP" {
            if !self.helped.insert(name.to_string()) {
                return Err(ExpositionError::parse(
                    line_no,
                    format!("second HELP line for metric {name}"),
                ));
            }
            self.family_entry(name).help = unescape_help(text);
            return Ok(());
        }

        let metric_type = MetricType::from_prometheus_type(text).ok_or_else(|| {
            ExpositionError::parse(line_no, format!("unknown metric type {text:?} for {name}"))
        })?;
        if !self.typed.insert(name.to_string()) {
            return Err(ExpositionError::parse(
                line_no,
                format!("second TYPE line for metric {name}"),
            ));
        }
        let family = self.family_entry(name);
        if !family.series.is_empty() {
            return Err(ExpositionError::parse(
                line_no,
                format!("TYPE line for {name} must precede its samples"),
            ));
        }
        family.metric_type = metric_type;
        Ok(())
    }

    fn add_sample(&mut self, line_no: usize, sample: Sample) -> Result<()> {
        let (family_name, suffix) = self.resolve_family(&sample.name);
        let metric_type = self.family_entry(&family_name).metric_type;

        match metric_type {
            MetricType::Counter | MetricType::Gauge | MetricType::Untyped => {
                let value = match metric_type {
                    MetricType::Counter => MetricValue::Counter(sample.value),
                    MetricType::Gauge => MetricValue::Gauge(sample.value),
                    _ => MetricValue::Untyped(sample.value),
                };
                let mut series = MetricSeries::new(sample.labels, value);
                series.timestamp_ms = sample.timestamp_ms;
                self.family_entry(&family_name).series.push(series);
            }
            MetricType::Histogram => {
                let mut labels = sample.labels;
                let bound = match suffix {
                    Some(Suffix::Bucket) => Some(take_float_label(line_no, &mut labels, "le")?),
                    Some(_) => None,
                    None => {
                        return Err(ExpositionError::parse(
                            line_no,
                            format!("unexpected sample {} in histogram", sample.name),
                        ));
                    }
                };
                let series = self.grouped_series(&family_name, labels, metric_type);
                if let Some(ts) = sample.timestamp_ms {
                    series.timestamp_ms = Some(ts);
                }
                if let MetricValue::Histogram {
                    buckets,
                    count,
                    sum,
                } = &mut series.value
                {
                    match (suffix, bound) {
                        (Some(Suffix::Bucket), Some(bound)) => {
                            buckets.push((bound, sample.value as u64))
                        }
                        (Some(Suffix::Count), _) => *count = sample.value as u64,
                        _ => *sum = sample.value,
                    }
                }
            }
            MetricType::Summary => {
                let mut labels = sample.labels;
                let quantile = match suffix {
                    None => Some(take_float_label(line_no, &mut labels, "quantile")?),
                    Some(Suffix::Bucket) => {
                        return Err(ExpositionError::parse(
                            line_no,
                            format!("unexpected sample {} in summary", sample.name),
                        ));
                    }
                    Some(_) => None,
                };
                let series = self.grouped_series(&family_name, labels, metric_type);
                if let Some(ts) = sample.timestamp_ms {
                    series.timestamp_ms = Some(ts);
                }
                if let MetricValue::Summary {
                    quantiles,
                    count,
                    sum,
                } = &mut series.value
                {
                    match (suffix, quantile) {
                        (None, Some(quantile)) => quantiles.push((quantile, sample.value)),
                        (Some(Suffix::Count), _) => *count = sample.value as u64,
                        _ => *sum = sample.value,
                    }
                }
            }
        }

        Ok(())
    }

    fn resolve_family(&self, name: &str) -> (String, Option<Suffix>) {
        if self.families.contains_key(name) {
            return (name.to_string(), None);
        }

        let candidates = [
            ("_bucket", Suffix::Bucket),
            ("_sum", Suffix::Sum),
            ("_count", Suffix::Count),
        ];
        for (ending, suffix) in candidates {
            let Some(base) = name.strip_suffix(ending) else {
                continue;
            };
            let Some(family) = self.families.get(base) else {
                continue;
            };
            let folds = match family.metric_type {
                MetricType::Histogram => true,
                MetricType::Summary => suffix != Suffix::Bucket,
                _ => false,
            };
            if folds {
                return (base.to_string(), Some(suffix));
            }
        }

        (name.to_string(), None)
    }

    fn family_entry(&mut self, name: &str) -> &mut MetricFamily {
        self.families
            .entry(name.to_string())
            .or_insert_with(|| MetricFamily::new(name, "", MetricType::Untyped))
    }

    fn grouped_series(
        &mut self,
        family_name: &str,
        labels: LabelSet,
        metric_type: MetricType,
    ) -> &mut MetricSeries {
        let key = (family_name.to_string(), labels);
        let family = self
            .families
            .entry(family_name.to_string())
            .or_insert_with(|| MetricFamily::new(family_name, "", metric_type));
        let index = match self.grouped.get(&key) {
            Some(index) => *index,
            None => {
                family.series.push(MetricSeries::new(
                    key.1.clone(),
                    MetricValue::empty_for(metric_type),
                ));
                let index = family.series.len() - 1;
                self.grouped.insert(key, index);
                index
            }
        };
        &mut family.series[index]
    }

    fn finish(mut self) -> MetricFamilies {
        self.families.retain(|_, family| !family.series.is_empty());
        for family in self.families.values_mut() {
            for series in &mut family.series {
                match &mut series.value {
                    MetricValue::Histogram { buckets, .. } => {
                        buckets.sort_by(|left, right| left.0.total_cmp(&right.0))
                    }
                    MetricValue::Summary { quantiles, .. } => {
                        quantiles.sort_by(|left, right| left.0.total_cmp(&right.0))
                    }
                    _ => {}
                }
            }
        }
        self.families
    }
}

#[derive(Debug)]
struct Sample {
    name: String,
    labels: LabelSet,
    value: f64,
    timestamp_ms: Option<i64>,
}

fn parse_sample(line_no: usize, line: &str) -> Result<Sample> {
    let name_end = line
        .find(|c: char| !is_metric_name_char(c))
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if !is_valid_metric_name(name) {
        return Err(ExpositionError::parse(
            line_no,
            format!("invalid metric name {name:?}"),
        ));
    }

    let mut rest = &line[name_end..];
    let labels = match rest.strip_prefix('{') {
        Some(inner) => {
            let (labels, remaining) = parse_labels(line_no, inner)?;
            rest = remaining;
            labels
        }
        None => Vec::new(),
    };

    if !rest.starts_with(char::is_whitespace) {
        return Err(ExpositionError::parse(
            line_no,
            format!("expected whitespace before value of {name}"),
        ));
    }

    let mut fields = rest.split_whitespace();
    let raw_value = fields
        .next()
        .ok_or_else(|| ExpositionError::parse(line_no, format!("missing value for {name}")))?;
    let value = parse_float(raw_value).ok_or_else(|| {
        ExpositionError::parse(line_no, format!("invalid value {raw_value:?} for {name}"))
    })?;
    let timestamp_ms = fields
        .next()
        .map(|raw| {
            raw.parse::<i64>().map_err(|_| {
                ExpositionError::parse(line_no, format!("invalid timestamp {raw:?} for {name}"))
            })
        })
        .transpose()?;
    if fields.next().is_some() {
        return Err(ExpositionError::parse(
            line_no,
            format!("unexpected trailing content after sample {name}"),
        ));
    }

    Ok(Sample {
        name: name.to_string(),
        labels,
        value,
        timestamp_ms,
    })
}

fn parse_labels(line_no: usize, input: &str) -> Result<(LabelSet, &str)> {
    let mut labels: LabelSet = Vec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if let Some(remaining) = rest.strip_prefix('}') {
            return Ok((labels, remaining));
        }

        let name_end = rest
            .find(|c: char| !is_label_name_char(c))
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        if !is_valid_label_name(name) {
            return Err(ExpositionError::parse(
                line_no,
                format!("invalid label name {name:?}"),
            ));
        }
        if labels.iter().any(|(existing, _)| existing == name) {
            return Err(ExpositionError::parse(
                line_no,
                format!("duplicate label name {name}"),
            ));
        }

        rest = rest[name_end..].trim_start();
        rest = rest.strip_prefix('=').ok_or_else(|| {
            ExpositionError::parse(line_no, format!("expected '=' after label {name}"))
        })?;
        rest = rest.trim_start();
        rest = rest.strip_prefix('"').ok_or_else(|| {
            ExpositionError::parse(line_no, format!("expected quoted value for label {name}"))
        })?;

        let (value, remaining) = read_label_value(rest).ok_or_else(|| {
            ExpositionError::parse(line_no, format!("unterminated value for label {name}"))
        })?;
        labels.push((name.to_string(), value));

        rest = remaining.trim_start();
        if let Some(remaining) = rest.strip_prefix(',') {
            rest = remaining;
        } else if !rest.starts_with('}') {
            return Err(ExpositionError::parse(
                line_no,
                format!("expected ',' or '}}' after label {name}"),
            ));
        }
    }
}

fn read_label_value(input: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((index, c)) = chars.next() {
        match c {
            '"' => return Some((value, &input[index + 1..])),
            '\\' => match chars.next()?.1 {
                'n' => value.push('\n'),
                '"' => value.push('"'),
                '\\' => value.push('\\'),
                other => {
                    value.push('\\');
                    value.push(other);
                }
            },
            other => value.push(other),
        }
    }
    None
}

fn take_float_label(line_no: usize, labels: &mut LabelSet, name: &str) -> Result<f64> {
    let position = labels
        .iter()
        .position(|(key, _)| key == name)
        .ok_or_else(|| ExpositionError::parse(line_no, format!("missing {name} label")))?;
    let (_, raw) = labels.remove(position);
    parse_float(&raw)
        .ok_or_else(|| ExpositionError::parse(line_no, format!("invalid {name} value {raw:?}")))
}

fn parse_float(raw: &str) -> Option<f64> {
    match raw {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => raw.parse::<f64>().ok(),
    }
}

fn unescape_help(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            output.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => output.push('\n'),
            Some('\\') => output.push('\\'),
            Some(other) => {
                output.push('\\');
                output.push(other);
            }
            None => output.push('\\'),
        }
    }
    output
}

fn is_metric_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

fn is_label_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_valid_metric_name(name: &str) -> bool {
    name.chars().next().is_some_and(|first| !first.is_ascii_digit())
        && name.chars().all(is_metric_name_char)
}

fn is_valid_label_name(name: &str) -> bool {
    name.chars().next().is_some_and(|first| !first.is_ascii_digit())
        && name.chars().all(is_label_name_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"# HELP http_requests_total The total number of HTTP requests.
# TYPE http_requests_total counter
http_requests_total{method="post",code="200"} 1027 1395066363000
http_requests_total{method="post",code="400"}    3 1395066363000

# A normal comment.
# HELP process_open_fds Open file descriptors.
# TYPE process_open_fds gauge
process_open_fds 17

# HELP http_request_duration_seconds A histogram of the request duration.
# TYPE http_request_duration_seconds histogram
http_request_duration_seconds_bucket{le="0.05"} 24054
http_request_duration_seconds_bucket{le="0.1"} 33444
http_request_duration_seconds_bucket{le="+Inf"} 144320
http_request_duration_seconds_sum 53423
http_request_duration_seconds_count 144320

# HELP rpc_duration_seconds A summary of the RPC duration in seconds.
# TYPE rpc_duration_seconds summary
rpc_duration_seconds{quantile="0.5"} 4773
rpc_duration_seconds{quantile="0.99"} 76656
rpc_duration_seconds_sum 1.7560473e+07
rpc_duration_seconds_count 2693
"#;

    #[test]
    fn decodes_all_family_types() {
        let families = decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(families.len(), 4);

        let requests = &families["http_requests_total"];
        assert_eq!(requests.metric_type, MetricType::Counter);
        assert_eq!(requests.help, "The total number of HTTP requests.");
        assert_eq!(requests.series.len(), 2);
        assert_eq!(requests.series[1].label("code"), Some("400"));
        assert_eq!(requests.series[1].value, MetricValue::Counter(3.0));
        assert_eq!(requests.series[0].timestamp_ms, Some(1_395_066_363_000));

        let fds = &families["process_open_fds"];
        assert_eq!(fds.series[0].value, MetricValue::Gauge(17.0));
        assert!(fds.series[0].labels.is_empty());

        let histogram = &families["http_request_duration_seconds"];
        assert_eq!(histogram.series.len(), 1);
        match &histogram.series[0].value {
            MetricValue::Histogram {
                buckets,
                count,
                sum,
            } => {
                assert_eq!(buckets.len(), 3);
                assert_eq!(buckets[0], (0.05, 24054));
                assert!(buckets[2].0.is_infinite());
                assert_eq!(*count, 144320);
                assert_eq!(*sum, 53423.0);
            }
            other => panic!("unexpected value {other:?}"),
        }

        let summary = &families["rpc_duration_seconds"];
        match &summary.series[0].value {
            MetricValue::Summary {
                quantiles, count, ..
            } => {
                assert_eq!(quantiles, &vec![(0.5, 4773.0), (0.99, 76656.0)]);
                assert_eq!(*count, 2693);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn histogram_series_are_grouped_by_labels_without_le() {
        let text = "# TYPE lat histogram\n\
                    lat_bucket{route=\"/a\",le=\"1\"} 1\n\
                    lat_bucket{route=\"/b\",le=\"1\"} 2\n\
                    lat_bucket{route=\"/a\",le=\"+Inf\"} 3\n\
                    lat_sum{route=\"/a\"} 0.5\n\
                    lat_count{route=\"/a\"} 3\n\
                    lat_count{route=\"/b\"} 2\n";
        let families = decode(text.as_bytes()).unwrap();
        let family = &families["lat"];
        assert_eq!(family.series.len(), 2);
        assert_eq!(family.series[0].label("route"), Some("/a"));
        assert_eq!(family.series[0].label("le"), None);
    }

    #[test]
    fn untyped_samples_without_metadata() {
        let families = decode(b"some_metric{a=\"1\"} 2.5\nother 1e3\n").unwrap();
        assert_eq!(families["some_metric"].metric_type, MetricType::Untyped);
        assert_eq!(families["other"].series[0].value, MetricValue::Untyped(1000.0));
    }

    #[test]
    fn sum_without_matching_histogram_is_its_own_family() {
        let families = decode(b"# TYPE jobs counter\njobs 4\njobs_sum 9\n").unwrap();
        assert!(families.contains_key("jobs_sum"));
        assert_eq!(families["jobs"].series.len(), 1);
    }

    #[test]
    fn label_value_escapes_are_decoded() {
        let families = decode(br#"msg{text="a \"quoted\" \\ path\nnext", x = "y" } 1"#).unwrap();
        let series = &families["msg"].series[0];
        assert_eq!(series.label("text"), Some("a \"quoted\" \\ path\nnext"));
        assert_eq!(series.label("x"), Some("y"));
    }

    #[test]
    fn special_float_values() {
        let families = decode(b"a +Inf\nb -Inf\nc NaN\n").unwrap();
        assert_eq!(families["a"].series[0].value, MetricValue::Untyped(f64::INFINITY));
        assert_eq!(
            families["b"].series[0].value,
            MetricValue::Untyped(f64::NEG_INFINITY)
        );
        match families["c"].series[0].value {
            MetricValue::Untyped(value) => assert!(value.is_nan()),
            ref other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn declared_but_empty_families_are_dropped() {
        let families = decode(b"# HELP ghost nothing here\n# TYPE ghost gauge\nup 1\n").unwrap();
        assert!(!families.contains_key("ghost"));
        assert!(families.contains_key("up"));
    }

    #[test]
    fn help_text_is_unescaped() {
        let families = decode(b"# HELP m first\\nsecond \\\\ end\nm 1\n").unwrap();
        assert_eq!(families["m"].help, "first\nsecond \\ end");
    }

    #[test]
    fn malformed_lines_report_line_numbers() {
        let err = decode(b"ok 1\nbroken{a=\"1\" 2\n").unwrap_err();
        assert!(matches!(err, ExpositionError::Parse { line: 2, .. }), "{err:?}");

        let err = decode(b"value_missing\n").unwrap_err();
        assert!(matches!(err, ExpositionError::Parse { line: 1, .. }));

        let err = decode(b"m not_a_number\n").unwrap_err();
        assert!(matches!(err, ExpositionError::Parse { line: 1, .. }));

        let err = decode(b"m 1 2 3\n").unwrap_err();
        assert!(matches!(err, ExpositionError::Parse { line: 1, .. }));
    }

    #[test]
    fn metadata_errors() {
        let err = decode(b"# TYPE m counter\n# TYPE m gauge\nm 1\n").unwrap_err();
        assert!(err.to_string().contains("second TYPE"));

        let err = decode(b"m 1\n# TYPE m gauge\n").unwrap_err();
        assert!(err.to_string().contains("must precede"));

        let err = decode(b"# TYPE m meter\nm 1\n").unwrap_err();
        assert!(err.to_string().contains("unknown metric type"));

        let err = decode(b"m{a=\"1\",a=\"2\"} 1\n").unwrap_err();
        assert!(err.to_string().contains("duplicate label"));
    }

    #[test]
    fn rejects_invalid_utf8_and_bad_names() {
        assert_eq!(decode(&[0xff, 0xfe]).unwrap_err(), ExpositionError::InvalidUtf8);
        assert!(decode(b"9lives 1\n").is_err());
        assert!(decode(b"foo-bar 1\n").is_err());
    }

    #[test]
    fn decode_then_encode_keeps_document_shape() {
        let families = decode(SAMPLE.as_bytes()).unwrap();
        let rendered = crate::render::encode(&families);
        let again = decode(rendered.as_bytes()).unwrap();
        assert_eq!(families, again);
    }
}
