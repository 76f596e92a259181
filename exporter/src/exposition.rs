//! Text exposition of metric families
//!
//! ```text
//! # HELP <name> <help>
//! # TYPE <name> <type>
//! <name>{<key>="<value>",...} <value>
//! ```
//!
//! Label pairs keep the sample's key order. Pairs with an empty value are
//! left out, since Prometheus treats them as absent anyway.

use crate::family::{FamilyGenerator, Metric};
use std::fmt::Write;

/// Write the `# HELP` / `# TYPE` header of a family
pub fn write_header(out: &mut String, generator: &FamilyGenerator) {
    let _ = writeln!(out, "# HELP {} {}", generator.name, escape_help(generator.help));
    let _ = writeln!(out, "# TYPE {} {}", generator.name, generator.metric_type);
}

/// Write one sample line
pub fn write_metric(out: &mut String, name: &str, metric: &Metric) {
    out.push_str(name);

    let mut pairs = metric
        .label_keys
        .iter()
        .zip(&metric.label_values)
        .filter(|(_, value)| !value.is_empty())
        .peekable();

    if pairs.peek().is_some() {
        out.push('{');
        for (i, (key, value)) in pairs.enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{key}=\"{}\"", escape_label_value(value));
        }
        out.push('}');
    }

    out.push(' ');
    out.push_str(&format_value(metric.value));
    out.push('\n');
}

/// Format a sample value the way Go's `strconv.FormatFloat(v, 'g', -1, 64)` does
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // `{:e}` yields the shortest round-tripping digits, e.g. "1.5e9"
    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };

    // Shortest formatting switches to exponent form outside [1e-4, 1e6)
    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    } else {
        format!("{value}")
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::MetricType;

    fn noop(_: &crate::resource::ManagedCluster) -> crate::family::Family {
        crate::family::Family::default()
    }

    #[test]
    fn test_format_value_matches_go() {
        assert_eq!(format_value(1.5e9), "1.5e+09");
        assert_eq!(format_value(1.0), "1");
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(0.25), "0.25");
        assert_eq!(format_value(123456.0), "123456");
        assert_eq!(format_value(1234567.0), "1.234567e+06");
        assert_eq!(format_value(1_000_000.0), "1e+06");
        assert_eq!(format_value(0.0001), "0.0001");
        assert_eq!(format_value(0.00001), "1e-05");
        assert_eq!(format_value(-2.5), "-2.5");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn test_header() {
        let generator = FamilyGenerator {
            name: "acm_managedcluster_created",
            help: "Unix creation timestamp",
            metric_type: MetricType::Gauge,
            generate: noop,
        };
        let mut out = String::new();
        write_header(&mut out, &generator);
        assert_eq!(
            out,
            "# HELP acm_managedcluster_created Unix creation timestamp\n\
             # TYPE acm_managedcluster_created gauge\n"
        );
    }

    #[test]
    fn test_metric_keeps_label_order_and_skips_empty() {
        let metric = Metric::new(1.0)
            .label("vendor", "aws")
            .label("cloud", "")
            .label("created_via", "hive")
            .label("hub_name", "mc1");
        let mut out = String::new();
        write_metric(&mut out, "m", &metric);
        assert_eq!(out, "m{vendor=\"aws\",created_via=\"hive\",hub_name=\"mc1\"} 1\n");
    }

    #[test]
    fn test_metric_without_labels() {
        let mut out = String::new();
        write_metric(&mut out, "m", &Metric::new(3.0).label("vendor", ""));
        assert_eq!(out, "m 3\n");
    }

    #[test]
    fn test_label_values_are_escaped() {
        let metric = Metric::new(1.0).label("k", "a\"b\\c\nd");
        let mut out = String::new();
        write_metric(&mut out, "m", &metric);
        assert_eq!(out, "m{k=\"a\\\"b\\\\c\\nd\"} 1\n");
    }
}
