use std::borrow::Cow;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Set,
}

impl MetricKind {
    fn suffix(self) -> &'static str {
        match self {
            MetricKind::Counter => "c",
            MetricKind::Gauge => "g",
            MetricKind::Histogram => "h",
            MetricKind::Set => "s",
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) enum MetricValue<'a> {
    Integer(i64),
    Float(f64),
    Text(&'a str),
}

/// Renders one metric event as a protocol line:
///
/// ```text
/// <name>:<value>|<type>[|@<rate>][|#<tag>,...]
/// ```
///
/// The rate section appears only below 1. Per-call tags come first in the tag
/// section, followed by the pre-joined global tags; `|#` is written once if either is
/// non-empty.
pub(crate) fn render_line(
    name: &str,
    value: MetricValue<'_>,
    kind: MetricKind,
    tags: &[Cow<'_, str>],
    global_tags: &str,
    rate: f64,
) -> String {
    let mut line = String::with_capacity(name.len() + 16);
    line.push_str(name);
    line.push(':');

    match value {
        MetricValue::Integer(v) => line.push_str(itoa::Buffer::new().format(v)),
        MetricValue::Float(v) => line.push_str(&format_float(v)),
        MetricValue::Text(v) => line.push_str(v),
    }

    line.push('|');
    line.push_str(kind.suffix());

    if rate < 1.0 {
        line.push_str("|@");
        line.push_str(ryu::Buffer::new().format(rate));
    }

    let mut wrote_tag = false;
    for tag in tags {
        line.push_str(if wrote_tag { "," } else { "|#" });
        wrote_tag = true;
        line.push_str(tag);
    }
    if !global_tags.is_empty() {
        line.push_str(if wrote_tag { "," } else { "|#" });
        line.push_str(global_tags);
    }

    line
}

/// Renders a gauge or histogram value with six significant digits, trailing zeros
/// trimmed. Magnitudes outside the fixed-notation window fall back to scientific
/// notation, which DogStatsD servers parse like any other float.
fn format_float(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return String::from("0");
    }

    let magnitude = value.abs().log10().floor() as i32;
    if (-4..6).contains(&magnitude) {
        let decimals = (5 - magnitude) as usize;
        let fixed = format!("{value:.decimals$}");
        if fixed.contains('.') {
            fixed.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            fixed
        }
    } else {
        let scientific = format!("{value:.5e}");
        match scientific.split_once('e') {
            Some((mantissa, exponent)) if mantissa.contains('.') => {
                let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
                format!("{mantissa}e{exponent}")
            }
            _ => scientific,
        }
    }
}
