const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
const SPARK_BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Human uptime from milliseconds, bucketed to the two most significant units.
pub fn format_uptime(ms: Option<u64>) -> String {
    let Some(ms) = ms else {
        return "-".to_string();
    };
    let s = ms / 1000;
    match s {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m {}s", s / 60, s % 60),
        s if s < 86400 => format!("{}h {}m", s / 3600, (s % 3600) / 60),
        s => format!("{}d {}h", s / 86400, (s % 86400) / 3600),
    }
}

/// Byte count with binary multiples. Zero renders as a dash since the
/// registry reports 0 for processes it has no sample for.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "-".to_string();
    }

    let mut value = bytes as f64;
    let mut idx = 0;
    while value >= 1024.0 && idx < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }

    if idx == 0 {
        format!("{bytes} B")
    } else {
        format!("{} {}", trim_decimal(value), BYTE_UNITS[idx])
    }
}

pub fn format_memory(bytes: Option<u64>) -> String {
    bytes.map(format_bytes).unwrap_or_else(|| "-".to_string())
}

pub fn format_percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1}%"))
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_optional<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// One-decimal rendering with a trailing `.0` dropped.
fn trim_decimal(value: f64) -> String {
    let rendered = format!("{value:.1}");
    match rendered.strip_suffix(".0") {
        Some(whole) => whole.to_string(),
        None => rendered,
    }
}

/// Block-character sparkline of percentages in `[0, 100]`.
pub fn sparkline<I>(values: I) -> String
where
    I: IntoIterator<Item = f64>,
{
    values
        .into_iter()
        .map(|v| {
            let clamped = v.clamp(0.0, 100.0);
            let idx = ((clamped / 100.0) * (SPARK_BARS.len() - 1) as f64).round() as usize;
            SPARK_BARS[idx.min(SPARK_BARS.len() - 1)]
        })
        .collect()
}
