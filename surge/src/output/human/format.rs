use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

/// Milliseconds as `850µs`, `12.34ms` or `1.20s`.
pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() || ms < 0.0 {
        return "n/a".to_string();
    }
    if ms >= 1_000.0 {
        return format!("{:.2}s", ms / 1_000.0);
    }
    if ms >= 1.0 {
        return format!("{ms:.2}ms");
    }
    format!("{:.0}µs", ms * 1_000.0)
}

pub(crate) fn format_ms_opt(ms: Option<f64>) -> String {
    ms.map_or_else(|| "n/a".to_string(), format_ms)
}

pub(crate) fn format_percent(ratio: f64) -> String {
    if !ratio.is_finite() {
        return "n/a".to_string();
    }
    let pct = ratio * 100.0;
    if pct == pct.trunc() {
        format!("{pct:.0}%")
    } else {
        format!("{pct:.2}%")
    }
}

pub(crate) fn format_duration(d: Duration) -> String {
    // Always a single rounded component in one of: ms, s.
    let total_ms = d.as_millis();
    if total_ms >= 1_000 {
        return format!("{}s", (total_ms + 500) / 1_000);
    }
    format!("{total_ms}ms")
}

pub(crate) fn format_value(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

pub(crate) fn format_bytes(b: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if b >= GIB {
        return format!("{:.2}GiB", (b as f64) / (GIB as f64));
    }
    if b >= MIB {
        return format!("{:.2}MiB", (b as f64) / (MIB as f64));
    }
    if b >= KIB {
        return format!("{:.2}KiB", (b as f64) / (KIB as f64));
    }

    format!("{b}B")
}
