use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
}

impl ThresholdOp {
    pub fn compare(self, observed: f64, expected: f64) -> bool {
        match self {
            ThresholdOp::Lt => observed < expected,
            ThresholdOp::Lte => observed <= expected,
            ThresholdOp::Gt => observed > expected,
            ThresholdOp::Gte => observed >= expected,
            ThresholdOp::Eq => observed == expected,
            ThresholdOp::Ne => observed != expected,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ThresholdOp::Lt => "<",
            ThresholdOp::Lte => "<=",
            ThresholdOp::Gt => ">",
            ThresholdOp::Gte => ">=",
            ThresholdOp::Eq => "==",
            ThresholdOp::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Count,
    Rate,
    Value,
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in `(0, 100]`.
    P(f64),
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdAgg::Count => f.write_str("count"),
            ThresholdAgg::Rate => f.write_str("rate"),
            ThresholdAgg::Value => f.write_str("value"),
            ThresholdAgg::Avg => f.write_str("avg"),
            ThresholdAgg::Min => f.write_str("min"),
            ThresholdAgg::Max => f.write_str("max"),
            ThresholdAgg::Med => f.write_str("med"),
            ThresholdAgg::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

impl ThresholdExpr {
    pub fn passes(&self, observed: f64) -> bool {
        self.op.compare(observed, self.value)
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.agg, self.op.as_str(), self.value)
    }
}

/// Parses `<agg> <op> <number>`, e.g. `p(95)<2000` or `rate < 0.05`. Whitespace is ignored.
pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Ne),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        other => {
            let Some(inner) = other.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) else {
                return Err(format!("unknown aggregation `{left}` in threshold: {raw}"));
            };
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
            if !(p > 0.0 && p <= 100.0) {
                return Err(format!("percentile out of range in threshold: {raw}"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;
    if !value.is_finite() {
        return Err(format!("invalid numeric value in threshold: {raw}"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ThresholdExpr {
        parse_threshold_expr(raw).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn parses_default_profile_thresholds() {
        let p95 = parse("p(95)<2000");
        assert_eq!(p95.agg, ThresholdAgg::P(95.0));
        assert_eq!(p95.op, ThresholdOp::Lt);
        assert_eq!(p95.value, 2000.0);

        let rate = parse("rate<0.05");
        assert_eq!(rate.agg, ThresholdAgg::Rate);
        assert_eq!(rate.value, 0.05);
    }

    #[test]
    fn trims_whitespace_and_reads_two_char_ops() {
        let expr = parse("  avg  <=  123  ");
        assert_eq!(expr.agg, ThresholdAgg::Avg);
        assert_eq!(expr.op, ThresholdOp::Lte);
        assert_eq!(parse("count != 0").op, ThresholdOp::Ne);
        assert_eq!(parse("value>=-1").value, -1.0);
        assert_eq!(parse("MED==5").agg, ThresholdAgg::Med);
    }

    #[test]
    fn accepts_fractional_percentiles() {
        assert_eq!(parse("p(99.9)<500").agg, ThresholdAgg::P(99.9));
        assert_eq!(parse("p(100)<500").agg, ThresholdAgg::P(100.0));
    }

    #[test]
    fn rejects_malformed_expressions() {
        for raw in [
            "",
            "   ",
            "p(95)",
            "<2000",
            "p(95)<",
            "p(0)<1",
            "p(101)<1",
            "p(abc)<1",
            "p95<1",
            "mean<1",
            "rate<abc",
            "rate<inf",
        ] {
            assert!(parse_threshold_expr(raw).is_err(), "accepted `{raw}`");
        }
        let err = parse_threshold_expr("p(101)<1").err().unwrap_or_default();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn display_round_trips_through_the_parser() {
        let expr = parse("p(99.9) < 1500");
        assert_eq!(expr.to_string(), "p(99.9)<1500");
        assert_eq!(parse(&expr.to_string()), expr);
    }

    #[test]
    fn comparisons() {
        assert!(parse("rate<0.05").passes(0.0));
        assert!(!parse("rate<0.05").passes(0.05));
        assert!(parse("count>=10").passes(10.0));
        assert!(parse("count!=0").passes(3.0));
    }
}
